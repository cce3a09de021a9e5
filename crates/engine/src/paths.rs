//! Vault path helpers. Vault paths are relative and `/`-separated.

const TRASH_DIR: &str = ".trash";

/// Normalize a configured folder into a prefix ending with `/`.
///
/// `""` and `"/"` mean the vault root and normalize to `""`, which every
/// path starts with.
pub fn normalize_folder(folder: &str) -> String {
    let trimmed = folder.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// Whether `path` lives under `folder` (normalized or not).
pub fn folder_contains(folder: &str, path: &str) -> bool {
    path.starts_with(&normalize_folder(folder))
}

/// Whether any segment of `path` is the host's trash folder.
pub fn is_trashed(path: &str) -> bool {
    path.split('/').any(|segment| segment == TRASH_DIR)
}

pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub(crate) fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// `.md` and `md` both mean the markdown extension filter.
pub(crate) fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn folder_gets_trailing_separator() {
        assert_eq!(normalize_folder("RandomTables"), "RandomTables/");
        assert_eq!(normalize_folder("RandomTables/"), "RandomTables/");
        assert_eq!(normalize_folder("/Games/Tables"), "Games/Tables/");
    }

    #[test]
    fn root_folder_matches_everything() {
        assert_eq!(normalize_folder("/"), "");
        assert_eq!(normalize_folder(""), "");
        assert!(folder_contains("/", "anything/at/all.md"));
    }

    #[test]
    fn prefix_match_requires_whole_segment() {
        assert!(folder_contains("Tables", "Tables/loot.md"));
        assert!(!folder_contains("Tables", "TablesOld/loot.md"));
    }

    #[test]
    fn trash_detection_checks_segments() {
        assert!(is_trashed("RandomTables/.trash/old.md"));
        assert!(is_trashed(".trash/old.md"));
        assert!(!is_trashed("RandomTables/trash.md"));
    }

    #[test]
    fn extension_ignores_dotfiles() {
        assert_eq!(extension("a/b/notes.md"), Some("md"));
        assert_eq!(extension("a/.hidden"), None);
        assert_eq!(extension("a/plain"), None);
        assert_eq!(normalize_extension(".md"), "md");
    }
}
