use serde::{Deserialize, Serialize};

/// Title given to a section that has no heading line.
pub const NAKED_TABLE_NAME: &str = "RTNakedList";

/// A titled list of items extracted from one section of a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Note name with the `.md` extension stripped
    pub file_name: String,

    /// Heading text, or [`NAKED_TABLE_NAME`]
    pub title: String,

    /// Pickable entries, list markers removed
    pub items: Vec<String>,

    /// Full path of the owning note, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl Table {
    #[must_use]
    pub fn new(file_name: impl Into<String>, title: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            file_name: file_name.into(),
            title: title.into(),
            items,
            source_file: None,
        }
    }

    /// Builder: attach the owning note's path
    #[must_use]
    pub fn with_source(mut self, path: impl Into<String>) -> Self {
        self.source_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn is_naked(&self) -> bool {
        self.title == NAKED_TABLE_NAME
    }

    /// Registry key for this table, see [`table_key`]
    #[must_use]
    pub fn key(&self) -> String {
        table_key(&self.file_name, &self.title)
    }
}

/// Lower-case the input and collapse whitespace runs into `-`.
#[must_use]
pub fn normalize_key_part(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Collision-safe key for a `(file_name, title)` pair.
///
/// Two sections that normalize to the same key are the same table; the one
/// loaded last replaces the other.
#[must_use]
pub fn table_key(file_name: &str, title: &str) -> String {
    format!(
        "{}-{}",
        normalize_key_part(file_name),
        normalize_key_part(title)
    )
}
