use crate::types::{Table, NAKED_TABLE_NAME};
use once_cell::sync::Lazy;
use regex::Regex;

static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d+\.|[*-])\s").expect("list item pattern is valid"));

static HEADER_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#+\s*").expect("header pattern is valid"));

static HORIZONTAL_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-{3,}$").expect("rule pattern is valid"));

/// Extract every random table from a note.
///
/// Never fails: malformed sections are skipped and the worst case is an empty
/// result. Sections without at least one item are dropped entirely.
#[must_use]
pub fn extract_tables(file_name: &str, content: &str) -> Vec<Table> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let file_name = strip_markdown_extension(file_name);
    split_sections(content)
        .into_iter()
        .filter_map(|section| parse_section(file_name, &section))
        .collect()
}

/// Strip trailing `.md` extensions (`notes.md.md` -> `notes`).
#[must_use]
pub fn strip_markdown_extension(file_name: &str) -> &str {
    let mut name = file_name;
    while let Some(stripped) = name.strip_suffix(".md") {
        name = stripped;
    }
    name
}

fn split_sections(content: &str) -> Vec<String> {
    let normalized = content.replace("\r\n", "\n");
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.split('\n') {
        if HORIZONTAL_RULE.is_match(line) {
            sections.push(current.join("\n"));
            current.clear();
        } else {
            current.push(line);
        }
    }
    sections.push(current.join("\n"));
    sections
}

fn parse_section(file_name: &str, section: &str) -> Option<Table> {
    let lines: Vec<&str> = section
        .trim()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.len() < 2 {
        return None;
    }

    let (title, candidates) = if LIST_ITEM.is_match(lines[0]) {
        (NAKED_TABLE_NAME.to_string(), &lines[..])
    } else {
        let title = HEADER_MARKERS.replace(lines[0], "").trim().to_string();
        (title, &lines[1..])
    };

    let items: Vec<String> = candidates
        .iter()
        .filter_map(|line| {
            let marker = LIST_ITEM.find(line)?;
            let item = line[marker.end()..].trim();
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect();

    if items.is_empty() {
        return None;
    }

    Some(Table::new(file_name, title, items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn titles(tables: &[Table]) -> Vec<&str> {
        tables.iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn empty_and_blank_content_yield_nothing() {
        assert!(extract_tables("a.md", "").is_empty());
        assert!(extract_tables("a.md", "  \n\t\n ").is_empty());
    }

    #[test]
    fn single_titled_table() {
        let tables = extract_tables("weapons.md", "Weapons\n- Sword\n- Axe\n- Bow");
        assert_eq!(
            tables,
            vec![Table::new(
                "weapons",
                "Weapons",
                vec!["Sword".into(), "Axe".into(), "Bow".into()]
            )]
        );
    }

    #[test]
    fn empty_sections_between_rules_are_skipped() {
        let tables = extract_tables(
            "loot.md",
            "Weapons\n- Sword\n- Axe\n---\n\n---\nPotions\n- Health",
        );
        assert_eq!(titles(&tables), vec!["Weapons", "Potions"]);
        assert_eq!(tables[1].items, vec!["Health"]);
    }

    #[test]
    fn numbered_naked_list() {
        let tables = extract_tables("weapons.md", "1. Sword\n2. Axe\n3. Dagger\n4. Mace");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].title, NAKED_TABLE_NAME);
        assert_eq!(tables[0].items, vec!["Sword", "Axe", "Dagger", "Mace"]);
    }

    #[test]
    fn title_only_section_is_dropped() {
        let tables = extract_tables(
            "loot.md",
            "Weapons\n- Sword\n- Axe\n---\nEmpty Section\n---\nPotions\n- Health",
        );
        assert_eq!(titles(&tables), vec!["Weapons", "Potions"]);
    }

    #[test]
    fn header_markers_are_stripped_from_titles() {
        let tables = extract_tables("npc", "## Tavern Keepers  \n* Greta\n* Olaf");
        assert_eq!(tables[0].title, "Tavern Keepers");
        assert_eq!(tables[0].items, vec!["Greta", "Olaf"]);
    }

    #[test]
    fn item_text_is_fully_trimmed_and_empty_items_dropped() {
        let tables = extract_tables("x.md", "Things\n-    padded   \n- \n-\tTabbed\t\n- last");
        assert_eq!(tables[0].items, vec!["padded", "Tabbed", "last"]);
    }

    #[test]
    fn mixed_markers_are_interchangeable() {
        let tables = extract_tables("x.md", "Mixed\n1. one\n- two\n* three\n12. twelve");
        assert_eq!(tables[0].items, vec!["one", "two", "three", "twelve"]);
    }

    #[test]
    fn non_item_lines_are_ignored() {
        let content = "Weather\nSome prose about weather.\n- Rain\n-not an item\n> quote\n- Snow";
        let tables = extract_tables("w.md", content);
        assert_eq!(tables[0].items, vec!["Rain", "Snow"]);
    }

    #[test]
    fn crlf_line_endings_are_normalized() {
        let tables = extract_tables("w.md", "Weather\r\n- Rain\r\n---\r\nWind\r\n- Gale\r\n");
        assert_eq!(titles(&tables), vec!["Weather", "Wind"]);
        assert_eq!(tables[0].items, vec!["Rain"]);
        assert_eq!(tables[1].items, vec!["Gale"]);
    }

    #[test]
    fn single_line_sections_are_dropped() {
        assert!(extract_tables("w.md", "- lonely").is_empty());
        assert!(extract_tables("w.md", "Title only").is_empty());
    }

    #[test]
    fn long_rules_and_consecutive_rules_split_sections() {
        let tables = extract_tables("w.md", "A\n- a\n------\n---\n---\nB\n- b");
        assert_eq!(titles(&tables), vec!["A", "B"]);
    }

    #[test]
    fn indented_dash_line_does_not_split_a_section() {
        let tables = extract_tables("w.md", "Weapons\n- Sword\n  ---\n- Axe");
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].items, vec!["Sword", "Axe"]);

        let tables = extract_tables("w.md", "Weapons\n- Sword\n---  \n- Axe");
        assert_eq!(tables[0].items, vec!["Sword", "Axe"]);
    }

    #[test]
    fn content_without_list_markers_yields_nothing() {
        let content = "Just a note\nwith several lines\n---\nand another section\nof prose";
        assert!(extract_tables("prose.md", content).is_empty());
    }

    #[test]
    fn file_name_extension_is_stripped() {
        assert_eq!(strip_markdown_extension("weapons.md"), "weapons");
        assert_eq!(strip_markdown_extension("weapons.md.md"), "weapons");
        assert_eq!(strip_markdown_extension("weapons"), "weapons");
        assert_eq!(strip_markdown_extension("notes.txt"), "notes.txt");
    }

    #[test]
    fn extraction_is_deterministic() {
        let content = "# Loot\n- Gold\n- Gems\n---\n1. Rope\n2. Torch";
        assert_eq!(
            extract_tables("loot.md", content),
            extract_tables("loot.md", content)
        );
    }
}
