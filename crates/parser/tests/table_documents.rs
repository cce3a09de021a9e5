use pretty_assertions::assert_eq;
use random_tables_parser::{extract_tables, table_key, Table, NAKED_TABLE_NAME};

const DUNGEON_NOTE: &str = r"
# Dungeon Dressing

Roll when the party enters an empty room.

- Cobwebs thick as curtains
- A cold draft from nowhere
- Scratch marks on the floor

---

1. A rusted key
2. Three copper pieces
3. A half-eaten ration

---

## Wandering Monsters
* Giant rat
* Skeleton
";

#[test]
fn parses_a_realistic_note() {
    let tables = extract_tables("Dungeon.md", DUNGEON_NOTE);

    assert_eq!(
        tables,
        vec![
            Table::new(
                "Dungeon",
                "Dungeon Dressing",
                vec![
                    "Cobwebs thick as curtains".into(),
                    "A cold draft from nowhere".into(),
                    "Scratch marks on the floor".into(),
                ],
            ),
            Table::new(
                "Dungeon",
                NAKED_TABLE_NAME,
                vec![
                    "A rusted key".into(),
                    "Three copper pieces".into(),
                    "A half-eaten ration".into(),
                ],
            ),
            Table::new(
                "Dungeon",
                "Wandering Monsters",
                vec!["Giant rat".into(), "Skeleton".into()],
            ),
        ]
    );
}

#[test]
fn every_table_has_items() {
    let content = "A\n---\nB\n- b\n---\n---\nC\nprose\n---\n1. x\n";
    let tables = extract_tables("mixed.md", content);
    assert!(!tables.is_empty());
    assert!(tables.iter().all(|t| !t.items.is_empty()));
}

#[test]
fn keys_distinguish_tables_within_a_note() {
    let tables = extract_tables("Dungeon.md", DUNGEON_NOTE);
    let keys: Vec<String> = tables.iter().map(Table::key).collect();
    assert_eq!(
        keys,
        vec![
            "dungeon-dungeon-dressing",
            "dungeon-rtnakedlist",
            "dungeon-wandering-monsters",
        ]
    );
    assert_eq!(keys[0], table_key("Dungeon", "Dungeon Dressing"));
}
