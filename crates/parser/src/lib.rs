//! # Random Tables Parser
//!
//! Turns markdown notes into random tables: titled lists of items a user can
//! roll on.
//!
//! ## Document layout
//!
//! ```text
//! Weapons            <- title line (leading `#` markers are stripped)
//! - Sword            <- items: `- `, `* ` or `1. ` markers
//! - Axe
//! ---                <- horizontal rule separates sections
//! 1. Healing         <- a section starting with an item is a "naked" list
//! 2. Mana
//! ```
//!
//! ## Example
//!
//! ```rust
//! use random_tables_parser::{extract_tables, NAKED_TABLE_NAME};
//!
//! let tables = extract_tables("loot.md", "Weapons\n- Sword\n- Axe\n---\n1. Gold\n2. Gems");
//!
//! assert_eq!(tables.len(), 2);
//! assert_eq!(tables[0].title, "Weapons");
//! assert_eq!(tables[1].title, NAKED_TABLE_NAME);
//! assert_eq!(tables[1].items, vec!["Gold", "Gems"]);
//! ```

mod parser;
mod types;

pub use parser::{extract_tables, strip_markdown_extension};
pub use types::{normalize_key_part, table_key, Table, NAKED_TABLE_NAME};
