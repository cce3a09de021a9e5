use crate::error::HostError;
use crate::host::{Action, ActionRegistry, Editor, Workspace};
use crate::settings::{read_settings, SharedSettings};
use log::{debug, warn};
use rand::Rng;
use random_tables_parser::Table;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of one `load_commands` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Actions registered with the host
    pub registered: usize,

    /// Why each invalid table was skipped
    pub skipped: Vec<String>,

    /// Ids the host refused to register
    pub failed: Vec<String>,
}

/// Action id for a table; equal to its registry key, so it stays stable
/// across reloads.
pub fn command_id(table: &Table) -> String {
    table.key()
}

pub fn command_name(table: &Table) -> String {
    if table.is_naked() {
        format!("Insert {}", table.file_name)
    } else {
        format!("Insert {} > {}", table.file_name, table.title)
    }
}

/// Uniformly pick one item
pub fn pick_item<'a, R: Rng + ?Sized>(items: &'a [String], rng: &mut R) -> Option<&'a str> {
    if items.is_empty() {
        return None;
    }
    let index = rng.gen_range(0..items.len());
    Some(items[index].as_str())
}

/// Owns the actions derived from tables and keeps the host registry in sync
/// by tearing them all down and registering them again.
pub struct CommandReconciler {
    actions: Arc<dyn ActionRegistry>,
    workspace: Arc<dyn Workspace>,
    settings: SharedSettings,
    registered: Vec<String>,
}

impl CommandReconciler {
    pub fn new(
        actions: Arc<dyn ActionRegistry>,
        workspace: Arc<dyn Workspace>,
        settings: SharedSettings,
    ) -> Self {
        Self {
            actions,
            workspace,
            settings,
            registered: Vec::new(),
        }
    }

    /// Ids currently registered by this reconciler
    pub fn registered_ids(&self) -> &[String] {
        &self.registered
    }

    /// Replace every registered action with one action per valid table.
    ///
    /// Accepts `&Table` or `Option<&Table>` entries; missing entries and tables
    /// without a file name, title or items are skipped and reported.
    pub fn load_commands<'a, I, T>(&mut self, tables: I) -> ReconcileReport
    where
        I: IntoIterator<Item = T>,
        T: Into<Option<&'a Table>>,
    {
        self.unload_commands();

        let mut report = ReconcileReport::default();
        for entry in tables {
            let table = match validate(entry.into()) {
                Ok(table) => table,
                Err(reason) => {
                    warn!("Skipping invalid table: {reason}");
                    report.skipped.push(reason);
                    continue;
                }
            };

            let action = self.build_action(table);
            let id = action.id.clone();
            match self.actions.add(action) {
                Ok(()) => {
                    if !self.registered.contains(&id) {
                        self.registered.push(id);
                    }
                    report.registered += 1;
                }
                Err(err) => {
                    warn!("Failed to register command {id}: {err}");
                    report.failed.push(id);
                }
            }
        }

        debug!(
            "Registered {} table commands ({} skipped, {} failed)",
            report.registered,
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    /// Remove every action this reconciler registered. Returns how many the
    /// host removed; tracking is cleared even when some removals fail.
    pub fn unload_commands(&mut self) -> usize {
        let ids = std::mem::take(&mut self.registered);
        let mut removed = 0;
        for id in ids {
            match self.actions.remove(&id) {
                Ok(()) => removed += 1,
                Err(err) => warn!("Failed to unregister command {id}: {err}"),
            }
        }
        removed
    }

    fn build_action(&self, table: &Table) -> Action {
        let id = command_id(table);
        let name = command_name(table);
        let items: Arc<[String]> = table.items.clone().into();
        let workspace = Arc::clone(&self.workspace);
        let settings = Arc::clone(&self.settings);
        let label = name.clone();

        Action::new(id, name, move |editor: Option<&dyn Editor>| {
            let separator = read_settings(&settings).separator_after_insert;
            let Some(item) = pick_item(&items, &mut rand::thread_rng()) else {
                return;
            };
            let text = format!("{item}{}", separator.suffix());
            match insert_text(&text, editor, workspace.as_ref()) {
                Ok(true) => {}
                Ok(false) => debug!("{label}: no active editor, nothing inserted"),
                Err(err) => warn!("Error executing command '{label}': {err}"),
            }
        })
    }
}

fn validate(entry: Option<&Table>) -> Result<&Table, String> {
    let Some(table) = entry else {
        return Err("table entry is missing".to_string());
    };
    if table.file_name.trim().is_empty() {
        return Err(format!("table '{}' has no file name", table.title));
    }
    if table.title.trim().is_empty() {
        return Err(format!("table in '{}' has no title", table.file_name));
    }
    if table.items.is_empty() {
        return Err(format!(
            "table '{} > {}' has no items",
            table.file_name, table.title
        ));
    }
    Ok(table)
}

/// Insert into the explicit editor, else the active markdown editor.
/// Returns `false` when there is nowhere to insert.
fn insert_text(
    text: &str,
    editor: Option<&dyn Editor>,
    workspace: &dyn Workspace,
) -> Result<bool, HostError> {
    if let Some(editor) = editor {
        editor.replace_selection(text)?;
        return Ok(true);
    }

    let Some(view) = workspace.active_view() else {
        return Ok(false);
    };
    match view.markdown_editor() {
        Some(editor) => {
            editor.replace_selection(text)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ActiveView, ViewKind};
    use crate::memory::{BufferEditor, MemoryActionRegistry, StaticWorkspace};
    use crate::settings::{SeparatorAfterInsert, Settings};
    use pretty_assertions::assert_eq;
    use random_tables_parser::NAKED_TABLE_NAME;
    use std::collections::HashSet;
    use std::sync::{Mutex, RwLock};

    fn settings(separator: SeparatorAfterInsert) -> SharedSettings {
        Arc::new(RwLock::new(Settings {
            separator_after_insert: separator,
            ..Settings::default()
        }))
    }

    fn weapons() -> Table {
        Table::new(
            "weapons",
            "Weapons",
            vec!["Sword".into(), "Axe".into(), "Bow".into()],
        )
    }

    fn reconciler(
        registry: &Arc<MemoryActionRegistry>,
        workspace: StaticWorkspace,
        separator: SeparatorAfterInsert,
    ) -> CommandReconciler {
        CommandReconciler::new(registry.clone(), Arc::new(workspace), settings(separator))
    }

    #[test]
    fn ids_and_names_follow_the_table() {
        let table = Table::new("Magic Items", "Rare Wands", vec!["x".into()]);
        assert_eq!(command_id(&table), "magic-items-rare-wands");
        assert_eq!(command_name(&table), "Insert Magic Items > Rare Wands");

        let naked = Table::new("weapons", NAKED_TABLE_NAME, vec!["x".into()]);
        assert_eq!(command_name(&naked), "Insert weapons");
    }

    #[test]
    fn loading_twice_does_not_duplicate_actions() {
        let registry = Arc::new(MemoryActionRegistry::new());
        let mut commands =
            reconciler(&registry, StaticWorkspace::empty(), SeparatorAfterInsert::None);
        let tables = vec![
            weapons(),
            Table::new("potions", NAKED_TABLE_NAME, vec!["Heal".into()]),
        ];

        commands.load_commands(&tables);
        let report = commands.load_commands(&tables);

        assert_eq!(report.registered, 2);
        assert_eq!(
            registry.list(),
            vec!["potions-rtnakedlist".to_string(), "weapons-weapons".to_string()]
        );
        assert_eq!(commands.registered_ids().len(), 2);
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let registry = Arc::new(MemoryActionRegistry::new());
        let mut commands =
            reconciler(&registry, StaticWorkspace::empty(), SeparatorAfterInsert::None);
        let nameless = Table::new("", "x", vec!["a".into()]);

        let report = commands.load_commands([None, Some(&nameless)]);

        assert_eq!(report.registered, 0);
        assert_eq!(report.skipped.len(), 2);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn tables_without_title_or_items_are_skipped() {
        let registry = Arc::new(MemoryActionRegistry::new());
        let mut commands =
            reconciler(&registry, StaticWorkspace::empty(), SeparatorAfterInsert::None);
        let untitled = Table::new("loot", "", vec!["a".into()]);
        let empty = Table::new("loot", "Gems", Vec::new());
        let good = weapons();

        let report = commands.load_commands([&untitled, &empty, &good]);

        assert_eq!(report.registered, 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(registry.list(), vec!["weapons-weapons".to_string()]);
    }

    #[test]
    fn unload_removes_everything_it_registered() {
        let registry = Arc::new(MemoryActionRegistry::new());
        registry
            .add(Action::new("reload-tables", "Reload Tables", |_| {}))
            .unwrap();
        let mut commands =
            reconciler(&registry, StaticWorkspace::empty(), SeparatorAfterInsert::None);
        commands.load_commands(&vec![weapons()]);

        assert_eq!(commands.unload_commands(), 1);
        assert_eq!(registry.list(), vec!["reload-tables".to_string()]);
        assert_eq!(commands.unload_commands(), 0);
    }

    struct FlakyRegistry {
        inner: MemoryActionRegistry,
        refuse_add: HashSet<String>,
        refuse_remove: HashSet<String>,
        remove_calls: Mutex<Vec<String>>,
    }

    impl ActionRegistry for FlakyRegistry {
        fn add(&self, action: Action) -> Result<(), HostError> {
            if self.refuse_add.contains(&action.id) {
                return Err(HostError::Rejected(action.id));
            }
            self.inner.add(action)
        }

        fn remove(&self, id: &str) -> Result<(), HostError> {
            self.remove_calls.lock().unwrap().push(id.to_string());
            if self.refuse_remove.contains(id) {
                return Err(HostError::Rejected(id.to_string()));
            }
            self.inner.remove(id)
        }

        fn list(&self) -> Vec<String> {
            self.inner.list()
        }
    }

    #[test]
    fn host_failures_do_not_stop_the_batch() {
        let registry = Arc::new(FlakyRegistry {
            inner: MemoryActionRegistry::new(),
            refuse_add: HashSet::from(["b-b".to_string()]),
            refuse_remove: HashSet::from(["a-a".to_string()]),
            remove_calls: Mutex::new(Vec::new()),
        });
        let mut commands = CommandReconciler::new(
            registry.clone(),
            Arc::new(StaticWorkspace::empty()),
            settings(SeparatorAfterInsert::None),
        );
        let tables = vec![
            Table::new("a", "a", vec!["1".into()]),
            Table::new("b", "b", vec!["2".into()]),
            Table::new("c", "c", vec!["3".into()]),
        ];

        let report = commands.load_commands(&tables);
        assert_eq!(report.registered, 2);
        assert_eq!(report.failed, vec!["b-b".to_string()]);

        assert_eq!(commands.unload_commands(), 1);
        assert!(commands.registered_ids().is_empty());
        assert_eq!(
            *registry.remove_calls.lock().unwrap(),
            vec!["a-a".to_string(), "c-c".to_string()]
        );
    }

    #[test]
    fn execution_appends_the_configured_separator() {
        for (separator, expected) in [
            (SeparatorAfterInsert::None, "Sword"),
            (SeparatorAfterInsert::Space, "Sword "),
            (SeparatorAfterInsert::Newline, "Sword\n"),
        ] {
            let registry = Arc::new(MemoryActionRegistry::new());
            let mut commands = reconciler(&registry, StaticWorkspace::empty(), separator);
            commands.load_commands(&vec![Table::new("w", "W", vec!["Sword".into()])]);

            let editor = BufferEditor::new();
            assert!(registry.execute("w-w", Some(&editor)));
            assert_eq!(editor.contents(), expected);
        }
    }

    #[test]
    fn separator_is_read_at_execution_time() {
        let registry = Arc::new(MemoryActionRegistry::new());
        let shared = settings(SeparatorAfterInsert::None);
        let mut commands = CommandReconciler::new(
            registry.clone(),
            Arc::new(StaticWorkspace::empty()),
            shared.clone(),
        );
        commands.load_commands(&vec![Table::new("w", "W", vec!["Sword".into()])]);

        shared.write().unwrap().separator_after_insert = SeparatorAfterInsert::Space;
        let editor = BufferEditor::new();
        registry.execute("w-w", Some(&editor));
        assert_eq!(editor.contents(), "Sword ");
    }

    #[test]
    fn execution_falls_back_to_the_active_markdown_editor() {
        let registry = Arc::new(MemoryActionRegistry::new());
        let active = Arc::new(BufferEditor::new());
        let workspace = StaticWorkspace::with_view(ActiveView::markdown(active.clone()));
        let mut commands = reconciler(&registry, workspace, SeparatorAfterInsert::None);
        commands.load_commands(&vec![weapons()]);

        registry.execute("weapons-weapons", None);

        assert!(["Sword", "Axe", "Bow"].contains(&active.contents().as_str()));
    }

    #[test]
    fn execution_without_an_editor_is_a_no_op() {
        let registry = Arc::new(MemoryActionRegistry::new());
        let other = Arc::new(BufferEditor::new());
        let workspace = StaticWorkspace::with_view(ActiveView {
            kind: ViewKind::Other,
            editor: Some(other.clone()),
        });
        let mut commands = reconciler(&registry, workspace, SeparatorAfterInsert::None);
        commands.load_commands(&vec![weapons()]);

        assert!(registry.execute("weapons-weapons", None));
        assert_eq!(other.contents(), "");

        let mut commands =
            reconciler(&registry, StaticWorkspace::empty(), SeparatorAfterInsert::None);
        commands.load_commands(&vec![weapons()]);
        assert!(registry.execute("weapons-weapons", None));
    }

    #[test]
    fn editor_failures_are_swallowed() {
        struct Broken;
        impl Editor for Broken {
            fn replace_selection(&self, _text: &str) -> Result<(), HostError> {
                Err(HostError::Unavailable("read-only".into()))
            }
        }

        let registry = Arc::new(MemoryActionRegistry::new());
        let mut commands =
            reconciler(&registry, StaticWorkspace::empty(), SeparatorAfterInsert::None);
        commands.load_commands(&vec![weapons()]);
        assert!(registry.execute("weapons-weapons", Some(&Broken)));
    }

    #[test]
    fn picks_cover_every_item() {
        let items: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let mut rng = rand::thread_rng();
        let mut seen = HashSet::new();
        for _ in 0..300 {
            seen.insert(pick_item(&items, &mut rng).unwrap());
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(pick_item(&[], &mut rng), None);
    }
}
