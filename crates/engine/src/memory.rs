//! In-process implementations of the host ports.

use crate::error::HostError;
use crate::host::{
    Action, ActionRegistry, ActiveView, ChangeSource, Editor, EventSink, FileEvent,
    FileEventKind, SubscriptionId, Workspace,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Action registry kept in memory, ordered by id
#[derive(Default)]
pub struct MemoryActionRegistry {
    actions: Mutex<BTreeMap<String, Action>>,
}

impl MemoryActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Action> {
        lock(&self.actions).get(id).cloned()
    }

    /// `(id, name)` of every registered action
    pub fn entries(&self) -> Vec<(String, String)> {
        lock(&self.actions)
            .values()
            .map(|action| (action.id.clone(), action.name.clone()))
            .collect()
    }

    /// Run an action by id. Returns `false` when no such action exists.
    pub fn execute(&self, id: &str, editor: Option<&dyn Editor>) -> bool {
        // The action may touch the registry itself; run it unlocked.
        let Some(action) = self.get(id) else {
            return false;
        };
        action.execute(editor);
        true
    }
}

impl ActionRegistry for MemoryActionRegistry {
    fn add(&self, action: Action) -> Result<(), HostError> {
        lock(&self.actions).insert(action.id.clone(), action);
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), HostError> {
        lock(&self.actions)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| HostError::NotFound(id.to_string()))
    }

    fn list(&self) -> Vec<String> {
        lock(&self.actions).keys().cloned().collect()
    }
}

/// Text buffer with the cursor at its end
#[derive(Default)]
pub struct BufferEditor {
    text: Mutex<String>,
}

impl BufferEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        lock(&self.text).clone()
    }
}

impl Editor for BufferEditor {
    fn replace_selection(&self, text: &str) -> Result<(), HostError> {
        lock(&self.text).push_str(text);
        Ok(())
    }
}

/// Workspace whose active view is set explicitly
#[derive(Default)]
pub struct StaticWorkspace {
    view: Mutex<Option<ActiveView>>,
}

impl StaticWorkspace {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_view(view: ActiveView) -> Self {
        Self {
            view: Mutex::new(Some(view)),
        }
    }

    pub fn set_active_view(&self, view: Option<ActiveView>) {
        *lock(&self.view) = view;
    }
}

impl Workspace for StaticWorkspace {
    fn active_view(&self) -> Option<ActiveView> {
        lock(&self.view).clone()
    }
}

/// Change source driven by explicit `emit` calls
#[derive(Default)]
pub struct ManualChangeSource {
    state: Mutex<Subscribers>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    sinks: HashMap<SubscriptionId, (FileEventKind, EventSink)>,
}

impl ManualChangeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.state).sinks.len()
    }

    /// Deliver an event to every subscriber of its kind
    pub fn emit(&self, event: FileEvent) {
        let sinks: Vec<EventSink> = lock(&self.state)
            .sinks
            .values()
            .filter(|(kind, _)| *kind == event.kind)
            .map(|(_, sink)| sink.clone())
            .collect();
        for sink in sinks {
            sink(&event);
        }
    }
}

impl ChangeSource for ManualChangeSource {
    fn subscribe(
        &self,
        kind: FileEventKind,
        sink: EventSink,
    ) -> Result<SubscriptionId, HostError> {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.sinks.insert(id, (kind, sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.state).sinks.remove(&id);
    }
}
