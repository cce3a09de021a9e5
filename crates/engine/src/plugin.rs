//! Plugin lifecycle: wires the registry, reconciler, watcher and reload loop
//! to one host.

use crate::commands::CommandReconciler;
use crate::error::{EngineError, HostError, Result};
use crate::host::{
    Action, ActionRegistry, ChangeSource, DocumentStore, FileEvent, FileEventKind,
    SettingsStore, Workspace,
};
use crate::paths;
use crate::registry::{TableRegistry, TABLE_EXTENSION};
use crate::reload_loop::{ReloadConfig, ReloadLoop, ReloadRequest};
use crate::settings::{
    load_settings, read_settings, save_settings, write_settings, Debouncer,
    SeparatorAfterInsert, Settings, SharedSettings,
};
use crate::watcher::{ChangeWatcher, FileEventHandler};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use random_tables_parser::Table;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

pub const RELOAD_ACTION_ID: &str = "reload-tables";
pub const RELOAD_ACTION_NAME: &str = "Reload Tables";

/// The host ports a plugin instance talks to
#[derive(Clone)]
pub struct Host {
    pub documents: Arc<dyn DocumentStore>,
    pub actions: Arc<dyn ActionRegistry>,
    pub workspace: Arc<dyn Workspace>,
    pub changes: Arc<dyn ChangeSource>,
    pub storage: Arc<dyn SettingsStore>,
}

/// Capabilities the host drives
#[async_trait]
pub trait PluginLifecycle: Send + Sync {
    async fn on_load(&self) -> Result<()>;

    /// Release everything `on_load` acquired. Each step runs even when an
    /// earlier one fails.
    async fn on_unload(&self);

    async fn reload(&self, request: ReloadRequest) -> Result<ReloadOutcome>;
}

/// Result of one reload cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadOutcome {
    /// Tables in the registry after the cycle
    pub tables: usize,

    /// Table actions registered with the host
    pub registered: usize,

    /// Tables the reconciler rejected
    pub skipped: Vec<String>,

    /// `path: error` for notes that could not be read
    pub failed_files: Vec<String>,
}

struct PluginState {
    registry: TableRegistry,
    commands: CommandReconciler,
}

struct PluginInner {
    host: Host,
    config: ReloadConfig,
    settings: SharedSettings,
    state: tokio::sync::Mutex<PluginState>,
    watcher: Mutex<ChangeWatcher>,
    reload_loop: Mutex<Option<ReloadLoop>>,
    settings_debounce: Debouncer,
    loaded: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Recovering from a poisoned plugin lock");
            poisoned.into_inner()
        }
    }
}

/// Random tables plugin bound to one host.
///
/// Cloning yields another handle to the same instance. Must be used from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct RandomTablesPlugin {
    inner: Arc<PluginInner>,
}

impl RandomTablesPlugin {
    pub fn new(host: Host, config: ReloadConfig) -> Self {
        let settings: SharedSettings = Arc::new(RwLock::new(Settings::default()));
        let registry = TableRegistry::new(
            Arc::clone(&host.documents),
            &settings_folder(&settings),
        );
        let commands = CommandReconciler::new(
            Arc::clone(&host.actions),
            Arc::clone(&host.workspace),
            Arc::clone(&settings),
        );
        let watcher = ChangeWatcher::new(Arc::clone(&host.changes));

        Self {
            inner: Arc::new(PluginInner {
                host,
                config,
                settings,
                state: tokio::sync::Mutex::new(PluginState { registry, commands }),
                watcher: Mutex::new(watcher),
                reload_loop: Mutex::new(None),
                settings_debounce: Debouncer::new(config.debounce),
                loaded: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.load(Ordering::SeqCst)
    }

    /// Current settings
    pub fn settings(&self) -> Settings {
        read_settings(&self.inner.settings)
    }

    /// Snapshot of the loaded tables
    pub async fn tables(&self) -> Vec<Table> {
        self.inner.state.lock().await.registry.get_tables()
    }

    /// Ids of the table actions currently registered
    pub async fn command_ids(&self) -> Vec<String> {
        self.inner.state.lock().await.commands.registered_ids().to_vec()
    }

    /// Queue a reload on the background loop; it runs without debounce.
    pub fn request_reload(&self, request: ReloadRequest) -> Result<()> {
        self.inner.trigger(request, "manual")
    }

    /// Change the table folder. Once no further change arrives for the
    /// debounce window the new value is applied, saved and the tables are
    /// reloaded. A cancelled change leaves the settings untouched.
    pub fn set_folder_location(&self, folder: impl Into<String>) {
        let folder = folder.into();
        let weak = Arc::downgrade(&self.inner);
        self.inner.settings_debounce.schedule(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            write_settings(&inner.settings, |settings| {
                settings.folder_location = folder.clone();
            });
            inner.persist_settings().await;
            if let Err(err) = inner.reload(ReloadRequest::Folder(folder)).await {
                error!("Reload after folder change failed: {err}");
            }
        });
    }

    /// Change what follows an inserted item. Actions read it when they run,
    /// so nothing is reloaded.
    pub async fn set_separator(&self, separator: SeparatorAfterInsert) -> Result<()> {
        write_settings(&self.inner.settings, |settings| {
            settings.separator_after_insert = separator;
        });
        save_settings(
            self.inner.host.storage.as_ref(),
            &read_settings(&self.inner.settings),
        )
        .await
    }

    /// Drop a pending folder change. Returns whether one was waiting.
    pub fn cancel_pending(&self) -> bool {
        self.inner.settings_debounce.cancel()
    }

    /// Candidate folders for the folder setting, `/` (the vault root) first
    pub fn folder_suggestions(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        let mut folders = self.inner.host.documents.folders();
        folders.retain(|folder| !paths::is_trashed(folder));
        folders.sort();
        folders.dedup();

        std::iter::once("/".to_string())
            .chain(folders)
            .filter(|folder| folder.to_lowercase().contains(&query))
            .collect()
    }
}

#[async_trait]
impl PluginLifecycle for RandomTablesPlugin {
    async fn on_load(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.loaded.swap(true, Ordering::SeqCst) {
            debug!("Plugin already loaded");
            return Ok(());
        }

        let settings = load_settings(inner.host.storage.as_ref()).await;
        debug!(
            "Using folder '{}', separator '{}'",
            settings.folder_location, settings.separator_after_insert
        );
        let folder = settings.folder_location.clone();
        write_settings(&inner.settings, |current| *current = settings);
        inner.state.lock().await.registry.set_folder(&folder);

        inner.start_loop();
        inner.register_reload_action();

        if let Err(err) = inner.reload(ReloadRequest::Full).await {
            error!("Initial table load failed: {err}");
        }

        if let Err(err) = inner.watch_folder(&folder) {
            warn!("Failed to watch '{folder}': {err}");
            return Err(err);
        }
        Ok(())
    }

    async fn on_unload(&self) {
        let inner = &self.inner;
        inner.loaded.store(false, Ordering::SeqCst);

        {
            let mut state = inner.state.lock().await;
            state.registry.unload();
            let removed = state.commands.unload_commands();
            debug!("Removed {removed} table commands");
        }

        match inner.host.actions.remove(RELOAD_ACTION_ID) {
            Ok(()) | Err(HostError::NotFound(_)) => {}
            Err(err) => warn!("Failed to remove reload action: {err}"),
        }

        lock(&inner.watcher).unload();

        let reload_loop = lock(&inner.reload_loop).take();
        if let Some(reload_loop) = reload_loop {
            reload_loop.shutdown().await;
        }

        if inner.settings_debounce.cancel() {
            debug!("Dropped a pending folder change");
        }
        info!("Random tables unloaded");
    }

    async fn reload(&self, request: ReloadRequest) -> Result<ReloadOutcome> {
        self.inner.reload(request).await
    }
}

impl PluginInner {
    async fn reload(self: &Arc<Self>, request: ReloadRequest) -> Result<ReloadOutcome> {
        let mut state = self.state.lock().await;
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(EngineError::Unloaded);
        }

        let mut failed_files = Vec::new();
        match request {
            ReloadRequest::Full => {
                failed_files = state.registry.load_tables(None).await?.failures;
            }
            ReloadRequest::Folder(folder) => {
                state.registry.set_folder(&folder);
                write_settings(&self.settings, |settings| {
                    settings.folder_location = folder.clone();
                });
                if let Err(err) = self.watch_folder(&folder) {
                    warn!("Failed to watch '{folder}': {err}");
                }
                failed_files = state.registry.load_tables(None).await?.failures;
            }
            ReloadRequest::Files(events) => {
                for event in events {
                    if let Some(failure) = apply_event(&mut state.registry, &event).await {
                        failed_files.push(failure);
                    }
                }
            }
        }

        let tables = state.registry.get_tables();
        let report = state.commands.load_commands(&tables);
        info!("Loaded {} tables", tables.len());

        Ok(ReloadOutcome {
            tables: tables.len(),
            registered: report.registered,
            skipped: report.skipped,
            failed_files,
        })
    }

    fn trigger(&self, request: ReloadRequest, reason: &str) -> Result<()> {
        match lock(&self.reload_loop).as_ref() {
            Some(reload_loop) => reload_loop.trigger(request, reason),
            None => Err(EngineError::Unloaded),
        }
    }

    fn notify(&self, event: &FileEvent) {
        if let Some(reload_loop) = lock(&self.reload_loop).as_ref() {
            if !reload_loop.notify_event(event) {
                debug!("Reload loop stopped, dropping event for {}", event.path);
            }
        }
    }

    fn start_loop(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let reload_loop = ReloadLoop::spawn(self.config, move |request| {
            let weak = Weak::clone(&weak);
            async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match inner.reload(request).await {
                    Ok(outcome) if !outcome.failed_files.is_empty() => {
                        warn!("{} table notes failed to load", outcome.failed_files.len());
                    }
                    Ok(_) | Err(EngineError::Unloaded) => {}
                    Err(err) => error!("Reload failed: {err}"),
                }
            }
        });
        if let Some(previous) = lock(&self.reload_loop).replace(reload_loop) {
            debug!("Replacing a running reload loop");
            drop(previous);
        }
    }

    fn register_reload_action(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let action = Action::new(RELOAD_ACTION_ID, RELOAD_ACTION_NAME, move |_| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Err(err) = inner.trigger(ReloadRequest::Full, "reload action") {
                warn!("Could not reload tables: {err}");
            }
        });
        if let Err(err) = self.host.actions.add(action) {
            warn!("Failed to register reload action: {err}");
        }
    }

    /// Point the single watch registration at `folder`.
    fn watch_folder(self: &Arc<Self>, folder: &str) -> Result<()> {
        let weak = Arc::downgrade(self);
        let handler: FileEventHandler = Arc::new(move |event: &FileEvent| {
            if paths::is_trashed(&event.path) {
                debug!("Ignoring trashed note {}", event.path);
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.notify(event);
            }
        });

        let mut watcher = lock(&self.watcher);
        watcher.unload();
        watcher.add_watch_path(folder, handler, Some(TABLE_EXTENSION))
    }

    async fn persist_settings(&self) {
        let settings = read_settings(&self.settings);
        if let Err(err) = save_settings(self.host.storage.as_ref(), &settings).await {
            warn!("Failed to save settings: {err}");
        }
    }
}

/// Apply one change to the registry, returning a failure line if the note
/// could not be read.
async fn apply_event(registry: &mut TableRegistry, event: &FileEvent) -> Option<String> {
    if event.kind == FileEventKind::Delete {
        if registry.forget_file(&event.path) {
            debug!("Dropped tables of deleted note {}", event.path);
        }
        return None;
    }

    match registry.load_tables(Some(&event.document())).await {
        Ok(_) => None,
        Err(EngineError::Read {
            source: HostError::NotFound(_),
            ..
        }) => {
            registry.forget_file(&event.path);
            None
        }
        Err(err) => {
            warn!("Tables failed to load from {}: {err}", event.path);
            Some(format!("{}: {err}", event.path))
        }
    }
}

fn settings_folder(settings: &SharedSettings) -> String {
    read_settings(settings).folder_location
}
