//! # Random Tables Engine
//!
//! Keeps one insert action per random table in sync with a folder of notes.
//!
//! ## Pipeline
//!
//! ```text
//! Host file event
//!     │
//!     ├──> ChangeWatcher (path prefix + extension filter)
//!     │      └─> Reload loop (debounced)
//!     │
//!     ├──> TableRegistry (full scan or single file)
//!     │      └─> Tables keyed by (file name, title)
//!     │
//!     └──> CommandReconciler (unload all, load all)
//!            └─> One action per table in the host registry
//! ```
//!
//! The host is reached only through the port traits in [`host`]; [`FsVault`]
//! and [`NotifyChangeSource`] implement them for a plain directory.
//!
//! ## Example
//!
//! ```no_run
//! use random_tables_engine::{
//!     FsVault, Host, MemoryActionRegistry, NotifyChangeSource, PluginLifecycle,
//!     RandomTablesPlugin, ReloadConfig, StaticWorkspace,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ReloadConfig::default();
//!     let vault = Arc::new(FsVault::new("/path/to/vault")?);
//!     let changes = Arc::new(NotifyChangeSource::start(&vault, config.notify_poll_interval)?);
//!     let host = Host {
//!         documents: vault.clone(),
//!         storage: vault,
//!         actions: Arc::new(MemoryActionRegistry::new()),
//!         workspace: Arc::new(StaticWorkspace::empty()),
//!         changes,
//!     };
//!
//!     let plugin = RandomTablesPlugin::new(host, config);
//!     plugin.on_load().await?;
//!     // ... the host runs ...
//!     plugin.on_unload().await;
//!     Ok(())
//! }
//! ```

mod commands;
mod error;
mod fs_host;
pub mod host;
mod memory;
mod paths;
mod plugin;
mod registry;
mod reload_loop;
mod settings;
mod watcher;

pub use commands::{command_id, command_name, pick_item, CommandReconciler, ReconcileReport};
pub use error::{EngineError, HostError, Result};
pub use fs_host::{FsVault, NotifyChangeSource, SETTINGS_DIR};
pub use host::{
    Action, ActionRegistry, ActiveView, ChangeSource, DocumentRef, DocumentStore, Editor,
    EventSink, FileEvent, FileEventKind, SettingsStore, SubscriptionId, ViewKind, Workspace,
};
pub use memory::{BufferEditor, ManualChangeSource, MemoryActionRegistry, StaticWorkspace};
pub use paths::{folder_contains, is_trashed, normalize_folder};
pub use plugin::{
    Host, PluginLifecycle, RandomTablesPlugin, ReloadOutcome, RELOAD_ACTION_ID, RELOAD_ACTION_NAME,
};
pub use registry::{LoadStats, TableRegistry, TABLE_EXTENSION};
pub use reload_loop::{ReloadConfig, ReloadLoop, ReloadRequest};
pub use settings::{
    load_settings, save_settings, Debouncer, SeparatorAfterInsert, Settings, SharedSettings,
};
pub use watcher::{ChangeWatcher, FileEventHandler};

pub use random_tables_parser::{extract_tables, Table, NAKED_TABLE_NAME};
