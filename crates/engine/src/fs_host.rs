//! Host ports backed by a plain directory on disk.

use crate::error::{EngineError, HostError, Result};
use crate::host::{
    ChangeSource, DocumentRef, DocumentStore, EventSink, FileEvent, FileEventKind,
    SettingsStore, SubscriptionId,
};
use crate::memory::ManualChangeSource;
use crate::registry::TABLE_EXTENSION;
use async_trait::async_trait;
use ignore::{DirEntry, WalkBuilder};
use log::{debug, warn};
use notify::event::{ModifyKind, RenameMode};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs;

/// Directory (under the vault root) holding persisted plugin data
pub const SETTINGS_DIR: &str = ".random-tables";
const SETTINGS_FILE: &str = "data.json";

/// A directory acting as the vault
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(EngineError::InvalidPath(root.display().to_string()));
        }
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_DIR).join(SETTINGS_FILE)
    }

    /// Vault-relative, `/`-separated form of an absolute path. `None` for
    /// paths outside the vault, the root itself, and anything hidden.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => {
                    let name = name.to_str()?;
                    if name.starts_with('.') {
                        return None;
                    }
                    segments.push(name);
                }
                _ => return None,
            }
        }
        if segments.is_empty() {
            return None;
        }
        Some(segments.join("/"))
    }

    pub fn absolute_path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn walk(&self) -> impl Iterator<Item = DirEntry> {
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .ignore(false)
            .parents(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false);

        builder.build().filter_map(|result| match result {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable vault entry: {err}");
                None
            }
        })
    }
}

#[async_trait]
impl DocumentStore for FsVault {
    fn markdown_documents(&self) -> std::result::Result<Vec<DocumentRef>, HostError> {
        let mut documents: Vec<DocumentRef> = self
            .walk()
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| self.relative_path(entry.path()))
            .map(DocumentRef::from_path)
            .filter(|doc| doc.extension == TABLE_EXTENSION)
            .collect();
        documents.sort();
        Ok(documents)
    }

    async fn read(&self, document: &DocumentRef) -> std::result::Result<String, HostError> {
        fs::read_to_string(self.absolute_path(&document.path))
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => HostError::NotFound(document.path.clone()),
                _ => HostError::Io(err),
            })
    }

    fn folders(&self) -> Vec<String> {
        let mut folders: Vec<String> = self
            .walk()
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_dir()))
            .filter_map(|entry| self.relative_path(entry.path()))
            .collect();
        folders.sort();
        folders
    }
}

#[async_trait]
impl SettingsStore for FsVault {
    async fn load_data(&self) -> std::result::Result<Option<serde_json::Value>, HostError> {
        let raw = match fs::read_to_string(self.settings_path()).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| HostError::Rejected(format!("invalid settings file: {err}")))
    }

    async fn save_data(&self, data: serde_json::Value) -> std::result::Result<(), HostError> {
        let path = self.settings_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut body = serde_json::to_string_pretty(&data)
            .map_err(|err| HostError::Rejected(format!("unserializable settings: {err}")))?;
        body.push('\n');
        fs::write(&path, body).await?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }
}

/// Change notifications for an [`FsVault`], from a recursive `notify`
/// watcher on its root.
pub struct NotifyChangeSource {
    subscribers: Arc<ManualChangeSource>,
    _watcher: Mutex<RecommendedWatcher>,
}

impl NotifyChangeSource {
    pub fn start(vault: &FsVault, poll_interval: Duration) -> Result<Self> {
        let subscribers = Arc::new(ManualChangeSource::new());
        let fanout = Arc::clone(&subscribers);
        let mapper = vault.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for file_event in map_event(&mapper, &event) {
                        fanout.emit(file_event);
                    }
                }
                Err(err) => warn!("Watcher error: {err}"),
            },
            NotifyConfig::default().with_poll_interval(poll_interval),
        )?;
        watcher.watch(vault.root(), RecursiveMode::Recursive)?;
        debug!("Watching vault {}", vault.root().display());

        Ok(Self {
            subscribers,
            _watcher: Mutex::new(watcher),
        })
    }
}

impl ChangeSource for NotifyChangeSource {
    fn subscribe(
        &self,
        kind: FileEventKind,
        sink: EventSink,
    ) -> std::result::Result<SubscriptionId, HostError> {
        self.subscribers.subscribe(kind, sink)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.unsubscribe(id);
    }
}

/// Translate a raw filesystem event into host events on vault paths.
fn map_event(vault: &FsVault, event: &Event) -> Vec<FileEvent> {
    let kinds: Vec<(FileEventKind, &PathBuf)> = match &event.kind {
        EventKind::Create(_) => tag(FileEventKind::Create, &event.paths),
        EventKind::Remove(_) => tag(FileEventKind::Delete, &event.paths),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            tag(FileEventKind::Delete, &event.paths)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            tag(FileEventKind::Create, &event.paths)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut kinds = Vec::new();
            if let Some(from) = event.paths.first() {
                kinds.push((FileEventKind::Delete, from));
            }
            if let Some(to) = event.paths.get(1) {
                kinds.push((FileEventKind::Create, to));
            }
            kinds
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|path| {
                let kind = if path.exists() {
                    FileEventKind::Create
                } else {
                    FileEventKind::Delete
                };
                (kind, path)
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => tag(FileEventKind::Modify, &event.paths),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    };

    kinds
        .into_iter()
        .filter(|(kind, path)| *kind == FileEventKind::Delete || !path.is_dir())
        .filter_map(|(kind, path)| {
            vault
                .relative_path(path)
                .map(|relative| FileEvent::new(kind, relative))
        })
        .collect()
}

fn tag(kind: FileEventKind, paths: &[PathBuf]) -> Vec<(FileEventKind, &PathBuf)> {
    paths.iter().map(|path| (kind, path)).collect()
}
