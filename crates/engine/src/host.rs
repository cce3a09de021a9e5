//! Ports to the host application.
//!
//! The engine never reaches into host internals: documents, change
//! notifications, the action registry, the active editor and persisted
//! settings all arrive through these traits.

use crate::error::HostError;
use crate::paths;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A document known to the host, addressed by its vault-relative path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef {
    /// `/`-separated path relative to the vault root
    pub path: String,

    /// Final path segment, extension included
    pub name: String,

    /// Extension without the leading dot, empty when absent
    pub extension: String,
}

impl DocumentRef {
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = paths::file_name(&path).to_string();
        let extension = paths::extension(&path).unwrap_or_default().to_string();
        Self {
            path,
            name,
            extension,
        }
    }
}

/// Document enumeration and content reads
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every markdown document in the vault
    fn markdown_documents(&self) -> Result<Vec<DocumentRef>, HostError>;

    /// Latest committed content of a document
    async fn read(&self, document: &DocumentRef) -> Result<String, HostError>;

    /// Folder paths of the vault, used for settings suggestions
    fn folders(&self) -> Vec<String> {
        Vec::new()
    }
}

pub type ActionCallback = Arc<dyn Fn(Option<&dyn Editor>) + Send + Sync>;

/// A named, invokable operation registered with the host
#[derive(Clone)]
pub struct Action {
    pub id: String,
    pub name: String,
    callback: ActionCallback,
}

impl Action {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        callback: impl Fn(Option<&dyn Editor>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    /// Run the action, optionally against an explicit editor
    pub fn execute(&self, editor: Option<&dyn Editor>) {
        (self.callback)(editor);
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The host's command registry. Adding a duplicate id replaces the old action.
pub trait ActionRegistry: Send + Sync {
    fn add(&self, action: Action) -> Result<(), HostError>;
    fn remove(&self, id: &str) -> Result<(), HostError>;
    fn list(&self) -> Vec<String>;
}

/// An editable text surface
pub trait Editor: Send + Sync {
    /// Replace the current selection (or insert at the cursor)
    fn replace_selection(&self, text: &str) -> Result<(), HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Markdown,
    Other,
}

/// The focused view of the host
#[derive(Clone)]
pub struct ActiveView {
    pub kind: ViewKind,
    pub editor: Option<Arc<dyn Editor>>,
}

impl ActiveView {
    pub fn markdown(editor: Arc<dyn Editor>) -> Self {
        Self {
            kind: ViewKind::Markdown,
            editor: Some(editor),
        }
    }

    /// The attached editor, if this is a markdown view that has one
    pub fn markdown_editor(&self) -> Option<&Arc<dyn Editor>> {
        match self.kind {
            ViewKind::Markdown => self.editor.as_ref(),
            ViewKind::Other => None,
        }
    }
}

impl fmt::Debug for ActiveView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveView")
            .field("kind", &self.kind)
            .field("has_editor", &self.editor.is_some())
            .finish()
    }
}

pub trait Workspace: Send + Sync {
    fn active_view(&self) -> Option<ActiveView>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    Create,
    Modify,
    Delete,
}

impl FileEventKind {
    pub const ALL: [Self; 3] = [Self::Create, Self::Modify, Self::Delete];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

/// A change notification for one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: String,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn document(&self) -> DocumentRef {
        DocumentRef::from_path(self.path.clone())
    }
}

pub type EventSink = Arc<dyn Fn(&FileEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Host file-change notifications, one subscription per event kind
pub trait ChangeSource: Send + Sync {
    fn subscribe(&self, kind: FileEventKind, sink: EventSink)
        -> Result<SubscriptionId, HostError>;
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Persisted key-value blob owned by the plugin
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_data(&self) -> Result<Option<serde_json::Value>, HostError>;
    async fn save_data(&self, data: serde_json::Value) -> Result<(), HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn document_ref_splits_name_and_extension() {
        let doc = DocumentRef::from_path("RandomTables/Loot/gems.md");
        assert_eq!(doc.name, "gems.md");
        assert_eq!(doc.extension, "md");

        let bare = DocumentRef::from_path("README");
        assert_eq!(bare.name, "README");
        assert_eq!(bare.extension, "");
    }

    #[test]
    fn only_markdown_views_expose_their_editor() {
        struct Sink;
        impl Editor for Sink {
            fn replace_selection(&self, _text: &str) -> Result<(), HostError> {
                Ok(())
            }
        }

        let markdown = ActiveView::markdown(Arc::new(Sink));
        assert!(markdown.markdown_editor().is_some());

        let canvas = ActiveView {
            kind: ViewKind::Other,
            editor: Some(Arc::new(Sink)),
        };
        assert!(canvas.markdown_editor().is_none());
    }
}
