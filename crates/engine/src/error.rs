use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures reported by the host ports
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Host rejected request: {0}")]
    Rejected(String),

    #[error("Host unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: HostError,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid vault path: {0}")]
    InvalidPath(String),

    #[error("Plugin is not loaded")]
    Unloaded,

    #[error("{0}")]
    Other(String),
}
