use crate::error::{EngineError, Result};
use crate::host::{FileEvent, FileEventKind};
use log::{debug, info};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Above this many distinct changed paths a batch becomes a full rescan.
const MAX_DELTA_PATHS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadConfig {
    /// Quiet period after the last file event before reloading
    pub debounce: Duration,
    /// Upper bound on how long a steady stream of events can delay a reload
    pub max_batch_wait: Duration,
    /// Poll interval for filesystem backends that need one
    pub notify_poll_interval: Duration,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(750),
            max_batch_wait: Duration::from_secs(3),
            notify_poll_interval: Duration::from_secs(2),
        }
    }
}

/// What a reload cycle has to look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadRequest {
    /// Rescan the configured folder
    Full,
    /// Switch to a new folder, then rescan it
    Folder(String),
    /// Re-read (or forget) only these files
    Files(Vec<FileEvent>),
}

enum LoopCommand {
    Event(FileEvent),
    Trigger {
        request: ReloadRequest,
        reason: String,
    },
    Shutdown,
}

/// Handle to the background task that batches change events into reloads.
///
/// Reload cycles run one at a time, in the order they become due.
pub struct ReloadLoop {
    tx: mpsc::UnboundedSender<LoopCommand>,
    handle: Option<JoinHandle<()>>,
}

impl ReloadLoop {
    pub fn spawn<F, Fut>(config: ReloadConfig, run: F) -> Self
    where
        F: Fn(ReloadRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_loop(config, rx, run));
        Self {
            tx,
            handle: Some(handle),
        }
    }

    /// Queue a file event for the next debounced cycle. Returns `false` once
    /// the loop has stopped.
    pub fn notify_event(&self, event: &FileEvent) -> bool {
        self.tx.send(LoopCommand::Event(event.clone())).is_ok()
    }

    /// Run `request` without waiting for the debounce window.
    pub fn trigger(&self, request: ReloadRequest, reason: impl Into<String>) -> Result<()> {
        self.tx
            .send(LoopCommand::Trigger {
                request,
                reason: reason.into(),
            })
            .map_err(|_| EngineError::Unloaded)
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Stop the loop, letting an in-flight cycle finish.
    pub async fn shutdown(mut self) {
        let _ = self.tx.send(LoopCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ReloadLoop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run_loop<F, Fut>(
    config: ReloadConfig,
    mut rx: mpsc::UnboundedReceiver<LoopCommand>,
    run: F,
) where
    F: Fn(ReloadRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut state = DebounceState::new(config.debounce, config.max_batch_wait);

    loop {
        let next_deadline = state.next_deadline();

        tokio::select! {
            command = rx.recv() => {
                match command {
                    Some(LoopCommand::Event(event)) => state.record_event(event),
                    Some(LoopCommand::Trigger { request, reason }) => {
                        state.force_run(request, reason);
                    }
                    Some(LoopCommand::Shutdown) | None => break,
                }
            }
            () = async {
                if let Some(deadline) = next_deadline {
                    time::sleep_until(deadline).await;
                }
            }, if next_deadline.is_some() => {
                let reason = state.reason.take().unwrap_or_else(|| "fs_event".to_string());
                if let Some(request) = state.take_request() {
                    debug!("Reload cycle ({reason}): {}", describe(&request));
                    run(request).await;
                }
                state.reset();
            }
        }
    }
    info!("Reload loop stopped");
}

fn describe(request: &ReloadRequest) -> String {
    match request {
        ReloadRequest::Full => "full scan".to_string(),
        ReloadRequest::Folder(folder) => format!("folder '{folder}'"),
        ReloadRequest::Files(events) => format!("{} changed files", events.len()),
    }
}

struct DebounceState {
    debounce: Duration,
    max_batch: Duration,
    dirty: bool,
    last_event: Option<Instant>,
    first_event: Option<Instant>,
    reason: Option<String>,
    force_immediate: bool,
    force_full_scan: bool,
    folder: Option<String>,
    pending_paths: BTreeMap<String, FileEventKind>,
}

impl DebounceState {
    fn new(debounce: Duration, max_batch: Duration) -> Self {
        Self {
            debounce,
            max_batch,
            dirty: false,
            last_event: None,
            first_event: None,
            reason: None,
            force_immediate: false,
            force_full_scan: false,
            folder: None,
            pending_paths: BTreeMap::new(),
        }
    }

    fn record_event(&mut self, event: FileEvent) {
        let now = Instant::now();
        self.record_path(event);
        self.last_event = Some(now);
        self.first_event.get_or_insert(now);
        self.dirty = true;
    }

    fn force_run(&mut self, request: ReloadRequest, reason: String) {
        match request {
            ReloadRequest::Full => {
                self.force_full_scan = true;
                self.pending_paths.clear();
            }
            ReloadRequest::Folder(folder) => {
                self.folder = Some(folder);
                self.pending_paths.clear();
            }
            ReloadRequest::Files(events) => {
                for event in events {
                    self.record_path(event);
                }
            }
        }
        self.reason = Some(reason);
        self.force_immediate = true;
        self.dirty = true;
    }

    fn next_deadline(&self) -> Option<Instant> {
        if !self.dirty {
            return None;
        }

        if self.force_immediate {
            return Some(Instant::now());
        }

        // Quiet period after the last event, capped by the batch age.
        let (first, last) = self.first_event.zip(self.last_event)?;
        Some((last + self.debounce).min(first + self.max_batch))
    }

    /// The latest kind per path wins; a folder switch outranks a full scan,
    /// which outranks a file batch.
    fn take_request(&mut self) -> Option<ReloadRequest> {
        if let Some(folder) = self.folder.take() {
            return Some(ReloadRequest::Folder(folder));
        }
        if self.force_full_scan {
            return Some(ReloadRequest::Full);
        }
        if self.pending_paths.is_empty() {
            return None;
        }
        let events = std::mem::take(&mut self.pending_paths)
            .into_iter()
            .map(|(path, kind)| FileEvent { kind, path })
            .collect();
        Some(ReloadRequest::Files(events))
    }

    fn reset(&mut self) {
        self.dirty = false;
        self.last_event = None;
        self.first_event = None;
        self.reason = None;
        self.force_immediate = false;
        self.force_full_scan = false;
        self.folder = None;
        self.pending_paths.clear();
    }

    fn record_path(&mut self, event: FileEvent) {
        if self.force_full_scan || self.folder.is_some() {
            return;
        }
        if !self.pending_paths.contains_key(&event.path)
            && self.pending_paths.len() >= MAX_DELTA_PATHS
        {
            debug!("More than {MAX_DELTA_PATHS} changed files, falling back to a full scan");
            self.force_full_scan = true;
            self.pending_paths.clear();
            return;
        }
        self.pending_paths.insert(event.path, event.kind);
    }
}
