use crate::error::Result;
use crate::host::{ChangeSource, EventSink, FileEvent, FileEventKind, SubscriptionId};
use crate::paths;
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard};

pub type FileEventHandler = Arc<dyn Fn(&FileEvent) + Send + Sync>;

struct WatchRegistration {
    path: String,
    extension: Option<String>,
    handler: FileEventHandler,
}

impl WatchRegistration {
    fn matches(&self, event: &FileEvent) -> bool {
        if !event.path.starts_with(&self.path) {
            return false;
        }
        match &self.extension {
            Some(ext) => paths::extension(&event.path) == Some(ext.as_str()),
            None => true,
        }
    }
}

type Registrations = Arc<Mutex<Vec<WatchRegistration>>>;

fn lock(registrations: &Registrations) -> MutexGuard<'_, Vec<WatchRegistration>> {
    match registrations.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Routes host change notifications to per-folder handlers.
///
/// The host is subscribed to once per event kind, on the first registration;
/// every event is then offered to each registration whose folder prefix and
/// extension filter match.
pub struct ChangeWatcher {
    source: Arc<dyn ChangeSource>,
    registrations: Registrations,
    subscriptions: Vec<SubscriptionId>,
}

impl ChangeWatcher {
    pub fn new(source: Arc<dyn ChangeSource>) -> Self {
        Self {
            source,
            registrations: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Vec::new(),
        }
    }

    /// Call `handler` for create/modify/delete events under `path`.
    ///
    /// Registrations are keyed by `(path, extension)`; registering the same
    /// key again replaces its handler.
    pub fn add_watch_path(
        &mut self,
        path: &str,
        handler: FileEventHandler,
        extension: Option<&str>,
    ) -> Result<()> {
        let path = paths::normalize_folder(path);
        let extension = extension.map(paths::normalize_extension);

        {
            let mut registrations = lock(&self.registrations);
            match registrations
                .iter_mut()
                .find(|r| r.path == path && r.extension == extension)
            {
                Some(existing) => existing.handler = handler,
                None => registrations.push(WatchRegistration {
                    path: path.clone(),
                    extension: extension.clone(),
                    handler,
                }),
            }
        }
        debug!(
            "Watching '{path}' for {} files",
            extension.as_deref().unwrap_or("all")
        );

        if self.subscriptions.is_empty() {
            if let Err(err) = self.attach() {
                lock(&self.registrations)
                    .retain(|r| !(r.path == path && r.extension == extension));
                return Err(err);
            }
        }
        Ok(())
    }

    /// Number of active registrations
    pub fn watch_count(&self) -> usize {
        lock(&self.registrations).len()
    }

    /// Drop every registration and detach from the host. Safe to call
    /// repeatedly.
    pub fn unload(&mut self) {
        lock(&self.registrations).clear();
        for id in self.subscriptions.drain(..) {
            self.source.unsubscribe(id);
        }
    }

    fn attach(&mut self) -> Result<()> {
        for kind in FileEventKind::ALL {
            let registrations = Arc::clone(&self.registrations);
            let sink: EventSink = Arc::new(move |event: &FileEvent| {
                dispatch(&registrations, event);
            });
            match self.source.subscribe(kind, sink) {
                Ok(id) => self.subscriptions.push(id),
                Err(err) => {
                    warn!("Failed to subscribe to {} events: {err}", kind.as_str());
                    for id in self.subscriptions.drain(..) {
                        self.source.unsubscribe(id);
                    }
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.unload();
    }
}

fn dispatch(registrations: &Registrations, event: &FileEvent) {
    // Handlers run unlocked so they may register further watches.
    let handlers: Vec<FileEventHandler> = lock(registrations)
        .iter()
        .filter(|r| r.matches(event))
        .map(|r| Arc::clone(&r.handler))
        .collect();
    for handler in handlers {
        handler(event);
    }
}
