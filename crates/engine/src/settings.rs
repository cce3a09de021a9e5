use crate::error::Result;
use crate::host::SettingsStore;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_FOLDER: &str = "RandomTables";

/// What to append after an inserted item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeparatorAfterInsert {
    #[default]
    None,
    Space,
    Newline,
}

impl SeparatorAfterInsert {
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Space => " ",
            Self::Newline => "\n",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Space => "space",
            Self::Newline => "newline",
        }
    }
}

impl fmt::Display for SeparatorAfterInsert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeparatorAfterInsert {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "space" => Ok(Self::Space),
            "newline" => Ok(Self::Newline),
            other => Err(format!(
                "unknown separator '{other}' (expected none, space or newline)"
            )),
        }
    }
}

/// Persisted plugin settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Vault folder holding the table notes
    pub folder_location: String,

    pub separator_after_insert: SeparatorAfterInsert,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            folder_location: DEFAULT_FOLDER.to_string(),
            separator_after_insert: SeparatorAfterInsert::None,
        }
    }
}

impl Settings {
    /// Merge a persisted blob over the defaults.
    ///
    /// Fields are read one by one: a missing or unreadable field keeps its
    /// default without discarding the others.
    pub fn from_data(data: Option<serde_json::Value>) -> Self {
        let mut settings = Self::default();
        let data = match data {
            Some(serde_json::Value::Object(data)) => data,
            None | Some(serde_json::Value::Null) => return settings,
            Some(other) => {
                warn!("Ignoring settings that are not an object, using defaults: {other}");
                return settings;
            }
        };

        if let Some(folder) = read_field(&data, "folderLocation") {
            settings.folder_location = folder;
        }
        if let Some(separator) = read_field(&data, "separatorAfterInsert") {
            settings.separator_after_insert = separator;
        }
        settings
    }

    pub fn to_data(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn read_field<T: serde::de::DeserializeOwned>(
    data: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<T> {
    let value = data.get(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!("Ignoring unreadable setting '{key}', using default: {err}");
            None
        }
    }
}

/// Settings shared between the plugin and the actions it registers
pub type SharedSettings = Arc<RwLock<Settings>>;

pub(crate) fn read_settings(settings: &SharedSettings) -> Settings {
    match settings.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub(crate) fn write_settings(settings: &SharedSettings, update: impl FnOnce(&mut Settings)) {
    match settings.write() {
        Ok(mut guard) => update(&mut guard),
        Err(poisoned) => update(&mut poisoned.into_inner()),
    }
}

/// Load settings from the host store; failures fall back to defaults.
pub async fn load_settings(store: &dyn SettingsStore) -> Settings {
    match store.load_data().await {
        Ok(data) => Settings::from_data(data),
        Err(err) => {
            warn!("Failed to load settings, using defaults: {err}");
            Settings::default()
        }
    }
}

pub async fn save_settings(store: &dyn SettingsStore, settings: &Settings) -> Result<()> {
    store.save_data(settings.to_data()?).await?;
    Ok(())
}

/// Coalesces rapid calls: scheduling cancels the pending run and starts a
/// new timer.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        let mut guard = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = guard.replace(handle) {
            debug!("Superseding pending settings change");
            previous.abort();
        }
    }

    /// Abort the pending run. Returns whether one was still waiting.
    pub fn cancel(&self) -> bool {
        let mut guard = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn missing_data_uses_defaults() {
        assert_eq!(Settings::from_data(None), Settings::default());
        assert_eq!(
            Settings::from_data(Some(serde_json::Value::Null)),
            Settings::default()
        );
    }

    #[test]
    fn partial_data_is_merged_over_defaults() {
        let settings = Settings::from_data(Some(json!({ "separatorAfterInsert": "newline" })));
        assert_eq!(settings.folder_location, DEFAULT_FOLDER);
        assert_eq!(settings.separator_after_insert, SeparatorAfterInsert::Newline);

        let settings = Settings::from_data(Some(json!({ "folderLocation": "Games/Tables" })));
        assert_eq!(settings.folder_location, "Games/Tables");
        assert_eq!(settings.separator_after_insert, SeparatorAfterInsert::None);
    }

    #[test]
    fn unreadable_field_keeps_the_readable_ones() {
        let settings = Settings::from_data(Some(json!({
            "folderLocation": "Games",
            "separatorAfterInsert": "tab"
        })));
        assert_eq!(settings.folder_location, "Games");
        assert_eq!(settings.separator_after_insert, SeparatorAfterInsert::None);

        let settings = Settings::from_data(Some(json!({
            "folderLocation": 7,
            "separatorAfterInsert": "space"
        })));
        assert_eq!(settings.folder_location, DEFAULT_FOLDER);
        assert_eq!(settings.separator_after_insert, SeparatorAfterInsert::Space);
    }

    #[test]
    fn non_object_data_falls_back_to_defaults() {
        assert_eq!(
            Settings::from_data(Some(json!(["RandomTables"]))),
            Settings::default()
        );
    }

    #[test]
    fn serializes_in_host_layout() {
        let settings = Settings {
            folder_location: "Tables".into(),
            separator_after_insert: SeparatorAfterInsert::Space,
        };
        assert_eq!(
            settings.to_data().unwrap(),
            json!({ "folderLocation": "Tables", "separatorAfterInsert": "space" })
        );
    }

    #[test]
    fn separator_suffixes() {
        assert_eq!(SeparatorAfterInsert::None.suffix(), "");
        assert_eq!(SeparatorAfterInsert::Space.suffix(), " ");
        assert_eq!(SeparatorAfterInsert::Newline.suffix(), "\n");
        assert_eq!(
            "Newline".parse::<SeparatorAfterInsert>(),
            Ok(SeparatorAfterInsert::Newline)
        );
        assert!("tab".parse::<SeparatorAfterInsert>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_runs_only_the_last_scheduled_task() {
        let runs = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(Duration::from_millis(750));

        for value in 1..=3 {
            let runs = runs.clone();
            let last = last.clone();
            debouncer.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                last.store(value, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(Duration::from_millis(750));
        let counter = runs.clone();
        debouncer.schedule(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(debouncer.cancel());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!debouncer.cancel());
    }
}
