use crate::error::{EngineError, Result};
use crate::host::{DocumentRef, DocumentStore};
use crate::paths;
use log::{debug, info, warn};
use random_tables_parser::{extract_tables, Table};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Extension of table notes
pub const TABLE_EXTENSION: &str = "md";

/// Statistics about one `load_tables` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    /// Documents read successfully
    pub files: usize,

    /// Tables extracted from those documents
    pub tables: usize,

    /// `path: error` for every document that could not be read
    pub failures: Vec<String>,
}

/// The current set of tables, derived from the notes in one vault folder.
///
/// Tables are kept per source document; the flat, key-deduplicated list is
/// derived on demand by folding documents in path order, so a full scan and a
/// sequence of single-file loads over the same contents agree.
pub struct TableRegistry {
    documents: Arc<dyn DocumentStore>,
    folder: String,
    by_source: BTreeMap<String, Vec<Table>>,
}

impl TableRegistry {
    pub fn new(documents: Arc<dyn DocumentStore>, folder: &str) -> Self {
        Self {
            documents,
            folder: paths::normalize_folder(folder),
            by_source: BTreeMap::new(),
        }
    }

    /// Normalized folder prefix (`""` for the vault root)
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Point the registry at another folder, dropping every loaded table.
    pub fn set_folder(&mut self, folder: &str) {
        self.folder = paths::normalize_folder(folder);
        self.by_source.clear();
    }

    /// Whether a document is a table note of this registry's folder
    pub fn accepts(&self, document: &DocumentRef) -> bool {
        document.path.starts_with(&self.folder)
            && document.extension == TABLE_EXTENSION
            && !paths::is_trashed(&document.path)
    }

    /// Rebuild the table set.
    ///
    /// Without `changed`, every table note of the folder is read and the set is
    /// replaced; an unreadable note is logged and contributes nothing. With
    /// `changed`, only that note is re-parsed and merged, and a read failure
    /// is returned to the caller.
    pub async fn load_tables(&mut self, changed: Option<&DocumentRef>) -> Result<LoadStats> {
        match changed {
            None => self.load_all().await,
            Some(document) => self.load_one(document).await,
        }
    }

    /// Drop the tables contributed by `path`. Returns whether any were held.
    pub fn forget_file(&mut self, path: &str) -> bool {
        self.by_source.remove(path).is_some()
    }

    /// Snapshot of the current tables, deduplicated by key (last one wins)
    pub fn get_tables(&self) -> Vec<Table> {
        let mut tables: Vec<Table> = Vec::new();
        let mut index_by_key: HashMap<String, usize> = HashMap::new();

        for table in self.by_source.values().flatten() {
            let key = table.key();
            match index_by_key.get(&key) {
                Some(&idx) => {
                    debug!(
                        "Table '{key}' from {} replaces an earlier definition",
                        table.source_file.as_deref().unwrap_or("<unknown>")
                    );
                    tables[idx] = table.clone();
                }
                None => {
                    index_by_key.insert(key, tables.len());
                    tables.push(table.clone());
                }
            }
        }
        tables
    }

    pub fn len(&self) -> usize {
        self.get_tables().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.values().all(Vec::is_empty)
    }

    /// Release every loaded table. Safe to call repeatedly.
    pub fn unload(&mut self) {
        self.by_source.clear();
    }

    async fn load_all(&mut self) -> Result<LoadStats> {
        let mut documents: Vec<DocumentRef> = self
            .documents
            .markdown_documents()?
            .into_iter()
            .filter(|doc| self.accepts(doc))
            .collect();
        documents.sort();

        let scheduled: Vec<String> = documents.iter().map(|doc| doc.path.clone()).collect();
        let mut reads = JoinSet::new();
        for (idx, document) in documents.into_iter().enumerate() {
            let store = Arc::clone(&self.documents);
            reads.spawn(async move {
                let content = store.read(&document).await;
                (idx, document, content)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => warn!("Table read task failed: {err}"),
            }
        }
        results.sort_by_key(|(idx, _, _)| *idx);

        let mut stats = LoadStats::default();
        // A task that panicked or was cancelled never reports back.
        let mut finished = vec![false; scheduled.len()];
        for (idx, _, _) in &results {
            finished[*idx] = true;
        }
        for (path, _) in scheduled.iter().zip(&finished).filter(|(_, done)| !**done) {
            stats.failures.push(format!("{path}: read task failed"));
        }
        let mut by_source = BTreeMap::new();
        for (_, document, content) in results {
            match content {
                Ok(content) => {
                    let tables = parse_document(&document, &content);
                    stats.files += 1;
                    stats.tables += tables.len();
                    if !tables.is_empty() {
                        by_source.insert(document.path, tables);
                    }
                }
                Err(err) => {
                    warn!("Tables failed to load from {}: {err}", document.path);
                    stats.failures.push(format!("{}: {err}", document.path));
                }
            }
        }

        self.by_source = by_source;
        info!(
            "Scanned {} table notes in '{}' ({} tables)",
            stats.files, self.folder, stats.tables
        );
        Ok(stats)
    }

    async fn load_one(&mut self, document: &DocumentRef) -> Result<LoadStats> {
        if !self.accepts(document) {
            debug!("Ignoring {}: not a table note of '{}'", document.path, self.folder);
            return Ok(LoadStats::default());
        }

        let content = self
            .documents
            .read(document)
            .await
            .map_err(|source| EngineError::Read {
                path: document.path.clone(),
                source,
            })?;

        let tables = parse_document(document, &content);
        let stats = LoadStats {
            files: 1,
            tables: tables.len(),
            failures: Vec::new(),
        };
        if tables.is_empty() {
            self.by_source.remove(&document.path);
        } else {
            self.by_source.insert(document.path.clone(), tables);
        }
        debug!("Reloaded {} ({} tables)", document.path, stats.tables);
        Ok(stats)
    }
}

fn parse_document(document: &DocumentRef, content: &str) -> Vec<Table> {
    extract_tables(&document.name, content)
        .into_iter()
        .map(|table| table.with_source(document.path.clone()))
        .collect()
}
