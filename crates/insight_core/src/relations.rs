//! Persistent file-relation graph.
//!
//! Maps a source file to the set of files structurally related to it. The
//! graph is directed (edges are not mirrored) and survives restarts through
//! an atomically written JSON snapshot.

use crate::error::Result;
use crate::events::{EventBus, StoreEvent};
use crate::model::ProjectHost;
use crate::persist::{self, SNAPSHOT_VERSION};
use crate::types::CodeFile;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Separator for the pipe-joined `related` field of the disk format.
const TARGET_SEPARATOR: &str = "|";

#[derive(Debug, Serialize, Deserialize)]
struct RelationsSnapshot {
    version: u32,
    relations: Vec<RelationRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RelationRecord {
    source: String,
    /// Pipe-joined target list.
    related: String,
}

/// Thread-safe source → related-files adjacency with optional persistence.
///
/// Targets are stored as URLs/paths and resolved against the project host on
/// every read, so entries for files that have since disappeared are filtered
/// rather than returned stale.
pub struct RelationGraphStore {
    relations: RwLock<BTreeMap<String, BTreeSet<String>>>,
    host: Arc<dyn ProjectHost>,
    events: EventBus,
    snapshot_path: Option<PathBuf>,
}

impl RelationGraphStore {
    /// Creates an in-memory store with no snapshot file.
    pub fn new(host: Arc<dyn ProjectHost>, events: EventBus) -> Self {
        Self {
            relations: RwLock::new(BTreeMap::new()),
            host,
            events,
            snapshot_path: None,
        }
    }

    /// Creates a store backed by `path`, loading the existing snapshot.
    ///
    /// A missing file yields an empty graph; malformed records inside an
    /// otherwise readable snapshot are skipped with a warning.
    pub fn with_snapshot(
        host: Arc<dyn ProjectHost>,
        events: EventBus,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let relations = Self::load(&path)?;
        Ok(Self {
            relations: RwLock::new(relations),
            host,
            events,
            snapshot_path: Some(path),
        })
    }

    /// Adds one directed edge. Idempotent.
    ///
    /// Fires `RelationsChanged` and persists only when the edge was new.
    pub fn add_relation(&self, source: &str, related: &str) -> Result<()> {
        let inserted = {
            let mut map = self.relations.write().unwrap_or_else(|e| e.into_inner());
            map.entry(source.to_string())
                .or_default()
                .insert(related.to_string())
        };

        if inserted {
            debug!(source, related, "relation added");
            self.persist_current()?;
            self.events.emit(StoreEvent::RelationsChanged {
                source: source.to_string(),
            });
        }
        Ok(())
    }

    /// Removes one directed edge; no-op when absent.
    ///
    /// The source entry is kept even when its set becomes empty: the file is
    /// still "known", just currently unrelated to anything.
    pub fn remove_relation(&self, source: &str, related: &str) -> Result<()> {
        let removed = {
            let mut map = self.relations.write().unwrap_or_else(|e| e.into_inner());
            map.get_mut(source).is_some_and(|set| set.remove(related))
        };

        if removed {
            debug!(source, related, "relation removed");
            self.persist_current()?;
            self.events.emit(StoreEvent::RelationsChanged {
                source: source.to_string(),
            });
        }
        Ok(())
    }

    /// Current adjacency of `source`, filtered to files that still exist.
    pub fn related_files(&self, source: &str) -> Vec<String> {
        let map = self.relations.read().unwrap_or_else(|e| e.into_inner());
        map.get(source)
            .map(|set| {
                set.iter()
                    .filter(|target| self.host.contains(target))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolves every stored pair to live file content.
    ///
    /// Pairs that no longer resolve are dropped silently. Computed under one
    /// read guard so concurrent mutation cannot produce a torn view.
    pub fn all_relations(&self) -> BTreeMap<String, Vec<CodeFile>> {
        let map = self.relations.read().unwrap_or_else(|e| e.into_inner());
        map.iter()
            .map(|(source, targets)| {
                let resolved = targets
                    .iter()
                    .filter_map(|target| self.host.read(target))
                    .collect();
                (source.clone(), resolved)
            })
            .collect()
    }

    /// Prunes every target that no longer resolves to a project file.
    ///
    /// Sources are kept even when their set empties. Returns the number of
    /// pruned targets.
    pub fn cleanup(&self) -> Result<usize> {
        let mut changed_sources = Vec::new();
        let pruned = {
            let mut map = self.relations.write().unwrap_or_else(|e| e.into_inner());
            let mut pruned = 0usize;
            for (source, targets) in map.iter_mut() {
                let before = targets.len();
                targets.retain(|target| self.host.contains(target));
                if targets.len() < before {
                    pruned += before - targets.len();
                    changed_sources.push(source.clone());
                }
            }
            pruned
        };

        if pruned > 0 {
            debug!(pruned, "stale relation targets removed");
            self.persist_current()?;
            for source in changed_sources {
                self.events.emit(StoreEvent::RelationsChanged { source });
            }
        }
        Ok(pruned)
    }

    /// All sources with at least one recorded relation entry, sorted.
    pub fn sources(&self) -> Vec<String> {
        let map = self.relations.read().unwrap_or_else(|e| e.into_inner());
        map.keys().cloned().collect()
    }

    /// Number of sources tracked.
    pub fn len(&self) -> usize {
        self.relations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// True when no source is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered `(source, pipe-joined targets)` records — the disk format.
    pub fn export_state(&self) -> Vec<(String, String)> {
        let map = self.relations.read().unwrap_or_else(|e| e.into_inner());
        map.iter()
            .map(|(source, targets)| {
                let joined = targets
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(TARGET_SEPARATOR);
                (source.clone(), joined)
            })
            .collect()
    }

    /// Replaces the whole graph from exported records.
    pub fn import_state(&self, records: &[(String, String)]) -> Result<()> {
        {
            let mut map = self.relations.write().unwrap_or_else(|e| e.into_inner());
            map.clear();
            for (source, joined) in records {
                map.insert(source.clone(), split_targets(joined));
            }
        }
        self.persist_current()
    }

    /// Reads a snapshot file into an adjacency map.
    fn load(path: &Path) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let Some(snapshot) = persist::load_snapshot::<RelationsSnapshot>(path)? else {
            return Ok(BTreeMap::new());
        };
        persist::check_version(path, snapshot.version)?;

        let mut map = BTreeMap::new();
        for record in snapshot.relations {
            if record.source.is_empty() {
                warn!(path = %path.display(), "skipping relation record with empty source");
                continue;
            }
            map.insert(record.source, split_targets(&record.related));
        }
        Ok(map)
    }

    /// Writes the current graph to the snapshot path, if one is configured.
    fn persist_current(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let snapshot = {
            let map = self.relations.read().unwrap_or_else(|e| e.into_inner());
            RelationsSnapshot {
                version: SNAPSHOT_VERSION,
                relations: map
                    .iter()
                    .map(|(source, targets)| RelationRecord {
                        source: source.clone(),
                        related: targets
                            .iter()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(TARGET_SEPARATOR),
                    })
                    .collect(),
            }
        };
        persist::save_snapshot(path, &snapshot)
    }
}

fn split_targets(joined: &str) -> BTreeSet<String> {
    joined
        .split(TARGET_SEPARATOR)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
