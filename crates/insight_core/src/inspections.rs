//! Authoritative record of inspections and their attached files.
//!
//! Two co-indexed maps share one key space: inspection id → inspection and
//! inspection id → ordered file list (unique by path). Every multi-step
//! mutation happens inside one critical section so no reader ever observes
//! an inspection without its file entry or vice versa.

use crate::error::{InsightError, Result};
use crate::events::{EventBus, StoreEvent};
use crate::metrics::MetricsLog;
use crate::persist::{self, SNAPSHOT_VERSION};
use crate::task::{CancelToken, WorkerPool};
use crate::types::{CodeFile, Inspection, InspectionState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, warn};

/// Minimum number of genuinely new files for an attach to proceed.
///
/// Below this, adding files is a no-op: a single extra file is not worth a
/// re-analysis round trip.
pub const MIN_NEW_FILES: usize = 2;

/// Executes the backend fix protocol for one inspection.
///
/// Implemented by the gateway; the store holds it weakly so the
/// store↔gateway pair cannot keep each other alive.
pub trait FixRunner: Send + Sync {
    /// Produces corrected file contents for the inspection's files.
    fn perform_fix(
        &self,
        inspection: &Inspection,
        files: &[CodeFile],
        token: &CancelToken,
    ) -> Result<Vec<CodeFile>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct InspectionsSnapshot {
    version: u32,
    inspections: Vec<InspectionRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InspectionRecord {
    id: String,
    description: String,
    fix_prompt: String,
    /// Full text content, not just paths: the snapshot must reconstruct
    /// identically even when the underlying files changed on disk.
    files: Vec<CodeFile>,
}

/// A fix currently running for an inspection.
struct ActiveFix {
    token: CancelToken,
    /// State to restore when the fix is cancelled.
    prior: InspectionState,
}

#[derive(Default)]
struct StoreInner {
    inspections_by_id: BTreeMap<String, Inspection>,
    files_by_inspection: BTreeMap<String, Vec<CodeFile>>,
    /// Runtime lifecycle state; removed ids stay as `Removed` tombstones.
    states: BTreeMap<String, InspectionState>,
    active_fixes: BTreeMap<String, ActiveFix>,
}

impl StoreInner {
    fn is_live(&self, id: &str) -> bool {
        matches!(self.states.get(id), Some(state) if *state != InspectionState::Removed)
    }

    fn ensure_live(&self, id: &str) -> Result<()> {
        if self.is_live(id) {
            Ok(())
        } else {
            Err(InsightError::InspectionNotFound(id.to_string()))
        }
    }

    fn set_state(&mut self, id: &str, next: InspectionState) -> Result<()> {
        let current = self
            .states
            .get(id)
            .copied()
            .unwrap_or(InspectionState::Created);
        if current == next {
            return Ok(());
        }
        if !current.can_transition_to(next) {
            return Err(InsightError::InvalidStateTransition {
                from: current.name().to_string(),
                to: next.name().to_string(),
            });
        }
        self.states.insert(id.to_string(), next);
        Ok(())
    }
}

/// Thread-safe inspection store with eager persistence.
pub struct InspectionStore {
    inner: Mutex<StoreInner>,
    events: EventBus,
    metrics: Arc<MetricsLog>,
    pool: Arc<WorkerPool>,
    fix_runner: Mutex<Option<Weak<dyn FixRunner>>>,
    snapshot_path: Option<PathBuf>,
}

impl InspectionStore {
    /// Creates an in-memory store with no snapshot file.
    pub fn new(events: EventBus, metrics: Arc<MetricsLog>, pool: Arc<WorkerPool>) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            events,
            metrics,
            pool,
            fix_runner: Mutex::new(None),
            snapshot_path: None,
        }
    }

    /// Creates a store backed by `path`, loading the existing snapshot.
    ///
    /// Undecodable records are skipped with a warning; the rest load.
    pub fn with_snapshot(
        events: EventBus,
        metrics: Arc<MetricsLog>,
        pool: Arc<WorkerPool>,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = Self::load(&path)?;
        Ok(Self {
            inner: Mutex::new(inner),
            events,
            metrics,
            pool,
            fix_runner: Mutex::new(None),
            snapshot_path: Some(path),
        })
    }

    /// Wires the fix backend in after construction.
    ///
    /// Held weakly: dropping the gateway stops fixes without leaking the
    /// store↔gateway pair.
    pub fn bind_fix_runner<R: FixRunner + 'static>(&self, runner: &Arc<R>) {
        let weak: Weak<dyn FixRunner> = Arc::downgrade(runner) as Weak<dyn FixRunner>;
        *self.fix_runner.lock().unwrap_or_else(|e| e.into_inner()) = Some(weak);
    }

    /// Creates or replaces an inspection, attaching initial files.
    ///
    /// The initial attach honors the `MIN_NEW_FILES` threshold (fewer files
    /// → created with an empty set) but never launches a fix. Rejects ids
    /// that were removed.
    pub fn put_inspection(&self, inspection: Inspection, files: Vec<CodeFile>) -> Result<()> {
        let id = inspection.id.clone();
        let doc = {
            let mut inner = self.lock_inner();
            if matches!(inner.states.get(&id), Some(InspectionState::Removed)) {
                return Err(InsightError::InspectionNotFound(id));
            }

            let unique = dedup_by_path(files);
            let attached = if unique.len() >= MIN_NEW_FILES {
                unique
            } else {
                Vec::new()
            };
            let state = if attached.is_empty() {
                InspectionState::Created
            } else {
                InspectionState::FilesAttached
            };
            inner.inspections_by_id.insert(id.clone(), inspection);
            inner.files_by_inspection.insert(id.clone(), attached);
            inner.states.insert(id.clone(), state);
            self.snapshot_doc(&inner)
        };
        self.write_doc(doc)?;
        self.events.emit(StoreEvent::InspectionChanged { id });
        Ok(())
    }

    /// Attaches files to an existing inspection, launching a background fix
    /// over the genuinely new ones.
    ///
    /// New files are the set-difference by path against the attached list;
    /// fewer than `MIN_NEW_FILES` of them → no-op, returns `false`. At most
    /// one fix runs per inspection: while one is in flight, further adds
    /// are refused (also `false`). Returns `true` when a fix was launched;
    /// the corrected files are appended on its completion.
    pub fn add_files_to_inspection(
        self: &Arc<Self>,
        id: &str,
        files: Vec<CodeFile>,
    ) -> Result<bool> {
        let new_files = {
            let inner = self.lock_inner();
            inner.ensure_live(id)?;
            if inner.active_fixes.contains_key(id) {
                debug!(id, "fix already in flight; add refused");
                return Ok(false);
            }
            let attached: BTreeSet<&str> = inner
                .files_by_inspection
                .get(id)
                .map(|files| files.iter().map(|f| f.path.as_str()).collect())
                .unwrap_or_default();
            let new_files: Vec<CodeFile> = dedup_by_path(files)
                .into_iter()
                .filter(|f| !attached.contains(f.path.as_str()))
                .collect();
            if new_files.len() < MIN_NEW_FILES {
                debug!(
                    id,
                    new_files = new_files.len(),
                    "below attach threshold; no-op"
                );
                return Ok(false);
            }
            new_files
        };

        let store = Arc::clone(self);
        let id_owned = id.to_string();
        self.perform_fix_with_progress(id, new_files, move |corrected| {
            store.append_files(&id_owned, corrected);
        })?;
        Ok(true)
    }

    /// Runs the bound fix backend over `files` in the background.
    ///
    /// Transitions to `FixInProgress` and fires `InspectionLoading` up
    /// front. On success `on_performed` receives the corrected files and
    /// the state becomes `FixApplied`. On cancellation nothing is touched:
    /// the prior state is restored, `InspectionCancelled` fires, no error
    /// is reported and `on_performed` is not invoked. On any other failure
    /// the error is reported (metric + log), the state becomes `FixFailed`,
    /// and `on_performed` still receives what was accumulated (possibly
    /// nothing) — callers get exactly one completion signal on every
    /// non-cancelled path.
    pub fn perform_fix_with_progress<F>(
        self: &Arc<Self>,
        id: &str,
        files: Vec<CodeFile>,
        on_performed: F,
    ) -> Result<CancelToken>
    where
        F: FnOnce(Vec<CodeFile>) + Send + 'static,
    {
        let token = CancelToken::new();
        let inspection = {
            let mut inner = self.lock_inner();
            inner.ensure_live(id)?;
            let prior = inner
                .states
                .get(id)
                .copied()
                .unwrap_or(InspectionState::Created);
            let inspection = inner
                .inspections_by_id
                .get(id)
                .cloned()
                .ok_or_else(|| InsightError::InspectionNotFound(id.to_string()))?;
            inner.set_state(id, InspectionState::FixInProgress)?;
            inner.active_fixes.insert(
                id.to_string(),
                ActiveFix {
                    token: token.clone(),
                    prior,
                },
            );
            inspection
        };
        self.events.emit(StoreEvent::InspectionLoading {
            id: id.to_string(),
        });

        let store = Arc::clone(self);
        let job_token = token.clone();
        let queued = self.pool.execute(move || {
            store.run_fix(inspection, files, on_performed, job_token);
        });
        if let Err(e) = queued {
            let mut inner = self.lock_inner();
            if let Some(active) = inner.active_fixes.remove(id) {
                inner.states.insert(id.to_string(), active.prior);
            }
            return Err(e);
        }
        Ok(token)
    }

    /// Fires the cancellation token of the inspection's in-flight fix.
    ///
    /// Returns `false` when no fix is running.
    pub fn cancel_fix(&self, id: &str) -> bool {
        let token = {
            let inner = self.lock_inner();
            inner.active_fixes.get(id).map(|active| active.token.clone())
        };
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Atomically replaces the description, rebinding the file list under
    /// the same id with its order preserved.
    pub fn set_description(&self, id: &str, new_description: impl Into<String>) -> Result<()> {
        let doc = {
            let mut inner = self.lock_inner();
            inner.ensure_live(id)?;
            let old = inner
                .inspections_by_id
                .remove(id)
                .ok_or_else(|| InsightError::InspectionNotFound(id.to_string()))?;
            let files = inner.files_by_inspection.remove(id).unwrap_or_default();
            let replacement = Inspection::with_id(id, new_description, old.fix_prompt);
            inner
                .inspections_by_id
                .insert(id.to_string(), replacement);
            inner.files_by_inspection.insert(id.to_string(), files);
            self.snapshot_doc(&inner)
        };
        self.write_doc(doc)?;
        self.events.emit(StoreEvent::InspectionChanged {
            id: id.to_string(),
        });
        Ok(())
    }

    /// Removes the inspection; terminal.
    ///
    /// An in-flight fix is cancelled; its late completion is dropped.
    pub fn remove_inspection(&self, id: &str) -> Result<()> {
        let (active, doc) = {
            let mut inner = self.lock_inner();
            inner.ensure_live(id)?;
            inner.inspections_by_id.remove(id);
            inner.files_by_inspection.remove(id);
            inner
                .states
                .insert(id.to_string(), InspectionState::Removed);
            let active = inner.active_fixes.remove(id);
            (active, self.snapshot_doc(&inner))
        };
        if let Some(active) = active {
            active.token.cancel();
        }
        self.write_doc(doc)?;
        self.events.emit(StoreEvent::InspectionRemoved {
            id: id.to_string(),
        });
        Ok(())
    }

    /// Detaches one file by path. Returns whether anything was removed.
    pub fn remove_file_from_inspection(&self, id: &str, path: &str) -> Result<bool> {
        let (removed, doc) = {
            let mut inner = self.lock_inner();
            inner.ensure_live(id)?;
            let files = inner
                .files_by_inspection
                .get_mut(id)
                .ok_or_else(|| InsightError::InspectionNotFound(id.to_string()))?;
            let before = files.len();
            files.retain(|f| f.path != path);
            let removed = files.len() < before;
            (removed, removed.then(|| self.snapshot_doc(&inner)).flatten())
        };
        if removed {
            self.write_doc(doc)?;
            self.events.emit(StoreEvent::FileRemovedFromInspection {
                id: id.to_string(),
                path: path.to_string(),
            });
        }
        Ok(removed)
    }

    /// All live inspections, ordered by id.
    pub fn inspections(&self) -> Vec<Inspection> {
        self.lock_inner().inspections_by_id.values().cloned().collect()
    }

    /// One inspection by id, when live.
    pub fn inspection(&self, id: &str) -> Option<Inspection> {
        self.lock_inner().inspections_by_id.get(id).cloned()
    }

    /// The inspection's attached files in attach order, when live.
    pub fn files_for(&self, id: &str) -> Option<Vec<CodeFile>> {
        self.lock_inner().files_by_inspection.get(id).cloned()
    }

    /// Number of live inspections.
    pub fn count(&self) -> usize {
        self.lock_inner().inspections_by_id.len()
    }

    /// Lifecycle state, including the `Removed` tombstone.
    pub fn state_of(&self, id: &str) -> Option<InspectionState> {
        self.lock_inner().states.get(id).copied()
    }

    /// True while a fix runs for the inspection.
    pub fn is_fix_in_flight(&self, id: &str) -> bool {
        self.lock_inner().active_fixes.contains_key(id)
    }

    /// Forces the snapshot to disk, when a path is configured.
    pub fn save(&self) -> Result<()> {
        let doc = {
            let inner = self.lock_inner();
            self.snapshot_doc(&inner)
        };
        self.write_doc(doc)
    }

    fn lock_inner(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Body of one background fix; runs on a worker thread.
    fn run_fix<F>(
        self: &Arc<Self>,
        inspection: Inspection,
        files: Vec<CodeFile>,
        on_performed: F,
        token: CancelToken,
    ) where
        F: FnOnce(Vec<CodeFile>),
    {
        let runner = self
            .fix_runner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .and_then(|weak| weak.upgrade());
        let outcome = match runner {
            Some(runner) => runner.perform_fix(&inspection, &files, &token),
            None => Err(InsightError::ConfigError(
                "no fix backend bound to the inspection store".to_string(),
            )),
        };

        let id = inspection.id.as_str();
        match outcome {
            Ok(corrected) => {
                let (live, doc) = {
                    let mut inner = self.lock_inner();
                    inner.active_fixes.remove(id);
                    if !inner.is_live(id) {
                        debug!(id, "fix completed after removal; result dropped");
                        (false, None)
                    } else {
                        if let Err(e) = inner.set_state(id, InspectionState::FixApplied) {
                            warn!(id, error = %e, "could not record fix completion state");
                        }
                        (true, self.snapshot_doc(&inner))
                    }
                };
                self.write_doc_logged(doc);
                if live {
                    self.events.emit(StoreEvent::InspectionChanged {
                        id: id.to_string(),
                    });
                }
                on_performed(corrected);
            }
            Err(e) if e.is_cancellation() => {
                {
                    let mut inner = self.lock_inner();
                    if let Some(active) = inner.active_fixes.remove(id) {
                        if inner.is_live(id) {
                            // Restore, don't transition: cancellation leaves
                            // the inspection exactly as it was.
                            inner.states.insert(id.to_string(), active.prior);
                        }
                    }
                }
                debug!(id, "fix cancelled");
                self.events.emit(StoreEvent::InspectionCancelled {
                    id: id.to_string(),
                });
            }
            Err(e) => {
                let live = {
                    let mut inner = self.lock_inner();
                    inner.active_fixes.remove(id);
                    let live = inner.is_live(id);
                    if live {
                        if let Err(state_err) = inner.set_state(id, InspectionState::FixFailed) {
                            warn!(id, error = %state_err, "could not record fix failure state");
                        }
                    }
                    live
                };
                warn!(id, error = %e, "fix failed");
                self.metrics.record_error(e.to_string());
                if live {
                    self.events.emit(StoreEvent::InspectionChanged {
                        id: id.to_string(),
                    });
                }
                on_performed(Vec::new());
            }
        }
    }

    /// Appends corrected files to the attached list, preserving order and
    /// uniqueness by path. Dropped when the inspection was removed mid-fix.
    fn append_files(&self, id: &str, corrected: Vec<CodeFile>) {
        let (changed, doc) = {
            let mut inner = self.lock_inner();
            if !inner.is_live(id) {
                debug!(id, "append after removal; files dropped");
                return;
            }
            let Some(files) = inner.files_by_inspection.get_mut(id) else {
                return;
            };
            let existing: BTreeSet<String> = files.iter().map(|f| f.path.clone()).collect();
            let mut changed = false;
            for file in dedup_by_path(corrected) {
                if !existing.contains(&file.path) {
                    files.push(file);
                    changed = true;
                }
            }
            (changed, changed.then(|| self.snapshot_doc(&inner)).flatten())
        };
        if changed {
            self.write_doc_logged(doc);
            self.events.emit(StoreEvent::InspectionChanged {
                id: id.to_string(),
            });
        }
    }

    /// Builds the full snapshot document, or `None` when not persisted.
    fn snapshot_doc(&self, inner: &StoreInner) -> Option<InspectionsSnapshot> {
        self.snapshot_path.as_ref()?;
        let inspections = inner
            .inspections_by_id
            .iter()
            .map(|(id, inspection)| InspectionRecord {
                id: id.clone(),
                description: inspection.description.clone(),
                fix_prompt: inspection.fix_prompt.clone(),
                files: inner
                    .files_by_inspection
                    .get(id)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();
        Some(InspectionsSnapshot {
            version: SNAPSHOT_VERSION,
            inspections,
        })
    }

    fn write_doc(&self, doc: Option<InspectionsSnapshot>) -> Result<()> {
        match (doc, &self.snapshot_path) {
            (Some(doc), Some(path)) => persist::save_snapshot(path, &doc),
            _ => Ok(()),
        }
    }

    /// Background variant: a failed write is logged and recorded, never
    /// propagated into a worker thread.
    fn write_doc_logged(&self, doc: Option<InspectionsSnapshot>) {
        if let Err(e) = self.write_doc(doc) {
            warn!(error = %e, "inspection snapshot write failed");
            self.metrics.record_error(e.to_string());
        }
    }

    /// Reads a snapshot file, skipping undecodable records.
    fn load(path: &Path) -> Result<StoreInner> {
        let mut inner = StoreInner::default();
        let Some(snapshot) = persist::load_snapshot::<InspectionsSnapshot>(path)? else {
            return Ok(inner);
        };
        persist::check_version(path, snapshot.version)?;

        for record in snapshot.inspections {
            if record.id.is_empty() {
                warn!(path = %path.display(), "skipping inspection record with empty id");
                continue;
            }
            let state = if record.files.is_empty() {
                InspectionState::Created
            } else {
                InspectionState::FilesAttached
            };
            let files = dedup_by_path(record.files);
            inner.inspections_by_id.insert(
                record.id.clone(),
                Inspection::with_id(&record.id, record.description, record.fix_prompt),
            );
            inner.files_by_inspection.insert(record.id.clone(), files);
            inner.states.insert(record.id, state);
        }
        Ok(inner)
    }
}

/// Keeps the first occurrence of each path, preserving order.
fn dedup_by_path(files: Vec<CodeFile>) -> Vec<CodeFile> {
    let mut seen = BTreeSet::new();
    files
        .into_iter()
        .filter(|f| seen.insert(f.path.clone()))
        .collect()
}
