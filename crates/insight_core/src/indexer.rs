//! One-shot project walk feeding the relation graph.
//!
//! The indexer visits every project file's element tree once, hands
//! interesting elements to a pluggable handler, and produces a snapshot of
//! what it accepted. At most one run is in flight at a time; a second start
//! is refused, not queued.

use crate::error::{InsightError, Result};
use crate::model::{Element, ElementKind, HostModel};
use crate::relations::RelationGraphStore;
use crate::task::{CancelToken, WorkerPool};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// What one index run accepted and how the walk went.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    /// Accepted elements keyed by their stable element key.
    pub elements: BTreeMap<String, Element>,
    /// Files whose trees were walked.
    pub files_walked: usize,
    /// Elements accepted and processed successfully.
    pub elements_indexed: usize,
    /// Elements whose processing failed (isolated, walk continued).
    pub elements_failed: usize,
}

/// Best-effort progress signal; the fraction is approximate.
#[derive(Debug, Clone)]
pub struct IndexProgress {
    pub fraction: f64,
    pub current_file: String,
}

/// Predicate/visitor pair driving one index run.
///
/// Exactly one of `on_complete` / `on_error` fires exactly once per run;
/// cancellation reports as `on_error(Cancelled)` so it never masquerades as
/// success or failure.
pub trait IndexHandler: Send + Sync {
    /// Interest predicate; rejected elements are skipped entirely.
    fn should_process(&self, element: &Element) -> bool;

    /// Invoked per accepted, still-valid element. Failures are isolated.
    fn process_element(&self, element: &Element) -> Result<()>;

    /// The run finished; `snapshot` holds everything accepted.
    fn on_complete(&self, snapshot: IndexSnapshot);

    /// The run aborted. Receives `Cancelled` for cooperative stops.
    fn on_error(&self, error: InsightError);
}

/// Walks the project once on the worker pool, single-flight.
pub struct ProjectIndexer {
    model: Arc<dyn HostModel>,
    pool: Arc<WorkerPool>,
    indexing: Arc<AtomicBool>,
    current: Arc<Mutex<Option<CancelToken>>>,
}

impl ProjectIndexer {
    pub fn new(model: Arc<dyn HostModel>, pool: Arc<WorkerPool>) -> Self {
        Self {
            model,
            pool,
            indexing: Arc::new(AtomicBool::new(false)),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts a background index run.
    ///
    /// Returns `false` without doing anything when a run is already in
    /// flight. Otherwise the walk is queued and `true` returned; completion
    /// is reported through the handler.
    pub fn start_indexing<F>(&self, handler: Arc<dyn IndexHandler>, progress: F) -> bool
    where
        F: Fn(IndexProgress) + Send + Sync + 'static,
    {
        if self
            .indexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("index run already in flight; start refused");
            return false;
        }

        let token = CancelToken::new();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());

        let model = Arc::clone(&self.model);
        let indexing = Arc::clone(&self.indexing);
        let current = Arc::clone(&self.current);
        let job_handler = Arc::clone(&handler);

        let queued = self.pool.execute(move || {
            let outcome = walk_project(&model, job_handler.as_ref(), &progress, &token);
            *current.lock().unwrap_or_else(|e| e.into_inner()) = None;
            indexing.store(false, Ordering::SeqCst);
            match outcome {
                Ok(snapshot) => {
                    debug!(
                        files = snapshot.files_walked,
                        indexed = snapshot.elements_indexed,
                        failed = snapshot.elements_failed,
                        "index run complete"
                    );
                    job_handler.on_complete(snapshot);
                }
                Err(e) => job_handler.on_error(e),
            }
        });

        if let Err(e) = queued {
            warn!(error = %e, "could not queue index run");
            *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
            self.indexing.store(false, Ordering::SeqCst);
            handler.on_error(e);
        }
        true
    }

    /// Cooperatively stops the in-flight run, if any.
    ///
    /// The walk aborts at its next checkpoint; partial index entries are not
    /// rolled back.
    pub fn stop_indexing(&self) {
        if let Some(token) = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            token.cancel();
        }
    }

    /// True while a run is in flight.
    pub fn is_indexing(&self) -> bool {
        self.indexing.load(Ordering::SeqCst)
    }
}

/// The walk itself; runs on a worker thread.
fn walk_project<F>(
    model: &Arc<dyn HostModel>,
    handler: &dyn IndexHandler,
    progress: &F,
    token: &CancelToken,
) -> Result<IndexSnapshot>
where
    F: Fn(IndexProgress),
{
    let files = model.files();
    let total = files.len().max(1);
    let mut snapshot = IndexSnapshot::default();

    for (i, file) in files.iter().enumerate() {
        token.checkpoint()?;
        progress(IndexProgress {
            fraction: i as f64 / total as f64,
            current_file: file.clone(),
        });

        let tree = match model.element_tree(file) {
            Ok(tree) => tree,
            Err(e) => {
                warn!(file, error = %e, "element tree unavailable; file skipped");
                continue;
            }
        };

        for element in tree {
            token.checkpoint()?;
            if !handler.should_process(&element) {
                continue;
            }
            // The host can mutate under us between discovery and processing.
            if !model.is_valid(&element) {
                debug!(key = %element.key, "element invalidated before processing; dropped");
                continue;
            }
            match handler.process_element(&element) {
                Ok(()) => {
                    snapshot.elements.insert(element.key.clone(), element);
                    snapshot.elements_indexed += 1;
                }
                Err(e) => {
                    warn!(key = %element.key, error = %e, "element processing failed");
                    snapshot.elements_failed += 1;
                }
            }
        }
        snapshot.files_walked += 1;
    }

    progress(IndexProgress {
        fraction: 1.0,
        current_file: String::new(),
    });
    Ok(snapshot)
}

/// Bundled handler: accepts named declarations and records cross-file
/// usages in the relation graph.
///
/// An edge `using file → declaring file` is added for every usage that
/// crosses a file boundary; same-file usages are ignored.
pub struct RelationIndexHandler {
    model: Arc<dyn HostModel>,
    relations: Arc<RelationGraphStore>,
    outcome: Mutex<Option<Result<IndexSnapshot>>>,
    done: Condvar,
}

impl RelationIndexHandler {
    pub fn new(model: Arc<dyn HostModel>, relations: Arc<RelationGraphStore>) -> Self {
        Self {
            model,
            relations,
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    /// Blocks until the run reports, up to `timeout`.
    ///
    /// Returns `None` on timeout; otherwise consumes and returns the run's
    /// outcome.
    pub fn wait_outcome(&self, timeout: Duration) -> Option<Result<IndexSnapshot>> {
        let guard = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        let (mut guard, _) = self
            .done
            .wait_timeout_while(guard, timeout, |outcome| outcome.is_none())
            .unwrap_or_else(|e| e.into_inner());
        guard.take()
    }

    fn deliver(&self, outcome: Result<IndexSnapshot>) {
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome);
        self.done.notify_all();
    }
}

impl IndexHandler for RelationIndexHandler {
    fn should_process(&self, element: &Element) -> bool {
        element.kind == ElementKind::Declaration && !element.name.is_empty()
    }

    fn process_element(&self, element: &Element) -> Result<()> {
        for usage in self.model.find_usages(element)? {
            if usage.file == element.file || !self.model.contains(&usage.file) {
                continue;
            }
            self.relations.add_relation(&usage.file, &element.file)?;
        }
        Ok(())
    }

    fn on_complete(&self, snapshot: IndexSnapshot) {
        self.deliver(Ok(snapshot));
    }

    fn on_error(&self, error: InsightError) {
        if error.is_cancellation() {
            debug!("index run cancelled");
        } else {
            warn!(error = %error, "index run failed");
        }
        self.deliver(Err(error));
    }
}
