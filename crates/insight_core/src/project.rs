//! Per-project facade wiring the engine together.
//!
//! One `InsightProject` is the authoritative instance for one project root:
//! it owns the worker pool, the event bus, the metric log, both stores, the
//! host model, and the background services, and injects them into each
//! other explicitly. State lives under `.insight/` next to the sources.

use crate::config::InsightConfig;
use crate::crawler::FileRelevanceCrawler;
use crate::error::{InsightError, Result};
use crate::events::EventBus;
use crate::gateway::{AIBackendGateway, HttpTransport, Transport};
use crate::indexer::ProjectIndexer;
use crate::inspections::InspectionStore;
use crate::metrics::MetricsLog;
use crate::model::LexicalModel;
use crate::orchestrator::AnalysisOrchestrator;
use crate::relations::RelationGraphStore;
use crate::task::WorkerPool;
use crate::TimeProvider;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Directory holding all persisted engine state.
const INSIGHT_DIR: &str = ".insight";

/// Handle to one opened project.
///
/// Construction wires every component; accessors hand them out. The gateway
/// is built lazily so commands that never talk to the backend work without
/// an API key. Dropping the project releases the lock and joins the pool.
pub struct InsightProject {
    root: PathBuf,
    insight_dir: PathBuf,
    config: InsightConfig,
    events: EventBus,
    metrics: Arc<MetricsLog>,
    pool: Arc<WorkerPool>,
    model: Arc<LexicalModel>,
    relations: Arc<RelationGraphStore>,
    inspections: Arc<InspectionStore>,
    crawler: Arc<FileRelevanceCrawler>,
    indexer: ProjectIndexer,
    gateway: Mutex<Option<Arc<AIBackendGateway>>>,
    _lock: LockGuard,
}

impl std::fmt::Debug for InsightProject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightProject")
            .field("root", &self.root)
            .field("insight_dir", &self.insight_dir)
            .finish_non_exhaustive()
    }
}

impl InsightProject {
    /// Initializes `.insight/` under `root` and opens the project.
    ///
    /// Fails when the directory already exists.
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let insight_dir = root.join(INSIGHT_DIR);

        if insight_dir.exists() {
            return Err(InsightError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "insight project already exists in this directory",
            )));
        }

        fs::create_dir_all(&insight_dir)?;
        InsightConfig::default().save(&insight_dir)?;

        Self::open(root)
    }

    /// Opens an existing project, acquiring its exclusive lock.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::open_inner(root.as_ref(), None)
    }

    /// Opens with an injected clock; metrics stamp through it.
    pub fn with_time_provider(
        root: impl AsRef<Path>,
        provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        Self::open_inner(root.as_ref(), Some(provider))
    }

    fn open_inner(root: &Path, time_provider: Option<Arc<dyn TimeProvider>>) -> Result<Self> {
        let root = root.to_path_buf();
        let insight_dir = root.join(INSIGHT_DIR);

        if !insight_dir.exists() {
            return Err(InsightError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("not an insight project: {}", root.display()),
            )));
        }

        let lock = acquire_lock(&insight_dir.join("LOCK"), 0)?;
        let config = InsightConfig::load(&insight_dir)?;

        let events = EventBus::new();
        let metrics = Arc::new(match time_provider {
            Some(provider) => MetricsLog::with_time_provider(provider),
            None => MetricsLog::new(),
        });
        let pool = Arc::new(WorkerPool::new(config.analysis.worker_threads));
        let model = Arc::new(LexicalModel::scan(&root)?);

        let relations = Arc::new(RelationGraphStore::with_snapshot(
            model.clone(),
            events.clone(),
            insight_dir.join("relations.json"),
        )?);
        let inspections = Arc::new(InspectionStore::with_snapshot(
            events.clone(),
            metrics.clone(),
            pool.clone(),
            insight_dir.join("inspections.json"),
        )?);
        let crawler = Arc::new(FileRelevanceCrawler::new(model.clone()));
        let indexer = ProjectIndexer::new(model.clone(), pool.clone());

        Ok(Self {
            root,
            insight_dir,
            config,
            events,
            metrics,
            pool,
            model,
            relations,
            inspections,
            crawler,
            indexer,
            gateway: Mutex::new(None),
            _lock: lock,
        })
    }

    /// Project root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `.insight/` state directory.
    pub fn insight_dir(&self) -> &Path {
        &self.insight_dir
    }

    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<MetricsLog> {
        &self.metrics
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn model(&self) -> &Arc<LexicalModel> {
        &self.model
    }

    pub fn relations(&self) -> &Arc<RelationGraphStore> {
        &self.relations
    }

    pub fn inspections(&self) -> &Arc<InspectionStore> {
        &self.inspections
    }

    pub fn crawler(&self) -> &Arc<FileRelevanceCrawler> {
        &self.crawler
    }

    pub fn indexer(&self) -> &ProjectIndexer {
        &self.indexer
    }

    /// The backend gateway, built on first use.
    ///
    /// Construction reads the API key from the configured environment
    /// variable and binds the gateway into the inspection store as its fix
    /// runner.
    pub fn gateway(&self) -> Result<Arc<AIBackendGateway>> {
        let mut slot = self.gateway.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(gateway) = slot.as_ref() {
            return Ok(Arc::clone(gateway));
        }
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&self.config.backend)?);
        let gateway = Arc::new(AIBackendGateway::new(
            &self.config.backend,
            transport,
            self.inspections.clone(),
            self.metrics.clone(),
        ));
        self.inspections.bind_fix_runner(&gateway);
        *slot = Some(Arc::clone(&gateway));
        Ok(gateway)
    }

    /// A fully wired orchestrator over this project's components.
    pub fn orchestrator(&self) -> Result<AnalysisOrchestrator> {
        Ok(AnalysisOrchestrator::new(
            self.model.clone(),
            self.crawler.clone(),
            self.relations.clone(),
            self.gateway()?,
            self.metrics.clone(),
            self.pool.clone(),
            self.config.crawler.timeout(),
            self.config.inspections.max_open,
        ))
    }

    /// Releases the lock and joins the workers.
    pub fn close(self) {
        drop(self);
    }
}

/// Acquires the exclusive project lock.
///
/// The lock file holds the owning PID; a lock left behind by a dead process
/// is cleaned up and the acquisition retried.
fn acquire_lock(lock_path: &Path, retry_count: u32) -> Result<LockGuard> {
    if retry_count > 2 {
        return Err(InsightError::ProjectLocked);
    }

    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            writeln!(file, "{}", std::process::id())?;
            file.flush()?;
            file.try_lock_exclusive()
                .map_err(|_| InsightError::ProjectLocked)?;
            Ok(LockGuard {
                file: Some(file),
                path: lock_path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            handle_existing_lock(lock_path, retry_count)
        }
        Err(e) => Err(InsightError::Io(e)),
    }
}

fn handle_existing_lock(lock_path: &Path, retry_count: u32) -> Result<LockGuard> {
    match fs::read_to_string(lock_path) {
        Ok(content) => {
            if let Ok(pid) = content.trim().parse::<u32>() {
                if is_process_alive(pid) {
                    return Err(InsightError::ProjectLocked);
                }
                warn!(pid, "removing lock left by dead process");
                if let Err(e) = fs::remove_file(lock_path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(InsightError::Io(e));
                    }
                }
                return acquire_lock(lock_path, retry_count + 1);
            }
            // Unparsable content: corruption or an interrupted write.
            warn!("lock file has invalid content; attempting cleanup");
            let _ = fs::remove_file(lock_path);
            acquire_lock(lock_path, retry_count + 1)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Removed between the create attempt and the read; retry.
            acquire_lock(lock_path, retry_count + 1)
        }
        Err(_) => Err(InsightError::ProjectLocked),
    }
}

/// RAII guard for the project lock; dropping releases and removes it.
struct LockGuard {
    /// Wrapped in Option so Drop can take ownership.
    file: Option<File>,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
        }
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    // No cheap liveness check; assume the holder is alive.
    true
}
