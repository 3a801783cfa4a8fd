//! Background analysis pipeline over candidate files.
//!
//! For each candidate: crawl related files with a bounded wait, skip when
//! nothing is related, otherwise send the bundle to the gateway and let its
//! tool-call dispatch mutate the inspection store. One item's failure never
//! stops the run; cancellation stops before the next item, never mid-write.

use crate::crawler::FileRelevanceCrawler;
use crate::error::{InsightError, Result};
use crate::gateway::{AIBackendGateway, AnalysisBundle};
use crate::metrics::{MetricKind, MetricsLog};
use crate::model::HostModel;
use crate::relations::RelationGraphStore;
use crate::task::{spawn_task, CancelToken, TaskHandle, WorkerPool};
use crate::types::{Action, CodeFile};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Which files one analysis run covers.
#[derive(Debug, Clone)]
pub enum AnalysisScope {
    /// An explicit list, e.g. the files currently open in the editor.
    Files(Vec<String>),
    /// Every file with a recorded relation entry.
    AllRelated,
}

impl AnalysisScope {
    fn name(&self) -> &'static str {
        match self {
            AnalysisScope::Files(_) => "files",
            AnalysisScope::AllRelated => "all-related",
        }
    }
}

/// Per-item progress signal.
#[derive(Debug, Clone)]
pub struct AnalysisProgress {
    /// Zero-based index of the item just finished.
    pub index: usize,
    /// Total candidate count.
    pub total: usize,
    /// The item's file path.
    pub current_file: String,
    /// True when the item failed (isolated; the run continues).
    pub failed: bool,
}

/// Outcome of one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    /// Files analyzed through the gateway.
    pub files_processed: usize,
    /// Files skipped (no related files, or no longer resolving).
    pub files_skipped: usize,
    /// Files whose analysis failed (crawl timeout, transport error).
    pub files_failed: usize,
    /// Every action produced, in per-file call order.
    pub actions: Vec<Action>,
    /// New inspections created during the run.
    pub inspections_created: usize,
    /// True when the run stopped on a fired token instead of finishing.
    pub cancelled: bool,
}

enum ItemOutcome {
    Processed(Vec<Action>),
    Skipped,
    /// The gateway round trip failed; the error was already metered there.
    Failed(String),
}

/// Drives the crawl → gateway → store pipeline over a scope of files.
pub struct AnalysisOrchestrator {
    model: Arc<dyn HostModel>,
    crawler: Arc<FileRelevanceCrawler>,
    relations: Arc<RelationGraphStore>,
    gateway: Arc<AIBackendGateway>,
    metrics: Arc<MetricsLog>,
    pool: Arc<WorkerPool>,
    crawl_timeout: Duration,
    ceiling: usize,
}

impl AnalysisOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: Arc<dyn HostModel>,
        crawler: Arc<FileRelevanceCrawler>,
        relations: Arc<RelationGraphStore>,
        gateway: Arc<AIBackendGateway>,
        metrics: Arc<MetricsLog>,
        pool: Arc<WorkerPool>,
        crawl_timeout: Duration,
        ceiling: usize,
    ) -> Self {
        Self {
            model,
            crawler,
            relations,
            gateway,
            metrics,
            pool,
            crawl_timeout,
            ceiling,
        }
    }

    /// Runs the pipeline synchronously on the calling thread.
    ///
    /// The token is checked between items, so cancellation never aborts a
    /// partially-applied mutation. The inspection ceiling fires the same
    /// token: exceeding it cancels the whole run, by design.
    pub fn run<F>(&self, scope: &AnalysisScope, token: &CancelToken, progress: F) -> AnalysisReport
    where
        F: Fn(AnalysisProgress),
    {
        let candidates = self.candidates(scope);
        let total = candidates.len();
        self.metrics.record(
            MetricKind::AnalysisStarted,
            [("scope", scope.name().to_string()), ("files", total.to_string())],
        );

        let mut report = AnalysisReport::default();
        for (index, file) in candidates.iter().enumerate() {
            if token.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let mut failed = false;
            match self.analyze_one(file, token) {
                Ok(ItemOutcome::Processed(actions)) => {
                    report.files_processed += 1;
                    report.inspections_created += actions
                        .iter()
                        .filter(|a| matches!(a, Action::AddInspection(_)))
                        .count();
                    report.actions.extend(actions);
                }
                Ok(ItemOutcome::Skipped) => report.files_skipped += 1,
                Ok(ItemOutcome::Failed(message)) => {
                    failed = true;
                    report.files_failed += 1;
                    warn!(file, error = %message, "analysis item failed");
                }
                Err(e) if e.is_cancellation() => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    failed = true;
                    report.files_failed += 1;
                    warn!(file, error = %e, "analysis item failed");
                    // Timeouts carry their own metric kind; everything else
                    // is a plain error.
                    if !matches!(e, InsightError::CrawlTimeout { .. }) {
                        self.metrics.record_error(e.to_string());
                    }
                }
            }

            progress(AnalysisProgress {
                index,
                total,
                current_file: file.clone(),
                failed,
            });

            // The ceiling breaker fires the run token during dispatch.
            if token.is_cancelled() {
                report.cancelled = true;
                break;
            }
        }

        if report.cancelled {
            debug!("analysis run cancelled");
            self.metrics
                .record(MetricKind::AnalysisCancelled, [] as [(&str, &str); 0]);
        } else {
            self.metrics.record(
                MetricKind::AnalysisCompleted,
                [
                    ("processed", report.files_processed.to_string()),
                    ("skipped", report.files_skipped.to_string()),
                    ("failed", report.files_failed.to_string()),
                ],
            );
        }
        report
    }

    /// Runs the same loop on the worker pool.
    pub fn spawn<F>(
        self: &Arc<Self>,
        scope: AnalysisScope,
        token: CancelToken,
        progress: F,
    ) -> Result<TaskHandle<AnalysisReport>>
    where
        F: Fn(AnalysisProgress) + Send + Sync + 'static,
    {
        let orchestrator = Arc::clone(self);
        spawn_task(&self.pool, token, move |task_token| {
            orchestrator.run(&scope, &task_token, &progress)
        })
    }

    fn candidates(&self, scope: &AnalysisScope) -> Vec<String> {
        match scope {
            AnalysisScope::Files(files) => files.clone(),
            AnalysisScope::AllRelated => self.relations.sources(),
        }
    }

    /// One item of the pipeline: crawl, bundle, round trip.
    fn analyze_one(&self, file: &str, token: &CancelToken) -> Result<ItemOutcome> {
        let crawl = self
            .crawler
            .spawn_related_files(file, &self.pool, token.clone())?;
        let related_paths = match crawl.wait(self.crawl_timeout) {
            Ok(paths) => paths,
            Err(e @ InsightError::CrawlTimeout { .. }) => {
                self.metrics
                    .record(MetricKind::CrawlTimeout, [("path", file.to_string())]);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        if related_paths.is_empty() {
            debug!(file, "no related files; skipped");
            return Ok(ItemOutcome::Skipped);
        }

        // Capture current contents; the crawl worked on live structure but
        // the bundle needs text.
        let Some(source) = self.model.read(file) else {
            debug!(file, "source no longer resolves; skipped");
            return Ok(ItemOutcome::Skipped);
        };
        let related: Vec<CodeFile> = related_paths
            .iter()
            .filter_map(|path| self.model.read(path))
            .collect();

        let bundle = AnalysisBundle::new(source, related);
        let result = self.gateway.analyze(&bundle, self.ceiling, token)?;
        if let Some(error) = result.error {
            return Ok(ItemOutcome::Failed(error));
        }

        for action in &result.actions {
            match action {
                Action::RequestContext { context_type } => {
                    // Informational only; the bundle is not widened.
                    debug!(file, context_type, "backend requested context");
                }
                Action::Error { message } => {
                    warn!(file, message, "tool-call interpretation error");
                }
                _ => {}
            }
        }
        Ok(ItemOutcome::Processed(result.actions))
    }
}
