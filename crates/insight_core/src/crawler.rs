//! Live discovery of files structurally related to a source file.
//!
//! Two strategies run over every element of the source file's tree:
//! forward reference resolution (which file declares the thing this element
//! names) and reverse usage search (which files use the thing this element
//! declares). The union, minus the source file itself and anything outside
//! the project, is the related set.

use crate::error::{InsightError, Result};
use crate::model::HostModel;
use crate::task::{spawn_task, CancelToken, TaskHandle, WorkerPool};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Computes the set of project files related to a given source file.
///
/// Every query runs against the host model live; nothing is cached here, so
/// results track the current structure even when it differs from what the
/// index recorded.
pub struct FileRelevanceCrawler {
    model: Arc<dyn HostModel>,
}

impl FileRelevanceCrawler {
    pub fn new(model: Arc<dyn HostModel>) -> Self {
        Self { model }
    }

    /// Traverses `source`'s element tree and collects related files.
    ///
    /// Checks the token between elements; a fired token surfaces as
    /// `Err(Cancelled)`. Lookup failures on individual elements are logged
    /// and skipped, so one odd element cannot sink the whole crawl.
    pub fn related_files(&self, source: &str, token: &CancelToken) -> Result<BTreeSet<String>> {
        token.checkpoint()?;
        let tree = self.model.element_tree(source)?;
        let mut related = BTreeSet::new();

        for element in &tree {
            token.checkpoint()?;
            if !self.model.is_valid(element) {
                debug!(key = %element.key, "element went stale during crawl");
                continue;
            }

            match self.model.resolve_reference(element) {
                Ok(Some(location)) => self.consider(source, &location.file, &mut related),
                Ok(None) => {}
                Err(e) => {
                    debug!(key = %element.key, error = %e, "reference resolution failed");
                }
            }

            match self.model.find_usages(element) {
                Ok(usages) => {
                    for usage in usages {
                        self.consider(source, &usage.file, &mut related);
                    }
                }
                Err(e) => {
                    debug!(key = %element.key, error = %e, "usage search failed");
                }
            }
        }

        debug!(
            source,
            elements = tree.len(),
            related = related.len(),
            "crawl finished"
        );
        Ok(related)
    }

    /// Runs the traversal on the worker pool.
    ///
    /// The returned task enforces the caller's deadline independently of the
    /// traversal's own cancellation token.
    pub fn spawn_related_files(
        &self,
        source: &str,
        pool: &WorkerPool,
        token: CancelToken,
    ) -> Result<RelatedFilesTask> {
        let model = Arc::clone(&self.model);
        let source_owned = source.to_string();
        let handle = spawn_task(pool, token, move |task_token| {
            FileRelevanceCrawler::new(model).related_files(&source_owned, &task_token)
        })?;
        Ok(RelatedFilesTask {
            handle,
            source: source.to_string(),
        })
    }

    /// Records `candidate` as related unless it is the source itself or
    /// falls outside the project.
    fn consider(&self, source: &str, candidate: &str, related: &mut BTreeSet<String>) {
        if candidate == source {
            return;
        }
        if !self.model.contains(candidate) {
            return;
        }
        related.insert(candidate.to_string());
    }
}

/// In-flight relevance crawl with a caller-enforced deadline.
pub struct RelatedFilesTask {
    handle: TaskHandle<Result<BTreeSet<String>>>,
    source: String,
}

impl RelatedFilesTask {
    /// The crawl's cancellation token.
    pub fn token(&self) -> &CancelToken {
        self.handle.token()
    }

    /// Fires the crawl's cancellation token.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Waits up to `timeout` for the related set.
    ///
    /// Three distinguishable outcomes: `Ok(set)` (possibly empty),
    /// `Err(CrawlTimeout)` when the deadline passes (the underlying
    /// traversal is cancelled before returning), and `Err(Cancelled)` when
    /// the token fired first.
    pub fn wait(self, timeout: Duration) -> Result<BTreeSet<String>> {
        match self.handle.wait_for(timeout)? {
            Some(result) => result,
            None => {
                self.handle.cancel();
                debug!(source = %self.source, timeout_ms = timeout.as_millis() as u64, "crawl timed out");
                Err(InsightError::CrawlTimeout {
                    path: self.source,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}
