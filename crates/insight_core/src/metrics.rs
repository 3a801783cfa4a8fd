//! Append-only metric log for observability.
//!
//! Metrics have no identity beyond insertion order. Every append is mirrored
//! to `tracing` so the log is visible even when nobody drains it.

use crate::TimeProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Closed set of metric identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// An analysis run started.
    AnalysisStarted,
    /// An analysis run completed (possibly with per-item failures).
    AnalysisCompleted,
    /// An analysis run was cancelled; not an error.
    AnalysisCancelled,
    /// A new inspection was created via tool-call.
    InspectionAdded,
    /// An existing inspection received the current bundle via tool-call.
    InspectionApplied,
    /// A fix round trip was attempted.
    FixRequested,
    /// Fix application exhausted its retry budget.
    FixFailed,
    /// The backend invoked a tool name we do not know.
    UnknownTool,
    /// The inspection ceiling cancelled an in-flight analysis.
    CeilingExceeded,
    /// A relevance crawl exceeded its deadline.
    CrawlTimeout,
    /// A surfaced failure (transport, store, orchestration item).
    Error,
}

/// One metric record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric identifier.
    pub id: MetricKind,
    /// Free-form key/value parameters.
    pub params: BTreeMap<String, String>,
    /// ISO-8601 timestamp of the append.
    pub timestamp: String,
}

/// Append-only, process-local metric log.
pub struct MetricsLog {
    entries: Mutex<Vec<Metric>>,
    time_provider: Option<Arc<dyn TimeProvider>>,
}

impl MetricsLog {
    /// Creates a log stamping entries with system time.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            time_provider: None,
        }
    }

    /// Creates a log using an injected clock (epoch seconds).
    pub fn with_time_provider(provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            time_provider: Some(provider),
        }
    }

    /// Appends a metric with the given parameters.
    pub fn record<I, K, V>(&self, id: MetricKind, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params: BTreeMap<String, String> = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let metric = Metric {
            id,
            params,
            timestamp: self.timestamp(),
        };
        debug!(metric = ?metric.id, params = ?metric.params, "metric recorded");
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(metric);
    }

    /// Appends a metric of kind `Error` carrying the failure message.
    pub fn record_error(&self, message: impl Into<String>) {
        self.record(MetricKind::Error, [("message", message.into())]);
    }

    /// Returns a copy of every recorded metric, in insertion order.
    pub fn snapshot(&self) -> Vec<Metric> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of metrics recorded so far.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of metrics of the given kind.
    pub fn count_of(&self, id: MetricKind) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.id == id)
            .count()
    }

    fn timestamp(&self) -> String {
        let secs = match &self.time_provider {
            Some(provider) => provider.now(),
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
        };
        chrono::DateTime::from_timestamp(secs, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| secs.to_string())
    }
}

impl Default for MetricsLog {
    fn default() -> Self {
        Self::new()
    }
}
