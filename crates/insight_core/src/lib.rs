//! Insight Core Library
//!
//! An AI-assisted inspection engine for code projects:
//! - Cross-file relevance discovery over a host-owned program structure
//! - A persistent relation graph and inspection store
//! - A chat-completions gateway with tool-call dispatch
//! - Background analysis orchestration with cooperative cancellation
//!
//! # Quick Start
//!
//! ```
//! use insight_core::{EventBus, LexicalModel, RelationGraphStore};
//! use insight_core::types::CodeFile;
//! use std::sync::Arc;
//!
//! let model = Arc::new(LexicalModel::from_files(vec![
//!     CodeFile::new("src/lib.rs", "pub fn greet() {}\n"),
//!     CodeFile::new("src/main.rs", "fn main() { greet(); }\n"),
//! ]));
//!
//! let relations = RelationGraphStore::new(model, EventBus::new());
//! relations.add_relation("src/main.rs", "src/lib.rs").unwrap();
//!
//! assert_eq!(
//!     relations.related_files("src/main.rs"),
//!     vec!["src/lib.rs".to_string()]
//! );
//! ```
//!
//! # Relevance discovery
//!
//! The crawler walks a file's element tree and unions forward reference
//! resolution with reverse usage search:
//!
//! ```
//! use insight_core::{CancelToken, FileRelevanceCrawler, LexicalModel};
//! use insight_core::types::CodeFile;
//! use std::sync::Arc;
//!
//! let model = Arc::new(LexicalModel::from_files(vec![
//!     CodeFile::new("src/lib.rs", "pub fn greet() {}\n"),
//!     CodeFile::new("src/main.rs", "fn main() { greet(); }\n"),
//! ]));
//!
//! let crawler = FileRelevanceCrawler::new(model);
//! let related = crawler
//!     .related_files("src/main.rs", &CancelToken::new())
//!     .unwrap();
//! assert!(related.contains("src/lib.rs"));
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod events;
pub mod gateway;
pub mod indexer;
pub mod inspections;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod persist;
pub mod project;
pub mod relations;
pub mod task;
pub mod types;

pub use config::{AnalysisConfig, BackendConfig, CrawlerConfig, InsightConfig, InspectionConfig};
pub use crawler::{FileRelevanceCrawler, RelatedFilesTask};
pub use error::{InsightError, Result};
pub use events::{EventBus, EventSink, StoreEvent};
pub use gateway::{
    AIBackendGateway, AnalysisBundle, HttpTransport, RateLimiter, Transport, FIX_ATTEMPTS,
};
pub use indexer::{
    IndexHandler, IndexProgress, IndexSnapshot, ProjectIndexer, RelationIndexHandler,
};
pub use inspections::{FixRunner, InspectionStore, MIN_NEW_FILES};
pub use metrics::{Metric, MetricKind, MetricsLog};
pub use model::{
    Element, ElementKind, HostModel, LexicalModel, Location, ProjectHost, StructureModel,
};
pub use orchestrator::{AnalysisOrchestrator, AnalysisProgress, AnalysisReport, AnalysisScope};
pub use project::InsightProject;
pub use relations::RelationGraphStore;
pub use task::{spawn_task, CancelToken, TaskHandle, WorkerPool};
pub use types::{Action, AnalysisResult, CodeFile, Inspection, InspectionState};

/// Injectable clock (epoch seconds) for time-dependent behavior in tests.
pub trait TimeProvider: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now(&self) -> i64;
}

impl<F> TimeProvider for F
where
    F: Fn() -> i64 + Send + Sync,
{
    fn now(&self) -> i64 {
        self()
    }
}
