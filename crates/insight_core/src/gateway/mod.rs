//! Backend round trips: request building, throttling, transport, and
//! tool-call dispatch.
//!
//! The gateway is the only component that talks to the AI backend. It turns
//! a `(source, related files)` bundle into an analysis round trip whose
//! tool-calls mutate the inspection store, and an `(inspection, files)`
//! bundle into a bounded-retry fix round trip.

pub mod protocol;

use crate::config::BackendConfig;
use crate::error::{InsightError, Result};
use crate::inspections::{FixRunner, InspectionStore};
use crate::metrics::{MetricKind, MetricsLog};
use crate::task::CancelToken;
use crate::types::{Action, AnalysisResult, CodeFile, Inspection};
use protocol::{
    AddInspectionArgs, ApplyInspectionArgs, ChatRequest, ChatResponse, RequestContextArgs,
    ToolCall,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Fix attempts before giving up and returning an empty result.
pub const FIX_ATTEMPTS: usize = 3;

/// Longest backend body echoed into error messages.
const MAX_ERROR_BODY: usize = 2048;

/// The files sent with one analysis round trip.
#[derive(Debug, Clone)]
pub struct AnalysisBundle {
    pub source: CodeFile,
    pub related: Vec<CodeFile>,
}

impl AnalysisBundle {
    pub fn new(source: CodeFile, related: Vec<CodeFile>) -> Self {
        Self { source, related }
    }

    /// Source first, then related files, as one list.
    pub fn files(&self) -> Vec<CodeFile> {
        let mut files = Vec::with_capacity(1 + self.related.len());
        files.push(self.source.clone());
        files.extend(self.related.iter().cloned());
        files
    }
}

/// Executes one chat round trip against the backend.
pub trait Transport: Send + Sync {
    fn send(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Production transport: blocking HTTP POST to `<base_url>/chat/completions`.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    /// Builds the client, reading the API key from the configured
    /// environment variable.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(InsightError::Transport {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }
        if body.trim().is_empty() {
            return Err(InsightError::EmptyResponse);
        }
        let parsed: ChatResponse = serde_json::from_str(&body)?;
        Ok(parsed)
    }
}

fn truncate_body(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut cut = MAX_ERROR_BODY;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &body[..cut])
}

/// Blocking requests-per-minute throttle, global per gateway.
///
/// One lock held across the sleep: only one request may proceed at a time,
/// so a second caller waits for both the sleep and the stamp.
pub struct RateLimiter {
    min_interval: Option<Duration>,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Option<Duration>) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Blocks until the minimum interval since the previous request has
    /// elapsed, then stamps. A limiter built with `None` never blocks.
    pub fn acquire(&self) {
        let Some(min_interval) = self.min_interval else {
            return;
        };
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < min_interval {
                thread::sleep(min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

enum Dispatch {
    Produced(Action),
    Skipped,
    Aborted,
}

/// Gateway to the AI backend.
pub struct AIBackendGateway {
    transport: Arc<dyn Transport>,
    store: Arc<InspectionStore>,
    metrics: Arc<MetricsLog>,
    limiter: RateLimiter,
    model_name: String,
}

impl AIBackendGateway {
    pub fn new(
        config: &BackendConfig,
        transport: Arc<dyn Transport>,
        store: Arc<InspectionStore>,
        metrics: Arc<MetricsLog>,
    ) -> Self {
        Self {
            transport,
            store,
            metrics,
            limiter: RateLimiter::new(config.min_request_interval()),
            model_name: config.model.clone(),
        }
    }

    /// Gateway over the production HTTP transport.
    pub fn with_http(
        config: &BackendConfig,
        store: Arc<InspectionStore>,
        metrics: Arc<MetricsLog>,
    ) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        Ok(Self::new(config, transport, store, metrics))
    }

    /// One analysis round trip: rate-limit, send, interpret.
    ///
    /// Transport and backend failures come back as
    /// `AnalysisResult { error: Some(..) }` after an `Error` metric;
    /// cancellation comes back as `Err(Cancelled)`. A response with no
    /// choices and no error is "no suggestions": empty result.
    pub fn analyze(
        &self,
        bundle: &AnalysisBundle,
        ceiling: usize,
        token: &CancelToken,
    ) -> Result<AnalysisResult> {
        let request = protocol::analysis_request(
            &self.model_name,
            &bundle.source,
            &bundle.related,
            &self.store.inspections(),
        );
        match self.round_trip(&request, token) {
            Ok(response) => Ok(self.interpret(&response, bundle, ceiling, token)),
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) => {
                warn!(source = %bundle.source.path, error = %e, "analysis round trip failed");
                self.metrics.record_error(e.to_string());
                Ok(AnalysisResult::failed(e.to_string()))
            }
        }
    }

    /// Asks the backend for corrected file contents, retrying transport and
    /// decode failures up to `FIX_ATTEMPTS` times.
    ///
    /// Exhaustion yields `Ok(vec![])` — failures never escape this path. A
    /// successfully parsed but empty answer is accepted as-is, not retried.
    /// Only cancellation returns an error.
    pub fn perform_fix(
        &self,
        inspection: &Inspection,
        files: &[CodeFile],
        token: &CancelToken,
    ) -> Result<Vec<CodeFile>> {
        self.metrics.record(
            MetricKind::FixRequested,
            [("inspection", inspection.id.clone())],
        );
        let request = protocol::fix_request(&self.model_name, inspection, files);

        for attempt in 1..=FIX_ATTEMPTS {
            token.checkpoint()?;
            match self.round_trip(&request, token) {
                Ok(response) => {
                    let content = response
                        .choices
                        .first()
                        .and_then(|choice| choice.message.content.clone())
                        .unwrap_or_default();
                    match protocol::parse_corrected_files(&content) {
                        Ok(corrected) => {
                            debug!(
                                inspection = %inspection.id,
                                attempt,
                                files = corrected.len(),
                                "fix response accepted"
                            );
                            return Ok(corrected);
                        }
                        Err(e) => {
                            warn!(inspection = %inspection.id, attempt, error = %e, "fix response undecodable");
                        }
                    }
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    warn!(inspection = %inspection.id, attempt, error = %e, "fix attempt failed");
                }
            }
        }

        self.metrics.record(
            MetricKind::FixFailed,
            [("inspection", inspection.id.clone())],
        );
        Ok(Vec::new())
    }

    /// Rate-limited send with cancellation checkpoints on both sides of the
    /// potentially long blocking section.
    fn round_trip(&self, request: &ChatRequest, token: &CancelToken) -> Result<ChatResponse> {
        token.checkpoint()?;
        self.limiter.acquire();
        token.checkpoint()?;
        let response = self.transport.send(request)?;
        if let Some(error) = &response.error {
            return Err(InsightError::Backend {
                message: error.message.clone(),
                kind: error.kind.clone(),
            });
        }
        Ok(response)
    }

    /// Interprets a successful response into content plus actions.
    fn interpret(
        &self,
        response: &ChatResponse,
        bundle: &AnalysisBundle,
        ceiling: usize,
        token: &CancelToken,
    ) -> AnalysisResult {
        let mut result = AnalysisResult::default();
        let Some(choice) = response.choices.first() else {
            debug!(source = %bundle.source.path, "no suggestions");
            return result;
        };
        result.content = choice.message.content.clone();
        let Some(calls) = &choice.message.tool_calls else {
            return result;
        };
        for call in calls {
            match self.dispatch(call, bundle, ceiling, token) {
                Dispatch::Produced(action) => result.actions.push(action),
                Dispatch::Skipped => {}
                Dispatch::Aborted => break,
            }
        }
        result
    }

    /// Interprets one tool-call.
    fn dispatch(
        &self,
        call: &ToolCall,
        bundle: &AnalysisBundle,
        ceiling: usize,
        token: &CancelToken,
    ) -> Dispatch {
        match call.function.name.as_str() {
            protocol::TOOL_ADD_INSPECTION => {
                if self.store.count() >= ceiling {
                    // Circuit breaker: runaway inspection creation cancels
                    // the whole in-flight analysis, not just this call.
                    warn!(ceiling, "inspection ceiling reached; cancelling analysis");
                    self.metrics.record(
                        MetricKind::CeilingExceeded,
                        [("ceiling", ceiling.to_string())],
                    );
                    token.cancel();
                    return Dispatch::Aborted;
                }
                let args: AddInspectionArgs = match serde_json::from_str(&call.function.arguments)
                {
                    Ok(args) => args,
                    Err(e) => {
                        return Dispatch::Produced(Action::Error {
                            message: format!("malformed add_inspection arguments: {e}"),
                        })
                    }
                };
                let inspection = Inspection::new(args.description, args.fix_prompt);
                match self.store.put_inspection(inspection.clone(), bundle.files()) {
                    Ok(()) => {
                        self.metrics.record(
                            MetricKind::InspectionAdded,
                            [("inspection", inspection.id.clone())],
                        );
                        Dispatch::Produced(Action::AddInspection(inspection))
                    }
                    Err(e) => Dispatch::Produced(Action::Error {
                        message: format!("could not register inspection: {e}"),
                    }),
                }
            }
            protocol::TOOL_APPLY_INSPECTION => {
                let args: ApplyInspectionArgs = match serde_json::from_str(&call.function.arguments)
                {
                    Ok(args) => args,
                    Err(e) => {
                        return Dispatch::Produced(Action::Error {
                            message: format!("malformed apply_inspection arguments: {e}"),
                        })
                    }
                };
                let Some(inspection) = self.store.inspection(&args.inspection_id) else {
                    return Dispatch::Produced(Action::Error {
                        message: format!("Inspection not found: {}", args.inspection_id),
                    });
                };
                match self
                    .store
                    .add_files_to_inspection(&inspection.id, bundle.files())
                {
                    Ok(launched) => {
                        debug!(inspection = %inspection.id, launched, "inspection applied");
                        self.metrics.record(
                            MetricKind::InspectionApplied,
                            [("inspection", inspection.id.clone())],
                        );
                        Dispatch::Produced(Action::ApplyInspection(inspection))
                    }
                    Err(e) => Dispatch::Produced(Action::Error {
                        message: format!("could not apply inspection: {e}"),
                    }),
                }
            }
            protocol::TOOL_REQUEST_CONTEXT => {
                match serde_json::from_str::<RequestContextArgs>(&call.function.arguments) {
                    Ok(args) => Dispatch::Produced(Action::RequestContext {
                        context_type: args.context_type,
                    }),
                    Err(e) => Dispatch::Produced(Action::Error {
                        message: format!("malformed request_context arguments: {e}"),
                    }),
                }
            }
            other => {
                // Unknown tools are an observability event, not a user error.
                debug!(tool = other, "unknown tool call ignored");
                self.metrics
                    .record(MetricKind::UnknownTool, [("name", other.to_string())]);
                Dispatch::Skipped
            }
        }
    }
}

impl FixRunner for AIBackendGateway {
    fn perform_fix(
        &self,
        inspection: &Inspection,
        files: &[CodeFile],
        token: &CancelToken,
    ) -> Result<Vec<CodeFile>> {
        AIBackendGateway::perform_fix(self, inspection, files, token)
    }
}
