use crate::config::EngineConfig;
use crate::error::{QueryError, Result};
use crate::request::{
    parse_payload, BatchItem, BatchPayload, IngestPayload, Operation, QueryRequest,
    MAX_BATCH_ITEMS,
};
use crate::services::{self, ReadContext};
use codefacts_analysis::ComplexityCache;
use codefacts_facts::{FactLoader, IngestWarning, LoadReport, RawModule};
use codefacts_protocol::{ErrorEnvelope, Response, ResponseStatus};
use codefacts_store::{IngestMeta, KnowledgeStore, ReadSession, ReplaceSummary};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Instant;

/// Result of one successful `ingest`.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    #[serde(flatten)]
    pub summary: ReplaceSummary,
    pub source: String,
    pub files_scanned: usize,
    pub load_ms: u64,
    pub warnings: Vec<IngestWarning>,
}

#[derive(Debug, Serialize)]
struct BatchItemResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    operation: &'static str,
    status: ResponseStatus,
    #[serde(skip_serializing_if = "Value::is_null")]
    data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEnvelope>,
}

#[derive(Debug, Serialize)]
struct BatchOutput {
    items: Vec<BatchItemResult>,
    /// An item failed under `stop_on_error`; later items were not run.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stopped: bool,
}

/// The single entry point transports talk to.
///
/// Safe to share across threads: every read operation opens its own
/// [`ReadSession`](codefacts_store::ReadSession) and ingestion serializes on the
/// store's writer lock.
pub struct Engine {
    config: EngineConfig,
    store: KnowledgeStore,
    cache: ComplexityCache,
}

impl Engine {
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = KnowledgeStore::open(&config.db_path)?;
        log::info!("Engine ready on {}", config.db_path.display());
        Ok(Self {
            config,
            store,
            cache: ComplexityCache::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load the dump at `path` (or the configured one) and replace the snapshot.
    ///
    /// On any failure the previous snapshot stays in place.
    pub fn ingest(&self, path: Option<&Path>) -> Result<IngestReport> {
        let path = path
            .or(self.config.facts_path.as_deref())
            .ok_or_else(|| QueryError::invalid("ingest needs a fact dump path"))?;
        let report = FactLoader::new(path).load()?;
        self.commit(report, path.display().to_string())
    }

    /// Replace the snapshot with modules built in memory.
    pub fn ingest_modules(&self, modules: Vec<RawModule>) -> Result<IngestReport> {
        let report = FactLoader::from_modules(modules)?;
        self.commit(report, "<memory>".to_string())
    }

    fn commit(&self, report: LoadReport, source: String) -> Result<IngestReport> {
        for warning in &report.warnings {
            log::warn!(
                "Ingestion warning ({}): {}",
                warning.file.as_deref().unwrap_or("-"),
                warning.message
            );
        }
        let meta = IngestMeta {
            source: Some(source.clone()),
            warning_count: report.warnings.len(),
        };
        let summary = self.store.replace_snapshot(&report.snapshot, &meta)?;
        Ok(IngestReport {
            summary,
            source,
            files_scanned: report.files_scanned,
            load_ms: report.time_ms,
            warnings: report.warnings,
        })
    }

    /// Parse and run a raw JSON request. Always returns a well-formed response.
    pub fn execute(&self, request: &Value) -> Response {
        match serde_json::from_value::<QueryRequest>(request.clone()) {
            Ok(request) => self.execute_request(request),
            Err(err) => {
                let err = QueryError::invalid(format!("malformed request: {err}"));
                log::warn!("{err}");
                error_response(&err)
            }
        }
    }

    pub fn execute_request(&self, request: QueryRequest) -> Response {
        let started = Instant::now();
        let operation = request.operation;
        log::debug!("Executing {}", operation.as_str());

        let mut response = match self.route(operation, request.payload) {
            Ok((data, generation)) => {
                let mut response = Response::ok(data);
                response.meta.snapshot_generation = generation;
                response
            }
            Err(err) => {
                log::warn!("{} failed: {err}", operation.as_str());
                error_response(&err)
            }
        };
        response.meta.operation = Some(operation.as_str().to_string());
        response.meta.duration_ms = Some(started.elapsed().as_millis() as u64);
        response
    }

    fn route(&self, operation: Operation, payload: Value) -> Result<(Value, Option<i64>)> {
        match operation {
            Operation::Capabilities => Ok((
                services::to_value(&services::capabilities(self.config.limits()))?,
                None,
            )),
            Operation::Ingest => {
                let payload: IngestPayload = parse_payload(operation, payload)?;
                let report = self.ingest(payload.path.as_deref())?;
                let generation = report.summary.generation;
                Ok((services::to_value(&report)?, Some(generation)))
            }
            Operation::Batch => {
                let payload: BatchPayload = parse_payload(operation, payload)?;
                self.batch(payload)
            }
            _ => {
                let session = self.store.read()?;
                let ctx = self.read_context(&session);
                let data = services::route(operation, payload, &ctx)?;
                Ok((data, Some(session.generation())))
            }
        }
    }

    fn read_context<'s>(&'s self, session: &'s ReadSession) -> ReadContext<'s> {
        ReadContext {
            session,
            limits: self.config.limits(),
            cache: &self.cache,
        }
    }

    /// Every item reads the same snapshot. A failing item does not abort the others
    /// unless `stop_on_error` is set.
    fn batch(&self, payload: BatchPayload) -> Result<(Value, Option<i64>)> {
        if payload.items.is_empty() {
            return Err(QueryError::invalid("batch needs at least one item"));
        }
        if payload.items.len() > MAX_BATCH_ITEMS {
            return Err(QueryError::invalid(format!(
                "batch has {} items, the maximum is {MAX_BATCH_ITEMS}",
                payload.items.len()
            )));
        }
        if let Some(item) = payload
            .items
            .iter()
            .find(|item| matches!(item.operation, Operation::Batch | Operation::Ingest))
        {
            return Err(QueryError::invalid(format!(
                "{} cannot run inside a batch",
                item.operation.as_str()
            )));
        }

        let session = self.store.read()?;
        let ctx = self.read_context(&session);
        let mut output = BatchOutput {
            items: Vec::with_capacity(payload.items.len()),
            stopped: false,
        };
        for BatchItem {
            id,
            operation,
            payload: item_payload,
        } in payload.items
        {
            if output.stopped {
                break;
            }
            let outcome = match operation {
                Operation::Capabilities => {
                    services::to_value(&services::capabilities(self.config.limits()))
                }
                _ => services::route(operation, item_payload, &ctx),
            };
            let result = match outcome {
                Ok(data) => BatchItemResult {
                    id,
                    operation: operation.as_str(),
                    status: ResponseStatus::Ok,
                    data,
                    error: None,
                },
                Err(err) => {
                    output.stopped = payload.stop_on_error;
                    BatchItemResult {
                        id,
                        operation: operation.as_str(),
                        status: ResponseStatus::Error,
                        data: Value::Null,
                        error: Some(envelope(&err)),
                    }
                }
            };
            output.items.push(result);
        }
        Ok((services::to_value(&output)?, Some(session.generation())))
    }
}

fn envelope(err: &QueryError) -> ErrorEnvelope {
    let envelope = ErrorEnvelope::new(err.kind(), err.to_string());
    match err.hint() {
        Some(hint) => envelope.with_hint(hint),
        None => envelope,
    }
}

fn error_response(err: &QueryError) -> Response {
    Response::error(envelope(err))
}
