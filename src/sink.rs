//! Concrete trace sinks and the capability trait they share.
//!
//! A [`TraceSink`] is everything the switchable exporter requires of a
//! backend: deliver a batch somewhere, fallibly, and release resources on
//! shutdown. The three concrete sinks wrap the ecosystem exporters
//! ([`opentelemetry_stdout`], [`opentelemetry_otlp`]) or write JSON lines
//! to a local file.

use crate::config::{FileSinkConfig, OtlpSinkConfig, StdoutSinkConfig};
use crate::error::BuildError;
use futures::future::BoxFuture;
use opentelemetry_otlp::{WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::trace::{SpanData, SpanExporter as _};
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tonic::metadata::{MetadataKey, MetadataValue};

/// A single export backend: deliver a batch of finished spans somewhere,
/// fallibly, and release all resources on shutdown.
///
/// Implementations must preserve batch order; some backends are
/// order-sensitive for on-disk or on-wire layout. Cancellation follows the
/// usual async contract: dropping the export future aborts the in-progress
/// delivery.
pub trait TraceSink: Send + Sync + fmt::Debug {
    /// Delivers one batch of finished spans.
    fn export(&self, batch: Vec<SpanData>) -> BoxFuture<'_, OTelSdkResult>;

    /// Releases all resources. Called at most once by the owning exporter.
    fn shutdown(&mut self, timeout: Duration) -> OTelSdkResult;

    /// Receives the pipeline's resource. Sinks that stamp a resource onto
    /// their output override this.
    fn set_resource(&mut self, resource: &Resource) {
        let _ = resource;
    }
}

/// Debug sink writing spans to standard output.
pub struct StdoutSink {
    inner: opentelemetry_stdout::SpanExporter,
}

impl StdoutSink {
    /// Creates the sink. Construction never fails.
    pub fn new(_config: &StdoutSinkConfig) -> Self {
        Self {
            inner: opentelemetry_stdout::SpanExporter::default(),
        }
    }
}

impl fmt::Debug for StdoutSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdoutSink").finish_non_exhaustive()
    }
}

impl TraceSink for StdoutSink {
    fn export(&self, batch: Vec<SpanData>) -> BoxFuture<'_, OTelSdkResult> {
        Box::pin(self.inner.export(batch))
    }

    fn shutdown(&mut self, timeout: Duration) -> OTelSdkResult {
        self.inner.shutdown_with_timeout(timeout)
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

/// Network sink sending spans to an OTLP collector over gRPC.
pub struct OtlpSink {
    inner: opentelemetry_otlp::SpanExporter,
}

impl OtlpSink {
    /// Builds the tonic-based OTLP exporter from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Otlp`] if the underlying transport cannot be
    /// constructed.
    pub fn build(config: &OtlpSinkConfig) -> Result<Self, BuildError> {
        let mut builder = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.endpoint)
            .with_timeout(config.timeout);

        if !config.headers.is_empty() {
            let mut metadata = tonic::metadata::MetadataMap::new();
            for (key, value) in &config.headers {
                if let (Ok(k), Ok(v)) = (
                    key.parse::<MetadataKey<_>>(),
                    value.parse::<MetadataValue<_>>(),
                ) {
                    metadata.insert(k, v);
                }
            }
            builder = builder.with_metadata(metadata);
        }

        let inner = builder.build().map_err(BuildError::Otlp)?;
        Ok(Self { inner })
    }
}

// Manual Debug because `opentelemetry_otlp::SpanExporter` doesn't implement it.
impl fmt::Debug for OtlpSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtlpSink").finish_non_exhaustive()
    }
}

impl TraceSink for OtlpSink {
    fn export(&self, batch: Vec<SpanData>) -> BoxFuture<'_, OTelSdkResult> {
        Box::pin(self.inner.export(batch))
    }

    fn shutdown(&mut self, timeout: Duration) -> OTelSdkResult {
        self.inner.shutdown_with_timeout(timeout)
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

/// File sink appending one JSON document per batch, newline-delimited.
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Opens (or creates) the trace file in append mode.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::File`] if the file cannot be opened.
    pub fn create(config: &FileSinkConfig) -> Result<Self, BuildError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .map_err(|source| BuildError::File {
                path: config.path.clone(),
                source,
            })?;

        Ok(Self {
            path: config.path.clone(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write_batch(&self, batch: &[SpanData]) -> OTelSdkResult {
        let record = BatchRecord {
            spans: batch.iter().map(SpanRecord::from_span).collect(),
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| OTelSdkError::InternalFailure(format!("failed to encode spans: {e}")))?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| OTelSdkError::InternalFailure("trace file writer poisoned".into()))?;
        writeln!(writer, "{line}")
            .map_err(|e| OTelSdkError::InternalFailure(format!("failed to write spans: {e}")))
    }
}

impl fmt::Debug for FileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSink").field("path", &self.path).finish()
    }
}

impl TraceSink for FileSink {
    fn export(&self, batch: Vec<SpanData>) -> BoxFuture<'_, OTelSdkResult> {
        let result = self.write_batch(&batch);
        Box::pin(std::future::ready(result))
    }

    fn shutdown(&mut self, _timeout: Duration) -> OTelSdkResult {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| OTelSdkError::InternalFailure("trace file writer poisoned".into()))?;
        writer
            .flush()
            .map_err(|e| OTelSdkError::InternalFailure(format!("failed to flush trace file: {e}")))
    }
}

#[derive(Serialize)]
struct BatchRecord {
    spans: Vec<SpanRecord>,
}

#[derive(Serialize)]
struct SpanRecord {
    trace_id: String,
    span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<String>,
    name: String,
    start_unix_nano: u64,
    end_unix_nano: u64,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    attributes: serde_json::Map<String, serde_json::Value>,
}

impl SpanRecord {
    fn from_span(span: &SpanData) -> Self {
        let parent_span_id = (span.parent_span_id != opentelemetry::trace::SpanId::INVALID)
            .then(|| span.parent_span_id.to_string());

        let attributes = span
            .attributes
            .iter()
            .map(|kv| {
                (
                    kv.key.as_str().to_string(),
                    serde_json::Value::String(kv.value.to_string()),
                )
            })
            .collect();

        Self {
            trace_id: span.span_context.trace_id().to_string(),
            span_id: span.span_context.span_id().to_string(),
            parent_span_id,
            name: span.name.to_string(),
            start_unix_nano: unix_nanos(span.start_time),
            end_unix_nano: unix_nanos(span.end_time),
            attributes,
        }
    }
}

fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
