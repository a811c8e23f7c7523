//! Shared test doubles for the switchable exporter integration tests.

use futures::future::BoxFuture;
use opentelemetry::trace::{SpanContext, SpanId, SpanKind, Status, TraceFlags, TraceId, TraceState};
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::trace::{SpanData, SpanEvents, SpanLinks};
use opentelemetry_switch::TraceSink;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

/// Call counters shared between a [`RecordingSink`] and the test body.
#[derive(Debug, Default)]
pub struct SinkCounters {
    pub exports: AtomicUsize,
    pub spans: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl SinkCounters {
    pub fn exports(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }

    pub fn spans(&self) -> usize {
        self.spans.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

/// Mock sink recording every call; optionally fails shutdown.
#[derive(Debug)]
pub struct RecordingSink {
    counters: Arc<SinkCounters>,
    fail_shutdown: bool,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<SinkCounters>) {
        Self::with_failing_shutdown(false)
    }

    pub fn with_failing_shutdown(fail_shutdown: bool) -> (Self, Arc<SinkCounters>) {
        let counters = Arc::new(SinkCounters::default());
        (
            Self {
                counters: Arc::clone(&counters),
                fail_shutdown,
            },
            counters,
        )
    }
}

impl TraceSink for RecordingSink {
    fn export(&self, batch: Vec<SpanData>) -> BoxFuture<'_, OTelSdkResult> {
        self.counters.exports.fetch_add(1, Ordering::SeqCst);
        self.counters.spans.fetch_add(batch.len(), Ordering::SeqCst);
        Box::pin(std::future::ready(Ok(())))
    }

    fn shutdown(&mut self, _timeout: Duration) -> OTelSdkResult {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown {
            Err(OTelSdkError::InternalFailure(
                "sink refused to shut down".into(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Builds a batch of finished, read-only span records.
pub fn sample_batch(len: usize) -> Vec<SpanData> {
    (0..len as u64).map(sample_span).collect()
}

fn sample_span(index: u64) -> SpanData {
    SpanData {
        span_context: SpanContext::new(
            TraceId::from_u128(0x1000 + u128::from(index)),
            SpanId::from_u64(index + 1),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        ),
        parent_span_id: SpanId::INVALID,
        span_kind: SpanKind::Internal,
        name: "request".into(),
        start_time: SystemTime::now(),
        end_time: SystemTime::now(),
        attributes: vec![KeyValue::new("batch.index", index as i64)],
        dropped_attributes_count: 0,
        events: SpanEvents::default(),
        links: SpanLinks::default(),
        status: Status::Unset,
        instrumentation_scope: InstrumentationScope::builder("switch-tests").build(),
    }
}
