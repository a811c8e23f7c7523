//! The runtime-switchable span exporter.
//!
//! [`SwitchableSpanExporter`] implements the SDK's `SpanExporter` contract
//! itself, so it drops into a `BatchSpanProcessor` like any single
//! backend, but internally forwards every batch to whichever of its owned
//! backends is currently selected. Selection lives in one shared atomic
//! word: switching costs the writer a single store and the hot export path
//! a single load, with no locks anywhere.

use crate::config::Config;
use crate::error::{BuildError, ShutdownError, SinkFailure};
use crate::mode::{ExportMode, UnknownModeError};
use crate::sink::{FileSink, OtlpSink, StdoutSink, TraceSink};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type Slots = [Option<Box<dyn TraceSink>>; ExportMode::COUNT];

/// Cloneable control handle for changing the active export mode.
///
/// The handle shares one atomic word with the exporter it came from, so a
/// controller (operator action, config reload, health-based fallback
/// logic) can keep switching modes after the exporter itself has been
/// moved into the tracing pipeline. Setting a mode never blocks.
#[derive(Clone, Debug)]
pub struct ModeSwitch {
    mode: Arc<AtomicUsize>,
}

impl ModeSwitch {
    /// Makes `mode` the dispatch target for every subsequent export call.
    ///
    /// Exports already in flight complete against the mode they observed
    /// when they started; the next export call observes the new mode. The
    /// store is visible before this returns.
    pub fn set(&self, mode: ExportMode) {
        self.mode.store(mode.index(), Ordering::Release);
        tracing::debug!(mode = %mode, "export mode set");
    }

    /// Validates an untyped mode value and makes it active.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownModeError`] for values outside the enumeration
    /// boundary; the current mode is left unchanged.
    pub fn set_raw(&self, value: usize) -> Result<ExportMode, UnknownModeError> {
        let mode = ExportMode::try_from(value)?;
        self.set(mode);
        Ok(mode)
    }

    /// The mode export calls currently dispatch to.
    pub fn current(&self) -> ExportMode {
        mode_from_word(self.mode.load(Ordering::Acquire))
    }
}

// Only validated indices are ever stored in the shared word.
fn mode_from_word(index: usize) -> ExportMode {
    ExportMode::try_from(index).expect("mode word holds a validated index")
}

/// Registry of export backends, assembled into a [`SwitchableSpanExporter`].
///
/// Binding is a construction-time operation; the dispatch table is never
/// resized or rebound after [`build`](SwitchBuilder::build). The
/// [`ExportMode::Disabled`] slot stays unbound by convention, which is
/// what makes that mode a no-op.
#[must_use = "builders do nothing unless .build() is called"]
pub struct SwitchBuilder {
    slots: Slots,
    initial_mode: ExportMode,
}

impl SwitchBuilder {
    /// Creates an empty registry. Every slot starts unbound and the
    /// initial mode is [`ExportMode::Disabled`].
    pub fn new() -> Self {
        Self {
            slots: [const { None }; ExportMode::COUNT],
            initial_mode: ExportMode::Disabled,
        }
    }

    /// Binds `sink` to `mode`'s dispatch slot, replacing any previous
    /// binding.
    pub fn bind(mut self, mode: ExportMode, sink: Box<dyn TraceSink>) -> Self {
        debug_assert!(
            mode != ExportMode::Disabled,
            "the disabled slot stays unbound"
        );
        self.slots[mode.index()] = Some(sink);
        self
    }

    /// Sets the mode active when the exporter starts.
    pub fn initial_mode(mut self, mode: ExportMode) -> Self {
        self.initial_mode = mode;
        self
    }

    /// Assembles the exporter, transferring ownership of every bound sink.
    pub fn build(self) -> SwitchableSpanExporter {
        SwitchableSpanExporter {
            mode: Arc::new(AtomicUsize::new(self.initial_mode.index())),
            slots: self.slots,
        }
    }
}

impl Default for SwitchBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Span exporter that forwards every batch to whichever backend is
/// currently selected.
///
/// The exporter exclusively owns every backend it was built with and is
/// solely responsible for shutting them down. It never buffers, drops, or
/// mutates spans; an unbound mode (and any export after shutdown) is a
/// silent no-op, which is what distinguishes "telemetry intentionally
/// off" from "telemetry broken".
pub struct SwitchableSpanExporter {
    mode: Arc<AtomicUsize>,
    slots: Slots,
}

impl SwitchableSpanExporter {
    /// Starts assembling an exporter from individual sinks.
    pub fn builder() -> SwitchBuilder {
        SwitchBuilder::new()
    }

    /// Constructs the exporter and its backends from configuration.
    ///
    /// Each present backend block is built and bound to its slot; absent
    /// blocks leave their slot unbound, so exporting in that mode does
    /// nothing.
    ///
    /// # Errors
    ///
    /// Any backend failing to build is fatal: backends built before the
    /// failure are shut down and a [`BuildError`] identifying the failing
    /// kind is returned.
    pub fn from_config(config: &Config) -> Result<Self, BuildError> {
        let mut builder = SwitchBuilder::new().initial_mode(config.mode);

        if let Some(stdout) = &config.stdout {
            builder = builder.bind(ExportMode::Stdout, Box::new(StdoutSink::new(stdout)));
        }

        if let Some(otlp) = &config.otlp {
            match OtlpSink::build(otlp) {
                Ok(sink) => builder = builder.bind(ExportMode::OtlpGrpc, Box::new(sink)),
                Err(err) => {
                    teardown_partial(&mut builder.slots);
                    return Err(err);
                }
            }
        }

        if let Some(file) = &config.file {
            match FileSink::create(file) {
                Ok(sink) => builder = builder.bind(ExportMode::File, Box::new(sink)),
                Err(err) => {
                    teardown_partial(&mut builder.slots);
                    return Err(err);
                }
            }
        }

        Ok(builder.build())
    }

    /// Returns a control handle for switching modes at runtime.
    ///
    /// Grab this before moving the exporter into a span processor; clones
    /// are cheap and safe to hand to concurrent controllers.
    pub fn switch(&self) -> ModeSwitch {
        ModeSwitch {
            mode: Arc::clone(&self.mode),
        }
    }

    /// The mode export calls currently dispatch to.
    pub fn current_mode(&self) -> ExportMode {
        mode_from_word(self.mode.load(Ordering::Acquire))
    }

    /// Makes `mode` the dispatch target for subsequent exports.
    pub fn set_mode(&self, mode: ExportMode) {
        self.switch().set(mode);
    }

    /// Whether a backend is bound at `mode`'s slot.
    pub fn is_bound(&self, mode: ExportMode) -> bool {
        self.slots[mode.index()].is_some()
    }

    /// Shuts down every backend this exporter owns.
    ///
    /// All backends are attempted even when an earlier one fails, and the
    /// failures come back together in one [`ShutdownError`]. The dispatch
    /// table is cleared either way, so any later export call is a silent
    /// no-op. A second call finds an empty table and invokes nothing.
    ///
    /// # Errors
    ///
    /// Returns a [`ShutdownError`] carrying one [`SinkFailure`] per
    /// backend that failed to release its resources.
    pub fn shutdown_all(&mut self, timeout: Duration) -> Result<(), ShutdownError> {
        let mut failures = Vec::new();

        for (mode, slot) in ExportMode::ALL.iter().zip(self.slots.iter_mut()) {
            let Some(mut sink) = slot.take() else {
                continue;
            };
            if let Err(source) = sink.shutdown(timeout) {
                tracing::warn!(mode = %mode, error = %source, "trace sink failed to shut down");
                failures.push(SinkFailure {
                    mode: *mode,
                    source,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError::new(failures))
        }
    }
}

impl fmt::Debug for SwitchableSpanExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound: Vec<&str> = ExportMode::ALL
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(mode, slot)| slot.as_ref().map(|_| mode.as_str()))
            .collect();
        f.debug_struct("SwitchableSpanExporter")
            .field("mode", &self.current_mode())
            .field("bound", &bound)
            .finish()
    }
}

impl SpanExporter for SwitchableSpanExporter {
    fn export(&self, batch: Vec<SpanData>) -> impl Future<Output = OTelSdkResult> + Send {
        // One atomic snapshot; the call completes against the mode it
        // observed here even if a switch lands mid-flight.
        let index = self.mode.load(Ordering::Acquire);
        async move {
            match self.slots[index].as_ref() {
                None => Ok(()),
                Some(sink) => sink.export(batch).await,
            }
        }
    }

    fn shutdown_with_timeout(&mut self, timeout: Duration) -> OTelSdkResult {
        self.shutdown_all(timeout).map_err(Into::into)
    }

    fn set_resource(&mut self, resource: &Resource) {
        for sink in self.slots.iter_mut().flatten() {
            sink.set_resource(resource);
        }
    }
}

/// Shuts down sinks bound before a later sibling failed to build.
fn teardown_partial(slots: &mut Slots) {
    for (mode, slot) in ExportMode::ALL.iter().zip(slots.iter_mut()) {
        let Some(mut sink) = slot.take() else {
            continue;
        };
        if let Err(error) = sink.shutdown(TEARDOWN_TIMEOUT) {
            tracing::warn!(mode = %mode, error = %error, "failed to tear down partially constructed sink");
        }
    }
}
