//! Runtime-switchable span export for OpenTelemetry.
//!
//! This crate sits between the tracing pipeline and its export backends.
//! [`SwitchableSpanExporter`] implements the SDK's `SpanExporter` contract
//! itself, so it drops into a `BatchSpanProcessor` like any single
//! backend, but internally forwards every batch to whichever of its owned
//! backends is currently selected: a stdout debug sink, an OTLP gRPC
//! collector, a JSON-lines file, or nothing at all. The active mode can be
//! changed at any time through a [`ModeSwitch`] handle without restarting
//! the process or losing in-flight spans.
//!
//! # Features
//!
//! - **Atomic mode dispatch** - selecting a backend is a single atomic
//!   load on the hot export path; switching is a single atomic store
//! - **Layered configuration** - defaults, config file, standard `OTEL_*`
//!   environment variables, and programmatic overrides via
//!   [figment](https://docs.rs/figment)
//! - **Aggregated shutdown** - every owned backend is shut down even when
//!   earlier ones fail; all failures come back in one [`ShutdownError`]
//! - **Safe no-ops** - an unbound mode and a post-shutdown export both
//!   succeed silently, distinguishing "telemetry intentionally off" from
//!   "telemetry broken"
//!
//! # Example
//!
//! ```no_run
//! use opentelemetry_switch::{Config, ExportMode, SwitchableSpanExporter};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::builder()
//!         .stdout()
//!         .otlp_endpoint("http://collector:4317")
//!         .build();
//!
//!     let exporter = SwitchableSpanExporter::from_config(&config)?;
//!     let switch = exporter.switch();
//!
//!     // Hand `exporter` to a BatchSpanProcessor; keep `switch` around
//!     // to redirect export traffic at runtime.
//!     switch.set(ExportMode::Stdout);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod exporter;
pub mod mode;
pub mod net;
pub mod request;
pub mod sink;

pub use config::{Config, ConfigBuilder, FileSinkConfig, OtlpSinkConfig, StdoutSinkConfig};
pub use error::{BuildError, ShutdownError, SinkFailure};
pub use exporter::{ModeSwitch, SwitchBuilder, SwitchableSpanExporter};
pub use mode::{ExportMode, UnknownModeError};
pub use net::{append_net_peer_attrs, split_host_port};
pub use request::HttpSpanBuilder;
pub use sink::{FileSink, OtlpSink, StdoutSink, TraceSink};
