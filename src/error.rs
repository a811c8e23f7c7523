//! Error types for the switchable exporter.

use crate::mode::ExportMode;
use opentelemetry_sdk::error::OTelSdkError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while constructing the exporter's backends.
///
/// Any backend failing to build is fatal to the whole construction;
/// backends built before the failure are shut down before this error is
/// returned.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BuildError {
    /// The OTLP gRPC exporter could not be built.
    #[error("failed to build OTLP gRPC trace sink")]
    Otlp(#[source] opentelemetry_otlp::ExporterBuildError),

    /// The trace file could not be opened.
    #[error("failed to open trace file {}", .path.display())]
    File {
        /// Path the sink was configured to write to.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A single backend's failure to shut down, tagged with its mode.
#[derive(Debug, Error)]
#[error("{mode} trace sink failed to shut down")]
pub struct SinkFailure {
    /// The slot whose backend failed.
    pub mode: ExportMode,
    /// The backend's own error.
    #[source]
    pub source: OTelSdkError,
}

/// One or more backends failed to shut down.
///
/// Every backend is attempted regardless of earlier failures, so this
/// error carries all of them; callers can tell an OTLP failure from a
/// file failure by the mode on each [`SinkFailure`].
#[derive(Debug)]
pub struct ShutdownError {
    failures: Vec<SinkFailure>,
}

impl ShutdownError {
    pub(crate) fn new(failures: Vec<SinkFailure>) -> Self {
        debug_assert!(!failures.is_empty());
        Self { failures }
    }

    /// The individual per-backend failures, in slot order.
    pub fn failures(&self) -> &[SinkFailure] {
        &self.failures
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failures.as_slice() {
            [single] => write!(f, "{single}: {}", single.source),
            many => {
                write!(f, "{} trace sinks failed to shut down:", many.len())?;
                for failure in many {
                    write!(f, " [{}: {}]", failure.mode, failure.source)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ShutdownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|failure| failure as &(dyn std::error::Error + 'static))
    }
}

impl From<ShutdownError> for OTelSdkError {
    fn from(err: ShutdownError) -> Self {
        OTelSdkError::InternalFailure(err.to_string())
    }
}
