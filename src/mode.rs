//! Export mode selection.
//!
//! [`ExportMode`] is the single source of truth for how many backend slots
//! the switchable exporter carries: dispatch tables are sized to exactly
//! [`ExportMode::COUNT`], and every integral value outside
//! `[0, ExportMode::COUNT)` is rejected before it can reach the shared
//! mode word.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned when an integral value does not name a valid export mode.
///
/// The offending value is preserved for diagnostics. Rejection has no side
/// effects; the previously active mode stays in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown export mode: {0}")]
pub struct UnknownModeError(pub usize);

/// Selects which backend an export call is dispatched to.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
#[repr(usize)]
pub enum ExportMode {
    /// Telemetry intentionally off; exports are silent no-ops.
    #[default]
    Disabled = 0,
    /// Write spans to standard output (debug sink).
    Stdout = 1,
    /// Send spans to an OTLP collector over gRPC.
    OtlpGrpc = 2,
    /// Append spans as JSON lines to a local file.
    File = 3,
}

impl ExportMode {
    /// Number of modes. Dispatch tables hold exactly this many slots.
    pub const COUNT: usize = 4;

    /// Every mode, in slot order.
    pub const ALL: [ExportMode; Self::COUNT] = [
        ExportMode::Disabled,
        ExportMode::Stdout,
        ExportMode::OtlpGrpc,
        ExportMode::File,
    ];

    /// The mode's dispatch-table slot.
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Name used in configuration and diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            ExportMode::Disabled => "disabled",
            ExportMode::Stdout => "stdout",
            ExportMode::OtlpGrpc => "otlp-grpc",
            ExportMode::File => "file",
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<usize> for ExportMode {
    type Error = UnknownModeError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::ALL.get(value).copied().ok_or(UnknownModeError(value))
    }
}
