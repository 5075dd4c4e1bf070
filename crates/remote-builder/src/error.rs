use std::fmt;

use fleet_api::FleetError;
use thiserror::Error;

/// Failure of a single remote step.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// The fleet API rejected the call in a way retrying will not fix.
    #[error("{op}: {source}")]
    Remote {
        op: &'static str,
        #[source]
        source: FleetError,
    },

    /// Every attempt allowed by the retry policy hit a server-side error.
    #[error("{op}: giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        op: &'static str,
        attempts: u32,
        #[source]
        source: FleetError,
    },

    #[error("{op}: cancelled")]
    Cancelled { op: &'static str },
}

impl BuilderError {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Remote { op, .. } | Self::RetriesExhausted { op, .. } | Self::Cancelled { op } => {
                op
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// Status code of the underlying fleet API error, if any.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            Self::Remote { source, .. } | Self::RetriesExhausted { source, .. } => source.status(),
            Self::Cancelled { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// EnsureError
// ---------------------------------------------------------------------------

/// Where in the ensure flow a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validate,
    Decommission,
    Create,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Validate => "validating",
            Phase::Decommission => "decommissioning",
            Phase::Create => "creating",
        };
        f.write_str(s)
    }
}

/// The caller-visible failure of [`ensure_builder`](crate::ensure_builder):
/// the original cause annotated with its phase.
#[derive(Debug, Error)]
#[error("{phase} builder: {source}")]
pub struct EnsureError {
    pub phase: Phase,
    #[source]
    pub source: BuilderError,
}

impl EnsureError {
    pub fn new(phase: Phase, source: BuilderError) -> Self {
        Self { phase, source }
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }
}

pub type Result<T> = std::result::Result<T, BuilderError>;
