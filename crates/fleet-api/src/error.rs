use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    /// The fleet API answered with a non-success status.
    #[error("fleet API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("fleet API transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("app {app} was not ready after {waited:?}")]
    AppNotReady { app: String, waited: Duration },
}

impl FleetError {
    /// Shorthand for an [`FleetError::Api`] error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// The status code reported by the fleet API, if the call got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
