use std::fmt;

use fleet_api::{App, FleetApi, Machine};

use crate::cancel::CancelSignal;
use crate::config::BuilderConfig;
use crate::error::Result;

/// Why an existing builder cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// Nothing was recorded for the organization. Expected on first use.
    NoBuilderApp,
    NoBuilderVolume,
    /// Anything other than exactly one machine, whatever its state.
    InvalidMachineCount,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvalidReason::NoBuilderApp => "no builder app",
            InvalidReason::NoBuilderVolume => "no builder volume",
            InvalidReason::InvalidMachineCount => "invalid machine count",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid(Machine),
    Invalid(InvalidReason),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }
}

/// Check whether `app` still points at a usable builder.
///
/// Volumes are listed first; a missing volume skips the machine listing.
/// Never changes remote state.
pub async fn validate_builder(
    api: &dyn FleetApi,
    app: Option<&App>,
    config: &BuilderConfig,
    cancel: &CancelSignal,
) -> Result<ValidationOutcome> {
    let Some(app) = app else {
        tracing::debug!("no builder app recorded");
        return Ok(ValidationOutcome::Invalid(InvalidReason::NoBuilderApp));
    };

    let volumes = config
        .read_retry
        .run("list volumes", cancel, || api.list_volumes(&app.name))
        .await?;
    if volumes.is_empty() {
        tracing::info!(app = %app.name, "existing builder app has no volume");
        return Ok(ValidationOutcome::Invalid(InvalidReason::NoBuilderVolume));
    }

    let mut machines = config
        .read_retry
        .run("list machines", cancel, || api.list_machines(&app.name))
        .await?;
    if machines.len() != 1 {
        tracing::info!(app = %app.name, count = machines.len(), "existing builder app has an invalid number of machines");
        return Ok(ValidationOutcome::Invalid(InvalidReason::InvalidMachineCount));
    }

    Ok(ValidationOutcome::Valid(machines.remove(0)))
}
