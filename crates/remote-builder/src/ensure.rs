use fleet_api::{App, FleetApi, Machine, Organization};

use crate::cancel::CancelSignal;
use crate::config::BuilderConfig;
use crate::error::{EnsureError, Phase};
use crate::naming::{NameGenerator, WordPairNames};
use crate::provision::create_builder;
use crate::retry;
use crate::validate::{validate_builder, InvalidReason, ValidationOutcome};

// ─── BuilderLifecycle ─────────────────────────────────────────────────────

/// Keeps one healthy builder per organization.
///
/// ```text
/// no recorded app         ─────────────────────────────► create
/// recorded app, valid     ─► return it
/// recorded app, invalid   ─► delete app ───────────────► create
/// ```
///
/// Holds no state between calls. Concurrent calls for the same organization
/// are not coordinated; the caller serializes them.
pub struct BuilderLifecycle<'a> {
    api: &'a dyn FleetApi,
    config: BuilderConfig,
    names: Box<dyn NameGenerator>,
    cancel: CancelSignal,
}

impl<'a> BuilderLifecycle<'a> {
    pub fn new(api: &'a dyn FleetApi) -> Self {
        let config = BuilderConfig::default();
        let names = Box::new(WordPairNames::new(config.name_prefix.clone()));
        Self {
            api,
            config,
            names,
            cancel: CancelSignal::never(),
        }
    }

    /// Replace the config. Also resets name generation to the config's prefix.
    pub fn with_config(mut self, config: BuilderConfig) -> Self {
        self.names = Box::new(WordPairNames::new(config.name_prefix.clone()));
        self.config = config;
        self
    }

    pub fn with_names(mut self, names: impl NameGenerator + 'static) -> Self {
        self.names = Box::new(names);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Return the organization's builder machine and app, creating or
    /// replacing them as needed.
    pub async fn ensure(
        &self,
        org: &Organization,
        region: &str,
    ) -> Result<(Machine, App), EnsureError> {
        let existing = org.remote_builder_app.as_ref();
        tracing::debug!(org = %org.slug, region, has_app = existing.is_some(), "ensuring builder");

        if let Some(app) = existing {
            let outcome = validate_builder(self.api, Some(app), &self.config, &self.cancel)
                .await
                .map_err(|e| EnsureError::new(Phase::Validate, e))?;
            match outcome {
                ValidationOutcome::Valid(machine) => {
                    tracing::info!(app = %app.name, machine = %machine.id, "builder app already exists and is valid");
                    return Ok((machine, app.clone()));
                }
                ValidationOutcome::Invalid(InvalidReason::NoBuilderApp) => {}
                ValidationOutcome::Invalid(reason) => {
                    tracing::warn!(app = %app.name, %reason, "deleting existing invalid builder");
                    retry::once("delete app", &self.cancel, self.api.delete_app(&app.name))
                        .await
                        .map_err(|e| EnsureError::new(Phase::Decommission, e))?;
                }
            }
        }

        let name = self.fresh_name(existing.map(|a| a.name.as_str()));
        let (app, machine) =
            create_builder(self.api, org, region, &name, &self.config, &self.cancel)
                .await
                .map_err(|e| EnsureError::new(Phase::Create, e))?;
        tracing::info!(org = %org.slug, app = %app.name, machine = %machine.id, "builder ready");
        Ok((machine, app))
    }

    /// A generated name that differs from `previous`.
    fn fresh_name(&self, previous: Option<&str>) -> String {
        let name = self.names.generate();
        match previous {
            Some(prev) if prev == name => format!("{name}-2"),
            _ => name,
        }
    }
}

/// Ensure `org` has a healthy builder in `region` with default settings.
pub async fn ensure_builder(
    api: &dyn FleetApi,
    org: &Organization,
    region: &str,
) -> Result<(Machine, App), EnsureError> {
    BuilderLifecycle::new(api).ensure(org, region).await
}
