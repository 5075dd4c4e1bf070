use std::time::Duration;

use fleet_api::MachineGuest;
use serde::Deserialize;

use crate::retry::RetryPolicy;

pub const DEFAULT_BUILDER_IMAGE: &str = "docker-hub-mirror.fly.io/flyio/rchab:sha-9346699";

// ---------------------------------------------------------------------------
// BuilderConfig
// ---------------------------------------------------------------------------

/// Shape of the builder worker and the retry budgets used to manage it.
///
/// Every top-level field has a default, so omitted fields are filled in. A
/// retry policy that is present must name both `max_attempts` and
/// `interval_ms`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub name_prefix: String,
    pub app_role: String,
    /// Used unless the organization carries its own builder image.
    pub image: String,
    pub volume_name: String,
    pub volume_size_gb: u32,
    pub mount_path: String,
    pub internal_port: u16,
    pub guest: MachineGuest,
    /// Value of `LOG_LEVEL` inside the builder machine.
    pub log_level: String,
    pub read_retry: RetryPolicy,
    pub volume_retry: RetryPolicy,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            name_prefix: "fly-builder-".to_string(),
            app_role: "remote-docker-builder".to_string(),
            image: DEFAULT_BUILDER_IMAGE.to_string(),
            volume_name: "machine_data".to_string(),
            volume_size_gb: 50,
            mount_path: "/data".to_string(),
            internal_port: 8080,
            guest: default_guest(),
            log_level: "debug".to_string(),
            read_retry: RetryPolicy::reads(),
            volume_retry: RetryPolicy::volume_create(),
        }
    }
}

fn default_guest() -> MachineGuest {
    MachineGuest {
        cpu_kind: "shared".to_string(),
        cpus: 4,
        memory_mb: 4096,
    }
}

impl BuilderConfig {
    /// Apply `REMOTE_BUILDER_IMAGE` and `REMOTE_BUILDER_RETRY_INTERVAL_MS`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Unparsable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(image) = lookup("REMOTE_BUILDER_IMAGE").filter(|v| !v.trim().is_empty()) {
            self.image = image;
        }
        if let Some(ms) = lookup("REMOTE_BUILDER_RETRY_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok())
        {
            let interval = Duration::from_millis(ms);
            self.read_retry = RetryPolicy::new(self.read_retry.max_attempts, interval);
            self.volume_retry = RetryPolicy::new(self.volume_retry.max_attempts, interval);
        }
        self
    }

    /// The image for `org_image`, falling back to the configured default.
    pub fn image_for(&self, org_image: Option<&str>) -> String {
        match org_image {
            Some(image) if !image.trim().is_empty() => image.to_string(),
            _ => self.image.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_builder_shape() {
        let config = BuilderConfig::default();
        assert_eq!(config.volume_size_gb, 50);
        assert_eq!(config.mount_path, "/data");
        assert_eq!(config.guest.cpus, 4);
        assert_eq!(config.guest.memory_mb, 4096);
        assert_eq!(config.read_retry.max_attempts, 3);
        assert_eq!(config.volume_retry.max_attempts, 5);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config: BuilderConfig = serde_json::from_str(
            r#"{"image": "registry.example/builder:1", "read_retry": {"max_attempts": 2, "interval_ms": 0}}"#,
        )
        .unwrap();
        assert_eq!(config.image, "registry.example/builder:1");
        assert_eq!(config.read_retry, RetryPolicy::immediate(2));
        assert_eq!(config.volume_retry, RetryPolicy::volume_create());
        assert_eq!(config.app_role, "remote-docker-builder");
    }

    #[test]
    fn incomplete_retry_policy_is_rejected() {
        let parsed =
            serde_json::from_str::<BuilderConfig>(r#"{"read_retry": {"max_attempts": 2}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn overrides_apply_and_bad_values_are_ignored() {
        let vars: HashMap<&str, &str> = [
            ("REMOTE_BUILDER_IMAGE", "mirror.example/rchab:dev"),
            ("REMOTE_BUILDER_RETRY_INTERVAL_MS", "250"),
        ]
        .into_iter()
        .collect();
        let config =
            BuilderConfig::default().with_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.image, "mirror.example/rchab:dev");
        assert_eq!(config.read_retry.interval(), Duration::from_millis(250));
        assert_eq!(config.volume_retry.max_attempts, 5);

        let config = BuilderConfig::default().with_overrides(|k| {
            (k == "REMOTE_BUILDER_RETRY_INTERVAL_MS").then(|| "soon".to_string())
        });
        assert_eq!(config.read_retry, RetryPolicy::reads());
    }

    #[test]
    fn org_image_wins_when_set() {
        let config = BuilderConfig::default();
        assert_eq!(config.image_for(Some("custom:1")), "custom:1");
        assert_eq!(config.image_for(Some("  ")), DEFAULT_BUILDER_IMAGE);
        assert_eq!(config.image_for(None), DEFAULT_BUILDER_IMAGE);
    }
}
