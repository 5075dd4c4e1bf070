//! JSON-over-HTTP binding of [`FleetApi`].
//!
//! All routes live under `<base_url>/v1/apps`. Non-2xx responses become
//! [`FleetError::Api`] carrying the status code, with the message taken from
//! an `{"error": "..."}` body when the server sends one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::api::FleetApi;
use crate::error::{FleetError, Result};
use crate::types::{
    AllocateIpInput, App, CreateAppInput, CreateVolumeRequest, LaunchMachineInput, Machine,
    Volume,
};

const DEFAULT_BASE_URL: &str = "https://api.machines.dev";

// ---------------------------------------------------------------------------
// HttpClientConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    /// Sent as a bearer token when present.
    pub token: Option<String>,
    /// Upper bound for [`FleetApi::wait_for_app`].
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            ready_timeout: Duration::from_secs(60),
            ready_poll_interval: Duration::from_millis(500),
        }
    }
}

impl HttpClientConfig {
    /// Defaults overlaid with `FLEET_API_URL` and `FLEET_API_TOKEN`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("FLEET_API_URL") {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }
        config.token = std::env::var("FLEET_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        config
    }
}

// ---------------------------------------------------------------------------
// HttpFleetClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpFleetClient {
    http: reqwest::Client,
    config: HttpClientConfig,
}

impl HttpFleetClient {
    pub fn new(config: HttpClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: HttpClientConfig) -> Self {
        Self { http, config }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/v1{path}", self.config.base_url.trim_end_matches('/'));
        let builder = self.http.request(method, url);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(FleetError::Api {
            status: status.as_u16(),
            message: error_message(status, &body),
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response, context: &str) -> Result<T> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| FleetError::Decode {
            context: context.to_string(),
            source,
        })
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value.get("error").and_then(|e| e.as_str()) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        trimmed.chars().take(500).collect()
    }
}

#[async_trait]
impl FleetApi for HttpFleetClient {
    async fn create_app(&self, input: &CreateAppInput) -> Result<App> {
        tracing::debug!(app = %input.name, "creating app");
        let response = self
            .send(self.request(Method::POST, "/apps").json(input))
            .await?;
        Self::decode(response, "created app").await
    }

    async fn delete_app(&self, name: &str) -> Result<()> {
        tracing::debug!(app = %name, "deleting app");
        self.send(self.request(Method::DELETE, &format!("/apps/{name}")))
            .await?;
        Ok(())
    }

    async fn allocate_ip_address(&self, app: &str, input: &AllocateIpInput) -> Result<()> {
        tracing::debug!(app = %app, kind = ?input.kind, "allocating ip address");
        self.send(
            self.request(Method::POST, &format!("/apps/{app}/ip_assignments"))
                .json(input),
        )
        .await?;
        Ok(())
    }

    async fn wait_for_app(&self, app: &str) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.config.ready_timeout;
        loop {
            match self
                .send(self.request(Method::GET, &format!("/apps/{app}")))
                .await
            {
                Ok(_) => return Ok(()),
                // Not registered with the control plane yet.
                Err(FleetError::Api { status: 404, .. }) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(FleetError::AppNotReady {
                    app: app.to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.config.ready_poll_interval).await;
        }
    }

    async fn list_volumes(&self, app: &str) -> Result<Vec<Volume>> {
        let response = self
            .send(self.request(Method::GET, &format!("/apps/{app}/volumes")))
            .await?;
        Self::decode(response, "volume list").await
    }

    async fn create_volume(&self, app: &str, request: &CreateVolumeRequest) -> Result<Volume> {
        tracing::debug!(app = %app, volume = %request.name, region = %request.region, "creating volume");
        let response = self
            .send(
                self.request(Method::POST, &format!("/apps/{app}/volumes"))
                    .json(request),
            )
            .await?;
        Self::decode(response, "created volume").await
    }

    async fn delete_volume(&self, app: &str, volume_id: &str) -> Result<()> {
        tracing::debug!(app = %app, volume = %volume_id, "deleting volume");
        self.send(self.request(
            Method::DELETE,
            &format!("/apps/{app}/volumes/{volume_id}"),
        ))
        .await?;
        Ok(())
    }

    async fn list_machines(&self, app: &str) -> Result<Vec<Machine>> {
        let response = self
            .send(self.request(Method::GET, &format!("/apps/{app}/machines")))
            .await?;
        Self::decode(response, "machine list").await
    }

    async fn launch_machine(&self, app: &str, input: &LaunchMachineInput) -> Result<Machine> {
        tracing::debug!(app = %app, region = %input.region, image = %input.config.image, "launching machine");
        let response = self
            .send(
                self.request(Method::POST, &format!("/apps/{app}/machines"))
                    .json(input),
            )
            .await?;
        Self::decode(response, "launched machine").await
    }
}
