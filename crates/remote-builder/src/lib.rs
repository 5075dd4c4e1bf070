//! `remote-builder` — keeps exactly one healthy remote build worker per
//! organization on the fleet platform.
//!
//! # Architecture
//!
//! ```text
//! BuilderLifecycle::ensure
//!     │
//!     ├── validate_builder   ← read-only: volume present, exactly one machine
//!     │
//!     ├── delete app         ← only when a recorded builder is invalid
//!     │
//!     └── create_builder     ← app → ip → ready → volume → machine
//!                               Rollback undoes partial work, newest first
//! ```
//!
//! Every remote call goes through [`retry`]: reads are retried 3 times,
//! volume creation 5 times, everything else once. Only 5xx answers are
//! retried. A [`CancelSignal`] aborts the flow between or during calls;
//! rollback still runs to completion.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use fleet_api::{HttpClientConfig, HttpFleetClient};
//! use remote_builder::{BuilderConfig, BuilderLifecycle};
//!
//! let client = HttpFleetClient::new(HttpClientConfig::from_env());
//! let lifecycle = BuilderLifecycle::new(&client)
//!     .with_config(BuilderConfig::default().with_env_overrides());
//! let (machine, app) = lifecycle.ensure(&org, "ord").await?;
//! ```

pub mod cancel;
pub mod classify;
pub mod config;
pub mod ensure;
pub mod error;
pub mod naming;
pub mod provision;
pub mod retry;
pub mod rollback;
pub mod validate;

pub use cancel::{CancelHandle, CancelSignal};
pub use classify::{classify, ErrorClass};
pub use config::{BuilderConfig, DEFAULT_BUILDER_IMAGE};
pub use ensure::{ensure_builder, BuilderLifecycle};
pub use error::{BuilderError, EnsureError, Phase, Result};
pub use naming::{NameGenerator, WordPairNames};
pub use provision::{create_builder, machine_config};
pub use retry::RetryPolicy;
pub use rollback::Rollback;
pub use validate::{validate_builder, InvalidReason, ValidationOutcome};
