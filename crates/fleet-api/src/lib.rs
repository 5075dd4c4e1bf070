//! `fleet-api` — the boundary between the remote builder lifecycle and the
//! fleet management API that hosts apps, volumes and machines.
//!
//! ```text
//! FleetApi (trait)
//!     ├── HttpFleetClient   ← JSON over HTTP, reqwest
//!     └── FakeFleet         ← in-memory, call-recording (feature "testing")
//! ```
//!
//! Errors carry the HTTP status when the API answered, so callers can tell
//! server-side trouble from their own mistakes.

pub mod api;
pub mod error;
pub mod http;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::FleetApi;
pub use error::{FleetError, Result};
pub use http::{HttpClientConfig, HttpFleetClient};
pub use types::{
    AllocateIpInput, App, CreateAppInput, CreateVolumeRequest, HttpOptions, IpAddressType,
    LaunchMachineInput, Machine, MachineConfig, MachineGuest, MachineMount, MachinePort,
    MachineService, Organization, TlsOptions, Volume,
};
