use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    AllocateIpInput, App, CreateAppInput, CreateVolumeRequest, LaunchMachineInput, Machine,
    Volume,
};

/// Operations the builder lifecycle needs from the fleet management API.
///
/// Every method may fail with a [`FleetError`](crate::FleetError); callers
/// decide whether a failure is worth retrying from its status code.
#[async_trait]
pub trait FleetApi: Send + Sync {
    async fn create_app(&self, input: &CreateAppInput) -> Result<App>;

    /// Deleting an app also tears down its volumes and machines remotely.
    async fn delete_app(&self, name: &str) -> Result<()>;

    async fn allocate_ip_address(&self, app: &str, input: &AllocateIpInput) -> Result<()>;

    /// Block until the app is registered with the machines control plane.
    ///
    /// Implementations bound the wait themselves.
    async fn wait_for_app(&self, app: &str) -> Result<()>;

    async fn list_volumes(&self, app: &str) -> Result<Vec<Volume>>;

    async fn create_volume(&self, app: &str, request: &CreateVolumeRequest) -> Result<Volume>;

    async fn delete_volume(&self, app: &str, volume_id: &str) -> Result<()>;

    async fn list_machines(&self, app: &str) -> Result<Vec<Machine>>;

    async fn launch_machine(&self, app: &str, input: &LaunchMachineInput) -> Result<Machine>;
}
