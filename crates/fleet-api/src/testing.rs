//! In-memory fleet API for tests.
//!
//! [`FakeFleet`] keeps apps, volumes and machines in memory, records every
//! call in order, and can be scripted to fail the next N calls of a given
//! operation. Enable with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! fleet-api = { path = "../fleet-api", features = ["testing"] }
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::FleetApi;
use crate::error::{FleetError, Result};
use crate::types::{
    AllocateIpInput, App, CreateAppInput, CreateVolumeRequest, LaunchMachineInput, Machine,
    Volume,
};

/// One [`FleetApi`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateApp,
    DeleteApp,
    AllocateIp,
    WaitForApp,
    ListVolumes,
    CreateVolume,
    DeleteVolume,
    ListMachines,
    LaunchMachine,
}

/// A recorded call. `target` is the app name, or the volume id for
/// volume deletion and successful volume creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub target: String,
    pub ok: bool,
}

#[derive(Default)]
struct FleetState {
    apps: BTreeMap<String, App>,
    volumes: BTreeMap<String, Vec<Volume>>,
    machines: BTreeMap<String, Vec<Machine>>,
    calls: Vec<Call>,
    failures: HashMap<Op, VecDeque<FleetError>>,
    next_id: u64,
}

impl FleetState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{:04}", self.next_id)
    }

    fn record(&mut self, op: Op, target: &str, ok: bool) {
        self.calls.push(Call {
            op,
            target: target.to_string(),
            ok,
        });
    }

    /// Pops a scripted failure for `op`, recording the failed call.
    fn scripted(&mut self, op: Op, target: &str) -> Result<()> {
        let failure = self.failures.get_mut(&op).and_then(|q| q.pop_front());
        match failure {
            Some(err) => {
                self.record(op, target, false);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn require_app(&mut self, op: Op, app: &str) -> Result<()> {
        if self.apps.contains_key(app) {
            Ok(())
        } else {
            self.record(op, app, false);
            Err(FleetError::api(404, format!("app {app} not found")))
        }
    }
}

#[derive(Default)]
pub struct FakeFleet {
    state: Mutex<FleetState>,
}

impl FakeFleet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FleetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue errors returned, in order, by the next calls of `op`.
    pub fn fail_next(&self, op: Op, errors: impl IntoIterator<Item = FleetError>) {
        self.lock()
            .failures
            .entry(op)
            .or_default()
            .extend(errors);
    }

    /// Fail the next `times` calls of `op` with the given status.
    pub fn fail_with_status(&self, op: Op, status: u16, times: usize) {
        self.fail_next(
            op,
            (0..times).map(|i| FleetError::api(status, format!("scripted failure {}", i + 1))),
        );
    }

    /// Register an app directly, bypassing the call log.
    pub fn seed_app(&self, name: &str, org_slug: &str) -> App {
        let mut state = self.lock();
        let app = App {
            id: state.next_id("app"),
            name: name.to_string(),
            status: Some("deployed".into()),
            organization_slug: Some(org_slug.to_string()),
        };
        state.apps.insert(name.to_string(), app.clone());
        app
    }

    pub fn seed_volume(&self, app: &str) -> Volume {
        let mut state = self.lock();
        let volume = Volume {
            id: state.next_id("vol"),
            name: "machine_data".into(),
            region: "ord".into(),
            size_gb: 50,
            state: Some("created".into()),
            attached_machine_id: None,
            created_at: None,
        };
        state
            .volumes
            .entry(app.to_string())
            .or_default()
            .push(volume.clone());
        volume
    }

    pub fn seed_machine(&self, app: &str, machine_state: &str) -> Machine {
        let mut state = self.lock();
        let machine = Machine {
            id: state.next_id("m"),
            name: format!("{app}-machine"),
            state: machine_state.to_string(),
            region: "ord".into(),
            config: None,
            created_at: None,
        };
        state
            .machines
            .entry(app.to_string())
            .or_default()
            .push(machine.clone());
        machine
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls (successful or not) of `op`.
    pub fn count(&self, op: Op) -> usize {
        self.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Position of the first call of `op` in the call log.
    pub fn first_index(&self, op: Op) -> Option<usize> {
        self.lock().calls.iter().position(|c| c.op == op)
    }

    pub fn app(&self, name: &str) -> Option<App> {
        self.lock().apps.get(name).cloned()
    }

    pub fn app_names(&self) -> Vec<String> {
        self.lock().apps.keys().cloned().collect()
    }

    pub fn volumes(&self, app: &str) -> Vec<Volume> {
        self.lock().volumes.get(app).cloned().unwrap_or_default()
    }

    pub fn machines(&self, app: &str) -> Vec<Machine> {
        self.lock().machines.get(app).cloned().unwrap_or_default()
    }

    /// Resources created through the API and never deleted through it.
    ///
    /// Apps are reported as `app:<name>`, volumes as `volume:<id>`.
    pub fn orphans(&self) -> Vec<String> {
        let state = self.lock();
        let mut live: Vec<String> = Vec::new();
        for call in state.calls.iter().filter(|c| c.ok) {
            match call.op {
                Op::CreateApp => live.push(format!("app:{}", call.target)),
                Op::CreateVolume => live.push(format!("volume:{}", call.target)),
                Op::DeleteApp => live.retain(|r| r != &format!("app:{}", call.target)),
                Op::DeleteVolume => live.retain(|r| r != &format!("volume:{}", call.target)),
                _ => {}
            }
        }
        live
    }
}

#[async_trait]
impl FleetApi for FakeFleet {
    async fn create_app(&self, input: &CreateAppInput) -> Result<App> {
        let mut state = self.lock();
        state.scripted(Op::CreateApp, &input.name)?;
        if state.apps.contains_key(&input.name) {
            state.record(Op::CreateApp, &input.name, false);
            return Err(FleetError::api(
                422,
                format!("app name {} is already taken", input.name),
            ));
        }
        let app = App {
            id: state.next_id("app"),
            name: input.name.clone(),
            status: Some("pending".into()),
            organization_slug: None,
        };
        state.apps.insert(input.name.clone(), app.clone());
        state.record(Op::CreateApp, &input.name, true);
        Ok(app)
    }

    async fn delete_app(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.scripted(Op::DeleteApp, name)?;
        state.require_app(Op::DeleteApp, name)?;
        state.apps.remove(name);
        state.volumes.remove(name);
        state.machines.remove(name);
        state.record(Op::DeleteApp, name, true);
        Ok(())
    }

    async fn allocate_ip_address(&self, app: &str, _input: &AllocateIpInput) -> Result<()> {
        let mut state = self.lock();
        state.scripted(Op::AllocateIp, app)?;
        state.require_app(Op::AllocateIp, app)?;
        state.record(Op::AllocateIp, app, true);
        Ok(())
    }

    async fn wait_for_app(&self, app: &str) -> Result<()> {
        let mut state = self.lock();
        state.scripted(Op::WaitForApp, app)?;
        state.require_app(Op::WaitForApp, app)?;
        state.record(Op::WaitForApp, app, true);
        Ok(())
    }

    async fn list_volumes(&self, app: &str) -> Result<Vec<Volume>> {
        let mut state = self.lock();
        state.scripted(Op::ListVolumes, app)?;
        state.require_app(Op::ListVolumes, app)?;
        state.record(Op::ListVolumes, app, true);
        Ok(state.volumes.get(app).cloned().unwrap_or_default())
    }

    async fn create_volume(&self, app: &str, request: &CreateVolumeRequest) -> Result<Volume> {
        let mut state = self.lock();
        state.scripted(Op::CreateVolume, app)?;
        state.require_app(Op::CreateVolume, app)?;
        let volume = Volume {
            id: state.next_id("vol"),
            name: request.name.clone(),
            region: request.region.clone(),
            size_gb: request.size_gb,
            state: Some("created".into()),
            attached_machine_id: None,
            created_at: None,
        };
        state
            .volumes
            .entry(app.to_string())
            .or_default()
            .push(volume.clone());
        state.record(Op::CreateVolume, &volume.id, true);
        Ok(volume)
    }

    async fn delete_volume(&self, app: &str, volume_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.scripted(Op::DeleteVolume, volume_id)?;
        let volumes = state.volumes.entry(app.to_string()).or_default();
        let before = volumes.len();
        volumes.retain(|v| v.id != volume_id);
        if volumes.len() == before {
            state.record(Op::DeleteVolume, volume_id, false);
            return Err(FleetError::api(404, format!("volume {volume_id} not found")));
        }
        state.record(Op::DeleteVolume, volume_id, true);
        Ok(())
    }

    async fn list_machines(&self, app: &str) -> Result<Vec<Machine>> {
        let mut state = self.lock();
        state.scripted(Op::ListMachines, app)?;
        state.require_app(Op::ListMachines, app)?;
        state.record(Op::ListMachines, app, true);
        Ok(state.machines.get(app).cloned().unwrap_or_default())
    }

    async fn launch_machine(&self, app: &str, input: &LaunchMachineInput) -> Result<Machine> {
        let mut state = self.lock();
        state.scripted(Op::LaunchMachine, app)?;
        state.require_app(Op::LaunchMachine, app)?;
        let machine = Machine {
            id: state.next_id("m"),
            name: input.name.clone().unwrap_or_else(|| format!("{app}-machine")),
            state: "created".into(),
            region: input.region.clone(),
            config: Some(input.config.clone()),
            created_at: None,
        };
        state
            .machines
            .entry(app.to_string())
            .or_default()
            .push(machine.clone());
        state.record(Op::LaunchMachine, app, true);
        Ok(machine)
    }
}
