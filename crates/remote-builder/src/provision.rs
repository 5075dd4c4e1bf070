use std::collections::BTreeMap;

use fleet_api::{
    AllocateIpInput, App, CreateAppInput, CreateVolumeRequest, FleetApi, HttpOptions,
    IpAddressType, LaunchMachineInput, Machine, MachineConfig, MachineMount, MachinePort,
    MachineService, Organization, TlsOptions, Volume,
};

use crate::cancel::CancelSignal;
use crate::config::BuilderConfig;
use crate::error::Result;
use crate::retry;
use crate::rollback::Rollback;

/// Create a brand-new builder named `name` for `org` in `region`.
///
/// Registers the app, gives it a shared IPv4 address, waits for it to be
/// ready, creates its volume and launches its machine. Any failure after the
/// app exists rolls back what was created, newest first, and returns the
/// failure that caused it.
pub async fn create_builder(
    api: &dyn FleetApi,
    org: &Organization,
    region: &str,
    name: &str,
    config: &BuilderConfig,
    cancel: &CancelSignal,
) -> Result<(App, Machine)> {
    let app = retry::commit(
        "create app",
        cancel,
        api.create_app(&CreateAppInput {
            organization_id: org.id.clone(),
            name: name.to_string(),
            app_role_id: config.app_role.clone(),
            machines: true,
            preferred_region: Some(region.to_string()),
        }),
    )
    .await?;
    tracing::info!(app = %name, app_id = %app.id, org = %org.slug, region, "builder app created");

    let mut rollback = Rollback::new();
    let app_name = app.name.clone();
    rollback.push(format!("delete app {app_name}"), async move {
        api.delete_app(&app_name).await
    });

    let result = provision_app(api, org, region, &app, config, cancel, &mut rollback).await;
    let machine = rollback.finish(result).await?;
    tracing::info!(app = %app.name, machine = %machine.id, "builder machine launched");
    Ok((app, machine))
}

async fn provision_app<'a>(
    api: &'a dyn FleetApi,
    org: &Organization,
    region: &str,
    app: &App,
    config: &BuilderConfig,
    cancel: &CancelSignal,
    rollback: &mut Rollback<'a>,
) -> Result<Machine> {
    retry::once(
        "allocate ip address",
        cancel,
        api.allocate_ip_address(
            &app.name,
            &AllocateIpInput {
                kind: IpAddressType::SharedV4,
                region: None,
                org_slug: org.slug.clone(),
            },
        ),
    )
    .await?;

    retry::once("wait for app", cancel, api.wait_for_app(&app.name)).await?;

    let volume = create_volume(api, &app.name, region, config, cancel).await?;
    let (app_name, volume_id) = (app.name.clone(), volume.id.clone());
    rollback.push(format!("delete volume {volume_id}"), async move {
        api.delete_volume(&app_name, &volume_id).await
    });

    let input = LaunchMachineInput {
        region: region.to_string(),
        config: machine_config(org, &app.name, &volume, config),
        name: None,
    };
    retry::commit("launch machine", cancel, api.launch_machine(&app.name, &input)).await
}

async fn create_volume(
    api: &dyn FleetApi,
    app: &str,
    region: &str,
    config: &BuilderConfig,
    cancel: &CancelSignal,
) -> Result<Volume> {
    let request = CreateVolumeRequest {
        name: config.volume_name.clone(),
        size_gb: config.volume_size_gb,
        auto_backup_enabled: false,
        compute_requirements: Some(config.guest.clone()),
        region: region.to_string(),
    };
    let volume = config
        .volume_retry
        .run("create volume", cancel, || api.create_volume(app, &request))
        .await?;
    tracing::debug!(app, volume = %volume.id, "builder volume created");
    Ok(volume)
}

/// Machine config for a builder: volume at the mount path, kept warm, and
/// reachable on 80 (redirected to HTTPS) and 443 (TLS, h2).
pub fn machine_config(
    org: &Organization,
    app_name: &str,
    volume: &Volume,
    config: &BuilderConfig,
) -> MachineConfig {
    let env = BTreeMap::from([
        ("ALLOW_ORG_SLUG".to_string(), org.slug.clone()),
        ("DATA_DIR".to_string(), config.mount_path.clone()),
        ("LOG_LEVEL".to_string(), config.log_level.clone()),
    ]);
    let h2 = || {
        Some(HttpOptions {
            h2_backend: Some(true),
        })
    };

    MachineConfig {
        env,
        guest: Some(config.guest.clone()),
        mounts: vec![MachineMount {
            path: config.mount_path.clone(),
            volume: volume.id.clone(),
            name: app_name.to_string(),
        }],
        services: vec![MachineService {
            protocol: "tcp".to_string(),
            internal_port: config.internal_port,
            autostop: Some(false),
            autostart: Some(true),
            min_machines_running: Some(0),
            ports: vec![
                MachinePort {
                    port: Some(80),
                    handlers: vec!["http".to_string()],
                    force_https: true,
                    tls_options: None,
                    http_options: h2(),
                },
                MachinePort {
                    port: Some(443),
                    handlers: vec!["http".to_string(), "tls".to_string()],
                    force_https: false,
                    tls_options: Some(TlsOptions {
                        alpn: vec!["h2".to_string()],
                    }),
                    http_options: h2(),
                },
            ],
        }],
        image: config.image_for(org.remote_builder_image.as_deref()),
    }
}
