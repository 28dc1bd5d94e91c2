mod args;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{routing::get, Router};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use fleet_common::telemetry::{init_tracing, OtlpExport};
use fleet_meta::{EtcdMetaStore, FleetStore};
use fleet_supervisor::applier::DirectoryApplier;
use fleet_supervisor::metrics::{healthz_handler, metrics_handler, SharedMetrics};
use fleet_supervisor::provisioner::ManifestProvisioner;
use fleet_supervisor::supervisor::InstallationSupervisor;

use crate::args::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let tracer_provider = init_tracing(
        "fleet-supervisor",
        &OtlpExport {
            endpoint: args.otlp_endpoint.clone(),
            token: args.otlp_token.clone(),
        },
    );
    info!(instance = %args.instance_id, "fleet-supervisor starting...");

    let meta = EtcdMetaStore::connect(std::slice::from_ref(&args.etcd_endpoint)).await?;
    info!("connected to etcd at {}", args.etcd_endpoint);

    let store = Arc::new(FleetStore::new(meta));
    let provisioner = Arc::new(ManifestProvisioner::new(
        DirectoryApplier::new(&args.manifest_dir),
        None,
    ));
    let metrics = Arc::new(SharedMetrics::default());

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(metrics.clone());
    let listener = tokio::net::TcpListener::bind(&args.metrics_listen).await?;
    info!("metrics listening on {}", args.metrics_listen);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error=%e, "metrics server exited");
        }
    });

    let supervisor = InstallationSupervisor::new(
        store,
        provisioner,
        args.instance_id.clone(),
        metrics.clone(),
    )
    .with_parallelism(args.parallelism);

    let mut interval = tokio::time::interval(Duration::from_secs(args.poll_interval_secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        "supervisor loop started (interval={}s, parallelism={})",
        args.poll_interval_secs, args.parallelism
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = supervisor.tick().await {
                    SharedMetrics::incr(&metrics.tick_errors_total);
                    warn!(error=%e, "supervisor tick failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.shutdown() {
            warn!(error=%e, "failed to flush trace exporter");
        }
    }
    Ok(())
}
