use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "fleet-supervisor", about = "Reconciles installations onto clusters")]
pub struct Args {
    #[arg(long, env = "FLEET_ETCD_ENDPOINT", default_value = "http://127.0.0.1:2379")]
    pub etcd_endpoint: String,

    /// Identity written into lock records. Must be unique per running supervisor.
    #[arg(long, env = "FLEET_INSTANCE_ID", default_value_t = fleet_common::new_id())]
    pub instance_id: String,

    /// Seconds between supervisor ticks.
    #[arg(long, env = "FLEET_POLL_INTERVAL_SECS", default_value_t = 30)]
    pub poll_interval_secs: u64,

    /// Installations supervised concurrently per tick.
    #[arg(long, env = "FLEET_PARALLELISM", default_value_t = 4)]
    pub parallelism: usize,

    /// Directory the manifest applier writes `<cluster>/<namespace>/` trees into.
    #[arg(long, env = "FLEET_MANIFEST_DIR", default_value = "/var/lib/fleet/manifests")]
    pub manifest_dir: PathBuf,

    #[arg(long, env = "FLEET_METRICS_LISTEN", default_value = "0.0.0.0:9110")]
    pub metrics_listen: String,

    /// OTLP/HTTP collector base URL for span export.
    #[arg(long, env = "FLEET_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Bearer token for the OTLP collector.
    #[arg(long, env = "FLEET_OTLP_TOKEN")]
    pub otlp_token: Option<String>,
}
