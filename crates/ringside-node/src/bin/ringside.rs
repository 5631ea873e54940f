use std::{net::SocketAddr, path::PathBuf, process, sync::Arc, time::Duration};

use clap::Parser;
use ringside_discovery::StateLatch;
use ringside_node::{
    NodeConfig, NodeDaemon, StandaloneMetadataFactory, StandaloneRing,
    error::{STARTUP_FAILURE_EXIT_CODE, build_error_banner},
    telemetry,
};

#[derive(Parser, Debug)]
#[command(name = "ringside", version, author, about = "Ringside node daemon")]
struct Args {
    /// Path to a YAML (or JSON) node configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cluster name (overrides the config file)
    #[arg(long)]
    cluster_name: Option<String>,

    /// Node name (overrides the config file)
    #[arg(long)]
    node_name: Option<String>,

    /// Bind address (overrides the config file)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Data directory (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<NodeConfig, ringside_node::NodeError> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::from_path(path)?,
        None => NodeConfig::new("ringside"),
    };
    if let Some(cluster_name) = &args.cluster_name {
        config.cluster_name = cluster_name.clone();
    }
    if let Some(node_name) = &args.node_name {
        config.node_name = Some(node_name.clone());
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn main() {
    telemetry::init();

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", build_error_banner("Configuration", &e));
            process::exit(STARTUP_FAILURE_EXIT_CODE);
        }
    };

    tracing::info!("{}", config.local_member().description());
    tracing::debug!(
        mlockall = config.mlockall,
        seccomp = config.seccomp,
        ctrl_handler = config.ctrl_handler,
        "native bootstrap flags"
    );

    let ring = Arc::new(StandaloneRing::new(&config));
    let daemon = NodeDaemon::new(ring, Arc::new(StandaloneMetadataFactory), config);

    if let Err(e) = daemon.activate(true) {
        eprintln!("{}", build_error_banner("Initialization", &e));
        daemon.destroy();
        process::exit(STARTUP_FAILURE_EXIT_CODE);
    }

    // Keep the process alive until it is killed; the daemon's shutdown hook
    // tears both subsystems down on the way out.
    let keep_alive = StateLatch::new();
    while !keep_alive.wait(Duration::from_secs(3600)) {}
}
