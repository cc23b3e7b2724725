//! Endform gateway daemon entry point.
//!
//! Hosts the PLC gateway, the live state poller, and the local HTTP
//! interface used by the operator panel, with signal-driven shutdown.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use endform_common::GatewayConfig;
use endform_gateway::{
    ClientFactory, Gateway, GatewayServer, Poller, SimulatedFactory, SimulatedPlc,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::signals::SignalHandler;

/// Gateway daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "endform-daemon",
    about = "Endform HMI gateway daemon - PLC tag relay and live machine state",
    version,
    long_about = None
)]
struct Args {
    /// Path to a gateway configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target AMS Net ID (overrides config file).
    #[arg(long, short = 'n', value_name = "NET_ID")]
    net_id: Option<String>,

    /// HTTP bind address (overrides config file).
    #[arg(long, short = 'b', value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Do not start the live state poller.
    #[arg(long)]
    no_poller: bool,

    /// Serve from the in-memory simulated controller.
    #[arg(long)]
    simulator: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Endform gateway daemon");

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    info!(
        net_id = %config.target.ams_net_id,
        bind = %config.http.bind_addr,
        poll_interval = ?config.poller.interval,
        "Configuration loaded"
    );

    let signals = SignalHandler::new();
    signals
        .listen()
        .context("Failed to set up signal handlers")?;

    run_daemon(config, signals).await
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("endform_daemon={level},endform_gateway={level},endform_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `ENDFORM_CONFIG_PATH` environment variable
/// 3. `/etc/endform/gateway.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<GatewayConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return GatewayConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("ENDFORM_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from ENDFORM_CONFIG_PATH");
            return GatewayConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from ENDFORM_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "ENDFORM_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    for candidate in ["/etc/endform/gateway.toml", "config/default.toml"] {
        let config_path = PathBuf::from(candidate);
        if config_path.exists() {
            info!(?config_path, "Loading config file");
            return GatewayConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from {config_path:?}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(GatewayConfig::default())
}

fn apply_overrides(config: &mut GatewayConfig, args: &Args) {
    if let Some(net_id) = &args.net_id {
        config.target.ams_net_id.clone_from(net_id);
    }
    if let Some(bind) = args.bind {
        config.http.bind_addr = bind;
    }
    if args.no_poller {
        config.poller.enabled = false;
    }
    if args.simulator {
        config.simulator.enabled = true;
    }
}

fn create_controller(config: &GatewayConfig) -> SimulatedPlc {
    if config.simulator.seed_machine_tags {
        info!("Using simulated PLC seeded with machine tags");
        SimulatedPlc::with_machine_tags(config)
    } else {
        info!("Using empty simulated PLC");
        SimulatedPlc::new()
    }
}

#[cfg(feature = "ads")]
fn vendor_factory() -> Option<Arc<dyn ClientFactory>> {
    Some(Arc::new(endform_gateway::AdsFactory))
}

#[cfg(not(feature = "ads"))]
fn vendor_factory() -> Option<Arc<dyn ClientFactory>> {
    None
}

/// Choose the controller backend.
///
/// The simulator is used only when enabled in configuration, or as a
/// last resort when this build links no protocol client.
fn create_factory(config: &GatewayConfig) -> Arc<dyn ClientFactory> {
    if config.simulator.enabled {
        warn!("Simulator enabled: no real PLC will be contacted");
        return Arc::new(SimulatedFactory::new(create_controller(config)));
    }
    if let Some(factory) = vendor_factory() {
        info!(net_id = %config.target.ams_net_id, "Using ADS client");
        return factory;
    }
    error!(
        net_id = %config.target.ams_net_id,
        "No PLC client in this build (rebuild with --features ads). \
         FALLING BACK TO THE SIMULATED PLC: machine state and downloads are NOT real"
    );
    Arc::new(SimulatedFactory::new(create_controller(config)))
}

/// Run the gateway until a shutdown signal arrives.
async fn run_daemon(config: GatewayConfig, signals: SignalHandler) -> Result<()> {
    let gateway = Arc::new(
        Gateway::new(&config, create_factory(&config)).context("Failed to create gateway")?,
    );
    let server = GatewayServer::new(&config, Arc::clone(&gateway));

    // The HTTP interface comes up even when the first connect fails.
    let connector = Arc::clone(&gateway);
    tokio::spawn(async move {
        match connector.connect().await {
            Ok(()) => info!(net_id = %connector.target().ams_net_id, "Connected to PLC"),
            Err(e) => warn!(error = %e, "Initial PLC connect failed, waiting for a new target"),
        }
    });

    let poller = if config.poller.enabled {
        let poller = Poller::new(
            Arc::clone(&gateway),
            server.state_updater(),
            config.poller.interval,
        );
        Some(tokio::spawn(poller.run(signals.subscribe())))
    } else {
        info!("Live state poller disabled");
        None
    };

    let shutdown = {
        let signals = signals.clone();
        async move { signals.wait().await }
    };
    let served = server.start(shutdown).await;

    info!("Shutting down...");
    signals.request_shutdown();

    if let Some(handle) = poller {
        if let Err(e) = handle.await {
            warn!(error = %e, "Poller task ended abnormally");
        }
    }
    gateway.disconnect().await;

    info!(
        signals = signals.state().signal_count(),
        "Daemon shutdown complete"
    );
    served.context("HTTP server failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["endform-daemon", "--no-poller"]);
        assert!(args.no_poller);
        assert!(args.config.is_none());
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_args_with_overrides() {
        let args = Args::parse_from([
            "endform-daemon",
            "-c",
            "gateway.toml",
            "--net-id",
            "10.1.2.3.1.1",
            "--bind",
            "0.0.0.0:9000",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("gateway.toml")));

        let mut config = GatewayConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.target.ams_net_id, "10.1.2.3.1.1");
        assert_eq!(config.http.bind_addr.port(), 9000);
        assert!(config.poller.enabled);
    }

    #[test]
    fn test_bad_bind_rejected() {
        assert!(Args::try_parse_from(["endform-daemon", "--bind", "nowhere"]).is_err());
    }

    #[test]
    fn test_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[target]\nams_net_id = \"192.168.0.7.1.1\"\n").unwrap();

        let args = Args::parse_from(["endform-daemon", "-c", path.to_str().unwrap()]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.target.ams_net_id, "192.168.0.7.1.1");
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let args = Args::parse_from(["endform-daemon", "-c", "/nonexistent/gateway.toml"]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_simulator_flag_enables_simulator() {
        let args = Args::parse_from(["endform-daemon", "--simulator"]);
        let mut config = GatewayConfig::default();
        assert!(!config.simulator.enabled);
        apply_overrides(&mut config, &args);
        assert!(config.simulator.enabled);
    }

    #[cfg(not(feature = "ads"))]
    #[test]
    fn test_no_vendor_client_without_ads_feature() {
        assert!(vendor_factory().is_none());
    }

    #[cfg(feature = "ads")]
    #[test]
    fn test_vendor_client_with_ads_feature() {
        assert!(vendor_factory().is_some());
    }

    #[tokio::test]
    async fn test_simulated_factory_serves_seeded_tags() {
        let mut config = GatewayConfig::default();
        config.simulator.enabled = true;
        let gateway = Gateway::new(&config, create_factory(&config)).unwrap();
        gateway.connect().await.unwrap();
        assert!(gateway.read_tag(&config.tags.production_count).await.is_ok());
    }

    #[test]
    fn test_unseeded_controller_is_empty() {
        let mut config = GatewayConfig::default();
        config.simulator.seed_machine_tags = false;
        let plc = create_controller(&config);
        assert!(plc.tag(&config.tags.production_count).is_none());
    }
}
