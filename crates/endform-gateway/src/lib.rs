//! Controller gateway for the end-forming HMI.
//!
//! This crate provides:
//! - [`Gateway`]: the single controller session, tag reads and writes,
//!   heartbeat discovery, indexed I/O, and target reconfiguration
//! - program download into the per-side step arrays
//! - [`Poller`]: fixed-interval live state reads, failure-isolated per group
//! - HTTP REST API, WebSocket live stream, and Prometheus metrics
//! - `AdsClient` for Beckhoff runtimes (feature `ads`), and the simulated
//!   controller used for tests and bench setups
//!
//! # Usage
//!
//! ```ignore
//! use endform_gateway::{Gateway, GatewayServer, SimulatedFactory, SimulatedPlc};
//!
//! let plc = SimulatedPlc::with_machine_tags(&config);
//! let gateway = Arc::new(Gateway::new(&config, Arc::new(SimulatedFactory::new(plc)))?);
//! let server = GatewayServer::new(&config, gateway);
//! server.start(shutdown).await?;
//! ```

#[cfg(feature = "ads")]
mod ads_client;
mod api;
mod client;
mod gateway;
mod live;
mod metrics;
mod poller;
mod simulated;
mod translator;
mod websocket;

#[cfg(feature = "ads")]
pub use ads_client::*;
pub use api::*;
pub use client::*;
pub use gateway::*;
pub use live::*;
pub use metrics::*;
pub use poller::*;
pub use simulated::*;
pub use translator::*;
pub use websocket::*;

use axum::{
    routing::{get, post, Router},
    Extension,
};
use endform_common::{GatewayConfig, HttpConfig, RecipeStore};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// HTTP front end for a [`Gateway`].
pub struct GatewayServer {
    http: HttpConfig,
    gateway: Arc<Gateway>,
    recipes: Arc<RecipeStore>,
    updater: StateUpdater,
}

impl GatewayServer {
    /// Create a server for `gateway`.
    pub fn new(config: &GatewayConfig, gateway: Arc<Gateway>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.http.ws_channel_capacity.max(1));
        let updater = StateUpdater::new(
            Arc::new(SharedState::default()),
            broadcast_tx,
            gateway.metrics(),
        );
        Self {
            http: config.http.clone(),
            recipes: Arc::new(RecipeStore::new(config.recipes.dir.clone())),
            gateway,
            updater,
        }
    }

    /// Handle for publishing live state (given to the poller).
    pub fn state_updater(&self) -> StateUpdater {
        self.updater.clone()
    }

    /// The gateway behind this server.
    pub fn gateway(&self) -> Arc<Gateway> {
        Arc::clone(&self.gateway)
    }

    /// Serve until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.http.bind_addr;
        info!(addr = %bind_addr, "Starting gateway HTTP server");

        let app = self.build_router();

        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        info!(addr = %bind_addr, "Gateway HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }

    /// Build the axum router with all routes.
    pub fn build_router(self) -> Router {
        let prom_metrics = self.gateway.metrics();

        let mut app = Router::new()
            .route("/health", get(api::health_check))
            // Connection
            .route("/status", get(api::get_status))
            .route("/heartbeat-debug", get(api::heartbeat_debug))
            .route("/set-net-id", post(api::set_net_id))
            // Tag access
            .route("/read", get(api::read_tag))
            .route("/read-axis-positions", get(api::read_axis_positions))
            .route("/write", post(api::write_default))
            .route("/write-bool", post(api::write_bool))
            .route("/pulse-bool", post(api::pulse_bool))
            .route("/test-tags", post(api::test_tags))
            // Indexed I/O
            .route("/io-map", get(api::get_io_map))
            .route("/io/read", post(api::io_read))
            .route("/io/write", post(api::io_write))
            .route("/io/pulse", post(api::io_pulse))
            // Programs and recipes
            .route("/write-program", post(api::write_program))
            .route("/validate-program", post(api::validate_program))
            .route("/recipes", get(api::list_recipes).post(api::save_recipe))
            .route(
                "/recipes/:side/:name",
                get(api::get_recipe).delete(api::delete_recipe),
            )
            // Live state
            .route("/live", get(api::get_live))
            .route("/ws", get(websocket::ws_handler))
            .route("/metrics", get(metrics::metrics_handler))
            .layer(Extension(self.gateway))
            .layer(Extension(self.updater))
            .layer(Extension(self.recipes))
            .layer(Extension(prom_metrics));

        if self.http.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app = app.layer(cors);
        }

        app
    }
}
