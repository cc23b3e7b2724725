//! Common utilities for acceptance tests.
//!
//! Provides helpers for:
//! - Building a router over a simulated controller
//! - Sending JSON requests and decoding JSON responses
//! - Building step programs

#![allow(dead_code)] // Not every suite uses every helper

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use endform_common::{GatewayConfig, Positions, Program, Side, Step, STEP_COUNT};
use endform_gateway::{Gateway, GatewayServer, SimulatedFactory, SimulatedPlc};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Largest response body the helpers will buffer.
const BODY_LIMIT: usize = 1024 * 1024;

/// A router with its simulated controller.
pub struct TestApp {
    /// Router under test.
    pub router: Router,
    /// Controller behind the gateway.
    pub plc: SimulatedPlc,
    /// Gateway shared with the router.
    pub gateway: Arc<Gateway>,
    /// Configuration the app was built from.
    pub config: GatewayConfig,
    /// Recipe directory, removed on drop.
    pub recipes: TempDir,
}

/// Build an app. The gateway is connected when `connect` is true.
pub async fn app(connect: bool) -> TestApp {
    let recipes = tempfile::tempdir().expect("tempdir");
    let mut config = GatewayConfig::default();
    config.recipes.dir = recipes.path().to_path_buf();

    let plc = SimulatedPlc::with_machine_tags(&config);
    let gateway = Arc::new(
        Gateway::new(&config, Arc::new(SimulatedFactory::new(plc.clone()))).expect("gateway"),
    );
    if connect {
        gateway.connect().await.expect("connect");
    }
    plc.clear_journal();

    let router = GatewayServer::new(&config, Arc::clone(&gateway)).build_router();
    TestApp {
        router,
        plc,
        gateway,
        config,
        recipes,
    }
}

impl TestApp {
    /// Send a request and decode the JSON body (`Null` when not JSON).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), BODY_LIMIT)
            .await
            .expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    /// GET `uri`.
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).expect("request"))
            .await
    }

    /// GET `uri` and return the raw text body.
    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), BODY_LIMIT)
            .await
            .expect("body");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// POST `body` as JSON to `uri`.
    pub async fn post(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.json(Method::POST, uri, body).await
    }

    /// DELETE `uri`.
    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
    }

    async fn json(&self, method: Method, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
    }
}

/// A program with every step set, axis 1 at `base + n`.
pub fn full_program(name: &str, side: Side, base: f64) -> Program {
    (1..=STEP_COUNT).fold(Program::new(name, side), |p, n| {
        p.with_step(Step::new(n, Positions::new(base + f64::from(n), base), 0))
    })
}
