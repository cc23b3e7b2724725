//! Connection, tag access, and indexed I/O acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Every operation attempted while disconnected answers 503
//! - Controller rejections surface as 502 with the client message
//! - Malformed input answers 400 and never reaches the controller
//! - Pulses always leave the tag false

use super::common::app;
use axum::http::StatusCode;
use endform_common::TagValue;
use serde_json::json;

// ============================================================================
// Health and Status
// ============================================================================

#[tokio::test]
async fn test_health() {
    let app = app(false).await;
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_status_reports_heartbeat() {
    let app = app(true).await;
    let (status, body) = app.get("/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
    assert_eq!(body["amsNetId"], "5.84.112.90.1.1");
    assert_eq!(body["heartbeatTag"], "MAIN.nHeartbeat");
    assert!(body["heartbeat"].is_number());
}

#[tokio::test]
async fn test_status_when_disconnected() {
    let app = app(false).await;
    let (status, body) = app.get("/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);
    assert!(body["heartbeat"].is_null());
}

#[tokio::test]
async fn test_heartbeat_debug_lists_candidates() {
    let app = app(true).await;
    let (status, body) = app.get("/heartbeat-debug").await;
    assert_eq!(status, StatusCode::OK);
    let candidates = body["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), app.config.tags.heartbeat_candidates.len());
    assert_eq!(candidates[0]["status"], "ok");
    assert_eq!(candidates[1]["status"], "error");
}

#[tokio::test]
async fn test_metrics_exposed() {
    let app = app(true).await;
    app.get("/read?tag=GVL_HMI.nPartCount").await;
    let (status, text) = app.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("endform_tag_reads_total"));
    assert!(text.contains("endform_plc_connected 1"));
}

// ============================================================================
// Target Changes
// ============================================================================

#[tokio::test]
async fn test_set_net_id_rejects_malformed_address() {
    let app = app(true).await;
    let (status, body) = app
        .post("/set-net-id", &json!({ "netId": "plc.local" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    // The existing session is untouched.
    assert!(app.gateway.is_connected());
    assert_eq!(app.gateway.target().ams_net_id, "5.84.112.90.1.1");
}

#[tokio::test]
async fn test_set_net_id_reconnects() {
    let app = app(true).await;
    let (status, body) = app
        .post("/set-net-id", &json!({ "netId": "10.0.0.5.1.1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["amsNetId"], "10.0.0.5.1.1");
    assert_eq!(body["connected"], true);
}

#[tokio::test]
async fn test_set_net_id_connect_failure_is_warning() {
    let app = app(true).await;
    app.plc.refuse_target("10.0.0.9.1.1", "no route to host");
    let (status, body) = app
        .post("/set-net-id", &json!({ "netId": "10.0.0.9.1.1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["connected"], false);
    assert!(body["warning"]
        .as_str()
        .unwrap()
        .contains("no route to host"));

    let (status, _) = app.get("/read?tag=GVL_HMI.nPartCount").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// Tag Access
// ============================================================================

#[tokio::test]
async fn test_read_tag() {
    let app = app(true).await;
    app.plc.set_tag("GVL_HMI.nPartCount", TagValue::Int(42));
    let (status, body) = app.get("/read?tag=GVL_HMI.nPartCount").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 42);
    assert_eq!(body["tag"], "GVL_HMI.nPartCount");
}

#[tokio::test]
async fn test_read_requires_tag() {
    let app = app(true).await;
    let (status, _) = app.get("/read").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_read_unknown_symbol_is_bad_gateway() {
    let app = app(true).await;
    let (status, body) = app.get("/read?tag=MAIN.bNoSuchTag").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("MAIN.bNoSuchTag"));
    // A rejected symbol does not drop the session.
    assert!(app.gateway.is_connected());

    let (_, status_body) = app.get("/status").await;
    assert_eq!(status_body["disconnectedTags"], json!(["MAIN.bNoSuchTag"]));
}

#[tokio::test]
async fn test_read_when_disconnected() {
    let app = app(false).await;
    let (status, body) = app.get("/read?tag=GVL_HMI.nPartCount").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], 503);
}

#[tokio::test]
async fn test_read_axis_positions() {
    let app = app(true).await;
    app.plc
        .set_tag("GVL_Axis.fLeftAxis1ActPos", TagValue::Real(12.5));
    let (status, body) = app.get("/read-axis-positions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
    assert_eq!(body["left"]["axis1"], 12.5);
    assert_eq!(body["right"]["axis2"], 0.0);
}

#[tokio::test]
async fn test_write_default_tag() {
    let app = app(true).await;
    let (status, body) = app.post("/write", &json!({ "value": 7 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tag"], "GVL_HMI.nCommand");
    assert_eq!(app.plc.tag("GVL_HMI.nCommand"), Some(TagValue::Int(7)));
}

#[tokio::test]
async fn test_write_bool_coercion() {
    let app = app(true).await;
    let tag = "GVL_HMI.bLeftJogMode";

    for (raw, expected) in [
        (json!(true), true),
        (json!("true"), true),
        (json!(1), true),
        (json!("yes"), false),
        (json!(0), false),
        (json!(null), false),
    ] {
        let (status, body) = app
            .post("/write-bool", &json!({ "tag": tag, "value": raw }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], expected, "raw value {raw}");
        assert_eq!(app.plc.tag(tag), Some(TagValue::Bool(expected)));
    }
}

#[tokio::test]
async fn test_pulse_bool_returns_low() {
    let app = app(true).await;
    let tag = "GVL_HMI.bRightRunMode";
    let (status, _) = app
        .post("/pulse-bool", &json!({ "tag": tag, "durationMs": 5 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.plc.tag(tag), Some(TagValue::Bool(false)));

    let writes: Vec<TagValue> = app
        .plc
        .journal()
        .into_iter()
        .filter(|r| r.tag == tag)
        .map(|r| r.value)
        .collect();
    assert_eq!(writes, vec![TagValue::Bool(true), TagValue::Bool(false)]);
}

#[tokio::test]
async fn test_test_tags_defaults() {
    let app = app(true).await;
    let (status, body) = app.post("/test-tags", &json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), app.gateway.default_test_tags().len());
    assert_eq!(results[0]["tag"], "MAIN.nHeartbeat");
    assert_eq!(results[0]["status"], "ok");
    assert!(results.iter().any(|r| r["status"] == "error"));
}

// ============================================================================
// Indexed I/O
// ============================================================================

#[tokio::test]
async fn test_io_map_listing() {
    let app = app(false).await;
    let (status, body) = app.get("/io-map").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert!(entries
        .iter()
        .any(|e| e["index"] == 22 && e["tag"] == "GVL_IO.bPartEject"));
}

#[tokio::test]
async fn test_io_read_mixed_indexes() {
    let app = app(true).await;
    app.plc.set_tag("GVL_IO.bDoorClosed", TagValue::Bool(true));

    let (status, body) = app
        .post("/io/read", &json!({ "indexes": [1, "16", 99, "abc"] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(results[0]["value"], true);
    assert_eq!(results[1]["value"], false);
    assert!(results[2]["error"].is_string());
    assert!(results[3]["error"].is_string());
}

#[tokio::test]
async fn test_io_write_and_unknown_index() {
    let app = app(true).await;
    let (status, body) = app
        .post("/io/write", &json!({ "index": "18", "value": 1 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tag"], "GVL_IO.bCoolantPump");
    assert_eq!(
        app.plc.tag("GVL_IO.bCoolantPump"),
        Some(TagValue::Bool(true))
    );

    let (status, body) = app
        .post("/io/write", &json!({ "index": 99, "value": true }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_io_pulse() {
    let app = app(true).await;
    let (status, body) = app
        .post("/io/pulse", &json!({ "index": 22, "durationMs": 5 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tag"], "GVL_IO.bPartEject");
    assert_eq!(app.plc.tag("GVL_IO.bPartEject"), Some(TagValue::Bool(false)));
}

#[tokio::test]
async fn test_live_snapshot_before_first_poll() {
    let app = app(true).await;
    let (status, body) = app.get("/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tick"], 0);
    assert_eq!(body["left"]["stepDescription"], "Idle");
}
