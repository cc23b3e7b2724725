//! Program validation and download acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - All ten steps of a side are written on every download
//! - Absent steps are cleared to the all-off pattern
//! - A failing step is reported by number while the others still land
//! - Downloads are refused with 503 while disconnected

use super::common::{app, full_program};
use axum::http::StatusCode;
use endform_common::{Positions, Program, Side, Step, TagValue};
use serde_json::json;

fn step_tag(prefix: &str, n: u8, field: &str) -> String {
    format!("{prefix}[{n}].{field}")
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_validate_good_program() {
    let app = app(false).await;
    let program = full_program("Flare 3/8", Side::Left, 10.0);
    let (status, body) = app
        .post("/validate-program", &json!({ "program": program }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["errors"], json!([]));
}

#[tokio::test]
async fn test_validate_reports_every_problem() {
    let app = app(false).await;
    let (status, body) = app
        .post(
            "/validate-program",
            &json!({ "program": { "name": "x", "side": "middle" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert!(body["errors"].as_array().unwrap().len() >= 2);
}

// ============================================================================
// Download
// ============================================================================

#[tokio::test]
async fn test_download_full_program() {
    let app = app(true).await;
    let program = full_program("Flare 3/8", Side::Left, 10.0);
    let (status, body) = app
        .post(
            "/write-program",
            &json!({ "side": "left", "program": program }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["errors"], json!([]));

    let prefix = &app.config.tags.left.program_prefix;
    assert_eq!(
        app.plc.tag(&step_tag(prefix, 7, "rAxis1Pos")),
        Some(TagValue::Real(17.0))
    );
    // Pattern 0: ID extend only.
    assert_eq!(
        app.plc.tag(&step_tag(prefix, 7, "bRedExt")),
        Some(TagValue::Bool(true))
    );
    assert_eq!(
        app.plc.tag(&step_tag(prefix, 7, "bExpExt")),
        Some(TagValue::Bool(false))
    );
}

#[tokio::test]
async fn test_download_clears_absent_steps() {
    let app = app(true).await;
    let prefix = app.config.tags.right.program_prefix.clone();
    app.plc
        .set_tag(&step_tag(&prefix, 2, "bExpRet"), TagValue::Bool(true));

    let program = Program::new("Sparse", Side::Right)
        .with_step(Step::new(1, Positions::new(1.0, 2.0), 3));
    let (status, body) = app
        .post(
            "/write-program",
            &json!({ "side": "right", "program": program }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        app.plc.tag(&step_tag(&prefix, 2, "bExpRet")),
        Some(TagValue::Bool(false))
    );
    assert_eq!(
        app.plc.tag(&step_tag(&prefix, 1, "bExpRet")),
        Some(TagValue::Bool(true))
    );
}

#[tokio::test]
async fn test_download_uses_request_side() {
    let app = app(true).await;
    let program = full_program("Bead", Side::Left, 40.0);
    let (status, _) = app
        .post(
            "/write-program",
            &json!({ "side": "right", "program": program }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let right = &app.config.tags.right.program_prefix;
    assert_eq!(
        app.plc.tag(&step_tag(right, 1, "rAxis1Pos")),
        Some(TagValue::Real(41.0))
    );
    assert!(app
        .plc
        .journal()
        .iter()
        .all(|r| !r.tag.starts_with(&app.config.tags.left.program_prefix)));
}

#[tokio::test]
async fn test_partial_failure_names_the_step() {
    let app = app(true).await;
    let prefix = app.config.tags.left.program_prefix.clone();
    app.plc
        .fail_tag(&step_tag(&prefix, 4, "rAxis2Pos"), "type mismatch");

    let program = full_program("Flare", Side::Left, 0.0);
    let (status, body) = app
        .post(
            "/write-program",
            &json!({ "side": "left", "program": program }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"], json!(["Step 4: type mismatch"]));
    assert_eq!(
        app.plc.tag(&step_tag(&prefix, 5, "rAxis1Pos")),
        Some(TagValue::Real(5.0))
    );
}

#[tokio::test]
async fn test_download_refused_when_disconnected() {
    let app = app(false).await;
    let program = full_program("Flare", Side::Left, 0.0);
    let (status, body) = app
        .post(
            "/write-program",
            &json!({ "side": "left", "program": program }),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert!(app.plc.journal().is_empty());
}

#[tokio::test]
async fn test_download_counted_in_metrics() {
    let app = app(true).await;
    let program = full_program("Flare", Side::Left, 0.0);
    app.post(
        "/write-program",
        &json!({ "side": "left", "program": program }),
    )
    .await;
    let (_, text) = app.get_text("/metrics").await;
    assert!(text.contains("endform_program_downloads_total{outcome=\"ok\"} 1"));
}
