//! REST API handlers.

use crate::gateway::{AxisPositions, Gateway, GatewayStatus, ReconfigureOutcome, TagCheck};
use crate::live::{LiveState, StateUpdater};
use crate::translator::TransferReport;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use endform_common::{
    from_json, parse_index, validate_json, HmiError, IoMapEntry, Program, Recipe, RecipeStore,
    Side, TagValue, ValidationReport,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Always false.
    pub success: bool,
    /// Human-readable message.
    pub error: String,
    /// HTTP status code.
    pub code: u16,
}

impl ApiError {
    /// Build an error with an explicit status.
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: status.as_u16(),
        }
    }
}

impl From<HmiError> for ApiError {
    fn from(err: HmiError) -> Self {
        let status = match &err {
            HmiError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            HmiError::Validation(_) => StatusCode::BAD_REQUEST,
            HmiError::UnknownIndex(_) | HmiError::NotFound(_) => StatusCode::NOT_FOUND,
            HmiError::Read { .. } | HmiError::Write { .. } | HmiError::Connect(_) => {
                StatusCode::BAD_GATEWAY
            }
            HmiError::Storage(_) | HmiError::Config(_) | HmiError::InvalidStateTransition { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn duration_ms(ms: Option<u64>) -> Option<Duration> {
    ms.map(Duration::from_millis)
}

fn tag_value(raw: &Value) -> Result<TagValue, ApiError> {
    from_json(raw).ok_or_else(|| {
        ApiError::new(StatusCode::BAD_REQUEST, format!("unsupported value: {raw}"))
    })
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always "ok".
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
}

/// Health check endpoint.
///
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /status
pub async fn get_status(Extension(gateway): Extension<Arc<Gateway>>) -> Json<GatewayStatus> {
    Json(gateway.status().await)
}

/// Optional tag query parameter.
#[derive(Debug, Deserialize)]
pub struct TagQuery {
    /// Tag name.
    pub tag: Option<String>,
}

/// Heartbeat diagnostic response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatDebugResponse {
    /// Connection state.
    pub connected: bool,
    /// Remembered heartbeat tag.
    pub heartbeat_tag: Option<String>,
    /// Result for every candidate.
    pub candidates: Vec<TagCheck>,
}

/// GET /heartbeat-debug?tag=
pub async fn heartbeat_debug(
    Extension(gateway): Extension<Arc<Gateway>>,
    Query(query): Query<TagQuery>,
) -> Json<HeartbeatDebugResponse> {
    let user_tag = query.tag.as_deref().filter(|t| !t.is_empty());
    let candidates = gateway.heartbeat_debug(user_tag).await;
    if gateway.is_connected() {
        gateway.probe_heartbeat(user_tag).await;
    }
    Json(HeartbeatDebugResponse {
        connected: gateway.is_connected(),
        heartbeat_tag: gateway.heartbeat_tag(),
        candidates,
    })
}

/// `POST /set-net-id` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetNetIdRequest {
    /// New AMS Net ID.
    pub net_id: String,
}

/// POST /set-net-id
pub async fn set_net_id(
    Extension(gateway): Extension<Arc<Gateway>>,
    Json(req): Json<SetNetIdRequest>,
) -> ApiResult<ReconfigureOutcome> {
    let outcome = gateway.reconfigure_target(req.net_id.trim()).await?;
    Ok(Json(outcome))
}

/// GET /read?tag=
pub async fn read_tag(
    Extension(gateway): Extension<Arc<Gateway>>,
    Query(query): Query<TagQuery>,
) -> ApiResult<Value> {
    let tag = query
        .tag
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "tag is required"))?;
    let value = gateway.read_tag(&tag).await?;
    Ok(Json(json!({ "success": true, "value": value, "tag": tag })))
}

/// Axis positions with connection state.
#[derive(Serialize)]
pub struct AxisPositionsResponse {
    /// Connection state.
    pub connected: bool,
    /// Positions, zero when disconnected.
    #[serde(flatten)]
    pub positions: AxisPositions,
}

/// GET /read-axis-positions
pub async fn read_axis_positions(
    Extension(gateway): Extension<Arc<Gateway>>,
) -> Json<AxisPositionsResponse> {
    let positions = gateway.read_axis_positions().await;
    Json(AxisPositionsResponse {
        connected: gateway.is_connected(),
        positions,
    })
}

/// `POST /write` body.
#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    /// Value for the default write tag.
    pub value: Value,
}

/// POST /write
pub async fn write_default(
    Extension(gateway): Extension<Arc<Gateway>>,
    Json(req): Json<WriteRequest>,
) -> ApiResult<Value> {
    let value = tag_value(&req.value)?;
    let tag = gateway.write_default(value).await?;
    Ok(Json(json!({ "success": true, "tag": tag, "value": req.value })))
}

/// `POST /write-bool` body.
#[derive(Debug, Deserialize)]
pub struct WriteBoolRequest {
    /// Target tag.
    pub tag: String,
    /// Raw value, coerced to a boolean.
    #[serde(default)]
    pub value: Option<Value>,
}

/// POST /write-bool
pub async fn write_bool(
    Extension(gateway): Extension<Arc<Gateway>>,
    Json(req): Json<WriteBoolRequest>,
) -> ApiResult<Value> {
    let value = gateway.write_boolean(&req.tag, req.value.as_ref()).await?;
    Ok(Json(json!({ "success": true, "tag": req.tag, "value": value })))
}

/// `POST /pulse-bool` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseRequest {
    /// Target tag.
    pub tag: String,
    /// High time; the configured default when absent.
    pub duration_ms: Option<u64>,
}

/// POST /pulse-bool
pub async fn pulse_bool(
    Extension(gateway): Extension<Arc<Gateway>>,
    Json(req): Json<PulseRequest>,
) -> ApiResult<Value> {
    gateway
        .pulse(&req.tag, duration_ms(req.duration_ms))
        .await?;
    Ok(Json(json!({ "success": true, "tag": req.tag })))
}

/// GET /io-map
pub async fn get_io_map(Extension(gateway): Extension<Arc<Gateway>>) -> Json<Vec<IoMapEntry>> {
    Json(gateway.io_map().entries().cloned().collect())
}

/// `POST /io/read` body.
#[derive(Debug, Deserialize)]
pub struct IoReadRequest {
    /// Indexes to read (integers or digit strings).
    pub indexes: Vec<Value>,
}

/// One `POST /io/read` result.
#[derive(Debug, Serialize)]
pub struct IoReadResult {
    /// Index as supplied.
    pub index: Value,
    /// Value read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<TagValue>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /io/read
pub async fn io_read(
    Extension(gateway): Extension<Arc<Gateway>>,
    Json(req): Json<IoReadRequest>,
) -> Json<Value> {
    let mut results = Vec::with_capacity(req.indexes.len());
    for raw in req.indexes {
        let outcome = match parse_index(&raw) {
            Ok(index) => gateway.read_io(index).await,
            Err(e) => Err(e),
        };
        results.push(match outcome {
            Ok(value) => IoReadResult {
                index: raw,
                value: Some(value),
                error: None,
            },
            Err(e) => IoReadResult {
                index: raw,
                value: None,
                error: Some(e.to_string()),
            },
        });
    }
    Json(json!({ "success": true, "results": results }))
}

/// `POST /io/write` body.
#[derive(Debug, Deserialize)]
pub struct IoWriteRequest {
    /// I/O index.
    pub index: Value,
    /// Raw value, coerced to a boolean.
    #[serde(default)]
    pub value: Option<Value>,
}

/// POST /io/write
pub async fn io_write(
    Extension(gateway): Extension<Arc<Gateway>>,
    Json(req): Json<IoWriteRequest>,
) -> ApiResult<Value> {
    let index = parse_index(&req.index)?;
    let (tag, value) = gateway.write_io(index, req.value.as_ref()).await?;
    Ok(Json(
        json!({ "success": true, "index": index, "tag": tag, "value": value }),
    ))
}

/// `POST /io/pulse` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoPulseRequest {
    /// I/O index.
    pub index: Value,
    /// High time; the configured default when absent.
    pub duration_ms: Option<u64>,
}

/// POST /io/pulse
pub async fn io_pulse(
    Extension(gateway): Extension<Arc<Gateway>>,
    Json(req): Json<IoPulseRequest>,
) -> ApiResult<Value> {
    let index = parse_index(&req.index)?;
    let tag = gateway.pulse_io(index, duration_ms(req.duration_ms)).await?;
    Ok(Json(json!({ "success": true, "index": index, "tag": tag })))
}

/// `POST /test-tags` body.
#[derive(Debug, Default, Deserialize)]
pub struct TestTagsRequest {
    /// Tags to read; the built-in list when empty.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// POST /test-tags
pub async fn test_tags(
    Extension(gateway): Extension<Arc<Gateway>>,
    Json(req): Json<TestTagsRequest>,
) -> Json<Value> {
    let results = gateway.test_tags(&req.tags).await;
    Json(json!({
        "connected": gateway.is_connected(),
        "results": results,
    }))
}

/// `POST /write-program` body.
#[derive(Debug, Deserialize)]
pub struct WriteProgramRequest {
    /// Target head. Overrides the side stored in the program.
    pub side: Side,
    /// Program to download.
    pub program: Program,
}

/// POST /write-program
///
/// Partial failure is a normal response with `success: false`.
pub async fn write_program(
    Extension(gateway): Extension<Arc<Gateway>>,
    Extension(updater): Extension<StateUpdater>,
    Json(req): Json<WriteProgramRequest>,
) -> ApiResult<TransferReport> {
    let mut program = req.program;
    if program.side != req.side {
        debug!(program_side = %program.side, side = %req.side, "Using request side");
        program.side = req.side;
    }
    if !gateway.is_connected() {
        return Err(HmiError::NotConnected.into());
    }
    let report = gateway.download_program(&program).await;
    updater.download_finished(program.side, &program.name, &report);
    Ok(Json(report))
}

/// `POST /validate-program` body.
#[derive(Debug, Deserialize)]
pub struct ValidateProgramRequest {
    /// Raw program document.
    pub program: Value,
}

/// POST /validate-program
pub async fn validate_program(Json(req): Json<ValidateProgramRequest>) -> Json<ValidationReport> {
    Json(validate_json(&req.program))
}

/// GET /live
pub async fn get_live(Extension(updater): Extension<StateUpdater>) -> Json<LiveState> {
    Json(updater.snapshot())
}

/// Side query parameter.
#[derive(Debug, Deserialize)]
pub struct SideQuery {
    /// Head.
    pub side: Side,
}

/// GET /recipes?side=
pub async fn list_recipes(
    Extension(store): Extension<Arc<RecipeStore>>,
    Query(query): Query<SideQuery>,
) -> ApiResult<Value> {
    let names = store.list(query.side)?;
    Ok(Json(json!({ "side": query.side, "recipes": names })))
}

/// `POST /recipes` body.
#[derive(Debug, Deserialize)]
pub struct SaveRecipeRequest {
    /// Head.
    pub side: Side,
    /// Recipe document.
    pub recipe: Recipe,
}

/// POST /recipes
pub async fn save_recipe(
    Extension(store): Extension<Arc<RecipeStore>>,
    Json(req): Json<SaveRecipeRequest>,
) -> ApiResult<Value> {
    let path = store.save(req.side, &req.recipe)?;
    info!(recipe = %req.recipe.name, side = %req.side, "Recipe saved via API");
    Ok(Json(json!({
        "success": true,
        "name": req.recipe.name,
        "file": path.file_name().and_then(|n| n.to_str()),
    })))
}

fn parse_side(raw: &str) -> Result<Side, ApiError> {
    raw.parse::<Side>().map_err(ApiError::from)
}

/// GET /recipes/:side/:name
pub async fn get_recipe(
    Extension(store): Extension<Arc<RecipeStore>>,
    Path((side, name)): Path<(String, String)>,
) -> ApiResult<Recipe> {
    let side = parse_side(&side)?;
    Ok(Json(store.load(side, &name)?))
}

/// DELETE /recipes/:side/:name
pub async fn delete_recipe(
    Extension(store): Extension<Arc<RecipeStore>>,
    Path((side, name)): Path<(String, String)>,
) -> ApiResult<Value> {
    let side = parse_side(&side)?;
    store.delete(side, &name)?;
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (HmiError::NotConnected, 503),
            (HmiError::Validation("bad".into()), 400),
            (HmiError::UnknownIndex(9), 404),
            (
                HmiError::Read {
                    tag: "t".into(),
                    message: "m".into(),
                },
                502,
            ),
            (HmiError::NotFound("recipe x (left)".into()), 404),
            (HmiError::Connect("no route to host".into()), 502),
            (HmiError::Storage("corrupt recipe".into()), 500),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).code, code);
        }
    }

    #[test]
    fn test_error_body_passes_message() {
        let err = ApiError::from(HmiError::Write {
            tag: "MAIN.x".into(),
            message: "0x704 invalid index offset".into(),
        });
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "0x704 invalid index offset");
    }
}
