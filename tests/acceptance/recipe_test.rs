//! Recipe storage acceptance tests.

use super::common::{app, full_program};
use axum::http::StatusCode;
use endform_common::Side;
use serde_json::json;

#[tokio::test]
async fn test_recipe_lifecycle() {
    let app = app(false).await;
    let recipe = json!({
        "name": "Flare 3/8",
        "description": "3/8 in. flare",
        "parameters": { "tubeOD": 9.525, "tubeID": 7.9, "finalSize": 12.0 },
        "program": full_program("Flare 3/8", Side::Left, 5.0),
    });

    let (status, body) = app
        .post("/recipes", &json!({ "side": "left", "recipe": recipe }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file"], "left_flare_3_8.json");

    let (status, body) = app.get("/recipes?side=left").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recipes"], json!(["Flare 3/8"]));

    let (_, body) = app.get("/recipes?side=right").await;
    assert_eq!(body["recipes"], json!([]));

    let (status, body) = app.get("/recipes/left/Flare%203%2F8").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parameters"]["tubeOD"], 9.525);
    assert_eq!(body["program"]["steps"]["10"]["positions"]["axis1"], 15.0);

    let (status, _) = app.delete("/recipes/left/Flare%203%2F8").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/recipes/left/Flare%203%2F8").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_corrupt_recipe_is_server_error() {
    let app = app(false).await;
    std::fs::write(app.recipes.path().join("left_broken.json"), "{ not json").unwrap();

    let (status, body) = app.get("/recipes/left/broken").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("corrupt recipe"));

    let (status, _) = app.delete("/recipes/left/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_recipe_rejects_unknown_side() {
    let app = app(false).await;
    let (status, body) = app.get("/recipes/middle/anything").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_recipe_written_to_configured_dir() {
    let app = app(false).await;
    app.post(
        "/recipes",
        &json!({ "side": "right", "recipe": { "name": "Bead 12" } }),
    )
    .await;
    assert!(app.recipes.path().join("right_bead_12.json").exists());
}
