use super::*;
use axum::{body, body::Body, http::Request};
use storage::MEMORY_DATABASE_URL;
use tower::ServiceExt;

async fn test_app() -> Router {
    let storage = Storage::new(MEMORY_DATABASE_URL).await.expect("db");
    build_router(Arc::new(AppState {
        api: ApiContext { storage },
    }))
}

fn purifier_json(id: &str, name: &str, pincode: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "location": {
            "houseNoStreet": "9 Residency Road",
            "area": "Richmond Town",
            "pincode": pincode,
            "phoneNumber": "9876543210"
        },
        "status": true,
        "lastUpdated": "2001-01-01T00:00:00Z"
    })
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let app = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn post_then_list_round_trips_record_with_fresh_stamp() {
    let app = test_app().await;
    let created = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/purifiers",
            purifier_json("PWR-001", "Front Desk", "560025"),
        ))
        .await
        .expect("response");
    assert_eq!(created.status(), StatusCode::OK);
    let created: PurifierRecord = read_json(created).await;
    assert!(created.last_updated.timestamp() > 978_307_200);

    let listed = app
        .oneshot(Request::get("/purifiers").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(listed.status(), StatusCode::OK);
    let listed: Vec<PurifierRecord> = read_json(listed).await;
    assert_eq!(listed, vec![created]);
}

#[tokio::test]
async fn invalid_pincode_is_a_bad_request() {
    let app = test_app().await;
    let response = app
        .oneshot(json_request(
            "POST",
            "/purifiers",
            purifier_json("PWR-002", "Pantry", "12"),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = read_json(response).await;
    assert_eq!(error.code, ErrorCode::Validation);
}

#[tokio::test]
async fn status_patch_and_put_require_existing_record() {
    let app = test_app().await;
    let missing = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/purifiers/PWR-404/status",
            serde_json::json!({ "status": true }),
        ))
        .await
        .expect("response");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    app.clone()
        .oneshot(json_request(
            "POST",
            "/purifiers",
            purifier_json("PWR-003", "Lab", "560001"),
        ))
        .await
        .expect("create");

    let patched = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/purifiers/PWR-003/status",
            serde_json::json!({ "status": false }),
        ))
        .await
        .expect("response");
    assert_eq!(patched.status(), StatusCode::OK);
    let patched: PurifierRecord = read_json(patched).await;
    assert!(!patched.status);

    let replaced = app
        .oneshot(json_request(
            "PUT",
            "/purifiers/PWR-003",
            purifier_json("PWR-003", "Lab Annex", "560001"),
        ))
        .await
        .expect("response");
    assert_eq!(replaced.status(), StatusCode::OK);
    let replaced: PurifierRecord = read_json(replaced).await;
    assert_eq!(replaced.name, "Lab Annex");
}

#[tokio::test]
async fn delete_is_idempotent_over_http() {
    let app = test_app().await;
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::delete("/purifiers/PWR-005")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
