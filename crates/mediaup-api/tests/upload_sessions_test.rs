//! Upload session API integration tests.
//!
//! Run with: `cargo test -p mediaup-api --test upload_sessions_test`

mod helpers;

use axum_test::TestServer;
use bytes::Bytes;
use helpers::auth::bearer;
use helpers::{relay_target, setup_test_app};
use mediaup_api::services::{session_key, SessionStore};
use mediaup_storage::Storage;
use serde_json::{json, Value};

async fn initiate(client: &TestServer, user: &str, body: Value) -> Value {
    let response = client
        .post("/uploads/sessions")
        .add_header("Authorization", bearer(user))
        .json(&body)
        .await;
    assert_eq!(response.status_code(), 201, "{}", response.text());
    response.json::<Value>()
}

fn png(size: u64) -> Value {
    json!({
        "fileName": "photo.png",
        "fileSize": size,
        "contentType": "image/png",
        "logicalType": "image"
    })
}

async fn relay_put(client: &TestServer, upload_url: &str, data: &'static [u8]) -> u16 {
    let (path, params) = relay_target(upload_url);
    let mut request = client.put(&path).content_type("image/png");
    for (key, value) in params {
        request = request.add_query_param(&key, value);
    }
    request.bytes(Bytes::from_static(data)).await.status_code().as_u16()
}

#[tokio::test]
async fn test_health_and_openapi() {
    let app = setup_test_app().await;
    let client = app.client();

    let health = client.get("/health").await;
    assert_eq!(health.status_code(), 200);
    assert_eq!(health.json::<Value>()["status"], "ok");

    let doc = client.get("/api-docs/openapi.json").await;
    assert_eq!(doc.status_code(), 200);
    assert!(doc.json::<Value>()["paths"]["/uploads/sessions"].is_object());
}

#[tokio::test]
async fn test_session_routes_require_token() {
    let app = setup_test_app().await;
    let client = app.client();

    let missing = client.post("/uploads/sessions").json(&png(5)).await;
    assert_eq!(missing.status_code(), 401);

    let garbage = client
        .post("/uploads/sessions")
        .add_header("Authorization", "Bearer not-a-jwt")
        .json(&png(5))
        .await;
    assert_eq!(garbage.status_code(), 401);
}

#[tokio::test]
async fn test_video_session_lifecycle_without_upload() {
    let app = setup_test_app().await;
    let client = app.client();

    let session = initiate(
        client,
        "user-1",
        json!({
            "fileName": "a.mp4",
            "fileSize": 10_000_000,
            "contentType": "video/mp4",
            "logicalType": "video"
        }),
    )
    .await;
    let id = session["sessionId"].as_str().unwrap();
    assert!(session["key"].as_str().unwrap().starts_with("videos/"));
    assert_eq!(session["ttl"], 3600);
    assert_eq!(session["uploadMode"], "direct");

    let confirm = client
        .post(&format!("/uploads/sessions/{}/confirm", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(confirm.status_code(), 400);
    assert_eq!(confirm.json::<Value>()["code"], "UPLOAD_NOT_COMPLETE");

    let cancel = client
        .delete(&format!("/uploads/sessions/{}", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(cancel.status_code(), 200);
    assert_eq!(cancel.json::<Value>()["status"], "cancelled");

    let again = client
        .post(&format!("/uploads/sessions/{}/confirm", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(again.status_code(), 409);
}

#[tokio::test]
async fn test_direct_upload_through_relay_then_confirm() {
    let app = setup_test_app().await;
    let client = app.client();

    let session = initiate(client, "user-1", png(5)).await;
    let id = session["sessionId"].as_str().unwrap();
    let upload_url = session["uploadUrl"].as_str().unwrap();

    let progress = client
        .get(&format!("/uploads/sessions/{}/progress", id))
        .add_header("Authorization", bearer("user-1"))
        .await
        .json::<Value>();
    assert_eq!(progress["status"], "pending");
    assert_eq!(progress["percentage"], 0);

    assert_eq!(relay_put(client, upload_url, b"hello").await, 201);

    let progress = client
        .get(&format!("/uploads/sessions/{}/progress", id))
        .add_header("Authorization", bearer("user-1"))
        .await
        .json::<Value>();
    assert_eq!(progress["percentage"], 100);

    let confirm = client
        .post(&format!("/uploads/sessions/{}/confirm", id))
        .add_header("Authorization", bearer("user-1"))
        .json(&json!({ "actualSize": 5 }))
        .await;
    assert_eq!(confirm.status_code(), 200);
    let file = confirm.json::<Value>();
    assert_eq!(file["size"], 5);
    assert_eq!(file["key"], session["key"]);
    assert_eq!(file["ownerId"], "user-1");

    let second = client
        .post(&format!("/uploads/sessions/{}/confirm", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(second.status_code(), 409);
    assert_eq!(second.json::<Value>()["code"], "CONFLICT");

    let cancel = client
        .delete(&format!("/uploads/sessions/{}", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(cancel.status_code(), 409);
    assert!(app.storage.exists(session["key"].as_str().unwrap()).await.unwrap());
}

#[tokio::test]
async fn test_relay_rejects_tampered_signature() {
    let app = setup_test_app().await;
    let client = app.client();

    let session = initiate(client, "user-1", png(5)).await;
    let upload_url = session["uploadUrl"].as_str().unwrap();
    let tampered = upload_url.replace("signature=", "signature=00");

    assert_eq!(relay_put(client, &tampered, b"hello").await, 403);
    assert!(!app.storage.exists(session["key"].as_str().unwrap()).await.unwrap());
}

#[tokio::test]
async fn test_other_users_get_forbidden() {
    let app = setup_test_app().await;
    let client = app.client();

    let session = initiate(client, "user-1", png(5)).await;
    let id = session["sessionId"].as_str().unwrap();

    for response in [
        client
            .get(&format!("/uploads/sessions/{}/progress", id))
            .add_header("Authorization", bearer("user-2"))
            .await,
        client
            .post(&format!("/uploads/sessions/{}/confirm", id))
            .add_header("Authorization", bearer("user-2"))
            .await,
        client
            .delete(&format!("/uploads/sessions/{}", id))
            .add_header("Authorization", bearer("user-2"))
            .await,
    ] {
        assert_eq!(response.status_code(), 403);
        assert_eq!(response.json::<Value>()["code"], "FORBIDDEN");
    }

    let unknown = client
        .get(&format!("/uploads/sessions/{}/progress", uuid::Uuid::new_v4()))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(unknown.status_code(), 404);
}

#[tokio::test]
async fn test_invalid_uploads_are_rejected() {
    let app = setup_test_app().await;
    let client = app.client();

    for body in [
        png(60 * 1024 * 1024),
        json!({
            "fileName": "clip.mp4",
            "fileSize": 10,
            "contentType": "video/mp4",
            "logicalType": "avatar"
        }),
        json!({
            "fileName": "photo.jpg",
            "fileSize": 10,
            "contentType": "image/png",
            "logicalType": "image"
        }),
    ] {
        let response = client
            .post("/uploads/sessions")
            .add_header("Authorization", bearer("user-1"))
            .json(&body)
            .await;
        assert_eq!(response.status_code(), 400);
        assert_eq!(response.json::<Value>()["code"], "INVALID_INPUT");
    }

    let unknown_type = client
        .post("/uploads/sessions")
        .add_header("Authorization", bearer("user-1"))
        .json(&json!({
            "fileName": "a.png",
            "fileSize": 10,
            "contentType": "image/png",
            "logicalType": "sticker"
        }))
        .await;
    assert_eq!(unknown_type.status_code(), 400);
}

#[tokio::test]
async fn test_expired_session_is_rejected() {
    let app = setup_test_app().await;
    let client = app.client();

    let session = initiate(client, "user-1", png(5)).await;
    let id: uuid::Uuid = session["sessionId"].as_str().unwrap().parse().unwrap();

    let key = session_key(&id);
    let mut stored = app.sessions.get(&key).await.unwrap().unwrap();
    stored.expires_at = chrono::Utc::now() - chrono::Duration::seconds(5);
    app.sessions
        .put(&key, stored, std::time::Duration::from_secs(60))
        .await
        .unwrap();

    let response = client
        .post(&format!("/uploads/sessions/{}/confirm", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(response.status_code(), 404);
    assert_eq!(response.json::<Value>()["code"], "SESSION_EXPIRED");
}

#[tokio::test]
async fn test_server_mode_parts_resume_and_complete() {
    let app = setup_test_app().await;
    let client = app.client();

    let mut body = png(10);
    body["uploadMode"] = json!("server");
    let session = initiate(client, "user-1", body).await;
    let id = session["sessionId"].as_str().unwrap();
    assert_eq!(session["uploadMode"], "server");
    assert_eq!(session["partSize"], 4);
    assert_eq!(session["totalParts"], 3);
    assert!(session.get("uploadUrl").is_none());

    let put_part = |index: u32, data: &'static [u8]| {
        client
            .put(&format!("/uploads/sessions/{}/parts/{}", id, index))
            .add_header("Authorization", bearer("user-1"))
            .bytes(Bytes::from_static(data))
    };

    assert_eq!(put_part(0, b"0123").await.status_code(), 200);
    assert_eq!(put_part(2, b"89").await.status_code(), 200);
    assert_eq!(put_part(3, b"xx").await.status_code(), 400);

    let parts = client
        .get(&format!("/uploads/sessions/{}/parts", id))
        .add_header("Authorization", bearer("user-1"))
        .await
        .json::<Value>();
    assert_eq!(parts["uploadedParts"], json!([0, 2]));
    assert_eq!(parts["totalParts"], 3);

    let early = client
        .post(&format!("/uploads/sessions/{}/parts/complete", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(early.status_code(), 400);

    assert_eq!(put_part(1, b"4567").await.status_code(), 200);

    let complete = client
        .post(&format!("/uploads/sessions/{}/parts/complete", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(complete.status_code(), 200);
    assert_eq!(complete.json::<Value>()["size"], 10);

    let confirm = client
        .post(&format!("/uploads/sessions/{}/confirm", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(confirm.status_code(), 200);

    let stored = app.storage.get(session["key"].as_str().unwrap()).await.unwrap();
    assert_eq!(stored, Bytes::from_static(b"0123456789"));
}

#[tokio::test]
async fn test_retry_reissues_url_and_detail_reports_it() {
    let app = setup_test_app().await;
    let client = app.client();

    let session = initiate(client, "user-1", png(5)).await;
    let id = session["sessionId"].as_str().unwrap();

    let retried = client
        .post(&format!("/uploads/sessions/{}/retry", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(retried.status_code(), 200, "{}", retried.text());
    let retried = retried.json::<Value>();
    assert_eq!(retried["retryCount"], 1);
    assert_eq!(retried["uploadMode"], "direct");
    let upload_url = retried["uploadUrl"].as_str().unwrap();

    assert_eq!(relay_put(client, upload_url, b"hello").await, 201);

    let detail = client
        .get(&format!("/uploads/sessions/{}/detail", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(detail.status_code(), 200);
    let detail = detail.json::<Value>();
    assert_eq!(detail["status"], "pending");
    assert_eq!(detail["percentage"], 100);
    assert_eq!(detail["retryCount"], 1);
    assert_eq!(detail["canResume"], true);
    assert!(detail["parts"].is_null());

    let confirm = client
        .post(&format!("/uploads/sessions/{}/confirm", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(confirm.status_code(), 200);

    let detail = client
        .get(&format!("/uploads/sessions/{}/detail", id))
        .add_header("Authorization", bearer("user-1"))
        .await
        .json::<Value>();
    assert_eq!(detail["status"], "completed");
    assert_eq!(detail["file"]["key"], session["key"]);

    let too_late = client
        .post(&format!("/uploads/sessions/{}/retry", id))
        .add_header("Authorization", bearer("user-1"))
        .await;
    assert_eq!(too_late.status_code(), 409);

    let stranger = client
        .get(&format!("/uploads/sessions/{}/detail", id))
        .add_header("Authorization", bearer("user-2"))
        .await;
    assert_eq!(stranger.status_code(), 403);
}
