mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use common::{PASSWORD, setup};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;
    let (status, body) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["storage"], "connected");
}

#[tokio::test]
async fn test_register_validation_and_conflicts() {
    let app = setup().await;
    app.register("alice").await;

    let (status, _) = app
        .request(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "alice", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .request(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "bob", "password": "weakpass" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["password"].is_array());

    let (status, _) = app
        .request(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "b", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .request(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "Wr0ngPassword" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_rotation_and_reuse_detection() {
    let app = setup().await;
    app.register("carol").await;
    let first = app.login("carol").await;
    assert_eq!(first["token_type"], "Bearer");
    let first_refresh = first["refresh_token"].as_str().unwrap();

    let (status, second) = app
        .request(
            "POST",
            "/auth/refresh",
            None,
            Some(json!({ "refresh_token": first_refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let second_refresh = second["refresh_token"].as_str().unwrap();
    assert_ne!(first_refresh, second_refresh);

    // Replaying the rotated token revokes the whole family
    let (status, _) = app
        .request(
            "POST",
            "/auth/refresh",
            None,
            Some(json!({ "refresh_token": first_refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(
            "POST",
            "/auth/refresh",
            None,
            Some(json!({ "refresh_token": second_refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let app = setup().await;
    app.register("dave").await;
    let tokens = app.login("dave").await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    for _ in 0..2 {
        let (status, _) = app
            .request(
                "POST",
                "/auth/logout",
                None,
                Some(json!({ "refresh_token": refresh })),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, _) = app
        .request(
            "POST",
            "/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = setup().await;
    let (status, _) = app.request("GET", "/files", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.request("GET", "/users/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.user("erin").await;
    let (status, me) = app.request("GET", "/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "erin");
    assert_eq!(me["storage_quota"], 1000);
    assert_eq!(me["storage_used"], 0);
    assert!(me.get("password_hash").is_none());

    // Query parameter tokens are accepted as well
    let (status, _) = app
        .request("GET", &format!("/users/me?token={}", token), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_and_security_headers() {
    let app = setup().await;
    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "trace-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "trace-42");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["cache-control"], "no-store");

    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

/// Log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_request_span_carries_generated_request_id() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = setup().await;
    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let request_id = response.headers()["x-request-id"]
        .to_str()
        .unwrap()
        .to_string();

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(
        output.contains(&format!("request_id={}", request_id)),
        "{}",
        output
    );
    assert!(!output.contains("request_id=unknown"));
}

#[tokio::test]
async fn test_upload_handshake() {
    let mut app = setup().await;
    let token = app.user("frank").await;

    let (status, ticket) = app
        .request(
            "POST",
            "/files/uploads",
            Some(&token),
            Some(json!({ "name": "notes.txt", "size": 120, "mime_type": "Text/Plain; charset=utf-8" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ticket["file"]["status"], "pending");
    assert_eq!(ticket["file"]["mime_type"], "text/plain");
    assert_eq!(ticket["upload"]["method"], "PUT");
    let file_id = ticket["file"]["id"].as_str().unwrap().to_string();
    let key = app.object_key(&token, &file_id);
    assert!(ticket["upload"]["url"].as_str().unwrap().contains(&key));

    // Pending files are invisible
    let (_, files) = app.request("GET", "/files", Some(&token), None).await;
    assert_eq!(files.as_array().unwrap().len(), 0);

    // Completing before the object exists is a conflict
    let (status, _) = app
        .request("POST", &format!("/files/{}/complete", file_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The stored size wins over the declared one
    app.storage.put(&key, 100);
    let (status, file) = app
        .request("POST", &format!("/files/{}/complete", file_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(file["status"], "available");
    assert_eq!(file["size"], 100);
    assert_eq!(app.storage_used(&token).await, 100);

    // Completing twice does not charge twice
    let (status, _) = app
        .request("POST", &format!("/files/{}/complete", file_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.storage_used(&token).await, 100);

    let (status, download) = app
        .request("GET", &format!("/files/{}/download", file_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(download["download"]["method"], "GET");
    assert!(download["download"]["url"].as_str().unwrap().contains(&key));

    let (_, files) = app.request("GET", "/files", Some(&token), None).await;
    assert_eq!(files.as_array().unwrap().len(), 1);
    assert!(app.drain_jobs().is_empty());
}

#[tokio::test]
async fn test_upload_rejects_bad_input() {
    let app = setup().await;
    let token = app.user("grace").await;

    let cases = [
        (json!({ "name": "../etc", "size": 10, "mime_type": "text/plain" }), StatusCode::UNPROCESSABLE_ENTITY),
        (json!({ "name": "a/b.txt", "size": 10, "mime_type": "text/plain" }), StatusCode::UNPROCESSABLE_ENTITY),
        (json!({ "name": "  ", "size": 10, "mime_type": "text/plain" }), StatusCode::UNPROCESSABLE_ENTITY),
        (json!({ "name": "ok.txt", "size": 0, "mime_type": "text/plain" }), StatusCode::UNPROCESSABLE_ENTITY),
        (json!({ "name": "ok.txt", "size": 10, "mime_type": "not a mime" }), StatusCode::BAD_REQUEST),
        (json!({ "name": "big.bin", "size": 801, "mime_type": "application/octet-stream" }), StatusCode::PAYLOAD_TOO_LARGE),
        (json!({ "name": "ok.txt", "size": 10, "mime_type": "text/plain", "folder_id": "missing" }), StatusCode::NOT_FOUND),
    ];

    for (body, expected) in cases {
        let (status, response) = app
            .request("POST", "/files/uploads", Some(&token), Some(body.clone()))
            .await;
        assert_eq!(status, expected, "{} -> {}", body, response);
    }
}

#[tokio::test]
async fn test_quota_enforcement() {
    let mut app = setup().await;
    let token = app.user("heidi").await;

    app.upload(&token, "a.bin", 500, None).await;

    // 500 used, 400 reserved, 100 left
    let (status, pending) = app
        .request(
            "POST",
            "/files/uploads",
            Some(&token),
            Some(json!({ "name": "b.bin", "size": 400, "mime_type": "application/octet-stream" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .request(
            "POST",
            "/files/uploads",
            Some(&token),
            Some(json!({ "name": "c.bin", "size": 200, "mime_type": "application/octet-stream" })),
        )
        .await;
    assert_eq!(status, StatusCode::INSUFFICIENT_STORAGE);

    let (_, me) = app.request("GET", "/users/me", Some(&token), None).await;
    assert_eq!(me["storage_reserved"], 400);

    // Client uploads more than it declared and more than fits
    let file_id = pending["file"]["id"].as_str().unwrap().to_string();
    let key = app.object_key(&token, &file_id);
    app.storage.put(&key, 600);
    let (status, _) = app
        .request("POST", &format!("/files/{}/complete", file_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::INSUFFICIENT_STORAGE);
    assert_eq!(app.storage_used(&token).await, 500);

    // The pending row is gone and its object is scheduled for deletion
    let jobs = app.drain_jobs();
    assert_eq!(
        jobs,
        vec![connect_drive::services::jobs::Job::delete_object(key)]
    );
    let (_, me) = app.request("GET", "/users/me", Some(&token), None).await;
    assert_eq!(me["storage_reserved"], 0);
}

#[tokio::test]
async fn test_file_names_unique_per_folder() {
    let app = setup().await;
    let token = app.user("ivan").await;
    let docs = app.create_folder(&token, "docs", None).await;

    app.upload(&token, "report.pdf", 10, None).await;
    app.upload(&token, "report.pdf", 10, Some(&docs)).await;

    let (status, _) = app
        .request(
            "POST",
            "/files/uploads",
            Some(&token),
            Some(json!({ "name": "report.pdf", "size": 10, "mime_type": "application/pdf" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Another user's namespace is separate
    let other = app.user("judy").await;
    app.upload(&other, "report.pdf", 10, None).await;
}

#[tokio::test]
async fn test_rename_and_move_file() {
    let app = setup().await;
    let token = app.user("mallory").await;
    let docs = app.create_folder(&token, "docs", None).await;
    let a = app.upload(&token, "a.txt", 10, None).await;
    app.upload(&token, "b.txt", 10, Some(&docs)).await;
    let a_id = a["id"].as_str().unwrap();

    let (status, _) = app
        .request("PATCH", &format!("/files/{}", a_id), Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, renamed) = app
        .request(
            "PATCH",
            &format!("/files/{}", a_id),
            Some(&token),
            Some(json!({ "name": "b.txt" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", renamed);

    // b.txt already exists inside docs
    let (status, _) = app
        .request(
            "PATCH",
            &format!("/files/{}", a_id),
            Some(&token),
            Some(json!({ "folder_id": docs })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // A rejected move plus rename leaves the file untouched
    let (status, _) = app
        .request(
            "PATCH",
            &format!("/files/{}", a_id),
            Some(&token),
            Some(json!({ "folder_id": docs, "name": "b.txt" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, unchanged) = app
        .request("GET", &format!("/files/{}", a_id), Some(&token), None)
        .await;
    assert!(unchanged["folder_id"].is_null());
    assert_eq!(unchanged["name"], "b.txt");

    // The final name is what must be free in the target folder
    let (status, moved) = app
        .request(
            "PATCH",
            &format!("/files/{}", a_id),
            Some(&token),
            Some(json!({ "folder_id": docs, "name": "c.txt" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", moved);
    assert_eq!(moved["folder_id"], docs.as_str());
    assert_eq!(moved["name"], "c.txt");

    // An explicit null moves it back to the root
    let (status, moved) = app
        .request(
            "PATCH",
            &format!("/files/{}", a_id),
            Some(&token),
            Some(json!({ "folder_id": null })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(moved["folder_id"].is_null());
}

#[tokio::test]
async fn test_files_are_private() {
    let app = setup().await;
    let owner = app.user("oscar").await;
    let intruder = app.user("trudy").await;
    let file = app.upload(&owner, "secret.txt", 10, None).await;
    let id = file["id"].as_str().unwrap();

    for (method, uri) in [
        ("GET", format!("/files/{}", id)),
        ("GET", format!("/files/{}/download", id)),
        ("DELETE", format!("/files/{}", id)),
    ] {
        let (status, _) = app.request(method, &uri, Some(&intruder), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
    }
}

#[tokio::test]
async fn test_folder_hierarchy() {
    let app = setup().await;
    let token = app.user("peggy").await;
    let a = app.create_folder(&token, "A", None).await;
    let b = app.create_folder(&token, "B", Some(&a)).await;
    let c = app.create_folder(&token, "C", Some(&b)).await;

    let (status, _) = app
        .request("POST", "/folders", Some(&token), Some(json!({ "name": "A" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Same name is fine in another parent
    app.create_folder(&token, "B", None).await;

    let (status, path) = app
        .request("GET", &format!("/folders/{}/path", c), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = path
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["A", "B", "C"]);

    let (_, tree) = app.request("GET", "/folders/tree", Some(&token), None).await;
    assert_eq!(tree.as_array().unwrap().len(), 4);

    // No cycles
    for target in [&a, &c] {
        let (status, _) = app
            .request(
                "PATCH",
                &format!("/folders/{}", a),
                Some(&token),
                Some(json!({ "parent_id": target })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    app.upload(&token, "inside.txt", 5, Some(&b)).await;
    let (status, detail) = app
        .request("GET", &format!("/folders/{}", b), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["folder"]["name"], "B");
    assert_eq!(detail["contents"]["folders"].as_array().unwrap().len(), 1);
    assert_eq!(detail["contents"]["files"].as_array().unwrap().len(), 1);

    // Moving C to the root as "A" collides there, and nothing is applied
    let (status, _) = app
        .request(
            "PATCH",
            &format!("/folders/{}", c),
            Some(&token),
            Some(json!({ "parent_id": null, "name": "A" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, detail) = app
        .request("GET", &format!("/folders/{}", c), Some(&token), None)
        .await;
    assert_eq!(detail["folder"]["parent_id"], b.as_str());
    assert_eq!(detail["folder"]["name"], "C");

    // Move C up to the root and rename it
    let (status, moved) = app
        .request(
            "PATCH",
            &format!("/folders/{}", c),
            Some(&token),
            Some(json!({ "parent_id": null, "name": "Top" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(moved["parent_id"].is_null());
    assert_eq!(moved["name"], "Top");
}
