#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use connect_drive::config::AppConfig;
use connect_drive::infrastructure::database;
use connect_drive::services::jobs::{Job, JobQueue};
use connect_drive::services::monitoring::{ErrorReporter, MonitoringEvent};
use connect_drive::services::storage::{PresignedUrl, StorageService};
use connect_drive::{AppState, create_app};
use http_body_util::BodyExt;
use sea_orm::Database;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const PASSWORD: &str = "Sup3rSecret";

/// Object store that keeps sizes in memory. Tests call `put` to play the
/// client uploading through a pre-signed URL.
pub struct MockStorageService {
    objects: Mutex<HashMap<String, i64>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_deletes: AtomicBool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn put(&self, key: &str, size: i64) {
        self.objects.lock().unwrap().insert(key.to_string(), size);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn presign_upload(
        &self,
        key: &str,
        _content_type: &str,
        ttl: Duration,
    ) -> anyhow::Result<PresignedUrl> {
        Ok(PresignedUrl::new(
            format!("http://mock-s3/bucket/{}?X-Amz-Mock=put", key),
            "PUT",
            ttl,
        ))
    }

    async fn presign_download(
        &self,
        key: &str,
        _filename: &str,
        _content_type: &str,
        ttl: Duration,
    ) -> anyhow::Result<PresignedUrl> {
        Ok(PresignedUrl::new(
            format!("http://mock-s3/bucket/{}?X-Amz-Mock=get", key),
            "GET",
            ttl,
        ))
    }

    async fn object_size(&self, key: &str) -> anyhow::Result<Option<i64>> {
        Ok(self.objects.lock().unwrap().get(key).copied())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("simulated storage outage");
        }
        self.objects.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn bucket_reachable(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub events: Mutex<Vec<MonitoringEvent>>,
}

#[async_trait]
impl ErrorReporter for RecordingReporter {
    async fn report(&self, event: MonitoringEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub storage: Arc<MockStorageService>,
    pub reporter: Arc<RecordingReporter>,
    pub jobs_rx: mpsc::Receiver<Job>,
}

/// Small limits so quota paths are easy to hit.
pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: "integration-test-secret-0123456789abcdef".to_string(),
        default_storage_quota: 1000,
        max_upload_size: 800,
        ..AppConfig::default()
    }
}

pub async fn setup() -> TestApp {
    setup_with(test_config()).await
}

pub async fn setup_with(config: AppConfig) -> TestApp {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();

    let storage = Arc::new(MockStorageService::new());
    let reporter = Arc::new(RecordingReporter::default());
    let (jobs, jobs_rx) = JobQueue::new(64);

    let state = AppState::new(db, storage.clone(), config, jobs, reporter.clone());
    let app = create_app(state.clone());

    TestApp {
        app,
        state,
        storage,
        reporter,
        jobs_rx,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn register(&self, username: &str) -> Value {
        let (status, body) = self
            .request(
                "POST",
                "/auth/register",
                None,
                Some(json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body
    }

    pub async fn login(&self, username: &str) -> Value {
        let (status, body) = self
            .request(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body
    }

    /// Register a user and return a fresh access token.
    pub async fn user(&self, username: &str) -> String {
        self.register(username).await;
        let tokens = self.login(username).await;
        tokens["access_token"].as_str().unwrap().to_string()
    }

    pub async fn create_folder(&self, token: &str, name: &str, parent_id: Option<&str>) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/folders",
                Some(token),
                Some(json!({ "name": name, "parent_id": parent_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create folder failed: {}", body);
        body["id"].as_str().unwrap().to_string()
    }

    /// Request an upload, put `size` bytes into the mock store and complete it.
    pub async fn upload(
        &self,
        token: &str,
        name: &str,
        size: i64,
        folder_id: Option<&str>,
    ) -> Value {
        let (status, ticket) = self
            .request(
                "POST",
                "/files/uploads",
                Some(token),
                Some(json!({
                    "name": name,
                    "size": size,
                    "mime_type": "text/plain",
                    "folder_id": folder_id,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "upload request failed: {}", ticket);

        let file_id = ticket["file"]["id"].as_str().unwrap().to_string();
        self.storage.put(&self.object_key(token, &file_id), size);

        let (status, file) = self
            .request(
                "POST",
                &format!("/files/{}/complete", file_id),
                Some(token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "complete failed: {}", file);
        file
    }

    pub fn object_key(&self, token: &str, file_id: &str) -> String {
        let claims =
            connect_drive::utils::auth::validate_jwt(token, &self.state.config.jwt_secret)
                .unwrap();
        connect_drive::services::storage::object_key(&claims.sub, file_id)
    }

    pub async fn storage_used(&self, token: &str) -> i64 {
        let (_, me) = self.request("GET", "/users/me", Some(token), None).await;
        me["storage_used"].as_i64().unwrap()
    }

    /// Jobs submitted so far, without waiting.
    pub fn drain_jobs(&mut self) -> Vec<Job> {
        let mut jobs = Vec::new();
        while let Ok(job) = self.jobs_rx.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}
