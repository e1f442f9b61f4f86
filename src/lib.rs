pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::auth_service::AuthService;
use crate::services::file_service::FileService;
use crate::services::folder_service::FolderService;
use crate::services::jobs::JobQueue;
use crate::services::monitoring::ErrorReporter;
use crate::services::quota::QuotaService;
use crate::services::recycle_service::RecycleService;
use crate::services::share_service::ShareService;
use crate::services::storage::StorageService;
use crate::services::worker::WorkerContext;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::refresh,
        api::handlers::auth::logout,
        api::handlers::users::get_profile,
        api::handlers::files::request_upload,
        api::handlers::files::complete_upload,
        api::handlers::files::list_files,
        api::handlers::files::get_file,
        api::handlers::files::update_file,
        api::handlers::files::delete_file,
        api::handlers::files::download_file,
        api::handlers::folders::create_folder,
        api::handlers::folders::folder_tree,
        api::handlers::folders::get_folder,
        api::handlers::folders::folder_path,
        api::handlers::folders::update_folder,
        api::handlers::folders::delete_folder,
        api::handlers::shares::create_share,
        api::handlers::shares::list_shares,
        api::handlers::shares::revoke_share,
        api::handlers::shares::resolve_share,
        api::handlers::shares::request_public_upload,
        api::handlers::shares::complete_public_upload,
        api::handlers::recycle::list_items,
        api::handlers::recycle::restore_item,
        api::handlers::recycle::purge_item,
        api::handlers::recycle::empty_bin,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::auth::RegisterRequest,
            api::handlers::auth::LoginRequest,
            api::handlers::auth::RefreshRequest,
            services::auth_service::TokenPair,
            api::handlers::users::UserProfileResponse,
            api::handlers::files::FileResponse,
            api::handlers::files::PresignedUrlResponse,
            api::handlers::files::UploadTicketResponse,
            api::handlers::files::DownloadResponse,
            api::handlers::files::UploadRequest,
            api::handlers::files::UpdateFileRequest,
            api::handlers::folders::FolderResponse,
            api::handlers::folders::FolderContentsResponse,
            api::handlers::folders::FolderDetailResponse,
            api::handlers::folders::TreeNode,
            api::handlers::folders::CreateFolderRequest,
            api::handlers::folders::UpdateFolderRequest,
            api::handlers::shares::CreateShareRequest,
            api::handlers::shares::ShareResponse,
            api::handlers::shares::ShareAccessRequest,
            api::handlers::shares::PublicShareResponse,
            api::handlers::shares::PublicUploadRequest,
            api::handlers::recycle::RecycleItemResponse,
            api::handlers::recycle::EmptyBinResponse,
            services::recycle_service::RestoredItem,
            api::handlers::health::HealthResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication endpoints"),
        (name = "users", description = "Account endpoints"),
        (name = "files", description = "File management endpoints"),
        (name = "folders", description = "Folder management endpoints"),
        (name = "shares", description = "Share link management"),
        (name = "public", description = "Unauthenticated share access"),
        (name = "recycle-bin", description = "Deleted items"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub config: AppConfig,
    pub auth_service: Arc<AuthService>,
    pub file_service: Arc<FileService>,
    pub folder_service: Arc<FolderService>,
    pub share_service: Arc<ShareService>,
    pub recycle_service: Arc<RecycleService>,
    pub quota: Arc<QuotaService>,
    pub jobs: JobQueue,
    pub reporter: Arc<dyn ErrorReporter>,
}

impl AppState {
    /// Wire the services together over one connection pool and job queue.
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        config: AppConfig,
        jobs: JobQueue,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let quota = Arc::new(QuotaService::new());
        let recycle_service = Arc::new(RecycleService::new(
            db.clone(),
            config.clone(),
            quota.clone(),
            jobs.clone(),
        ));
        let file_service = Arc::new(FileService::new(
            db.clone(),
            storage.clone(),
            config.clone(),
            quota.clone(),
            recycle_service.clone(),
            jobs.clone(),
        ));
        let folder_service = Arc::new(FolderService::new(db.clone(), recycle_service.clone()));
        let share_service = Arc::new(ShareService::new(db.clone(), file_service.clone()));
        let auth_service = Arc::new(AuthService::new(db.clone(), config.clone()));

        Self {
            db,
            storage,
            config,
            auth_service,
            file_service,
            folder_service,
            share_service,
            recycle_service,
            quota,
            jobs,
            reporter,
        }
    }

    pub fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            db: self.db.clone(),
            storage: self.storage.clone(),
            auth_service: self.auth_service.clone(),
            file_service: self.file_service.clone(),
            share_service: self.share_service.clone(),
            recycle_service: self.recycle_service.clone(),
            quota: self.quota.clone(),
            reporter: self.reporter.clone(),
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static("x-request-id")])
}

pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/users/me", get(api::handlers::users::get_profile))
        .route("/files", get(api::handlers::files::list_files))
        .route("/files/uploads", post(api::handlers::files::request_upload))
        .route(
            "/files/:id",
            get(api::handlers::files::get_file)
                .patch(api::handlers::files::update_file)
                .delete(api::handlers::files::delete_file),
        )
        .route(
            "/files/:id/complete",
            post(api::handlers::files::complete_upload),
        )
        .route(
            "/files/:id/download",
            get(api::handlers::files::download_file),
        )
        .route("/folders", post(api::handlers::folders::create_folder))
        .route("/folders/tree", get(api::handlers::folders::folder_tree))
        .route(
            "/folders/:id",
            get(api::handlers::folders::get_folder)
                .patch(api::handlers::folders::update_folder)
                .delete(api::handlers::folders::delete_folder),
        )
        .route("/folders/:id/path", get(api::handlers::folders::folder_path))
        .route(
            "/shares",
            get(api::handlers::shares::list_shares).post(api::handlers::shares::create_share),
        )
        .route(
            "/shares/:id",
            axum::routing::delete(api::handlers::shares::revoke_share),
        )
        .route(
            "/recycle-bin",
            get(api::handlers::recycle::list_items).delete(api::handlers::recycle::empty_bin),
        )
        .route(
            "/recycle-bin/:id",
            axum::routing::delete(api::handlers::recycle::purge_item),
        )
        .route(
            "/recycle-bin/:id/restore",
            post(api::handlers::recycle::restore_item),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            api::middleware::auth::auth_middleware,
        ));

    let public = Router::new()
        .route("/health", get(api::handlers::health::health_check))
        .route("/auth/register", post(api::handlers::auth::register))
        .route("/auth/login", post(api::handlers::auth::login))
        .route("/auth/refresh", post(api::handlers::auth::refresh))
        .route("/auth/logout", post(api::handlers::auth::logout))
        .route(
            "/public/shares/:token",
            post(api::handlers::shares::resolve_share),
        )
        .route(
            "/public/shares/:token/uploads",
            post(api::handlers::shares::request_public_upload),
        )
        .route(
            "/public/shares/:token/uploads/:file_id/complete",
            post(api::handlers::shares::complete_public_upload),
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public)
        .merge(protected)
        .layer(from_fn_with_state(
            state.clone(),
            api::middleware::error_reporting::error_reporting_middleware,
        ))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        // Inside the request id layer so every span carries the final id
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get(api::middleware::request_id::REQUEST_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request_id,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    tracing::info!("📥 {} {}", request.method(), request.uri().path());
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            "📤 Finished in {:?} with status {}",
                            latency,
                            response.status()
                        );
                    },
                ),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(from_fn(api::middleware::security::security_headers))
        .layer(cors_layer(&state.config.allowed_origins))
        // Bodies are small JSON documents; file bytes go straight to the store
        .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}
