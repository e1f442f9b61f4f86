use crate::AppState;
use crate::api::error::ErrorDetail;
use crate::api::middleware::request_id::REQUEST_ID_HEADER;
use crate::services::monitoring::MonitoringEvent;
use crate::utils::auth::Claims;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Forward every 5xx response to the configured error reporter.
pub async fn error_reporting_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let response = next.run(req).await;
    let status = response.status();

    if status.is_server_error() {
        let message = response
            .extensions()
            .get::<ErrorDetail>()
            .map(|d| d.0.clone())
            .unwrap_or_else(|| status.to_string());

        let mut event = MonitoringEvent::new("http", message);
        event.request_id = request_id;
        event.user_id = response.extensions().get::<Claims>().map(|c| c.sub.clone());
        event.method = Some(method);
        event.path = Some(path);
        event.status = Some(status.as_u16());

        let reporter = state.reporter.clone();
        tokio::spawn(async move { reporter.report(event).await });
    }

    response
}
