use axum::{
    extract::Request,
    http::{Method, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};

/// Log each request on arrival and on completion, at a level chosen by the
/// response status class.
pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    tracing::debug!(request_id = %request_id, method = %method, uri = %uri, "incoming request");

    let response = next.run(request).await;
    log_completion(&request_id, &method, &uri, response.status(), start.elapsed());
    response
}

fn log_completion(request_id: &str, method: &Method, uri: &Uri, status: StatusCode, took: Duration) {
    let duration_ms = took.as_millis() as u64;
    if status.is_server_error() {
        tracing::error!(request_id, %method, %uri, %status, duration_ms, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(request_id, %method, %uri, %status, duration_ms, "request rejected");
    } else {
        tracing::info!(request_id, %method, %uri, %status, duration_ms, "request completed");
    }
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
