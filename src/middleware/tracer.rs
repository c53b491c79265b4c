use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const TRACER_HEADER: &str = "x-tracer-id";

/// Tags each request with a tracer id, kept from the caller when supplied,
/// and echoes it on the response
pub async fn tracer_middleware(request: Request, next: Next) -> Response {
    let tracer = request
        .headers()
        .get(TRACER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = info_span!(
        "request",
        tracer = %tracer,
        method = %request.method(),
        uri = %request.uri()
    );
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&tracer) {
        response.headers_mut().insert(TRACER_HEADER, value);
    }
    response
}
