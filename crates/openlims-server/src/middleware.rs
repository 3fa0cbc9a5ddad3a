use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Assigns every request a UUID, stores it in request extensions for the
/// tracing span, and echoes it back on the response.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let id = Uuid::new_v4().to_string();
    let value = HeaderValue::from_str(&id)
        .unwrap_or_else(|_| HeaderValue::from_static("invalid-request-id"));

    req.extensions_mut().insert(value.clone());
    let mut res = next.run(req).await;
    res.headers_mut().insert("x-request-id", value);
    res
}
