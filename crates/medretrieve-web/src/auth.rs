//! Shared-secret gate for the invoke/job surface (§9: "no user accounts or
//! authorization beyond a simple shared-secret model"). A `None` secret
//! (the default) disables the check entirely, which is what local
//! development and the test suite run with.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

pub async fn require_shared_secret(
    State(secret): State<Arc<Option<String>>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = secret.as_ref() else {
        return Ok(next.run(req).await);
    };

    let provided = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_str()) {
        Ok(next.run(req).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}
