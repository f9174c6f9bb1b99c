//! Error envelope middleware, panic capture and route fallback
//!
//! Handlers and extractors render errors in their production form. This
//! middleware is the single place failed requests are logged, and outside
//! production it re-renders them with diagnostic `details`.

use std::any::Any;

use axum::{
    extract::{OriginalUri, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};

use crate::error::{ApiError, ApiFailure};
use crate::AppState;

/// Log failed requests and finalize their error envelope
pub async fn error_envelope(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let Some(failure) = response.extensions().get::<ApiFailure>().cloned() else {
        return response;
    };

    log_failure(&failure, &method, &path);

    if state.environment.is_production() || failure.diagnostics.is_none() {
        return response;
    }
    failure.render(true)
}

fn log_failure(failure: &ApiFailure, method: &Method, path: &str) {
    let status = failure.status.as_u16();
    if failure.status.is_server_error() {
        error!(
            status,
            code = failure.code,
            %method,
            path,
            cause = failure.diagnostics.as_deref().unwrap_or(""),
            "{}",
            failure.message
        );
    } else {
        warn!(status, code = failure.code, %method, path, "{}", failure.message);
    }
}

/// Response for a handler that panicked
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiFailure::panic(detail).render(false)
}

/// Fallback for unknown routes and unsupported methods
pub async fn route_not_found(method: Method, OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::NotFound(format!("Route {} {} not found", method, uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{StatusCode, Uri};
    use axum::response::IntoResponse;

    #[test]
    fn test_panic_response_carries_failure() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let failure = response.extensions().get::<ApiFailure>().unwrap();
        assert_eq!(failure.code, "INTERNAL_SERVER_ERROR");
        assert_eq!(failure.diagnostics.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_route_not_found_is_404() {
        let uri: Uri = "/nope".parse().unwrap();
        let response = route_not_found(Method::GET, OriginalUri(uri))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
