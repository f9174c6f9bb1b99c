//! cifra-api library - chord sheet HTTP service
//!
//! Thin request/response layer over the stored-procedure gateway in
//! `cifra-common`. Every request passes through the validation gate
//! ([`crud`]) before any procedure is called, and every response leaves in the
//! standard envelope ([`envelope`]).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::{middleware, Router};
use cifra_common::config::{Environment, ServerConfig};
use cifra_common::db::Gateway;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub mod api;
pub mod crud;
pub mod envelope;
pub mod error;
pub mod services;

pub use crud::{CallerIdentity, FixedIdentity, IdentityProvider};
pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    /// Resolves the caller's account and user for each request
    pub identity: Arc<dyn IdentityProvider>,
    pub environment: Environment,
    pub startup_time: Instant,
}

impl AppState {
    pub fn new(gateway: Gateway, environment: Environment) -> Self {
        Self {
            gateway,
            identity: Arc::new(FixedIdentity::default()),
            environment,
            startup_time: Instant::now(),
        }
    }

    /// Replace the identity provider
    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }
}

/// Router settings taken from the server configuration
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub api_version: String,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
    pub max_body_bytes: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            api_version: "v1".to_string(),
            cors_origins: Vec::new(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl From<&ServerConfig> for RouterOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            api_version: config.api_version.clone(),
            cors_origins: config.cors_origins.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// Base path of the internal song API, e.g. `/api/v1/internal`
pub fn internal_base_path(api_version: &str) -> String {
    format!("/api/{}/internal", api_version)
}

/// Build application router
pub fn build_router(state: AppState, options: &RouterOptions) -> Router {
    let routes = Router::new()
        .merge(api::health_routes())
        .nest(&internal_base_path(&options.api_version), api::song_routes());
    with_service_layers(routes, state, options)
}

/// Wrap routes in the fallback and the service layers
///
/// Layers, outermost first: CORS, request tracing, error envelope, panic
/// capture, body limit. The error envelope sits outside panic capture so a
/// panicking handler still answers with the standard error shape.
pub fn with_service_layers(
    routes: Router<AppState>,
    state: AppState,
    options: &RouterOptions,
) -> Router {
    routes
        .fallback(api::middleware::route_not_found)
        .layer(DefaultBodyLimit::max(options.max_body_bytes))
        .layer(CatchPanicLayer::custom(api::middleware::panic_response))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::middleware::error_envelope,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&options.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let base = CorsLayer::new().allow_methods(methods).allow_headers(Any);

    if origins.is_empty() {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    base.allow_origin(allowed)
}
