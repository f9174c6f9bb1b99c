//! HTTP API handlers for cifra-api

pub mod health;
pub mod middleware;
pub mod song;

pub use health::health_routes;
pub use song::song_routes;
