//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the fulfillment service
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use stockroom_infra::StoreError;

use crate::config::Config;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &Config) -> Result<Router, StoreError> {
    let services = services::build_services(config).await?;
    Ok(router_with(services))
}

/// Router over already-built services. Tests use this with a seeded in-memory store.
pub fn router_with(services: AppServices) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router().layer(Extension(Arc::new(services))))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
