use axum::Router;

pub mod fulfillment;
pub mod system;

/// Router for the fulfillment endpoints.
pub fn router() -> Router {
    Router::new().nest("/fulfillment", fulfillment::router())
}
