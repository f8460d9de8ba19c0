//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: credential store, session machinery and entitlement services
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig, clock: Arc<dyn keyward_core::Clock>) -> anyhow::Result<Router> {
    let services = Arc::new(AppServices::build(config, clock).await?);
    Ok(router_with(services))
}

/// Router over already-wired services.
pub fn router_with(services: Arc<AppServices>) -> Router {
    // Session routes: require a valid, revalidated session.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        services.clone(),
        middleware::session_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::public_router())
        .merge(protected)
        .layer(Extension(services))
        .layer(ServiceBuilder::new())
}
