use axum::{
    Router,
    routing::{get, patch, post},
};

pub mod admin;
pub mod auth;
pub mod entitlements;
pub mod internal;
pub mod system;
pub mod usage;
pub mod webhooks;

/// Endpoints that carry their own credentials (password, shared secrets).
pub fn public_router() -> Router {
    Router::new()
        .route("/auth/login", post(auth::login))
        .nest("/webhooks", webhooks::router())
        .nest("/internal", internal::router())
}

/// Endpoints behind the session middleware.
pub fn router() -> Router {
    Router::new()
        .route("/auth/session", get(auth::session))
        .route("/auth/profile", patch(auth::update_profile))
        .route("/entitlements", get(entitlements::list))
        .route("/entitlements/:feature", get(entitlements::check))
        .route("/usage", get(usage::get_usage))
        .route("/conversations", post(usage::start_conversation))
        .nest("/admin", admin::router())
}
