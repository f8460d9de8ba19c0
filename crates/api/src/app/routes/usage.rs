use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::SessionContext;

pub async fn get_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<SessionContext>,
) -> axum::response::Response {
    let now = services.clock.now();
    let identity = ctx.identity();

    let subscription = match services.subscriptions.get_user_subscription(identity.id, now).await {
        Ok(s) => s,
        Err(e) => return errors::subscription_error_to_response(e),
    };

    match services.usage.get_usage(&identity, subscription.as_ref(), now).await {
        Ok(report) => Json(dto::UsageResponse::from(report)).into_response(),
        Err(e) => errors::usage_error_to_response(e),
    }
}

/// Quota-gated conversation start.
pub async fn start_conversation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<SessionContext>,
) -> axum::response::Response {
    let now = services.clock.now();
    let identity = ctx.identity();

    let subscription = match services.subscriptions.get_user_subscription(identity.id, now).await {
        Ok(s) => s,
        Err(e) => return errors::subscription_error_to_response(e),
    };

    match services
        .usage
        .start_conversation(&identity, subscription.as_ref(), now)
        .await
    {
        Ok(report) => (StatusCode::CREATED, Json(dto::UsageResponse::from(report))).into_response(),
        Err(e) => errors::usage_error_to_response(e),
    }
}
