use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde_json::json;
use tracing::info;

use keyward_core::UserId;
use keyward_entitlements::MonthKey;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::SessionContext;

pub fn router() -> Router {
    Router::new().route("/usage/reset", post(reset_usage))
}

pub async fn reset_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<SessionContext>,
    Json(body): Json<dto::ResetUsageRequest>,
) -> axum::response::Response {
    if !ctx.is_admin() {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", "admin role required");
    }

    let user_id: UserId = match body.user_id.parse() {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let now = services.clock.now();
    let month = match body.month.as_deref().map(str::parse::<MonthKey>).transpose() {
        Ok(m) => m.unwrap_or_else(|| MonthKey::of(now)),
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = services.usage.reset_usage(user_id, month, now).await {
        return errors::usage_error_to_response(e);
    }
    info!(admin = %ctx.session().user_id, user_id = %user_id, month = %month, "usage reset by admin");

    Json(json!({ "user_id": user_id, "month": month.to_string(), "count": 0 })).into_response()
}
