use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use keyward_entitlements::{EntitlementResolver, Feature};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::SessionContext;

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<SessionContext>,
) -> axum::response::Response {
    let now = services.clock.now();
    let identity = ctx.identity();

    let subscription = match services.subscriptions.get_user_subscription(identity.id, now).await {
        Ok(s) => s,
        Err(e) => return errors::subscription_error_to_response(e),
    };

    Json(dto::EntitlementsResponse {
        features: EntitlementResolver::granted_features(&identity, subscription.as_ref(), now),
        subscription: dto::SubscriptionSummary::new(subscription.as_ref(), now),
    })
    .into_response()
}

/// Single-feature decision with the rule that produced it.
pub async fn check(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<SessionContext>,
    Path(feature): Path<String>,
) -> axum::response::Response {
    let Ok(feature) = feature.parse::<Feature>() else {
        return errors::json_error(StatusCode::NOT_FOUND, "unknown_feature", format!("unknown feature '{feature}'"));
    };

    let now = services.clock.now();
    let identity = ctx.identity();
    let subscription = match services.subscriptions.get_user_subscription(identity.id, now).await {
        Ok(s) => s,
        Err(e) => return errors::subscription_error_to_response(e),
    };

    Json(EntitlementResolver::explain(&identity, subscription.as_ref(), feature, now)).into_response()
}
