use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
};
use tracing::error;

use keyward_auth::ProfileUpdate;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::SessionContext;
use crate::middleware::SESSION_HEADER;

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::LoginRequest>,
) -> axum::response::Response {
    let now = services.clock.now();
    let session = match services.issuer.login(&body.email, &body.password, now).await {
        Ok(s) => s,
        Err(e) => return errors::auth_error_to_response(e),
    };

    match services.sealer.seal(&session) {
        Ok(token) => (StatusCode::OK, Json(dto::LoginResponse::new(token, &session))).into_response(),
        Err(e) => {
            error!(error = %e, "failed to seal session");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "failed to issue session")
        }
    }
}

/// Session materialization: identity, subscription summary and a fresh service assertion.
pub async fn session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<SessionContext>,
) -> axum::response::Response {
    let now = services.clock.now();
    let session = ctx.session();

    let subscription = match services.subscriptions.get_user_subscription(session.user_id, now).await {
        Ok(s) => s,
        Err(e) => return errors::subscription_error_to_response(e),
    };
    let assertion = services.signer.sign(Some(&session.user_id), now);

    Json(dto::SessionResponse {
        user: session.identity().into(),
        issued_at: session.issued_at(),
        expires_at: session.expires_at(),
        last_checked_at: session.last_checked_at(),
        service_token_expires_at: assertion.as_ref().and_then(|a| a.expires_at()),
        service_token: assertion.map(|a| a.token),
        subscription: dto::SubscriptionSummary::new(subscription.as_ref(), now),
    })
    .into_response()
}

/// Patch display name and/or e-mail on the session without re-authentication.
pub async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<SessionContext>,
    Json(body): Json<dto::ProfileUpdateRequest>,
) -> axum::response::Response {
    let mut session = ctx.into_session();
    session.apply_profile_update(ProfileUpdate {
        name: body.name,
        email: body.email,
    });

    let token = match services.sealer.seal(&session) {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "failed to reseal session");
            return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "failed to reseal session");
        }
    };

    let mut response = Json(dto::LoginResponse::new(token.clone(), &session)).into_response();
    if let Ok(value) = HeaderValue::from_str(&token) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}
