//! Hooks called by the credential backend, authenticated with the credential store secret.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, warn};

use keyward_auth::normalize_email;
use keyward_entitlements::TrialLifecycleManager;
use keyward_infra::credential_store::http::SECRET_HEADER;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::middleware::secret_header;

pub fn router() -> Router {
    Router::new()
        .route("/credentials/changed", post(credentials_changed))
        .route("/accounts/registered", post(account_registered))
}

/// Secret first, body second: an unauthenticated caller only ever sees 401.
fn authorize_and_parse<T: DeserializeOwned>(
    services: &AppServices,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<T, axum::response::Response> {
    let presented = secret_header(headers, SECRET_HEADER).unwrap_or_default();
    if !services.credential_secret.matches(presented) {
        warn!("internal hook rejected: bad or missing secret");
        return Err(errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized"));
    }
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "internal hook payload rejected");
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_payload", e.to_string())
    })
}

/// Push of a password change; sessions issued before `changed_at` end at their next request.
pub async fn credentials_changed(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let body: dto::CredentialsChangedRequest = match authorize_and_parse(&services, &headers, &body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let now = services.clock.now();
    services
        .revalidator
        .cache()
        .record_change(&body.email, body.changed_at, now);
    info!(changed_at = %body.changed_at, "password change recorded");
    StatusCode::NO_CONTENT.into_response()
}

/// A new account exists in the credential backend: grant the registration trial.
pub async fn account_registered(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let body: dto::AccountRegisteredRequest = match authorize_and_parse(&services, &headers, &body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let now = services.clock.now();
    let email = normalize_email(&body.email);

    let credential = match services
        .credentials
        .get_credentials_by_email(&services.credential_secret, &email)
        .await
    {
        Ok(Some(c)) => c,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "unknown_account", "unknown account"),
        Err(e) => return errors::auth_error_to_response(e.into()),
    };

    match services.subscriptions.grant_trial(credential.user_id, &email, now).await {
        Ok(sub) => (
            StatusCode::CREATED,
            Json(json!({
                "user_id": sub.user_id,
                "tier": sub.tier,
                "expires_at": sub.expires_at,
                "trial_days_left": TrialLifecycleManager::trial_days_left(Some(&sub), now),
            })),
        )
            .into_response(),
        Err(e) => errors::subscription_error_to_response(e),
    }
}
