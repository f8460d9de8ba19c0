//! Payment-provider webhooks.
//!
//! Authenticated by `x-webhook-secret`, a secret of their own. Once authenticated, every
//! delivery is acknowledged with 200 so the provider stops retrying; failures are logged and
//! reported in the body.

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
use keyward_core::UserId;
use keyward_entitlements::{BillingPeriod, Tier};
use keyward_infra::Activation;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::middleware::secret_header;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

pub fn router() -> Router {
    Router::new()
        .route("/subscriptions/activate", post(activate))
        .route("/subscriptions/cancel", post(cancel))
}

pub async fn activate(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let body: dto::ActivateWebhookRequest = match authorize_and_parse(&services, &headers, &body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let now = services.clock.now();

    let activation = match resolve_activation(&services, &body) {
        Ok(Some(a)) => a,
        Ok(None) => {
            warn!(product_id = ?body.product_id, "activation for unknown product ignored");
            return acknowledged(json!({ "received": true, "ignored": "unknown_product" }));
        }
        Err(msg) => return processing_failed(msg),
    };

    let email = normalize_email(&body.email);
    let user_id = match resolve_user(&services, &email).await {
        Ok(id) => id,
        Err(msg) => return processing_failed(msg),
    };

    match services.subscriptions.activate(user_id, &email, activation, now).await {
        Ok(sub) => {
            info!(user_id = %user_id, tier = %sub.tier, "subscription activated by webhook");
            acknowledged(json!({ "received": true, "tier": sub.tier, "status": sub.status }))
        }
        Err(e) => processing_failed(e.to_string()),
    }
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let body: dto::CancelWebhookRequest = match authorize_and_parse(&services, &headers, &body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let now = services.clock.now();

    let email = normalize_email(&body.email);
    let user_id = match resolve_user(&services, &email).await {
        Ok(id) => id,
        Err(msg) => return processing_failed(msg),
    };

    match services.subscriptions.cancel(user_id, body.external_id, now).await {
        Ok(sub) => {
            info!(
                user_id = %user_id,
                status = %sub.status,
                cancel_at_period_end = sub.cancel_at_period_end,
                "subscription cancelled by webhook"
            );
            acknowledged(json!({
                "received": true,
                "tier": sub.tier,
                "status": sub.status,
                "expires_at": sub.expires_at,
            }))
        }
        Err(e) => processing_failed(e.to_string()),
    }
}

fn authorize_and_parse<T: DeserializeOwned>(
    services: &AppServices,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<T, axum::response::Response> {
    let presented = secret_header(headers, WEBHOOK_SECRET_HEADER).unwrap_or_default();
    if !services.webhook_secret.matches(presented) {
        warn!("webhook rejected: bad or missing secret");
        return Err(errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized"));
    }
    // Authenticated deliveries are acknowledged even when unreadable; a 4xx would only
    // make the provider redeliver the same body.
    serde_json::from_slice(body).map_err(|e| processing_failed(format!("invalid_payload: {e}")))
}

/// `Ok(None)` for a product id the catalog does not know.
fn resolve_activation(
    services: &AppServices,
    body: &dto::ActivateWebhookRequest,
) -> Result<Option<Activation>, String> {
    let (tier, billing_period) = match (&body.product_id, &body.tier) {
        (Some(product_id), _) => match services.products.lookup(product_id) {
            Some(mapping) => (mapping.tier, Some(mapping.billing_period)),
            None => return Ok(None),
        },
        (None, Some(tier)) => {
            let tier: Tier = tier.parse().map_err(|e: keyward_core::DomainError| e.to_string())?;
            let billing_period = body
                .billing_period
                .as_deref()
                .map(str::parse::<BillingPeriod>)
                .transpose()
                .map_err(|e| e.to_string())?;
            (tier, billing_period)
        }
        (None, None) => return Err("product_id or tier is required".to_string()),
    };

    Ok(Some(Activation {
        tier,
        billing_period,
        external_id: body.external_id.clone(),
        provider: body.provider.clone(),
    }))
}

/// Existing subscription row first, then the credential store.
async fn resolve_user(services: &AppServices, email: &str) -> Result<UserId, String> {
    let now = services.clock.now();
    match services.subscriptions.find_by_email(email, now).await {
        Ok(Some(sub)) => return Ok(sub.user_id),
        Ok(None) => {}
        Err(e) => return Err(e.to_string()),
    }

    match services
        .credentials
        .get_credentials_by_email(&services.credential_secret, email)
        .await
    {
        Ok(Some(credential)) => Ok(credential.user_id),
        Ok(None) => Err("unknown account".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn acknowledged(body: serde_json::Value) -> axum::response::Response {
    (StatusCode::OK, Json(body)).into_response()
}

fn processing_failed(message: String) -> axum::response::Response {
    warn!(error = %message, "webhook processing failed");
    acknowledged(json!({ "received": true, "error": message }))
}
