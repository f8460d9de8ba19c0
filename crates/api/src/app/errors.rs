use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use keyward_auth::AuthError;
use keyward_core::DomainError;
use keyward_infra::{StoreError, SubscriptionError, UsageError};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::InvalidCredentials => {
            json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", err.to_string())
        }
        AuthError::Unauthorized => {
            error!("credential store rejected the shared secret");
            json_error(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized")
        }
        AuthError::TransientStore(msg) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "credential_store_unavailable",
            msg,
        ),
        AuthError::Configuration(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "configuration_error", msg)
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::CONFLICT, "invariant_violation", msg)
        }
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StoreError::Backend(msg) => {
            error!(error = %msg, "store failure");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", "storage unavailable")
        }
    }
}

pub fn subscription_error_to_response(err: SubscriptionError) -> axum::response::Response {
    match err {
        SubscriptionError::Domain(e) => domain_error_to_response(e),
        SubscriptionError::Store(e) => store_error_to_response(e),
        SubscriptionError::NotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", "no subscription found")
        }
    }
}

pub fn usage_error_to_response(err: UsageError) -> axum::response::Response {
    match err {
        UsageError::QuotaExceeded(report) => (
            StatusCode::FORBIDDEN,
            axum::Json(json!({
                "error": "quota_exceeded",
                "message": "monthly conversation limit reached",
                "usage": crate::app::dto::UsageResponse::from(report),
            })),
        )
            .into_response(),
        e @ UsageError::WriteFailed { .. } => {
            error!(error = %e, "usage write failed");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "usage_unavailable", "usage could not be recorded")
        }
        UsageError::Store(e) => store_error_to_response(e),
    }
}
