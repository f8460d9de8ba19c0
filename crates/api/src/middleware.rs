use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{error, info};

use keyward_auth::SealError;

use crate::app::errors::json_error;
use crate::app::services::AppServices;
use crate::context::SessionContext;

/// Response header carrying the resealed session after every authenticated request.
pub const SESSION_HEADER: &str = "x-session-token";

/// Open the sealed session, revalidate it, and reseal the refreshed record.
///
/// A forced logout or an expired session is `401 session_expired`; anything else that
/// fails to open is `401 unauthorized`.
pub async fn session_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(req.headers()) else {
        return json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing session token");
    };

    let now = services.clock.now();
    let session = match services.sealer.open(token, now) {
        Ok(session) => session,
        Err(SealError::Expired) => {
            return json_error(StatusCode::UNAUTHORIZED, "session_expired", "session expired; sign in again");
        }
        Err(e) => {
            info!(error = %e, "rejected session token");
            return json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid session token");
        }
    };

    let session = services.revalidator.revalidate(session, now).await;
    if session.force_logout() {
        return json_error(StatusCode::UNAUTHORIZED, "session_expired", "credentials changed; sign in again");
    }

    let resealed = match services.sealer.seal(&session) {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "failed to reseal session");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "failed to reseal session");
        }
    };

    req.extensions_mut().insert(SessionContext::new(session));
    let mut response = next.run(req).await;

    // Handlers that rewrite the session (profile update) set the header themselves.
    if !response.headers().contains_key(SESSION_HEADER) {
        if let Ok(value) = HeaderValue::from_str(&resealed) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    response
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Value of a shared-secret header, if present and valid UTF-8.
pub fn secret_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
