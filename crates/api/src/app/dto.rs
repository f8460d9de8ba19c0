use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keyward_auth::{Identity, Role, Session};
use keyward_core::UserId;
use keyward_entitlements::{
    Feature, Subscription, SubscriptionStatus, Tier, TrialLifecycleManager, UsageReport,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActivateWebhookRequest {
    pub email: String,
    pub product_id: Option<String>,
    pub tier: Option<String>,
    pub billing_period: Option<String>,
    pub external_id: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelWebhookRequest {
    pub email: String,
    pub external_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsChangedRequest {
    pub email: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AccountRegisteredRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetUsageRequest {
    pub user_id: String,
    /// `YYYY-MM`; defaults to the current month.
    pub month: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
}

impl From<Identity> for UserResponse {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            name: identity.name,
            role: identity.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

impl LoginResponse {
    pub fn new(token: String, session: &Session) -> Self {
        Self {
            token,
            expires_at: session.expires_at(),
            user: session.identity().into(),
        }
    }
}

/// Subscription as clients see it; users without a row are reported as free and active.
#[derive(Debug, Serialize)]
pub struct SubscriptionSummary {
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub trial_days_left: i64,
}

impl SubscriptionSummary {
    pub fn new(subscription: Option<&Subscription>, now: DateTime<Utc>) -> Self {
        Self {
            tier: subscription.map(|s| s.tier).unwrap_or_default(),
            status: subscription.map(|s| s.status).unwrap_or(SubscriptionStatus::Active),
            expires_at: subscription.and_then(|s| s.expires_at),
            cancel_at_period_end: subscription.is_some_and(|s| s.cancel_at_period_end),
            trial_days_left: TrialLifecycleManager::trial_days_left(subscription, now),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserResponse,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    /// Bearer credential for the downstream data service; absent when signing is unavailable.
    pub service_token: Option<String>,
    pub service_token_expires_at: Option<DateTime<Utc>>,
    pub subscription: SubscriptionSummary,
}

#[derive(Debug, Serialize)]
pub struct EntitlementsResponse {
    pub subscription: SubscriptionSummary,
    pub features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub month: String,
    pub count: u32,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub unlimited: bool,
}

impl From<UsageReport> for UsageResponse {
    fn from(report: UsageReport) -> Self {
        Self {
            month: report.month.to_string(),
            count: report.count,
            limit: report.limit,
            remaining: report.remaining(),
            unlimited: report.unlimited,
        }
    }
}
