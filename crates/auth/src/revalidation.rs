//! Remote invalidation of stateless sessions.
//!
//! A password change made on another device must eventually end every older session.
//! With no session table, two mechanisms feed that decision:
//!
//! - the periodic check: once `last_checked_at` is more than one interval old, the
//!   credential store is asked for the password-change timestamp;
//! - the `RevocationCache`: every change timestamp observed (pulled by a check or pushed
//!   by the credential backend) is remembered, so other sessions of the same account are
//!   ended at their next request instead of at their own next check.
//!
//! Opening a sealed session is pure; revalidation is this separate, explicit step.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::credentials::{CredentialStore, SharedSecret};
use crate::principal::normalize_email;
use crate::session::{Session, session_ttl};

/// Default interval between remote checks for one session.
pub fn revalidation_interval() -> Duration {
    Duration::minutes(10)
}

/// Latest known password-change time per account.
///
/// Entries older than the session lifetime can no longer invalidate anything and are
/// pruned on write.
#[derive(Debug, Default)]
pub struct RevocationCache {
    changes: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl RevocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest known change for `email`, if any.
    pub fn latest_change(&self, email: &str) -> Option<DateTime<Utc>> {
        let map = self.changes.read().ok()?;
        map.get(&normalize_email(email)).copied()
    }

    /// Remember a change. Keeps the maximum of the stored and the new timestamp.
    pub fn record_change(&self, email: &str, changed_at: DateTime<Utc>, now: DateTime<Utc>) {
        let Ok(mut map) = self.changes.write() else {
            return;
        };
        let entry = map.entry(normalize_email(email)).or_insert(changed_at);
        if changed_at > *entry {
            *entry = changed_at;
        }
        let horizon = now - session_ttl();
        map.retain(|_, at| *at > horizon);
    }

    pub fn len(&self) -> usize {
        self.changes.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a revalidation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidationOutcome {
    /// Not due and no known revocation.
    Skipped,
    /// Remote check succeeded; session still valid.
    Confirmed,
    /// Session ended by a newer password change.
    Revoked,
    /// Remote check failed; session left untouched (fail open).
    Unavailable,
}

/// Applies the revalidation rules to a session.
pub struct Revalidator<S> {
    store: S,
    secret: SharedSecret,
    interval: Duration,
    cache: Arc<RevocationCache>,
}

impl<S: CredentialStore> Revalidator<S> {
    pub fn new(store: S, secret: SharedSecret, cache: Arc<RevocationCache>) -> Self {
        Self {
            store,
            secret,
            interval: revalidation_interval(),
            cache,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn cache(&self) -> &Arc<RevocationCache> {
        &self.cache
    }

    pub fn is_due(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.last_checked_at() > self.interval
    }

    /// Revalidate and return the (possibly) updated session.
    pub async fn revalidate(&self, session: Session, now: DateTime<Utc>) -> Session {
        self.revalidate_with_outcome(session, now).await.0
    }

    pub async fn revalidate_with_outcome(
        &self,
        mut session: Session,
        now: DateTime<Utc>,
    ) -> (Session, RevalidationOutcome) {
        if session.force_logout() {
            return (session, RevalidationOutcome::Revoked);
        }

        if let Some(changed_at) = self.cache.latest_change(session.credential_email()) {
            if changed_at > session.issued_at() {
                info!(user_id = %session.user_id, "session revoked by known password change");
                session.mark_force_logout();
                session.record_check(now);
                return (session, RevalidationOutcome::Revoked);
            }
        }

        if !self.is_due(&session, now) {
            return (session, RevalidationOutcome::Skipped);
        }

        let changed_at = match self
            .store
            .get_password_changed_at(&self.secret, session.credential_email())
            .await
        {
            Ok(changed_at) => changed_at,
            Err(e) => {
                warn!(user_id = %session.user_id, error = %e, "session revalidation failed; keeping session");
                return (session, RevalidationOutcome::Unavailable);
            }
        };

        session.record_check(now);

        match changed_at {
            Some(changed_at) => {
                self.cache.record_change(session.credential_email(), changed_at, now);
                if changed_at > session.issued_at() {
                    info!(user_id = %session.user_id, "session revoked by password change");
                    session.mark_force_logout();
                    (session, RevalidationOutcome::Revoked)
                } else {
                    (session, RevalidationOutcome::Confirmed)
                }
            }
            None => (session, RevalidationOutcome::Confirmed),
        }
    }
}
