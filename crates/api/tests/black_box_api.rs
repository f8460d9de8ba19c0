use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use keyward_api::app::{router_with, services::AppServices};
use keyward_api::config::AppConfig;
use keyward_auth::{Credential, Role};
use keyward_core::{Clock, ManualClock};
use keyward_entitlements::Tier;
use keyward_infra::SubscriptionStore;
use reqwest::StatusCode;
use serde_json::json;

const PRIVATE_KEY: &str = include_str!("../../auth/tests/fixtures/assertion_private.pem");
const PUBLIC_KEY: &str = include_str!("../../auth/tests/fixtures/assertion_public.pem");

const STORE_SECRET: &str = "store-secret";
const WEBHOOK_SECRET: &str = "hook-secret";
const PUBLIC_URL: &str = "https://app.keyward.test";

struct TestServer {
    base_url: String,
    clock: Arc<ManualClock>,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("KEYWARD_SESSION_SECRET", "session-secret"),
            ("KEYWARD_CREDENTIAL_STORE_SECRET", STORE_SECRET),
            ("KEYWARD_WEBHOOK_SECRET", WEBHOOK_SECRET),
            ("KEYWARD_ASSERTION_PRIVATE_KEY", PRIVATE_KEY),
            ("KEYWARD_PUBLIC_URL", PUBLIC_URL),
            ("KEYWARD_PRODUCT_TIERS", "prod_ext=extended:monthly,prod_all=all_in_one:yearly"),
        ]);
        let config = AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
            .expect("test config");

        // Build app (same router as prod) over in-memory services, bound to an ephemeral port.
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let services = Arc::new(AppServices::in_memory(&config, clock.clone()));
        let app = router_with(services.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            clock,
            services,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn register(&self, email: &str, password: &str, role: Role) -> Credential {
        self.services
            .accounts
            .as_ref()
            .expect("in-memory credential store")
            .register(email, password, Some("Test User"), role, self.clock.now())
            .expect("register")
    }

    async fn login(&self, client: &reqwest::Client, email: &str, password: &str) -> String {
        let res = client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = res.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn get_json(
    client: &reqwest::Client,
    url: String,
    token: &str,
) -> (StatusCode, serde_json::Value) {
    let res = client.get(url).bearer_auth(token).send().await.unwrap();
    let status = res.status();
    let body = res.json().await.unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_is_public_and_session_routes_are_not() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/auth/session")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = get_json(&client, srv.url("/entitlements"), "v1.forged.token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_does_not_reveal_which_emails_exist() {
    let srv = TestServer::spawn().await;
    srv.register("alice@example.com", "hunter2", Role::Member);
    let client = reqwest::Client::new();

    let mut bodies = Vec::new();
    for (email, password) in [("alice@example.com", "wrong"), ("nobody@example.com", "hunter2")] {
        let res = client
            .post(srv.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        bodies.push(res.json::<serde_json::Value>().await.unwrap());
    }
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[0]["error"], "invalid_credentials");
}

#[tokio::test]
async fn session_materialization_returns_verifiable_service_token() {
    let srv = TestServer::spawn().await;
    let credential = srv.register("Bob@Example.com", "pw-bob", Role::Member);
    let client = reqwest::Client::new();

    let token = srv.login(&client, " bob@example.com ", "pw-bob").await;
    let res = client
        .get(srv.url("/auth/session"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-session-token"));
    let body: serde_json::Value = res.json().await.unwrap();

    assert_eq!(body["user"]["email"], "bob@example.com");
    assert_eq!(body["user"]["role"], "member");
    assert_eq!(body["subscription"]["tier"], "free");

    let service_token = body["service_token"].as_str().unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&["convex"]);
    validation.set_issuer(&[PUBLIC_URL]);
    let decoded = jsonwebtoken::decode::<serde_json::Value>(
        service_token,
        &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
        &validation,
    )
    .unwrap();
    assert_eq!(decoded.claims["sub"], credential.user_id.to_string());
    assert_eq!(
        decoded.claims["exp"].as_i64().unwrap() - decoded.claims["iat"].as_i64().unwrap(),
        3600
    );
}

#[tokio::test]
async fn profile_update_reseals_session() {
    let srv = TestServer::spawn().await;
    srv.register("carol@example.com", "pw-carol", Role::Member);
    let client = reqwest::Client::new();
    let token = srv.login(&client, "carol@example.com", "pw-carol").await;

    let res = client
        .patch(srv.url("/auth/profile"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Caroline" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let header = res.headers()["x-session-token"].to_str().unwrap().to_string();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["token"].as_str().unwrap(), header);
    assert_eq!(body["user"]["name"], "Caroline");

    let (status, session) = get_json(&client, srv.url("/auth/session"), &header).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["user"]["name"], "Caroline");
    assert_eq!(session["user"]["email"], "carol@example.com");
}

#[tokio::test]
async fn registration_trial_runs_seven_days_then_falls_back_to_free() {
    let srv = TestServer::spawn().await;
    let credential = srv.register("dana@example.com", "pw-dana", Role::Member);
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/internal/accounts/registered"))
        .header("x-keyward-secret", STORE_SECRET)
        .json(&json!({ "email": "dana@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tier"], "trial");
    assert_eq!(body["trial_days_left"], 7);

    let token = srv.login(&client, "dana@example.com", "pw-dana").await;
    let (status, entitlements) = get_json(&client, srv.url("/entitlements"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entitlements["features"].as_array().unwrap().len(), 8);
    assert_eq!(entitlements["subscription"]["trial_days_left"], 7);

    // A second registration signal does not grant another trial.
    let res = client
        .post(srv.url("/internal/accounts/registered"))
        .header("x-keyward-secret", STORE_SECRET)
        .json(&json!({ "email": "dana@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Day 8: the old session has expired; sign in again.
    srv.clock.advance(ChronoDuration::days(8));
    let (status, body) = get_json(&client, srv.url("/entitlements"), &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "session_expired");

    let token = srv.login(&client, "dana@example.com", "pw-dana").await;
    let (status, decision) = get_json(&client, srv.url("/entitlements/check_ins"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decision["allowed"], false);
    assert_eq!(decision["tier"], "free");

    let stored = srv
        .services
        .subscriptions
        .store()
        .load(credential.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.tier, Tier::Free);
    assert!(stored.trial_used);
}

#[tokio::test]
async fn unknown_feature_is_not_found() {
    let srv = TestServer::spawn().await;
    srv.register("erin@example.com", "pw-erin", Role::Member);
    let client = reqwest::Client::new();
    let token = srv.login(&client, "erin@example.com", "pw-erin").await;

    let (status, body) = get_json(&client, srv.url("/entitlements/teleportation"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_feature");
}

#[tokio::test]
async fn webhooks_require_their_secret_and_ack_unknown_products() {
    let srv = TestServer::spawn().await;
    srv.register("finn@example.com", "pw-finn", Role::Member);
    let client = reqwest::Client::new();
    let payload = json!({ "email": "finn@example.com", "product_id": "prod_all", "external_id": "sub_9" });

    let res = client
        .post(srv.url("/webhooks/subscriptions/activate"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/webhooks/subscriptions/activate"))
        .header("x-webhook-secret", STORE_SECRET)
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/webhooks/subscriptions/activate"))
        .header("x-webhook-secret", WEBHOOK_SECRET)
        .json(&json!({ "email": "finn@example.com", "product_id": "prod_unknown" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["ignored"], "unknown_product");

    let res = client
        .post(srv.url("/webhooks/subscriptions/activate"))
        .header("x-webhook-secret", WEBHOOK_SECRET)
        .json(&json!({ "email": "ghost@example.com", "product_id": "prod_all" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["received"], true);
    assert!(body["error"].is_string());

    let res = client
        .post(srv.url("/webhooks/subscriptions/activate"))
        .header("x-webhook-secret", WEBHOOK_SECRET)
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tier"], "all_in_one");

    let token = srv.login(&client, "finn@example.com", "pw-finn").await;
    let (_, decision) = get_json(&client, srv.url("/entitlements/memories"), &token).await;
    assert_eq!(decision["allowed"], true);
}

#[tokio::test]
async fn cancelled_paid_plan_keeps_access_until_period_end() {
    let srv = TestServer::spawn().await;
    srv.register("gail@example.com", "pw-gail", Role::Member);
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/webhooks/subscriptions/activate"))
        .header("x-webhook-secret", WEBHOOK_SECRET)
        .json(&json!({ "email": "gail@example.com", "product_id": "prod_ext", "external_id": "sub_1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    srv.clock.advance(ChronoDuration::days(3));
    let res = client
        .post(srv.url("/webhooks/subscriptions/cancel"))
        .header("x-webhook-secret", WEBHOOK_SECRET)
        .json(&json!({ "email": "gail@example.com", "external_id": "sub_1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "active");
    assert!(body["expires_at"].is_string());

    let token = srv.login(&client, "gail@example.com", "pw-gail").await;
    let (_, decision) = get_json(&client, srv.url("/entitlements/goals"), &token).await;
    assert_eq!(decision["allowed"], true);

    srv.clock.advance(ChronoDuration::days(29));
    let token = srv.login(&client, "gail@example.com", "pw-gail").await;
    let (_, decision) = get_json(&client, srv.url("/entitlements/goals"), &token).await;
    assert_eq!(decision["allowed"], false);
    assert_eq!(decision["reason"], "inactive");
}

#[tokio::test]
async fn free_quota_blocks_the_eleventh_conversation() {
    let srv = TestServer::spawn().await;
    srv.register("hank@example.com", "pw-hank", Role::Member);
    let client = reqwest::Client::new();
    let token = srv.login(&client, "hank@example.com", "pw-hank").await;

    for expected in 1..=10 {
        let res = client
            .post(srv.url("/conversations"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["count"], expected);
    }

    let res = client
        .post(srv.url("/conversations"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "quota_exceeded");
    assert_eq!(body["usage"]["remaining"], 0);

    let (status, usage) = get_json(&client, srv.url("/usage"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["count"], 10);
    assert_eq!(usage["limit"], 10);
    assert_eq!(usage["unlimited"], false);
}

#[tokio::test]
async fn admin_can_reset_usage_and_members_cannot() {
    let srv = TestServer::spawn().await;
    let member = srv.register("ivy@example.com", "pw-ivy", Role::Member);
    srv.register("root@example.com", "pw-root", Role::Admin);
    let client = reqwest::Client::new();
    let member_token = srv.login(&client, "ivy@example.com", "pw-ivy").await;
    let admin_token = srv.login(&client, "root@example.com", "pw-root").await;

    for _ in 0..10 {
        client
            .post(srv.url("/conversations"))
            .bearer_auth(&member_token)
            .send()
            .await
            .unwrap();
    }

    let reset = json!({ "user_id": member.user_id.to_string() });
    let res = client
        .post(srv.url("/admin/usage/reset"))
        .bearer_auth(&member_token)
        .json(&reset)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url("/admin/usage/reset"))
        .bearer_auth(&admin_token)
        .json(&reset)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/conversations"))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    // Admins are unlimited and never counted.
    let (_, usage) = get_json(&client, srv.url("/usage"), &admin_token).await;
    assert_eq!(usage["unlimited"], true);
    assert_eq!(usage["count"], 0);
}

#[tokio::test]
async fn password_change_elsewhere_forces_logout() {
    let srv = TestServer::spawn().await;
    srv.register("jo@example.com", "old-pw", Role::Member);
    let client = reqwest::Client::new();
    let laptop = srv.login(&client, "jo@example.com", "old-pw").await;
    let phone = srv.login(&client, "jo@example.com", "old-pw").await;

    srv.clock.advance(ChronoDuration::minutes(1));
    let changed_at = srv
        .services
        .accounts
        .as_ref()
        .unwrap()
        .change_password("jo@example.com", "new-pw", srv.clock.now())
        .unwrap();

    // Without a push the laptop session survives until its next revalidation tick.
    let (status, _) = get_json(&client, srv.url("/auth/session"), &laptop).await;
    assert_eq!(status, StatusCode::OK);

    srv.clock.advance(ChronoDuration::minutes(11));
    let (status, body) = get_json(&client, srv.url("/auth/session"), &laptop).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "session_expired");

    // The observed change also ends the sibling session; a push must carry the secret.
    let res = client
        .post(srv.url("/internal/credentials/changed"))
        .json(&json!({ "email": "jo@example.com", "changed_at": changed_at }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = get_json(&client, srv.url("/auth/session"), &phone).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "session_expired");

    let fresh = srv.login(&client, "jo@example.com", "new-pw").await;
    let (status, _) = get_json(&client, srv.url("/auth/session"), &fresh).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn pushed_password_change_is_honoured_at_next_request() {
    let srv = TestServer::spawn().await;
    srv.register("kim@example.com", "old-pw", Role::Member);
    let client = reqwest::Client::new();
    let token = srv.login(&client, "kim@example.com", "old-pw").await;

    srv.clock.advance(ChronoDuration::seconds(30));
    let res = client
        .post(srv.url("/internal/credentials/changed"))
        .header("x-keyward-secret", STORE_SECRET)
        .json(&json!({ "email": "kim@example.com", "changed_at": srv.clock.now() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (status, body) = get_json(&client, srv.url("/usage"), &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "session_expired");
}

#[tokio::test]
async fn patched_email_does_not_survive_a_password_change() {
    let srv = TestServer::spawn().await;
    srv.register("lee@example.com", "old-pw", Role::Member);
    let client = reqwest::Client::new();
    let token = srv.login(&client, "lee@example.com", "old-pw").await;

    let res = client
        .patch(srv.url("/auth/profile"))
        .bearer_auth(&token)
        .json(&json!({ "email": "nobody@elsewhere.test" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let patched = res.headers()["x-session-token"].to_str().unwrap().to_string();

    srv.clock.advance(ChronoDuration::minutes(1));
    srv.services
        .accounts
        .as_ref()
        .unwrap()
        .change_password("lee@example.com", "new-pw", srv.clock.now())
        .unwrap();

    srv.clock.advance(ChronoDuration::minutes(11));
    let (status, body) = get_json(&client, srv.url("/auth/session"), &patched).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "session_expired");
}

#[tokio::test]
async fn pushed_change_ends_a_session_with_a_patched_email() {
    let srv = TestServer::spawn().await;
    srv.register("max@example.com", "old-pw", Role::Member);
    let client = reqwest::Client::new();
    let token = srv.login(&client, "max@example.com", "old-pw").await;

    let res = client
        .patch(srv.url("/auth/profile"))
        .bearer_auth(&token)
        .json(&json!({ "email": "max-new@example.com" }))
        .send()
        .await
        .unwrap();
    let patched = res.headers()["x-session-token"].to_str().unwrap().to_string();

    srv.clock.advance(ChronoDuration::seconds(30));
    let res = client
        .post(srv.url("/internal/credentials/changed"))
        .header("x-keyward-secret", STORE_SECRET)
        .json(&json!({ "email": "max@example.com", "changed_at": srv.clock.now() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (status, body) = get_json(&client, srv.url("/usage"), &patched).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "session_expired");
}

#[tokio::test]
async fn authenticated_webhook_with_unreadable_payload_is_acknowledged() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for (path, body) in [
        ("/webhooks/subscriptions/activate", "{not json"),
        ("/webhooks/subscriptions/cancel", r#"{"external_id":"sub_1"}"#),
    ] {
        let res = client
            .post(srv.url(path))
            .header("x-webhook-secret", WEBHOOK_SECRET)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let ack: serde_json::Value = res.json().await.unwrap();
        assert_eq!(ack["received"], true);
        assert!(ack["error"].as_str().unwrap().starts_with("invalid_payload"));
    }

    let res = client
        .post(srv.url("/webhooks/subscriptions/activate"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn internal_hooks_check_the_secret_before_the_body() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for path in ["/internal/credentials/changed", "/internal/accounts/registered"] {
        let res = client
            .post(srv.url(path))
            .body("garbage")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "unauthorized");

        let res = client
            .post(srv.url(path))
            .header("x-keyward-secret", STORE_SECRET)
            .body("garbage")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_conversation_starts_stop_at_the_free_quota() {
    let srv = TestServer::spawn().await;
    srv.register("nia@example.com", "pw-nia", Role::Member);
    let client = reqwest::Client::new();
    let token = srv.login(&client, "nia@example.com", "pw-nia").await;

    let requests: Vec<_> = (0..20)
        .map(|_| {
            let client = client.clone();
            let url = srv.url("/conversations");
            let token = token.clone();
            tokio::spawn(async move { client.post(url).bearer_auth(token).send().await.unwrap().status() })
        })
        .collect();

    let mut created = 0;
    let mut refused = 0;
    for request in requests {
        match request.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::FORBIDDEN => refused += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!((created, refused), (10, 10));

    let (_, usage) = get_json(&client, srv.url("/usage"), &token).await;
    assert_eq!(usage["count"], 10);
}
