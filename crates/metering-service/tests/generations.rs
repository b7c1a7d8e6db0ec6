//! Metered generation integration tests.
//!
//! The generation provider is a `wiremock` server; the tests drive the full
//! pipeline from HTTP request to ledger state.

mod common;

use common::TestHarness;
use serde_json::json;

use metering_core::{Plan, SubscriptionStatus};
use metering_store::Store;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn provider_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "a poem" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "image-1" })))
        .mount(&server)
        .await;
    server
}

fn harness_with_provider(server: &MockServer, rate_max: u32) -> TestHarness {
    let uri = server.uri();
    TestHarness::with_config(move |config| {
        config.text_provider_url = format!("{uri}/generate");
        config.image_provider_url = format!("{uri}/synthesize");
        config.rate_max_requests = rate_max;
    })
}

/// Upgrade the harness account to an active paid subscription.
fn upgrade_to_paid(harness: &TestHarness) {
    let mut account = metering_core::Account::new(harness.account_id.clone());
    account.plan = Plan::Standard;
    account.subscription_status = SubscriptionStatus::Active;
    account.credits_total = Plan::Standard.allotment();
    account.credits_remaining = Plan::Standard.allotment();
    harness.store.put_account(&account).unwrap();
}

#[tokio::test]
async fn text_generation_charges_one_credit() {
    let provider = provider_server().await;
    let harness = harness_with_provider(&provider, 100);

    let response = harness
        .server
        .post("/v1/generations")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "kind": "text_generation", "input": "write a poem" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["output"], "a poem");
    assert_eq!(body["cost_credits"], 1);
    assert_eq!(body["credits_remaining"], 9);
}

#[tokio::test]
async fn provider_failure_refunds_the_reservation() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&provider)
        .await;
    let harness = harness_with_provider(&provider, 100);

    let response = harness
        .server
        .post("/v1/generations")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "kind": "text_generation", "input": "write a poem" }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);

    // The balance is back where it started and the attempt is audited.
    let balance = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.auth_header())
        .await;
    let body: serde_json::Value = balance.json();
    assert_eq!(body["remaining"], 10);

    let usage = harness
        .server
        .get("/v1/usage")
        .add_header("authorization", harness.auth_header())
        .await;
    let body: serde_json::Value = usage.json();
    assert_eq!(body["records"][0]["outcome"], "refunded");
}

#[tokio::test]
async fn free_pool_exhausts_at_ten() {
    let provider = provider_server().await;
    let harness = harness_with_provider(&provider, 100);

    for _ in 0..10 {
        harness
            .server
            .post("/v1/generations")
            .add_header("authorization", harness.auth_header())
            .json(&json!({ "kind": "text_generation", "input": "go" }))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .post("/v1/generations")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "kind": "text_generation", "input": "go" }))
        .await;

    response.assert_status(axum::http::StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_credits");
    assert_eq!(body["error"]["details"]["remaining"], 0);
}

#[tokio::test]
async fn eleventh_request_is_rate_limited() {
    let provider = provider_server().await;
    let harness = harness_with_provider(&provider, 10);
    upgrade_to_paid(&harness);

    for _ in 0..10 {
        harness
            .server
            .post("/v1/generations")
            .add_header("authorization", harness.auth_header())
            .json(&json!({ "kind": "text_generation", "input": "go" }))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .post("/v1/generations")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "kind": "text_generation", "input": "go" }))
        .await;

    response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "rate_limited");

    // The rejected request never reached the ledger.
    let account = harness.store.get_account(&harness.account_id).unwrap().unwrap();
    assert_eq!(account.credits_remaining, 90);
}

#[tokio::test]
async fn image_synthesis_requires_a_paid_plan() {
    let provider = provider_server().await;
    let harness = harness_with_provider(&provider, 100);

    let response = harness
        .server
        .post("/v1/generations")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "kind": "image_synthesis", "input": "a cat" }))
        .await;

    response.assert_status(axum::http::StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "plan_required");

    // No charge happened.
    let account = harness.store.get_account(&harness.account_id).unwrap().unwrap();
    assert_eq!(account.credits_remaining, 10);
}

#[tokio::test]
async fn daily_image_cap_rejects_regardless_of_credits() {
    let provider = provider_server().await;
    let uri = provider.uri();
    let harness = TestHarness::with_config(move |config| {
        config.text_provider_url = format!("{uri}/generate");
        config.image_provider_url = format!("{uri}/synthesize");
        config.rate_max_requests = 100;
        config.daily_image_cap = 2;
    });
    upgrade_to_paid(&harness);

    for _ in 0..2 {
        harness
            .server
            .post("/v1/generations")
            .add_header("authorization", harness.auth_header())
            .json(&json!({ "kind": "image_synthesis", "input": "a cat" }))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .post("/v1/generations")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "kind": "image_synthesis", "input": "a cat" }))
        .await;

    response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "quota_exceeded");
    assert_eq!(body["error"]["details"]["used"], 2);

    // Plenty of credits remained; the quota is independent of the ledger.
    let account = harness.store.get_account(&harness.account_id).unwrap().unwrap();
    assert_eq!(account.credits_remaining, 98);
}

#[tokio::test]
async fn unknown_kind_is_a_bad_request() {
    let provider = provider_server().await;
    let harness = harness_with_provider(&provider, 100);

    harness
        .server
        .post("/v1/generations")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "kind": "video_rendering", "input": "x" }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let provider = provider_server().await;
    let harness = harness_with_provider(&provider, 100);

    harness
        .server
        .post("/v1/generations")
        .json(&json!({ "kind": "text_generation", "input": "x" }))
        .await
        .assert_status_unauthorized();
}
