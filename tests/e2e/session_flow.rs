//! Payment-gated sessions and analytics over HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::TestHarness;
use primal_health::claim::Currency;
use primal_health::session::PAYMENT_HEADER;
use primal_health::Ledger;
use reqwest::StatusCode;
use serde_json::json;

/// Pay the session price on the simulated ledger and return the signature.
async fn pay_for_session(harness: &TestHarness) -> String {
    harness
        .ledger()
        .transfer(harness.oracle_did(), 0.01, Currency::Usdc, "session")
        .await
        .expect("transfer")
}

#[tokio::test]
async fn test_session_requires_payment() {
    let harness = TestHarness::setup().await.expect("setup");

    let (status, body) = harness
        .post("/api/session", &json!({}))
        .await
        .expect("open");
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    let requirements = &body["paymentRequirements"];
    assert_eq!(requirements["header"], PAYMENT_HEADER);
    assert_eq!(requirements["recipientDID"], harness.oracle_did().as_str());
    assert_eq!(requirements["currency"], "USDC");

    let (status, body) = harness
        .send(
            harness
                .client()
                .post(harness.url("/api/session"))
                .header(PAYMENT_HEADER, "unknownsignature"),
        )
        .await
        .expect("bogus proof");
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(body["paymentRequirements"].is_object());

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_paid_session_unlocks_analytics() {
    let harness = TestHarness::setup().await.expect("setup");
    let proof = pay_for_session(&harness).await;

    let (status, session) = harness
        .send(
            harness
                .client()
                .post(harness.url("/api/session"))
                .header(PAYMENT_HEADER, proof.as_str()),
        )
        .await
        .expect("open");
    assert_eq!(status, StatusCode::CREATED, "{session}");
    assert_eq!(session["paymentTransaction"], proof.as_str());
    let token = session["token"].as_str().expect("token").to_string();

    // A proof buys exactly one session.
    let (status, _) = harness
        .send(
            harness
                .client()
                .post(harness.url("/api/session"))
                .header(PAYMENT_HEADER, proof.as_str()),
        )
        .await
        .expect("reuse");
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let (status, analytics) = harness
        .send(
            harness
                .client()
                .get(harness.url("/api/analytics/claims"))
                .bearer_auth(&token),
        )
        .await
        .expect("analytics");
    assert_eq!(status, StatusCode::OK, "{analytics}");
    assert_eq!(analytics["total"], 0);
    assert_eq!(analytics["totalPaid"], 0.0);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_analytics_rejects_missing_or_unknown_token() {
    let harness = TestHarness::setup().await.expect("setup");

    let (status, body) = harness
        .get("/api/analytics/claims")
        .await
        .expect("no token");
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = harness
        .send(
            harness
                .client()
                .get(harness.url("/api/analytics/claims"))
                .bearer_auth("deadbeef"),
        )
        .await
        .expect("bad token");
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_base64_payment_header_is_accepted() {
    use base64::Engine as _;

    let harness = TestHarness::setup().await.expect("setup");
    let proof = pay_for_session(&harness).await;
    let header = base64::engine::general_purpose::STANDARD
        .encode(json!({ "signature": proof }).to_string());

    let (status, session) = harness
        .send(
            harness
                .client()
                .post(harness.url("/api/session"))
                .header(PAYMENT_HEADER, header),
        )
        .await
        .expect("open");
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["paymentTransaction"], proof.as_str());

    harness.teardown().await.expect("teardown");
}
