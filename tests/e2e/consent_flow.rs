//! Consent and privacy settings over HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{TestHarness, TestIdentity};
use primal_health::ServiceEvent;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_consent_grant_check_update_revoke() {
    let mut harness = TestHarness::setup().await.expect("setup");
    let patient = TestIdentity::generate();
    let provider = TestIdentity::generate();
    let check = |field: &str| {
        format!(
            "/api/consents/check?patientDID={}&providerDID={}&field={field}",
            patient.did, provider.did
        )
    };

    let (status, consent) = harness
        .post(
            "/api/consents",
            &json!({
                "patientDID": patient.did,
                "consentedData": ["diagnosticResult"],
                "authorizedProviderDIDs": [provider.did],
            }),
        )
        .await
        .expect("grant");
    assert_eq!(status, StatusCode::CREATED, "{consent}");
    assert_eq!(consent["revoked"], false);
    let consent_id = consent["consentId"].as_str().expect("consent id").to_string();

    let (_, allowed) = harness.get(&check("diagnosticResult")).await.expect("check");
    assert_eq!(allowed["allowed"], true);
    let (_, allowed) = harness.get(&check("notes")).await.expect("check notes");
    assert_eq!(allowed["allowed"], false);

    let (status, active) = harness
        .get(&format!("/api/consents?patientDID={}", patient.did))
        .await
        .expect("list");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active.as_array().map(Vec::len), Some(1));

    let (status, updated) = harness
        .put(
            &format!("/api/consents/{consent_id}"),
            &json!({ "consentedData": ["diagnosticResult", "notes"] }),
        )
        .await
        .expect("update");
    assert_eq!(status, StatusCode::OK, "{updated}");
    let (_, allowed) = harness.get(&check("notes")).await.expect("check notes");
    assert_eq!(allowed["allowed"], true);

    let (status, revoked) = harness
        .post(&format!("/api/consents/{consent_id}/revoke"), &json!({}))
        .await
        .expect("revoke");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revoked["revoked"], true);

    let (_, allowed) = harness.get(&check("diagnosticResult")).await.expect("check");
    assert_eq!(allowed["allowed"], false);
    let (_, active) = harness
        .get(&format!("/api/consents?patientDID={}", patient.did))
        .await
        .expect("list");
    assert_eq!(active, json!([]));

    let events = harness.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, ServiceEvent::ConsentGranted { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ServiceEvent::ConsentRevoked { .. })));

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_revoking_unknown_consent_reports_failure() {
    let harness = TestHarness::setup().await.expect("setup");
    let (status, body) = harness
        .post("/api/consents/no-such-consent/revoke", &json!({}))
        .await
        .expect("revoke");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["revoked"], false);
    assert_eq!(body["consentId"], "no-such-consent");
    assert!(body["error"].is_string());
    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_consent_rejects_unknown_fields_and_bad_dids() {
    let harness = TestHarness::setup().await.expect("setup");
    let patient = TestIdentity::generate();

    let (status, _) = harness
        .post(
            "/api/consents",
            &json!({ "patientDID": patient.did, "consentedData": ["bloodType"] }),
        )
        .await
        .expect("grant");
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = harness
        .post(
            "/api/consents",
            &json!({ "patientDID": patient.did, "authorizedProviderDIDs": ["nobody"] }),
        )
        .await
        .expect("grant");
    assert_eq!(status, StatusCode::BAD_REQUEST);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_privacy_settings_round_trip() {
    let harness = TestHarness::setup().await.expect("setup");
    let patient = TestIdentity::generate();
    let path = format!("/api/privacy/{}", patient.did);

    let (status, defaults) = harness.get(&path).await.expect("get");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(defaults["patientDID"], patient.did.as_str());
    assert_eq!(defaults["autoDelete"], false);

    let (status, updated) = harness
        .put(&path, &json!({ "autoDelete": true, "dataRetention": "minimal" }))
        .await
        .expect("put");
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["autoDelete"], true);
    assert_eq!(updated["dataRetention"], "minimal");

    let (_, fetched) = harness.get(&path).await.expect("get again");
    assert_eq!(fetched["autoDelete"], true);

    let (status, _) = harness
        .put(&path, &json!({ "shareWithEveryone": true }))
        .await
        .expect("unknown setting");
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = harness
        .get("/api/privacy/not-a-did")
        .await
        .expect("bad did");
    assert_eq!(status, StatusCode::BAD_REQUEST);

    harness.teardown().await.expect("teardown");
}
