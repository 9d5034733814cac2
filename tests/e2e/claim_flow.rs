//! Record, claim and oracle verification over HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{TestHarness, TestIdentity};
use primal_health::claim::{ClaimStatus, Currency, ProviderAction};
use primal_health::oracle::{Attestation, REASON_NOT_QUALIFYING};
use primal_health::ServiceEvent;
use reqwest::StatusCode;
use serde_json::{json, Value};

const PATIENT_KEY: &str = "patient-secret";

/// Register identities, submit a record and file a signed claim against it.
async fn file_claim(
    harness: &TestHarness,
    patient: &TestIdentity,
    provider: &TestIdentity,
    result: &str,
) -> Value {
    let (status, _) = harness
        .post(
            "/api/identities",
            &json!({ "did": patient.did, "role": "patient" }),
        )
        .await
        .expect("register patient");
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = harness
        .post(
            "/api/identities",
            &json!({ "did": provider.did, "role": "provider", "name": "Acme Health" }),
        )
        .await
        .expect("register provider");
    assert_eq!(status, StatusCode::CREATED);

    let (status, record) = harness
        .post(
            "/api/records",
            &json!({
                "patientDID": patient.did,
                "disease": "COVID-19",
                "result": result,
                "testType": "PCR",
                "labName": "City Lab",
            }),
        )
        .await
        .expect("submit record");
    assert_eq!(status, StatusCode::CREATED, "{record}");
    let record_id = record["recordId"].as_str().expect("record id");
    assert!(record["anchorTransaction"].is_string());

    let (status, prepared) = harness
        .post(
            &format!("/api/records/{record_id}/prepare"),
            &json!({ "encryptionKey": PATIENT_KEY }),
        )
        .await
        .expect("prepare");
    assert_eq!(status, StatusCode::OK, "{prepared}");
    assert_eq!(prepared["healthDataHash"], record["dataHash"]);

    let hash = prepared["healthDataHash"].as_str().expect("hash");
    let signature = patient.sign_claim(&provider.did, hash, 400.0, Currency::Sol);
    let (status, claim) = harness
        .post(
            "/api/claims",
            &json!({
                "patientDID": patient.did,
                "insuranceProviderDID": provider.did,
                "healthDataHash": hash,
                "encryptedHealthData": prepared["encryptedHealthData"],
                "claimAmount": 400.0,
                "currency": "SOL",
                "patientSignature": signature,
            }),
        )
        .await
        .expect("submit claim");
    assert_eq!(status, StatusCode::CREATED, "{claim}");
    assert_eq!(claim["status"], "pending");
    claim
}

#[tokio::test]
async fn test_positive_claim_is_verified_and_paid() {
    let mut harness = TestHarness::setup().await.expect("setup");
    let patient = TestIdentity::generate();
    let provider = TestIdentity::generate();
    let claim = file_claim(&harness, &patient, &provider, "positive").await;
    let claim_id = claim["claimId"].as_str().expect("claim id");

    let (status, outcome) = harness
        .post(
            &format!("/api/claims/{claim_id}/verify"),
            &json!({ "encryptionKey": PATIENT_KEY }),
        )
        .await
        .expect("verify");
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["claim"]["status"], "paid");
    assert_eq!(outcome["claim"]["paymentAmount"], 550.0);

    let attestation: Attestation =
        serde_json::from_value(outcome["attestation"].clone()).expect("attestation");
    assert_eq!(&attestation.oracle_did, harness.oracle_did());
    attestation.verify().expect("attestation signature");

    let (status, stored) = harness
        .get(&format!("/api/claims/{claim_id}"))
        .await
        .expect("status");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["status"], "paid");
    let tx = stored["paymentTransactionId"].as_str().expect("tx id");

    let (status, transaction) = harness
        .get(&format!("/api/transactions/{tx}"))
        .await
        .expect("transaction");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transaction["signature"], tx);

    // Anchor memo plus payout.
    assert_eq!(harness.ledger().len(), 2);

    let (status, claims) = harness
        .get(&format!("/api/claims?patientDID={}", patient.did))
        .await
        .expect("list");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claims.as_array().map(Vec::len), Some(1));

    let (status, records) = harness
        .get(&format!("/api/records?patientDID={}", patient.did))
        .await
        .expect("list records");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records.as_array().map(Vec::len), Some(1));
    assert_eq!(records[0]["dataHash"], stored["healthDataHash"]);

    let events = harness.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, ServiceEvent::ClaimPaid { claim_id: id, .. } if id == claim_id)));

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_negative_result_is_rejected() {
    let harness = TestHarness::setup().await.expect("setup");
    let patient = TestIdentity::generate();
    let provider = TestIdentity::generate();
    let claim = file_claim(&harness, &patient, &provider, "negative").await;
    let claim_id = claim["claimId"].as_str().expect("claim id");

    let (status, outcome) = harness
        .post(
            &format!("/api/claims/{claim_id}/verify"),
            &json!({ "encryptionKey": PATIENT_KEY }),
        )
        .await
        .expect("verify");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["claim"]["status"], "rejected");
    assert_eq!(outcome["claim"]["rejectionReason"], REASON_NOT_QUALIFYING);
    assert!(outcome["claim"].get("paymentTransactionId").is_none());

    // Terminal claims cannot be verified again.
    let (status, body) = harness
        .post(
            &format!("/api/claims/{claim_id}/verify"),
            &json!({ "encryptionKey": PATIENT_KEY }),
        )
        .await
        .expect("verify again");
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_only_the_claims_provider_may_act_on_it() {
    let harness = TestHarness::setup().await.expect("setup");
    let patient = TestIdentity::generate();
    let provider = TestIdentity::generate();
    let stranger = TestIdentity::generate();
    let claim = file_claim(&harness, &patient, &provider, "positive").await;
    let claim_id = claim["claimId"].as_str().expect("claim id");

    let (status, _) = harness
        .post(
            &format!("/api/claims/{claim_id}/pay"),
            &json!({
                "providerDID": stranger.did,
                "providerSignature": stranger.sign_provider_action(claim_id, ProviderAction::Pay, ClaimStatus::Paid),
            }),
        )
        .await
        .expect("pay");
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = harness
        .post(
            &format!("/api/claims/{claim_id}/status"),
            &json!({
                "providerDID": stranger.did,
                "providerSignature": stranger.sign_provider_action(claim_id, ProviderAction::SetStatus, ClaimStatus::Verified),
                "status": "verified",
            }),
        )
        .await
        .expect("status by stranger");
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = harness
        .post(
            &format!("/api/claims/{claim_id}/status"),
            &json!({
                "providerDID": provider.did,
                "providerSignature": provider.sign_provider_action(claim_id, ProviderAction::SetStatus, ClaimStatus::Rejected),
                "status": "rejected",
                "reason": "duplicate",
            }),
        )
        .await
        .expect("status by provider");
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["status"], "rejected");
    assert_eq!(updated["rejectionReason"], "duplicate");

    let (status, _) = harness
        .post(
            &format!("/api/claims/{claim_id}/pay"),
            &json!({
                "providerDID": provider.did,
                "providerSignature": provider.sign_provider_action(claim_id, ProviderAction::Pay, ClaimStatus::Paid),
            }),
        )
        .await
        .expect("pay rejected");
    assert_eq!(status, StatusCode::CONFLICT);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_provider_actions_must_be_signed_by_the_provider() {
    let harness = TestHarness::setup().await.expect("setup");
    let patient = TestIdentity::generate();
    let provider = TestIdentity::generate();
    let claim = file_claim(&harness, &patient, &provider, "positive").await;
    let claim_id = claim["claimId"].as_str().expect("claim id");

    // Naming the provider is not enough.
    let (status, body) = harness
        .post(
            &format!("/api/claims/{claim_id}/status"),
            &json!({ "providerDID": provider.did, "status": "verified" }),
        )
        .await
        .expect("unsigned status");
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());

    let forged = patient.sign_provider_action(claim_id, ProviderAction::SetStatus, ClaimStatus::Verified);
    let (status, _) = harness
        .post(
            &format!("/api/claims/{claim_id}/status"),
            &json!({ "providerDID": provider.did, "providerSignature": forged, "status": "verified" }),
        )
        .await
        .expect("forged status");
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = harness
        .post(
            &format!("/api/claims/{claim_id}/pay"),
            &json!({ "providerDID": provider.did }),
        )
        .await
        .expect("unsigned pay");
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A signature for verifying does not authorize a payout.
    let for_status = provider.sign_provider_action(claim_id, ProviderAction::SetStatus, ClaimStatus::Verified);
    let (status, _) = harness
        .post(
            &format!("/api/claims/{claim_id}/pay"),
            &json!({ "providerDID": provider.did, "providerSignature": for_status }),
        )
        .await
        .expect("replayed signature");
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, stored) = harness
        .get(&format!("/api/claims/{claim_id}"))
        .await
        .expect("status");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["status"], "pending");
    // Only the record anchor reached the ledger.
    assert_eq!(harness.ledger().len(), 1);

    let (status, verified) = harness
        .post(
            &format!("/api/claims/{claim_id}/status"),
            &json!({ "providerDID": provider.did, "providerSignature": for_status, "status": "verified" }),
        )
        .await
        .expect("signed status");
    assert_eq!(status, StatusCode::OK, "{verified}");
    assert_eq!(verified["status"], "verified");

    let (status, paid) = harness
        .post(
            &format!("/api/claims/{claim_id}/pay"),
            &json!({
                "providerDID": provider.did,
                "providerSignature": provider.sign_provider_action(claim_id, ProviderAction::Pay, ClaimStatus::Paid),
            }),
        )
        .await
        .expect("signed pay");
    assert_eq!(status, StatusCode::OK, "{paid}");
    assert_eq!(paid["status"], "paid");

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_record_cannot_back_two_claims() {
    let harness = TestHarness::setup().await.expect("setup");
    let patient = TestIdentity::generate();
    let provider = TestIdentity::generate();
    let claim = file_claim(&harness, &patient, &provider, "positive").await;

    let hash = claim["healthDataHash"].as_str().expect("hash");
    let (status, body) = harness
        .post(
            "/api/claims",
            &json!({
                "patientDID": patient.did,
                "insuranceProviderDID": provider.did,
                "healthDataHash": hash,
                "encryptedHealthData": claim["encryptedHealthData"],
                "claimAmount": 400.0,
                "currency": "SOL",
                "patientSignature": patient.sign_claim(&provider.did, hash, 400.0, Currency::Sol),
            }),
        )
        .await
        .expect("second claim");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("healthDataHash")));

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let harness = TestHarness::setup().await.expect("setup");
    let patient = TestIdentity::generate();

    let (status, body) = harness
        .post(
            "/api/records",
            &json!({ "patientDID": "did:solana:nope", "disease": "COVID-19", "result": "positive" }),
        )
        .await
        .expect("bad did");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("patientDID")));

    let (status, _) = harness
        .post(
            "/api/records",
            &json!({ "patientDID": patient.did, "disease": "COVID-19", "result": "maybe" }),
        )
        .await
        .expect("bad result");
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = harness
        .send(
            harness
                .client()
                .post(harness.url("/api/claims"))
                .header("content-type", "application/json")
                .body("{not json"),
        )
        .await
        .expect("malformed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = harness.get("/api/records").await.expect("missing query");
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = harness
        .post(
            "/api/identities",
            &json!({ "did": patient.did, "role": "provider" }),
        )
        .await
        .expect("provider without name");
    assert_eq!(status, StatusCode::BAD_REQUEST);

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_unknown_resources_are_not_found() {
    let harness = TestHarness::setup().await.expect("setup");
    let stranger = TestIdentity::generate();

    let (status, body) = harness.get("/api/claims/CLM-missing").await.expect("claim");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = harness
        .post(
            "/api/claims/CLM-missing/verify",
            &json!({ "encryptionKey": PATIENT_KEY }),
        )
        .await
        .expect("verify");
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = harness
        .get(&format!("/api/identities/{}", stranger.did))
        .await
        .expect("identity");
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = harness
        .post(
            "/api/records/rec-missing/prepare",
            &json!({ "encryptionKey": PATIENT_KEY }),
        )
        .await
        .expect("prepare");
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = harness
        .get("/api/transactions/unknownsignature")
        .await
        .expect("transaction");
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, claims) = harness
        .get(&format!("/api/claims?patientDID={}", stranger.did))
        .await
        .expect("list");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claims, json!([]));

    harness.teardown().await.expect("teardown");
}

#[tokio::test]
async fn test_health_reports_oracle() {
    let harness = TestHarness::setup().await.expect("setup");
    let (status, body) = harness.get("/health").await.expect("health");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["oracleDID"], harness.oracle_did().as_str());
    harness.teardown().await.expect("teardown");
}
