//! End-to-end lifecycle flows over the HTTP surface: each type walks its
//! own legal path, illegal steps are refused, and the status invariant
//! holds after every call.

mod common;

use axum::http::{Method, StatusCode};
use common::{expect_status, seed_record, TestApp};
use medequip_api::lifecycle::allowed_statuses;
use medequip_api::models::{TransferStatus, TransferType};
use serde_json::{json, Value};
use std::str::FromStr;

async fn transition(app: &TestApp, token: &str, id: i64, action: &str) -> axum::response::Response {
    app.request(
        Method::PUT,
        &format!("/api/transfers/{}/status", id),
        Some(token),
        Some(json!({ "action": action })),
    )
    .await
}

fn status_of(body: &Value) -> TransferStatus {
    TransferStatus::from_str(body["data"]["status"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn external_transfer_walks_the_five_state_path() {
    let app = TestApp::new();
    let manager = app.token("manager", None, None);

    let response = app
        .request(
            Method::POST,
            "/api/transfers",
            Some(&manager),
            Some(json!({
                "transfer_type": "external",
                "equipment_id": 41,
                "equipment_name": "Ultrasound scanner",
                "facility_id": 1,
                "source_department_id": 10,
                "receiving_org": {
                    "name": "Regional Repair Center",
                    "contact_person": "J. Okafor",
                    "phone": "+1-555-0134",
                    "address": null
                },
                "expected_return_date": "2026-09-15",
                "reason": "annual calibration"
            })),
        )
        .await;
    let body = expect_status(response, StatusCode::CREATED).await;
    let id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(status_of(&body), TransferStatus::PendingApproval);
    assert!(body["data"]["request_code"]
        .as_str()
        .unwrap()
        .starts_with("TRF-"));

    for (action, expected) in [
        ("approve", TransferStatus::Approved),
        ("start_transfer", TransferStatus::InTransfer),
        ("hand_over", TransferStatus::HandedOver),
    ] {
        let response = transition(&app, &manager, id, action).await;
        let body = expect_status(response, StatusCode::OK).await;
        let status = status_of(&body);
        assert_eq!(status, expected);
        // Invariant: always within the legal set for the type.
        assert!(allowed_statuses(TransferType::External).contains(&status));
    }

    // Final step through the dedicated complete endpoint.
    let response = app
        .request(
            Method::POST,
            &format!("/api/transfers/{}/complete", id),
            Some(&manager),
            None,
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(status_of(&body), TransferStatus::Completed);
    // The return timestamp is stamped when completion leaves handed_over.
    assert!(body["data"]["returned_at"].is_string());
    assert!(body["data"]["completed_at"].is_string());
    assert!(body["data"]["approved_at"].is_string());
    assert!(body["data"]["handed_over_at"].is_string());
}

#[tokio::test]
async fn internal_transfer_cannot_be_handed_over() {
    let app = TestApp::new();
    let manager = app.token("manager", None, None);
    let record = seed_record(
        &app,
        TransferType::Internal,
        TransferStatus::InTransfer,
        Some(1),
        1,
    );

    let mutations = app.store.mutation_calls();
    let response = transition(&app, &manager, record.id, "hand_over").await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["message"].as_str().unwrap().contains("cannot move"));
    // Rejected by the status graph before the store mutation.
    assert_eq!(app.store.mutation_calls(), mutations);

    // The only legal step from here is completion.
    let response = transition(&app, &manager, record.id, "complete").await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(status_of(&body), TransferStatus::Completed);
}

#[tokio::test]
async fn steps_cannot_be_skipped() {
    let app = TestApp::new();
    let manager = app.token("manager", None, None);
    let record = seed_record(
        &app,
        TransferType::Internal,
        TransferStatus::PendingApproval,
        Some(1),
        1,
    );

    let response = transition(&app, &manager, record.id, "start_transfer").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = transition(&app, &manager, record.id, "complete").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn disposal_completes_straight_from_approved() {
    let app = TestApp::new();
    let manager = app.token("manager", None, None);
    let record = seed_record(
        &app,
        TransferType::Disposal,
        TransferStatus::Approved,
        Some(1),
        1,
    );

    let response = transition(&app, &manager, record.id, "complete").await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(status_of(&body), TransferStatus::Completed);
    // Disposal never passes through handover, so no return timestamp.
    assert!(body["data"]["returned_at"].is_null());
}

#[tokio::test]
async fn staff_cannot_approve_but_source_staff_can_start() {
    let app = TestApp::new();
    let record = seed_record(
        &app,
        TransferType::Internal,
        TransferStatus::PendingApproval,
        Some(1),
        1,
    );

    let source_staff = app.token("staff", Some(10), Some(vec![1]));
    let response = transition(&app, &source_staff, record.id, "approve").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let manager = app.token("manager", None, None);
    let response = transition(&app, &manager, record.id, "approve").await;
    assert_eq!(response.status(), StatusCode::OK);

    // Once approved, the source department may start the movement.
    let response = transition(&app, &source_staff, record.id, "start_transfer").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn delete_is_refused_after_approval_without_a_store_call() {
    let app = TestApp::new();
    let manager = app.token("manager", None, None);
    let record = seed_record(
        &app,
        TransferType::Internal,
        TransferStatus::Approved,
        Some(1),
        1,
    );

    let mutations = app.store.mutation_calls();
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/transfers/{}", record.id),
            Some(&manager),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.mutation_calls(), mutations);
}

#[tokio::test]
async fn pending_records_can_be_deleted_by_source_staff() {
    let app = TestApp::new();
    let record = seed_record(
        &app,
        TransferType::Internal,
        TransferStatus::PendingApproval,
        Some(1),
        1,
    );

    // Destination staff cannot delete: the rule is source-department only.
    let destination_staff = app.token("staff", Some(20), Some(vec![1]));
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/transfers/{}", record.id),
            Some(&destination_staff),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let source_staff = app.token("staff", Some(10), Some(vec![1]));
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/transfers/{}", record.id),
            Some(&source_staff),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let manager = app.token("manager", None, None);
    let response = app
        .get(&format!("/api/transfers/{}", record.id), Some(&manager))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn editing_is_closed_to_outside_departments() {
    let app = TestApp::new();
    let record = seed_record(
        &app,
        TransferType::Internal,
        TransferStatus::PendingApproval,
        Some(1),
        1,
    );

    let outsider = app.token("staff", Some(33), Some(vec![1]));
    let response = app
        .request(
            Method::PUT,
            &format!("/api/transfers/{}", record.id),
            Some(&outsider),
            Some(json!({ "reason": "hijacked justification" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let source_staff = app.token("staff", Some(10), Some(vec![1]));
    let response = app
        .request(
            Method::PUT,
            &format!("/api/transfers/{}", record.id),
            Some(&source_staff),
            Some(json!({ "reason": "corrected justification" })),
        )
        .await;
    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(body["data"]["reason"], "corrected justification");
}
