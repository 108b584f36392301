use crate::common::{setup_test_db, test_config};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use entity::sea_orm_active_enums::{CreditPaymentStatus, CreditServiceType, OrderStatus, OrderType};
use membership_credit::{
    jobs::LocalJobLock, models::credit::CreditPayIntent, routes::create_router, AppState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

async fn app() -> (Router, AppState) {
    let db = setup_test_db().await;
    let state = AppState::with_connection(db, test_config(), Arc::new(LocalJobLock::new()))
        .await
        .unwrap();
    (create_router(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Value, Option<String>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body, request_id)
}

async fn open_session(state: &AppState, user_id: Uuid) -> Uuid {
    let membership = state
        .services
        .membership
        .new_membership_account(user_id)
        .await
        .unwrap();
    let payments = &state.services.credit_payment;
    let record_id = payments
        .new_payment_order(
            membership.id,
            user_id,
            &CreditPayIntent::service_cost(CreditServiceType::Translate, 250),
        )
        .await
        .unwrap();
    payments.pay(user_id, membership.id, record_id).await.unwrap();
    record_id
}

#[tokio::test]
async fn test_health_echoes_request_id() {
    let (app, state) = app().await;
    assert_eq!(state.scheduler.job_count(), 3);

    let (status, body, request_id) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(request_id.is_some());
}

#[tokio::test]
async fn test_member_info_and_bills() {
    let (app, state) = app().await;
    let user_id = Uuid::new_v4();
    state
        .services
        .membership
        .new_membership_account(user_id)
        .await
        .unwrap();

    let (status, body, _) = send(&app, "GET", &format!("/api/v1/members/{}", user_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["membershipType"], "FREE");
    assert_eq!(body["data"]["credit"], 1000);
    assert_eq!(body["data"]["isExpired"], false);

    let (status, body, _) =
        send(&app, "GET", &format!("/api/v1/members/{}/bills", user_id)).await;
    assert_eq!(status, StatusCode::OK);
    let bills = body["data"].as_array().unwrap();
    assert_eq!(bills.len(), 2);
    assert_eq!(bills[0]["billType"], "EXPIRED");
    assert_eq!(bills[1]["billType"], "SUB_FREE");
    assert_eq!(bills[1]["afterCredit"], 1000);
}

#[tokio::test]
async fn test_unknown_member_is_not_found() {
    let (app, _) = app().await;

    let (status, body, _) =
        send(&app, "GET", &format!("/api/v1/members/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], 4001);

    let (status, _, _) = send(&app, "GET", "/api/v1/members/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_and_retrieve_sessions() {
    let (app, state) = app().await;

    let confirmed = open_session(&state, Uuid::new_v4()).await;
    let (status, body, _) = send(
        &app,
        "POST",
        &format!("/api/v1/credit-sessions/{}/confirm", confirmed),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "credit session confirmed");
    assert_eq!(
        state
            .services
            .credit_payment
            .get_record(confirmed)
            .await
            .unwrap()
            .status,
        CreditPaymentStatus::Success
    );

    let user_id = Uuid::new_v4();
    let retrieved = open_session(&state, user_id).await;
    let (status, _, _) = send(
        &app,
        "POST",
        &format!("/api/v1/credit-sessions/{}/retrieve", retrieved),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let membership = state
        .services
        .user_membership
        .get_base_info(user_id)
        .await
        .unwrap();
    assert_eq!(membership.credit, 1000);

    let (status, body, _) = send(
        &app,
        "POST",
        &format!("/api/v1/credit-sessions/{}/confirm", Uuid::new_v4()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 4106);
}

#[tokio::test]
async fn test_cancel_order() {
    let (app, state) = app().await;
    let user_id = Uuid::new_v4();
    state
        .services
        .membership
        .new_membership_account(user_id)
        .await
        .unwrap();
    let order = state
        .services
        .order
        .subscribe(user_id, OrderType::SubPro, 1)
        .await
        .unwrap();
    let uri = format!("/api/v1/orders/{}/cancel?user_id={}", order.id, user_id);

    let (status, body, _) = send(&app, "POST", &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cancelled"], true);
    assert_eq!(body["data"]["orderId"], order.id.to_string());

    let (status, body, _) = send(&app, "POST", &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cancelled"], false);
    assert_eq!(
        state
            .services
            .order
            .get_order(order.id)
            .await
            .unwrap()
            .order_status,
        OrderStatus::Cancelled
    );

    let (status, body, _) = send(
        &app,
        "POST",
        &format!("/api/v1/orders/{}/cancel?user_id={}", order.id, Uuid::new_v4()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 4109);
}
