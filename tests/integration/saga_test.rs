use crate::common::setup;
use entity::{
    credit_payment_records,
    sea_orm_active_enums::{CreditPaymentStatus, CreditType, MembershipType},
};
use membership_credit::{
    services::feature_cost::{DocsUploadCost, NoteKind, TranslateKind},
    ApiError,
};
use sea_orm::{entity::*, query::*};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use uuid::Uuid;

async fn records_of(
    ctx: &crate::common::TestContext,
    user_id: Uuid,
) -> Vec<credit_payment_records::Model> {
    credit_payment_records::Entity::find()
        .filter(credit_payment_records::Column::UserId.eq(user_id))
        .all(&ctx.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_first_use_creates_the_membership() {
    let ctx = setup().await;
    let user_id = Uuid::new_v4();

    let session = ctx
        .services
        .membership
        .credit_fun_ai(user_id, "advanced", true, |session| async move { Ok(session) })
        .await
        .unwrap();

    let membership = ctx
        .services
        .user_membership
        .get_by_user_id(user_id)
        .await
        .unwrap();
    assert_eq!(membership.membership_type, MembershipType::Free);
    // Free grant of 1000 minus the 300 model cost
    assert_eq!(ctx.balances(membership.id).await, (700, 0));

    let record = ctx
        .services
        .credit_payment
        .get_record(session.expect("charged feature gets a session id"))
        .await
        .unwrap();
    assert_eq!(record.status, CreditPaymentStatus::Success);
}

#[tokio::test]
async fn test_failed_action_is_refunded() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(1000, 0).await;

    let err = ctx
        .services
        .membership
        .credit_fun_translate(user_id, TranslateKind::Ocr, true, |_| async {
            Err::<(), _>(ApiError::BadRequest("ocr backend down".into()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(ref msg) if msg == "ocr backend down"));

    assert_eq!(ctx.balances(membership_id).await, (1000, 0));
    let records = records_of(&ctx, user_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CreditPaymentStatus::Cancelled);
    ctx.assert_ledger_consistent(membership_id).await;
}

#[tokio::test]
async fn test_session_left_open_without_auto_confirm() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(1000, 0).await;

    let session = ctx
        .services
        .membership
        .credit_fun_translate(user_id, TranslateKind::Ocr, false, |session| async move {
            Ok(session)
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ctx.balances(membership_id).await, (800, 0));
    assert_eq!(
        ctx.services
            .credit_payment
            .get_record(session)
            .await
            .unwrap()
            .status,
        CreditPaymentStatus::AwaitingConfirmation
    );

    ctx.services
        .membership
        .retrieve_credit_fun(Some(session))
        .await
        .unwrap();
    assert_eq!(ctx.balances(membership_id).await, (1000, 0));
}

#[tokio::test]
async fn test_insufficient_credit_never_runs_the_action() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(100, 5000).await;
    let ran = Arc::new(AtomicBool::new(false));

    // Free tier may not fall back to add-on credit
    let flag = ran.clone();
    let err = ctx
        .services
        .membership
        .credit_fun_ai(user_id, "advanced", true, |_| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::CreditNotEnough { need: 300, have: 100 }));
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(ctx.balances(membership_id).await, (100, 5000));
    assert!(records_of(&ctx, user_id).await.is_empty());
}

#[tokio::test]
async fn test_professional_falls_back_to_add_on_credit() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(100, 350).await;
    let now = time::OffsetDateTime::now_utc();
    ctx.services
        .user_membership
        .update_account_type(
            user_id,
            MembershipType::Professional,
            Some("sub_123".to_string()),
            now,
            now + time::Duration::days(30),
        )
        .await
        .unwrap();

    ctx.services
        .membership
        .credit_fun_ai(user_id, "advanced", true, |_| async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(ctx.balances(membership_id).await, (100, 50));
    let records = records_of(&ctx, user_id).await;
    assert_eq!(records[0].credit_type, CreditType::AddOnCredit);
    assert_eq!(records[0].credit, 300);

    let err = ctx
        .services
        .membership
        .credit_fun_ai(user_id, "advanced", true, |_| async { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::CreditAddOnNotEnough { need: 300, have: 50 }));
}

#[tokio::test]
async fn test_uncharged_features_run_without_a_session() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(1000, 0).await;

    let session = ctx
        .services
        .membership
        .credit_fun_note(user_id, NoteKind::Summary, |session| async move { Ok(session) })
        .await
        .unwrap();
    assert!(session.is_none());

    let upload = DocsUploadCost {
        file_size_bytes: 1_048_576,
        page_count: 10,
        used_storage_bytes: 0,
    };
    let session = ctx
        .services
        .membership
        .credit_fun_docs_upload(user_id, upload, true, |session| async move { Ok(session) })
        .await
        .unwrap();
    assert!(session.is_none());

    let session = ctx
        .services
        .membership
        .credit_fun_ai(user_id, "basic", true, |session| async move { Ok(session) })
        .await
        .unwrap();
    assert!(session.is_none());

    assert_eq!(ctx.balances(membership_id).await, (1000, 0));
    assert!(records_of(&ctx, user_id).await.is_empty());
}

#[tokio::test]
async fn test_denied_features_report_their_codes() {
    let ctx = setup().await;
    let (user_id, _) = ctx.funded_member(1000, 0).await;
    let membership = &ctx.services.membership;

    let err = membership
        .credit_fun_note(user_id, NoteKind::Word, |_| async { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(4602));

    let err = membership
        .credit_fun_ai(user_id, "missing", true, |_| async { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(4402));

    let too_big = DocsUploadCost {
        file_size_bytes: 11 * 1_048_576,
        page_count: 1,
        used_storage_bytes: 0,
    };
    let err = membership
        .credit_fun_docs_upload(user_id, too_big, true, |_| async { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(4301));

    let err = membership
        .charge_around(user_id, None, true, |_| async { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(4201));
}
