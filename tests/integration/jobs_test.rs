use crate::{common::setup, membership_test::lapse};
use entity::{
    credit_payment_records, orders,
    sea_orm_active_enums::{
        CreditPaymentStatus, CreditServiceType, MembershipType, OrderStatus, OrderType,
    },
};
use membership_credit::{
    jobs::{
        run_once, ConfirmExpiredJob, JobLock, LocalJobLock, MembershipExpiredJob,
        OrderProcessingJob, SweepReport,
    },
    models::credit::CreditPayIntent,
};
use sea_orm::entity::*;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

#[tokio::test]
async fn test_expired_sessions_are_confirmed_by_the_sweep() {
    let ctx = setup().await;
    let payments = &ctx.services.credit_payment;
    let (user_id, membership_id) = ctx.funded_member(1000, 0).await;
    let intent = CreditPayIntent::service_cost(CreditServiceType::Translate, 100);

    let stale_id = payments
        .new_payment_order(membership_id, user_id, &intent)
        .await
        .unwrap();
    payments.pay(user_id, membership_id, stale_id).await.unwrap();
    let fresh_id = payments
        .new_payment_order(membership_id, user_id, &intent)
        .await
        .unwrap();
    payments.pay(user_id, membership_id, fresh_id).await.unwrap();

    let stale = payments.get_record(stale_id).await.unwrap();
    let mut active: credit_payment_records::ActiveModel = stale.into();
    active.confirm_expired_at = Set(Some(
        time::OffsetDateTime::now_utc() - time::Duration::minutes(1),
    ));
    active.update(&ctx.db).await.unwrap();

    let job = ConfirmExpiredJob::new(
        payments.clone(),
        ctx.config.jobs.credit_pay_confirm_expired.clone(),
    );
    let lock = LocalJobLock::new();
    let report = run_once(&lock, &job).await.unwrap();
    assert_eq!(
        report,
        Some(SweepReport {
            scanned: 1,
            succeeded: 1,
            failed: 0,
        })
    );

    assert_eq!(
        payments.get_record(stale_id).await.unwrap().status,
        CreditPaymentStatus::Success
    );
    assert_eq!(
        payments.get_record(fresh_id).await.unwrap().status,
        CreditPaymentStatus::AwaitingConfirmation
    );
    // The debit stands
    assert_eq!(ctx.balances(membership_id).await, (800, 0));

    // Nothing left to sweep
    let report = run_once(&lock, &job).await.unwrap().unwrap();
    assert_eq!(report.scanned, 0);
}

#[tokio::test]
async fn test_held_lock_skips_the_run() {
    let ctx = setup().await;
    let config = ctx.config.jobs.credit_pay_confirm_expired.clone();
    let lock = LocalJobLock::new();
    let token = lock
        .try_acquire(&config.lock_key, Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    let job = ConfirmExpiredJob::new(ctx.services.credit_payment.clone(), config.clone());
    assert_eq!(run_once(&lock, &job).await.unwrap(), None);

    assert!(lock.release(&config.lock_key, &token).await.unwrap());
    assert!(run_once(&lock, &job).await.unwrap().is_some());
}

#[tokio::test]
async fn test_membership_sweep_renews_each_lapsed_member() {
    let ctx = setup().await;
    let membership = &ctx.services.membership;

    let free_user = Uuid::new_v4();
    membership.new_membership_account(free_user).await.unwrap();
    let free_id = lapse(&ctx, free_user).await;

    let pro_user = Uuid::new_v4();
    membership.new_membership_account(pro_user).await.unwrap();
    let order = ctx
        .services
        .order
        .subscribe(pro_user, OrderType::SubPro, 1)
        .await
        .unwrap();
    ctx.services
        .order
        .do_order_pay_success_handler(order.id, None, Some("sub_7".into()))
        .await
        .unwrap();
    let pro_id = lapse(&ctx, pro_user).await;

    // Broken member: the renewal grant can not land
    let broken_user = Uuid::new_v4();
    membership.new_membership_account(broken_user).await.unwrap();
    let broken_id = lapse(&ctx, broken_user).await;
    ctx.services
        .credit
        .delete_credit_account(broken_id)
        .await
        .unwrap();

    let active_user = Uuid::new_v4();
    membership.new_membership_account(active_user).await.unwrap();

    let job = MembershipExpiredJob::new(
        ctx.services.membership.clone(),
        ctx.config.jobs.membership_expired.clone(),
    );
    let lock: Arc<dyn JobLock> = Arc::new(LocalJobLock::new());
    let report = run_once(lock.as_ref(), &job).await.unwrap().unwrap();
    assert_eq!(
        report,
        SweepReport {
            scanned: 3,
            succeeded: 2,
            failed: 1,
        }
    );

    for (user_id, membership_id) in [(free_user, free_id), (pro_user, pro_id)] {
        let renewed = ctx
            .services
            .user_membership
            .get_by_user_id(user_id)
            .await
            .unwrap();
        assert_eq!(renewed.membership_type, MembershipType::Free);
        assert!(renewed.end_at > time::OffsetDateTime::now_utc());
        assert_eq!(ctx.balances(membership_id).await, (1000, 0));
    }

    let active = ctx
        .services
        .user_membership
        .get_by_user_id(active_user)
        .await
        .unwrap();
    // Only the opening reset and grant
    assert_eq!(ctx.bill_count(active.id).await, 2);
}

#[tokio::test]
async fn test_order_sweep_finishes_stuck_orders() {
    let ctx = setup().await;
    let order_service = &ctx.services.order;
    let user_id = Uuid::new_v4();
    ctx.services
        .membership
        .new_membership_account(user_id)
        .await
        .unwrap();
    let membership_id = ctx
        .services
        .user_membership
        .get_by_user_id(user_id)
        .await
        .unwrap()
        .id;

    // Paid, then the grant never ran
    let order = order_service
        .subscribe(user_id, OrderType::SubPro, 1)
        .await
        .unwrap();
    let mut active: orders::ActiveModel = order.clone().into();
    active.order_status = Set(OrderStatus::Processing);
    active.updated_at = Set(time::OffsetDateTime::now_utc() - time::Duration::minutes(30));
    active.update(&ctx.db).await.unwrap();

    // Still inside the inline completion window
    let recent = order_service
        .subscribe(user_id, OrderType::SubPro, 1)
        .await
        .unwrap();
    let mut active: orders::ActiveModel = recent.clone().into();
    active.order_status = Set(OrderStatus::Paid);
    active.updated_at = Set(time::OffsetDateTime::now_utc());
    active.update(&ctx.db).await.unwrap();

    let job = OrderProcessingJob::new(
        order_service.clone(),
        ctx.config.jobs.order_processing.clone(),
    );
    let report = run_once(&LocalJobLock::new(), &job).await.unwrap();
    assert_eq!(
        report,
        Some(SweepReport {
            scanned: 1,
            succeeded: 1,
            failed: 0,
        })
    );

    assert_eq!(
        order_service.get_order(order.id).await.unwrap().order_status,
        OrderStatus::Completed
    );
    assert_eq!(
        order_service.get_order(recent.id).await.unwrap().order_status,
        OrderStatus::Paid
    );
    let membership = ctx
        .services
        .user_membership
        .get_by_user_id(user_id)
        .await
        .unwrap();
    assert_eq!(membership.membership_type, MembershipType::Professional);
    assert_eq!(ctx.balances(membership_id).await, (5000, 0));
}
