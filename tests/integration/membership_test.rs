use crate::common::{setup, TestContext};
use entity::{
    sea_orm_active_enums::{CreditPayType, MembershipType, OrderType},
    user_memberships,
};
use membership_credit::events::{Delivery, Event};
use sea_orm::{entity::*, query::*};
use uuid::Uuid;

/// Move the membership window into the past
pub async fn lapse(ctx: &TestContext, user_id: Uuid) -> Uuid {
    let membership = ctx
        .services
        .user_membership
        .get_by_user_id(user_id)
        .await
        .unwrap();
    let membership_id = membership.id;
    let now = time::OffsetDateTime::now_utc();
    let mut active: user_memberships::ActiveModel = membership.into();
    active.start_at = Set(now - time::Duration::days(31));
    active.end_at = Set(now - time::Duration::days(1));
    active.update(&ctx.db).await.unwrap();
    membership_id
}

#[tokio::test]
async fn test_new_membership_starts_on_the_free_plan() {
    let ctx = setup().await;
    let user_id = Uuid::new_v4();

    let membership = ctx
        .services
        .membership
        .new_membership_account(user_id)
        .await
        .unwrap();
    assert_eq!(membership.membership_type, MembershipType::Free);
    assert!(membership.end_at > time::OffsetDateTime::now_utc());
    assert_eq!(ctx.balances(membership.id).await, (1000, 0));

    let info = ctx
        .services
        .user_membership
        .get_base_info(user_id)
        .await
        .unwrap();
    assert_eq!(info.name, "Free");
    assert!(!info.is_expired);
    assert!((29..=30).contains(&info.expired_day));
    assert_eq!((info.credit, info.add_on_credit), (1000, 0));

    let again = ctx
        .services
        .membership
        .check_account_and_new(user_id)
        .await
        .unwrap();
    assert_eq!(again.id, membership.id);

    let err = ctx
        .services
        .membership
        .new_membership_account(user_id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(4002));
}

#[tokio::test]
async fn test_user_events_are_idempotent() {
    let ctx = setup().await;
    let user_id = Uuid::new_v4();
    let bus = &ctx.services.bus;

    bus.publish(Event::user_register(user_id), Delivery::Sync)
        .await
        .unwrap();
    bus.publish(Event::user_register(user_id), Delivery::Sync)
        .await
        .unwrap();

    let count = user_memberships::Entity::find()
        .filter(user_memberships::Column::UserId.eq(user_id))
        .count(&ctx.db)
        .await
        .unwrap();
    assert_eq!(count, 1);
    let membership = ctx
        .services
        .user_membership
        .get_by_user_id(user_id)
        .await
        .unwrap();
    assert_eq!(ctx.balances(membership.id).await, (1000, 0));

    bus.publish(Event::user_deleted(user_id), Delivery::Sync)
        .await
        .unwrap();
    bus.publish(Event::user_deleted(user_id), Delivery::Sync)
        .await
        .unwrap();

    assert!(ctx
        .services
        .user_membership
        .find_by_user_id(user_id)
        .await
        .unwrap()
        .is_none());
    let err = ctx
        .services
        .credit
        .get_by_membership_id(membership.id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(4004));
}

#[tokio::test]
async fn test_active_membership_is_not_renewed() {
    let ctx = setup().await;
    let user_id = Uuid::new_v4();
    let membership = ctx
        .services
        .membership
        .new_membership_account(user_id)
        .await
        .unwrap();

    let err = ctx
        .services
        .membership
        .handle_account_expired(membership.id, user_id)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(4009));
}

#[tokio::test]
async fn test_expired_free_membership_renews_its_allowance() {
    let ctx = setup().await;
    let user_id = Uuid::new_v4();
    ctx.services
        .membership
        .new_membership_account(user_id)
        .await
        .unwrap();
    ctx.services
        .membership
        .credit_fun_ai(user_id, "advanced", true, |_| async { Ok(()) })
        .await
        .unwrap();
    let membership_id = lapse(&ctx, user_id).await;
    assert_eq!(ctx.balances(membership_id).await, (700, 0));

    let expired = ctx
        .services
        .membership
        .get_account_expired_list(Some(MembershipType::Free), 10)
        .await
        .unwrap();
    assert!(expired.iter().any(|m| m.id == membership_id));
    assert!(ctx
        .services
        .membership
        .get_account_expired_list(Some(MembershipType::Professional), 10)
        .await
        .unwrap()
        .is_empty());

    ctx.services
        .membership
        .handle_account_expired(membership_id, user_id)
        .await
        .unwrap();

    let renewed = ctx
        .services
        .user_membership
        .get_by_user_id(user_id)
        .await
        .unwrap();
    assert_eq!(renewed.membership_type, MembershipType::Free);
    assert!(renewed.end_at > time::OffsetDateTime::now_utc());
    assert_eq!(ctx.balances(membership_id).await, (1000, 0));
    ctx.assert_ledger_consistent(membership_id).await;
}

#[tokio::test]
async fn test_expired_professional_membership_drops_to_free() {
    let ctx = setup().await;
    let user_id = Uuid::new_v4();
    ctx.services
        .membership
        .new_membership_account(user_id)
        .await
        .unwrap();
    let order = ctx
        .services
        .order
        .subscribe(user_id, OrderType::SubPro, 1)
        .await
        .unwrap();
    ctx.services
        .order
        .do_order_pay_success_handler(order.id, None, Some("sub_9".into()))
        .await
        .unwrap();
    let pack = ctx
        .services
        .order
        .subscribe(user_id, OrderType::SubProAddOnCredit, 1)
        .await
        .unwrap();
    ctx.services
        .order
        .do_order_pay_success_handler(pack.id, None, None)
        .await
        .unwrap();

    let membership_id = lapse(&ctx, user_id).await;
    assert_eq!(ctx.balances(membership_id).await, (5000, 2000));

    ctx.services
        .membership
        .handle_account_expired(membership_id, user_id)
        .await
        .unwrap();

    let downgraded = ctx
        .services
        .user_membership
        .get_by_user_id(user_id)
        .await
        .unwrap();
    assert_eq!(downgraded.membership_type, MembershipType::Free);
    assert!(downgraded.stripe_subscription_id.is_none());
    // Both balances expire, then the free allowance is granted
    assert_eq!(ctx.balances(membership_id).await, (1000, 0));

    let bills = ctx.services.credit.list_bills(membership_id).await.unwrap();
    let last = bills.last().unwrap();
    assert_eq!(last.bill_type, CreditPayType::SubFree);
    assert!(bills
        .iter()
        .any(|bill| bill.bill_type == CreditPayType::Expired && bill.add_on_credit == -2000));
    ctx.assert_ledger_consistent(membership_id).await;
}

#[tokio::test]
async fn test_sweep_and_expiry_check_share_the_boundary() {
    let ctx = setup().await;
    let user_id = Uuid::new_v4();
    ctx.services
        .membership
        .new_membership_account(user_id)
        .await
        .unwrap();
    let membership = ctx
        .services
        .user_membership
        .get_by_user_id(user_id)
        .await
        .unwrap();
    let end_at = membership.end_at;
    let memberships = &ctx.services.user_membership;

    let at_end = memberships
        .get_account_expired_list_at(None, end_at, 10)
        .await
        .unwrap();
    assert!(at_end.iter().all(|m| m.id != membership.id));

    let after_end = memberships
        .get_account_expired_list_at(None, end_at + time::Duration::seconds(1), 10)
        .await
        .unwrap();
    assert!(after_end.iter().any(|m| m.id == membership.id));
}
