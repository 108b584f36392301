use crate::common::setup;
use entity::sea_orm_active_enums::{CreditInOutType, CreditPayType, CreditServiceType, CreditType};
use membership_credit::{models::credit::CreditPayIntent, ApiError};
use std::sync::Arc;
use tokio::task::JoinSet;

#[tokio::test]
async fn test_subscription_renewal_resets_primary_credit_only() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(200, 50).await;
    let bills_before = ctx.bill_count(membership_id).await;

    let renewal = CreditPayIntent::new(CreditPayType::SubFree).with_credit(500);
    ctx.services
        .credit
        .in_or_out_credit(user_id, membership_id, &renewal)
        .await
        .unwrap();

    assert_eq!(ctx.balances(membership_id).await, (500, 50));

    let bills = ctx.services.credit.list_bills(membership_id).await.unwrap();
    assert_eq!(bills.len(), bills_before + 2);

    let reset = &bills[bills_before];
    assert_eq!(reset.bill_type, CreditPayType::Expired);
    assert_eq!(reset.in_out_type, CreditInOutType::Expense);
    assert_eq!((reset.before_credit, reset.after_credit), (200, 0));

    let grant = &bills[bills_before + 1];
    assert_eq!(grant.bill_type, CreditPayType::SubFree);
    assert_eq!(grant.in_out_type, CreditInOutType::Income);
    assert_eq!((grant.before_credit, grant.after_credit), (0, 500));
    assert_eq!(grant.after_add_on_credit, 50);

    ctx.assert_ledger_consistent(membership_id).await;
}

#[tokio::test]
async fn test_overdraft_is_rejected_without_a_bill() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(100, 0).await;
    let bills_before = ctx.bill_count(membership_id).await;

    let cost = CreditPayIntent::service_cost(CreditServiceType::AiCopilot, 500);
    let err = ctx
        .services
        .credit
        .debit(user_id, membership_id, &cost)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::CreditNotEnough { need: 500, have: 100 }));

    let add_on_cost = cost.with_add_on_credit(1).with_credit_type(CreditType::AddOnCredit);
    let err = ctx
        .services
        .credit
        .debit(user_id, membership_id, &add_on_cost)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(4008));

    assert_eq!(ctx.balances(membership_id).await, (100, 0));
    assert_eq!(ctx.bill_count(membership_id).await, bills_before);
}

#[tokio::test]
async fn test_unspecified_reason_code_is_unknown_bill_type() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(100, 0).await;

    let intent = CreditPayIntent::new(CreditPayType::Unspecified).with_credit(10);
    let err = ctx
        .services
        .credit
        .in_or_out_credit(user_id, membership_id, &intent)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(4006));
    assert_eq!(ctx.balances(membership_id).await, (100, 0));
}

#[tokio::test]
async fn test_negative_amounts_are_rejected() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(100, 0).await;

    let intent = CreditPayIntent::new(CreditPayType::ServiceRetrieve).with_credit(-50);
    let result = ctx
        .services
        .credit
        .credit_back(user_id, membership_id, &intent)
        .await;
    assert!(matches!(result, Err(ApiError::BadRequest(_))));
    assert_eq!(ctx.balances(membership_id).await, (100, 0));
}

#[tokio::test]
async fn test_every_bill_balances_and_replays() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(1000, 300).await;
    let credit = &ctx.services.credit;

    let spend = CreditPayIntent::service_cost(CreditServiceType::Translate, 250);
    credit.debit(user_id, membership_id, &spend).await.unwrap();

    let spend_add_on = CreditPayIntent::service_cost(CreditServiceType::Translate, 0)
        .with_add_on_credit(120)
        .with_credit_type(CreditType::AddOnCredit);
    credit.debit(user_id, membership_id, &spend_add_on).await.unwrap();

    let refund = CreditPayIntent::new(CreditPayType::ServiceRetrieve).with_credit(250);
    credit.credit_back(user_id, membership_id, &refund).await.unwrap();

    let pack = CreditPayIntent::new(CreditPayType::SubProAddOnCredit).with_add_on_credit(500);
    credit.grant_add_on(user_id, membership_id, &pack).await.unwrap();

    assert_eq!(ctx.balances(membership_id).await, (1000, 680));

    let bills = credit.list_bills(membership_id).await.unwrap();
    for (index, bill) in bills.iter().enumerate() {
        assert_eq!(bill.seq, index as i64 + 1);
        assert_eq!(bill.after_credit, bill.before_credit + bill.credit);
        assert_eq!(
            bill.after_add_on_credit,
            bill.before_add_on_credit + bill.add_on_credit
        );
        assert!(bill.after_credit >= 0 && bill.after_add_on_credit >= 0);
    }

    let audit = credit.audit(membership_id).await.unwrap();
    assert!(audit.is_consistent());
    assert_eq!(audit.bill_count, bills.len());
    assert_eq!(
        (audit.replayed_credit, audit.replayed_add_on_credit),
        (1000, 680)
    );
}

#[tokio::test]
async fn test_expire_all_credit_zeroes_both_balances() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(700, 90).await;

    ctx.services
        .credit
        .credit_account_expired_all_credit(user_id, membership_id)
        .await
        .unwrap();

    assert_eq!(ctx.balances(membership_id).await, (0, 0));
    let bills = ctx.services.credit.list_bills(membership_id).await.unwrap();
    assert!(bills
        .iter()
        .rev()
        .take(2)
        .all(|bill| bill.bill_type == CreditPayType::Expired));
    ctx.assert_ledger_consistent(membership_id).await;
}

#[tokio::test]
async fn test_missing_credit_account() {
    let ctx = setup().await;
    let (user_id, membership_id) = ctx.funded_member(0, 0).await;
    ctx.services
        .credit
        .delete_credit_account(membership_id)
        .await
        .unwrap();

    let err = ctx
        .services
        .credit
        .debit(
            user_id,
            membership_id,
            &CreditPayIntent::service_cost(CreditServiceType::Note, 1),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(4004));

    let account = ctx
        .services
        .credit
        .new_credit_account(user_id, membership_id)
        .await
        .unwrap();
    assert_eq!((account.credit, account.add_on_credit, account.version), (0, 0, 0));
    assert!(matches!(
        ctx.services
            .credit
            .new_credit_account(user_id, membership_id)
            .await,
        Err(ApiError::UserCreditAccountAlreadyExists(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_never_overdraw() {
    let ctx = Arc::new(setup().await);
    let (user_id, membership_id) = ctx.funded_member(1000, 0).await;
    let bills_before = ctx.bill_count(membership_id).await;

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let ctx = ctx.clone();
        tasks.spawn(async move {
            let cost = CreditPayIntent::service_cost(CreditServiceType::AiCopilot, 300);
            ctx.services.credit.debit(user_id, membership_id, &cost).await
        });
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("debit task panicked") {
            Ok(_) => succeeded += 1,
            Err(ApiError::CreditNotEnough { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(rejected, 7);
    assert_eq!(ctx.balances(membership_id).await, (100, 0));
    assert_eq!(ctx.bill_count(membership_id).await, bills_before + 3);
    ctx.assert_ledger_consistent(membership_id).await;
}

#[tokio::test]
async fn test_recreated_account_keeps_its_own_history() {
    let ctx = setup().await;
    let credit = &ctx.services.credit;
    let (user_id, membership_id) = ctx.funded_member(1000, 0).await;
    credit
        .debit(
            user_id,
            membership_id,
            &CreditPayIntent::service_cost(CreditServiceType::AiCopilot, 300),
        )
        .await
        .unwrap();
    let old_bills = ctx.bill_count(membership_id).await;
    assert!(old_bills >= 2);

    credit.delete_credit_account(membership_id).await.unwrap();
    let account = credit
        .new_credit_account(user_id, membership_id)
        .await
        .unwrap();
    credit
        .grant_subscription(
            user_id,
            membership_id,
            &CreditPayIntent::new(CreditPayType::SubFree).with_credit(500),
        )
        .await
        .unwrap();

    let bills = credit.list_bills(membership_id).await.unwrap();
    assert!(bills.iter().all(|bill| bill.credit_id == account.id));
    assert_eq!(bills.first().unwrap().seq, 1);
    assert_eq!(bills.last().unwrap().after_credit, 500);

    let audit = credit.audit(membership_id).await.unwrap();
    assert_eq!(audit.bill_count, bills.len());
    assert_eq!(audit.replayed_credit, 500);
    assert!(audit.broken_bills.is_empty());
    ctx.assert_ledger_consistent(membership_id).await;
}
