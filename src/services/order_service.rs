use crate::{
    config::{MembershipConfig, SubInfo},
    error::{ApiError, Result},
    events::{Event, EventHandler, EventPayload, EventType, PayNotify},
    models::{credit::CreditPayIntent, order_status_ext::OrderStatusExt},
    services::{CreditService, UserMembershipService},
};
use async_trait::async_trait;
use entity::{
    orders,
    sea_orm_active_enums::{CreditPayType, MembershipType, OrderStatus, OrderType},
    user_memberships,
};
use sea_orm::{entity::*, query::*, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Unpaid orders lapse after this long
const PAY_EXPIRY_MINUTES: i64 = 30;

/// Subscription orders: PENDING -> PAID -> PROCESSING -> COMPLETED
pub struct OrderService {
    db: DatabaseConnection,
    credit_service: Arc<CreditService>,
    user_membership_service: Arc<UserMembershipService>,
    membership_config: Arc<MembershipConfig>,
}

impl OrderService {
    pub fn new(
        db: DatabaseConnection,
        credit_service: Arc<CreditService>,
        user_membership_service: Arc<UserMembershipService>,
        membership_config: Arc<MembershipConfig>,
    ) -> Self {
        Self {
            db,
            credit_service,
            user_membership_service,
            membership_config,
        }
    }

    /// Open a PENDING order for `count` periods of the plan sold by `order_type`
    #[instrument(skip(self))]
    pub async fn subscribe(
        &self,
        user_id: Uuid,
        order_type: OrderType,
        count: i32,
    ) -> Result<orders::Model> {
        let sub_info = self
            .membership_config
            .sub_info(order_type)
            .ok_or_else(|| ApiError::SubscribeTypeNotFound(format!("{:?}", order_type)))?;
        let membership = self.user_membership_service.get_by_user_id(user_id).await?;

        self.new_order(&membership, order_type, sub_info, count)
            .await
    }

    async fn new_order(
        &self,
        membership: &user_memberships::Model,
        order_type: OrderType,
        sub_info: &SubInfo,
        count: i32,
    ) -> Result<orders::Model> {
        if count < 1 {
            return Err(ApiError::BadRequest(
                "order count must be at least 1".to_string(),
            ));
        }

        let now = time::OffsetDateTime::now_utc();

        match order_type {
            OrderType::SubFree => {
                if membership.end_at >= now {
                    return Err(ApiError::CanNotSubscribeFree);
                }
            }
            OrderType::SubPro => {}
            OrderType::SubProAddOnCredit => {
                self.check_add_on_subscription(membership, count).await?;
            }
        }

        let months = i64::from(count) * sub_info.duration_months;
        let order = orders::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(membership.user_id),
            membership_id: Set(membership.id),
            order_type: Set(order_type),
            order_status: Set(OrderStatus::Pending),
            sub_name: Set(sub_info.name.clone()),
            sub_credit: Set(sub_info.credit * i64::from(count)),
            sub_add_on_credit: Set(sub_info.add_on_credit * i64::from(count)),
            sub_start_date: Set(now),
            // Plan months are 30 days
            sub_end_date: Set(now + time::Duration::days(30 * months)),
            price: Set(sub_info.price),
            number_count: Set(count),
            total_amount: Set(sub_info.price * i64::from(count)),
            currency: Set(sub_info.currency.clone()),
            pay_order_id: Set(None),
            pay_time: Set(None),
            pay_expired_at: Set(now + time::Duration::minutes(PAY_EXPIRY_MINUTES)),
            stripe_pay_mode: Set(sub_info.stripe_pay_mode.clone()),
            stripe_price_id: Set(sub_info.stripe_price_id.clone()),
            stripe_subscription_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order = order.insert(&self.db).await?;

        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            order_type = ?order_type,
            count,
            "Created subscription order"
        );
        Ok(order)
    }

    async fn check_add_on_subscription(
        &self,
        membership: &user_memberships::Model,
        count: i32,
    ) -> Result<()> {
        let base = &self.membership_config.professional.base;
        if membership.membership_type != MembershipType::Professional {
            return Err(ApiError::CanNotSubscribeProAddOnCredit(
                "add-on credit packs require a professional membership".to_string(),
            ));
        }
        if !base.is_enable_sub_add_on_credit {
            return Err(ApiError::CanNotSubscribeProAddOnCredit(
                "add-on credit packs are not on sale".to_string(),
            ));
        }

        let since = time::OffsetDateTime::now_utc() - time::Duration::days(30);
        let this_month = orders::Entity::find()
            .filter(orders::Column::UserId.eq(membership.user_id))
            .filter(orders::Column::OrderType.eq(OrderType::SubProAddOnCredit))
            .filter(orders::Column::CreatedAt.gte(since))
            .filter(
                orders::Column::OrderStatus
                    .is_not_in([OrderStatus::Cancelled, OrderStatus::PaymentFailed]),
            )
            .count(&self.db)
            .await?;

        if this_month + count as u64 > base.max_add_on_credit_sub_count_of_month {
            return Err(ApiError::OverMaxAddOnCreditSubCountOfMonth(
                base.max_add_on_credit_sub_count_of_month,
            ));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<orders::Model> {
        orders::Entity::find_by_id(order_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ApiError::OrderNotFound(order_id.to_string()))
    }

    /// Cancel a member's unpaid order. Returns whether the status changed.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, user_id: Uuid, order_id: Uuid) -> Result<bool> {
        let order = self.get_order(order_id).await?;
        if order.user_id != user_id {
            return Err(ApiError::OrderNotFound(order_id.to_string()));
        }
        self.transition(order_id, OrderStatus::Cancelled).await
    }

    #[instrument(skip(self))]
    pub async fn pay_failed(&self, order_id: Uuid) -> Result<bool> {
        self.transition(order_id, OrderStatus::PaymentFailed).await
    }

    #[instrument(skip(self))]
    pub async fn pay_expire(&self, order_id: Uuid) -> Result<bool> {
        self.transition(order_id, OrderStatus::Cancelled).await
    }

    /// PENDING -> PAID, then grant the order. Repeated notifications are no-ops.
    #[instrument(skip(self))]
    pub async fn do_order_pay_success_handler(
        &self,
        order_id: Uuid,
        pay_order_id: Option<String>,
        subscription_id: Option<String>,
    ) -> Result<()> {
        let txn = self.db.begin().await?;
        let order = lock_order(&txn, order_id).await?;
        if order.order_status != OrderStatus::Pending {
            txn.rollback().await?;
            debug!(order_id = %order_id, status = ?order.order_status, "Order already settled");
            return Ok(());
        }

        let now = time::OffsetDateTime::now_utc();
        let mut active: orders::ActiveModel = order.into();
        active.order_status = Set(OrderStatus::Paid);
        active.pay_order_id = Set(pay_order_id);
        active.stripe_subscription_id = Set(subscription_id);
        active.pay_time = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&txn).await?;
        txn.commit().await?;

        info!(order_id = %order_id, "Order paid");
        self.do_order_processing_handler(order_id).await
    }

    /// PAID -> PROCESSING, then apply membership and credit and complete.
    ///
    /// An order left in PROCESSING by a failed grant is picked up again here.
    #[instrument(skip(self))]
    pub async fn do_order_processing_handler(&self, order_id: Uuid) -> Result<()> {
        let txn = self.db.begin().await?;
        let order = lock_order(&txn, order_id).await?;
        match order.order_status {
            OrderStatus::Paid => {
                let mut active: orders::ActiveModel = order.into();
                active.order_status = Set(OrderStatus::Processing);
                active.updated_at = Set(time::OffsetDateTime::now_utc());
                active.update(&txn).await?;
                txn.commit().await?;
            }
            OrderStatus::Processing => {
                txn.rollback().await?;
                warn!(order_id = %order_id, "Resuming order left in processing");
            }
            status => {
                txn.rollback().await?;
                debug!(order_id = %order_id, status = ?status, "Order not ready for processing");
                return Ok(());
            }
        }

        let mut attempt = 0;
        loop {
            let txn = self.db.begin().await?;
            match self.complete_order_in_txn(&txn, order_id).await {
                Ok(()) => {
                    txn.commit().await?;
                    info!(order_id = %order_id, "Order completed");
                    return Ok(());
                }
                Err(ApiError::ConcurrentModification(reason))
                    if attempt < self.credit_service.max_retries() =>
                {
                    txn.rollback().await?;
                    attempt += 1;
                    warn!(order_id = %order_id, attempt, "Retrying order completion: {}", reason);
                }
                Err(e) => {
                    txn.rollback().await?;
                    return Err(e);
                }
            }
        }
    }

    /// Orders stuck in PAID or PROCESSING since before `stale_before`, oldest first
    #[instrument(skip(self))]
    pub async fn get_unfinished_list(
        &self,
        stale_before: time::OffsetDateTime,
        limit: u64,
    ) -> Result<Vec<orders::Model>> {
        let orders = orders::Entity::find()
            .filter(
                orders::Column::OrderStatus.is_in([OrderStatus::Paid, OrderStatus::Processing]),
            )
            .filter(orders::Column::UpdatedAt.lt(stale_before))
            .order_by_asc(orders::Column::UpdatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(orders)
    }

    async fn complete_order_in_txn(&self, txn: &DatabaseTransaction, order_id: Uuid) -> Result<()> {
        let order = lock_order(txn, order_id).await?;
        if order.order_status != OrderStatus::Processing {
            debug!(order_id = %order_id, status = ?order.order_status, "Order completed elsewhere");
            return Ok(());
        }

        let content = format!("order {}", order.id);
        let intent = match order.order_type {
            OrderType::SubFree => {
                self.user_membership_service
                    .update_account_type_in_txn(
                        txn,
                        order.user_id,
                        MembershipType::Free,
                        None,
                        order.sub_start_date,
                        order.sub_end_date,
                    )
                    .await?;
                CreditPayIntent::new(CreditPayType::SubFree).with_credit(order.sub_credit)
            }
            OrderType::SubPro => {
                self.user_membership_service
                    .update_account_type_in_txn(
                        txn,
                        order.user_id,
                        MembershipType::Professional,
                        order.stripe_subscription_id.clone(),
                        order.sub_start_date,
                        order.sub_end_date,
                    )
                    .await?;
                CreditPayIntent::new(CreditPayType::SubPro).with_credit(order.sub_credit)
            }
            OrderType::SubProAddOnCredit => {
                CreditPayIntent::new(CreditPayType::SubProAddOnCredit)
                    .with_add_on_credit(order.sub_add_on_credit)
            }
        }
        .with_content(content, order.sub_name.clone());

        self.credit_service
            .in_or_out_credit_in_txn(txn, order.user_id, order.membership_id, &intent)
            .await?;

        let mut active: orders::ActiveModel = order.into();
        active.order_status = Set(OrderStatus::Completed);
        active.updated_at = Set(time::OffsetDateTime::now_utc());
        active.update(txn).await?;
        Ok(())
    }

    /// A paid subscription invoice renews Pro for the invoiced period
    #[instrument(skip(self, notify))]
    pub async fn invoice_payment_succeeded(&self, notify: &PayNotify) -> Result<()> {
        let user_id = notify
            .user_id
            .ok_or_else(|| ApiError::BadRequest("invoice event without user id".to_string()))?;

        let order = self.subscribe(user_id, OrderType::SubPro, 1).await?;

        if let (Some(start), Some(end)) = (notify.period_start, notify.period_end) {
            let mut active: orders::ActiveModel = order.clone().into();
            active.sub_start_date = Set(start);
            active.sub_end_date = Set(end);
            active.update(&self.db).await?;
        }

        self.do_order_pay_success_handler(
            order.id,
            notify.pay_order_id.clone(),
            notify.subscription_id.clone(),
        )
        .await
    }

    /// Route one `pay.notify.*` event to its order transition
    #[instrument(skip(self, notify))]
    pub async fn handle_pay_notify(&self, event_type: EventType, notify: &PayNotify) -> Result<()> {
        let order_id = || {
            notify
                .order_id
                .ok_or_else(|| ApiError::BadRequest(format!("{} without order id", event_type)))
        };

        match event_type {
            EventType::PaySuccess => {
                self.do_order_pay_success_handler(
                    order_id()?,
                    notify.pay_order_id.clone(),
                    notify.subscription_id.clone(),
                )
                .await
            }
            EventType::PayFailed => self.pay_failed(order_id()?).await.map(|_| ()),
            EventType::PayExpire => self.pay_expire(order_id()?).await.map(|_| ()),
            EventType::InvoicePaymentSucceeded => self.invoice_payment_succeeded(notify).await,
            EventType::InvoicePaymentFailed
            | EventType::CustomerSubscriptionCreated
            | EventType::CustomerSubscriptionUpdated
            | EventType::CustomerSubscriptionDeleted => {
                info!(
                    event_type = %event_type,
                    subscription_id = ?notify.subscription_id,
                    "Subscription lifecycle notification"
                );
                Ok(())
            }
            other => {
                warn!(event_type = %other, "Order handler received unrelated event");
                Ok(())
            }
        }
    }

    async fn transition(&self, order_id: Uuid, next: OrderStatus) -> Result<bool> {
        let txn = self.db.begin().await?;
        let order = lock_order(&txn, order_id).await?;
        if !order.order_status.can_transition_to(next) {
            txn.rollback().await?;
            debug!(order_id = %order_id, from = ?order.order_status, to = ?next, "Ignoring order transition");
            return Ok(false);
        }

        let mut active: orders::ActiveModel = order.into();
        active.order_status = Set(next);
        active.updated_at = Set(time::OffsetDateTime::now_utc());
        active.update(&txn).await?;
        txn.commit().await?;

        info!(order_id = %order_id, status = ?next, "Order status changed");
        Ok(true)
    }
}

async fn lock_order(txn: &DatabaseTransaction, order_id: Uuid) -> Result<orders::Model> {
    orders::Entity::find_by_id(order_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| ApiError::OrderNotFound(order_id.to_string()))
}

/// Bus adapter for `pay.notify.*`
pub struct OrderEventHandler {
    order_service: Weak<OrderService>,
}

impl OrderEventHandler {
    pub fn new(order_service: &Arc<OrderService>) -> Self {
        Self {
            order_service: Arc::downgrade(order_service),
        }
    }
}

#[async_trait]
impl EventHandler for OrderEventHandler {
    fn name(&self) -> &'static str {
        "order"
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let EventPayload::Pay(notify) = &event.payload else {
            return Ok(());
        };
        let Some(order_service) = self.order_service.upgrade() else {
            return Ok(());
        };
        order_service.handle_pay_notify(event.event_type, notify).await
    }
}
