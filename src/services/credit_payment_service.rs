use crate::{
    config::PaymentConfig,
    error::{ApiError, Result},
    events::{CreditPayNotify, Delivery, Event, EventBus, EventContext, EventHandler, EventPayload},
    models::{
        credit::CreditPayIntent,
        payment_status_ext::{PayEventTypeExt, PaymentStatusExt},
    },
    services::CreditService,
};
use async_trait::async_trait;
use entity::{
    credit_pay_events, credit_payment_records, credits,
    sea_orm_active_enums::{CreditPayEventType, CreditPayType, CreditPaymentStatus, CreditType},
};
use sea_orm::{
    entity::*, query::*, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A session has at most one pre-pay and one settling event
const RECORD_EVENT_LIMIT: u64 = 8;

/// Payment sessions: a tentative debit that is later confirmed or refunded.
///
/// Each decision is written to the `credit_pay_events` outbox in the same
/// transaction as its ledger effect, then published on the bus. The record
/// itself is only ever updated by [`CreditPaymentRecordHandler`].
pub struct CreditPaymentService {
    db: DatabaseConnection,
    credit_service: Arc<CreditService>,
    bus: Arc<EventBus>,
}

impl CreditPaymentService {
    pub fn new(
        db: DatabaseConnection,
        credit_service: Arc<CreditService>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            db,
            credit_service,
            bus,
        }
    }

    /// Open a PENDING session for `intent.amount()` of `intent.credit_type`
    #[instrument(skip(self, intent), fields(service_type = ?intent.service_type))]
    pub async fn new_payment_order(
        &self,
        membership_id: Uuid,
        user_id: Uuid,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        if intent.amount() < 0 {
            return Err(ApiError::BadRequest(
                "payment amount must not be negative".to_string(),
            ));
        }

        let now = time::OffsetDateTime::now_utc();
        let record_id = Uuid::new_v4();

        let record = credit_payment_records::ActiveModel {
            id: Set(record_id),
            user_id: Set(user_id),
            membership_id: Set(membership_id),
            service_type: Set(intent.service_type),
            credit_type: Set(intent.credit_type),
            credit: Set(intent.amount()),
            status: Set(CreditPaymentStatus::Pending),
            content: Set(intent.content.clone()),
            remark: Set(intent.remark.clone()),
            pay_at: Set(None),
            rel_credit_bid: Set(None),
            retrieve_credit_bid: Set(None),
            error_code: Set(None),
            error_message: Set(None),
            transaction_at: Set(None),
            confirm_at: Set(None),
            confirm_expired_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        record.insert(&self.db).await?;

        info!(
            record_id = %record_id,
            user_id = %user_id,
            credit = intent.amount(),
            credit_type = ?intent.credit_type,
            "Opened credit payment session"
        );

        Ok(record_id)
    }

    #[instrument(skip(self))]
    pub async fn get_record(&self, record_id: Uuid) -> Result<credit_payment_records::Model> {
        credit_payment_records::Entity::find_by_id(record_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ApiError::CreditPaymentRecordNotFound(record_id.to_string()))
    }

    /// Tentatively debit the session amount. Returns the debit bill id.
    ///
    /// An insufficient balance is reported without touching the session so it
    /// can be paid later; any other ledger failure fails the session.
    #[instrument(skip(self))]
    pub async fn pay(&self, user_id: Uuid, membership_id: Uuid, record_id: Uuid) -> Result<Uuid> {
        let record = self.get_record(record_id).await?;
        if record.membership_id != membership_id || record.user_id != user_id {
            return Err(ApiError::CreditPaymentRecordNotFound(record_id.to_string()));
        }
        if record.status != CreditPaymentStatus::Pending {
            return Err(ApiError::CreditPaymentRecordStatusNotPending(
                record_id.to_string(),
            ));
        }

        let intent = cost_intent(&record);

        match self.credit_service.get_by_membership_id(membership_id).await {
            Ok(account) => {
                if let Some(shortfall) = shortfall(&account, &intent) {
                    info!(record_id = %record_id, "Credit payment rejected: {}", shortfall);
                    return Err(shortfall);
                }
            }
            Err(e) => {
                self.record_failure(&record, &e).await;
                return Err(e);
            }
        }

        let mut attempt = 0;
        loop {
            let txn = self.db.begin().await?;
            let locked = lock_record(&txn, record_id).await?;
            if locked.status != CreditPaymentStatus::Pending
                || has_events(&txn, record_id, None).await?
            {
                txn.rollback().await?;
                return Err(ApiError::CreditPaymentRecordStatusNotPending(
                    record_id.to_string(),
                ));
            }

            match self
                .credit_service
                .in_or_out_credit_in_txn(&txn, user_id, membership_id, &intent)
                .await
            {
                Ok(bill_id) => {
                    let outbox = insert_event(
                        &txn,
                        &record,
                        CreditPayEventType::PrePaySuccess,
                        Some(bill_id),
                        None,
                    )
                    .await?;
                    txn.commit().await?;

                    info!(record_id = %record_id, bill_id = %bill_id, "Credit pre-pay succeeded");
                    self.publish(&outbox).await;
                    return Ok(bill_id);
                }
                Err(ApiError::ConcurrentModification(reason))
                    if attempt < self.credit_service.max_retries() =>
                {
                    txn.rollback().await?;
                    attempt += 1;
                    warn!(record_id = %record_id, attempt, "Retrying pre-pay: {}", reason);
                }
                // A balance spent by a concurrent pay leaves the session payable
                Err(
                    e @ (ApiError::CreditNotEnough { .. } | ApiError::CreditAddOnNotEnough { .. }),
                ) => {
                    txn.rollback().await?;
                    info!(record_id = %record_id, "Credit payment rejected: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    txn.rollback().await?;
                    self.record_failure(&record, &e).await;
                    return Err(e);
                }
            }
        }
    }

    /// Finalize a session. Empty ids and settled sessions are a no-op.
    #[instrument(skip(self))]
    pub async fn confirm(&self, record_id: Option<Uuid>) -> Result<()> {
        let Some(record_id) = record_id else {
            return Ok(());
        };
        self.redeliver_pending(Some(record_id), RECORD_EVENT_LIMIT).await?;

        let txn = self.db.begin().await?;
        let record = lock_record(&txn, record_id).await?;
        if is_settled(&txn, &record).await? {
            txn.rollback().await?;
            debug!(record_id = %record_id, status = ?record.status, "Confirm on settled session");
            return Ok(());
        }
        if record.status != CreditPaymentStatus::AwaitingConfirmation {
            txn.rollback().await?;
            return Err(ApiError::CreditPaymentRecordStatusNotAwaitingConfirmation(
                record_id.to_string(),
            ));
        }

        let outbox = insert_event(&txn, &record, CreditPayEventType::PayConfirm, None, None).await?;
        txn.commit().await?;

        info!(record_id = %record_id, "Credit payment confirmed");
        self.publish(&outbox).await;
        Ok(())
    }

    /// Refund a session's debit. Empty ids and settled sessions are a no-op.
    #[instrument(skip(self))]
    pub async fn retrieve(&self, record_id: Option<Uuid>) -> Result<()> {
        let Some(record_id) = record_id else {
            return Ok(());
        };
        self.redeliver_pending(Some(record_id), RECORD_EVENT_LIMIT).await?;

        let mut attempt = 0;
        loop {
            let txn = self.db.begin().await?;
            let record = lock_record(&txn, record_id).await?;
            if is_settled(&txn, &record).await? {
                txn.rollback().await?;
                debug!(record_id = %record_id, status = ?record.status, "Retrieve on settled session");
                return Ok(());
            }
            if record.status != CreditPaymentStatus::AwaitingConfirmation {
                txn.rollback().await?;
                return Err(ApiError::CreditPaymentRecordStatusNotAwaitingConfirmation(
                    record_id.to_string(),
                ));
            }

            let intent = retrieve_intent(&record);
            match self
                .credit_service
                .in_or_out_credit_in_txn(&txn, record.user_id, record.membership_id, &intent)
                .await
            {
                Ok(bill_id) => {
                    let outbox = insert_event(
                        &txn,
                        &record,
                        CreditPayEventType::PayRetrieve,
                        Some(bill_id),
                        None,
                    )
                    .await?;
                    txn.commit().await?;

                    info!(record_id = %record_id, bill_id = %bill_id, "Credit payment retrieved");
                    self.publish(&outbox).await;
                    return Ok(());
                }
                Err(ApiError::ConcurrentModification(reason))
                    if attempt < self.credit_service.max_retries() =>
                {
                    txn.rollback().await?;
                    attempt += 1;
                    warn!(record_id = %record_id, attempt, "Retrying retrieve: {}", reason);
                }
                Err(e) => {
                    txn.rollback().await?;
                    return Err(e);
                }
            }
        }
    }

    /// Sessions awaiting confirmation past their deadline, oldest first
    #[instrument(skip(self))]
    pub async fn get_confirm_expired_list(
        &self,
        limit: u64,
    ) -> Result<Vec<credit_payment_records::Model>> {
        let now = time::OffsetDateTime::now_utc();
        let records = credit_payment_records::Entity::find()
            .filter(
                credit_payment_records::Column::Status.eq(CreditPaymentStatus::AwaitingConfirmation),
            )
            .filter(credit_payment_records::Column::ConfirmExpiredAt.lte(now))
            .order_by_asc(credit_payment_records::Column::ConfirmExpiredAt)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(records)
    }

    /// Publish outbox rows that were never applied. Returns how many now are.
    #[instrument(skip(self))]
    pub async fn redeliver_pending(&self, record_id: Option<Uuid>, limit: u64) -> Result<usize> {
        let mut query = credit_pay_events::Entity::find()
            .filter(credit_pay_events::Column::ProcessedAt.is_null())
            .order_by_asc(credit_pay_events::Column::OccurredAt);
        if let Some(record_id) = record_id {
            query = query.filter(credit_pay_events::Column::RecordId.eq(record_id));
        }
        let pending = query.limit(limit).all(&self.db).await?;

        let mut applied = 0;
        for outbox in &pending {
            warn!(
                outbox_id = %outbox.id,
                record_id = %outbox.record_id,
                kind = ?outbox.event_type,
                "Redelivering credit pay event"
            );
            if self.publish(outbox).await {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Ledger failure during pay: persist the failure decision and publish it
    async fn record_failure(&self, record: &credit_payment_records::Model, cause: &ApiError) {
        let result: Result<credit_pay_events::Model> = async {
            let txn = self.db.begin().await?;
            if has_events(&txn, record.id, None).await? {
                txn.rollback().await?;
                return Err(ApiError::CreditPaymentRecordStatusNotPending(
                    record.id.to_string(),
                ));
            }
            let outbox = insert_event(
                &txn,
                record,
                CreditPayEventType::PrePayFailed,
                None,
                Some(cause),
            )
            .await?;
            txn.commit().await?;
            Ok(outbox)
        }
        .await;

        match result {
            Ok(outbox) => {
                warn!(record_id = %record.id, "Credit pre-pay failed: {}", cause);
                self.publish(&outbox).await;
            }
            Err(e) => warn!(
                record_id = %record.id,
                "Could not record pre-pay failure ({}): {}",
                cause,
                e
            ),
        }
    }

    /// The outbox row is durable, so a failed delivery is left for redelivery
    async fn publish(&self, outbox: &credit_pay_events::Model) -> bool {
        let event = Event::credit_pay(EventContext::for_user(outbox.user_id), notify_of(outbox));
        match self.bus.publish(event, Delivery::Sync).await {
            Ok(()) => true,
            Err(e) => {
                warn!(outbox_id = %outbox.id, "Credit pay event not applied yet: {}", e);
                false
            }
        }
    }
}

/// Applies credit pay notify events to their payment record, once each.
pub struct CreditPaymentRecordHandler {
    db: DatabaseConnection,
    confirm_window: time::Duration,
}

impl CreditPaymentRecordHandler {
    pub fn new(db: DatabaseConnection, config: &PaymentConfig) -> Self {
        Self {
            db,
            confirm_window: time::Duration::seconds(config.confirm_window_secs),
        }
    }

    #[instrument(skip(self, notify), fields(record_id = %notify.record_id, kind = ?notify.kind))]
    pub async fn apply(&self, notify: &CreditPayNotify) -> Result<()> {
        let txn = self.db.begin().await?;

        let outbox = credit_pay_events::Entity::find_by_id(notify.outbox_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ApiError::Internal(anyhow::anyhow!(
                    "credit pay event {} not found",
                    notify.outbox_id
                ))
            })?;
        if outbox.processed_at.is_some() {
            txn.rollback().await?;
            debug!("Credit pay event already applied");
            return Ok(());
        }

        let record = lock_record(&txn, outbox.record_id).await?;
        let kind = outbox.event_type;
        let now = time::OffsetDateTime::now_utc();

        if record.status == kind.target_status() {
            mark_processed(&txn, &outbox, now).await?;
            txn.commit().await?;
            return Ok(());
        }

        if !record.status.can_transition_to(kind.target_status()) {
            mark_processed(&txn, &outbox, now).await?;
            txn.commit().await?;
            warn!(status = ?record.status, "Dropping credit pay event for illegal transition");
            return Err(match kind.source_status() {
                CreditPaymentStatus::Pending => {
                    ApiError::CreditPaymentRecordStatusNotPending(record.id.to_string())
                }
                _ => ApiError::CreditPaymentRecordStatusNotAwaitingConfirmation(
                    record.id.to_string(),
                ),
            });
        }

        let at = outbox.occurred_at;
        let mut active: credit_payment_records::ActiveModel = record.into();
        active.status = Set(kind.target_status());
        active.updated_at = Set(now);
        match kind {
            CreditPayEventType::PrePaySuccess => {
                active.pay_at = Set(Some(at));
                active.transaction_at = Set(Some(at));
                active.rel_credit_bid = Set(outbox.bill_id);
                active.confirm_expired_at = Set(Some(at + self.confirm_window));
            }
            CreditPayEventType::PrePayFailed => {
                active.pay_at = Set(Some(at));
                active.transaction_at = Set(Some(at));
                active.error_code = Set(outbox.error_code);
                active.error_message = Set(outbox.error_message.clone());
            }
            CreditPayEventType::PayConfirm => {
                active.confirm_at = Set(Some(at));
            }
            CreditPayEventType::PayRetrieve => {
                active.confirm_at = Set(Some(at));
                active.retrieve_credit_bid = Set(outbox.bill_id);
            }
        }
        active.update(&txn).await?;
        mark_processed(&txn, &outbox, now).await?;
        txn.commit().await?;

        info!(status = ?kind.target_status(), "Credit payment record updated");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for CreditPaymentRecordHandler {
    fn name(&self) -> &'static str {
        "credit_payment_record"
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        match &event.payload {
            EventPayload::CreditPay(notify) => self.apply(notify).await,
            _ => Ok(()),
        }
    }
}

fn cost_intent(record: &credit_payment_records::Model) -> CreditPayIntent {
    amount_intent(record, CreditPayType::ServiceCost)
}

fn retrieve_intent(record: &credit_payment_records::Model) -> CreditPayIntent {
    amount_intent(record, CreditPayType::ServiceRetrieve)
}

fn amount_intent(record: &credit_payment_records::Model, pay_type: CreditPayType) -> CreditPayIntent {
    let intent = CreditPayIntent {
        service_type: record.service_type,
        ..CreditPayIntent::new(pay_type)
    }
    .with_credit_type(record.credit_type)
    .with_content(record.content.clone(), record.id.to_string());

    match record.credit_type {
        CreditType::Credit => intent.with_credit(record.credit),
        CreditType::AddOnCredit => intent.with_add_on_credit(record.credit),
    }
}

fn shortfall(account: &credits::Model, intent: &CreditPayIntent) -> Option<ApiError> {
    let need = intent.amount();
    match intent.credit_type {
        CreditType::Credit if account.credit < need => Some(ApiError::CreditNotEnough {
            need,
            have: account.credit,
        }),
        CreditType::AddOnCredit if account.add_on_credit < need => {
            Some(ApiError::CreditAddOnNotEnough {
                need,
                have: account.add_on_credit,
            })
        }
        _ => None,
    }
}

fn notify_of(outbox: &credit_pay_events::Model) -> CreditPayNotify {
    CreditPayNotify {
        outbox_id: outbox.id,
        record_id: outbox.record_id,
        kind: outbox.event_type,
        bill_id: outbox.bill_id,
        error_code: outbox.error_code,
        error_message: outbox.error_message.clone(),
    }
}

async fn lock_record(
    txn: &DatabaseTransaction,
    record_id: Uuid,
) -> Result<credit_payment_records::Model> {
    credit_payment_records::Entity::find_by_id(record_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| ApiError::CreditPaymentRecordNotFound(record_id.to_string()))
}

/// Terminal, or a terminal decision already sits in the outbox
async fn is_settled<C: ConnectionTrait>(
    db: &C,
    record: &credit_payment_records::Model,
) -> Result<bool> {
    if record.status.is_terminal() {
        return Ok(true);
    }
    has_events(
        db,
        record.id,
        Some(&[CreditPayEventType::PayConfirm, CreditPayEventType::PayRetrieve]),
    )
    .await
}

async fn has_events<C: ConnectionTrait>(
    db: &C,
    record_id: Uuid,
    kinds: Option<&[CreditPayEventType]>,
) -> Result<bool> {
    let mut query =
        credit_pay_events::Entity::find().filter(credit_pay_events::Column::RecordId.eq(record_id));
    if let Some(kinds) = kinds {
        query = query.filter(credit_pay_events::Column::EventType.is_in(kinds.iter().copied()));
    }
    Ok(query.count(db).await? > 0)
}

async fn insert_event(
    txn: &DatabaseTransaction,
    record: &credit_payment_records::Model,
    kind: CreditPayEventType,
    bill_id: Option<Uuid>,
    cause: Option<&ApiError>,
) -> Result<credit_pay_events::Model> {
    let outbox = credit_pay_events::ActiveModel {
        id: Set(Uuid::new_v4()),
        record_id: Set(record.id),
        user_id: Set(record.user_id),
        event_type: Set(kind),
        bill_id: Set(bill_id),
        error_code: Set(cause.and_then(|e| e.status_code()).map(|code| code as i32)),
        error_message: Set(cause.map(|e| e.to_string())),
        occurred_at: Set(time::OffsetDateTime::now_utc()),
        processed_at: Set(None),
    };
    Ok(outbox.insert(txn).await?)
}

async fn mark_processed(
    txn: &DatabaseTransaction,
    outbox: &credit_pay_events::Model,
    at: time::OffsetDateTime,
) -> Result<()> {
    let mut active: credit_pay_events::ActiveModel = outbox.clone().into();
    active.processed_at = Set(Some(at));
    active.update(txn).await?;
    Ok(())
}
