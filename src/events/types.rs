use entity::sea_orm_active_enums::CreditPayEventType;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    CreditPrePaySuccess,
    CreditPrePayFailed,
    CreditPayConfirm,
    CreditPayRetrieve,
    PaySuccess,
    PayFailed,
    PayExpire,
    CustomerSubscriptionCreated,
    CustomerSubscriptionUpdated,
    CustomerSubscriptionDeleted,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    UserRegister,
    UserDeleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreditPrePaySuccess => "credit.pay.notify.pre_pay_success",
            Self::CreditPrePayFailed => "credit.pay.notify.pre_pay_failed",
            Self::CreditPayConfirm => "credit.pay.notify.pay_confirm",
            Self::CreditPayRetrieve => "credit.pay.notify.pay_retrieve",
            Self::PaySuccess => "pay.notify.pay_success",
            Self::PayFailed => "pay.notify.pay_failed",
            Self::PayExpire => "pay.notify.pay_expire",
            Self::CustomerSubscriptionCreated => "pay.notify.customer.subscriptions.created",
            Self::CustomerSubscriptionUpdated => "pay.notify.customer.subscriptions.updated",
            Self::CustomerSubscriptionDeleted => "pay.notify.customer.subscriptions.deleted",
            Self::InvoicePaymentSucceeded => "pay.notify.invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "pay.notify.invoice.payment_failed",
            Self::UserRegister => "user.register",
            Self::UserDeleted => "user.deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    pub const ALL: [EventType; 14] = [
        Self::CreditPrePaySuccess,
        Self::CreditPrePayFailed,
        Self::CreditPayConfirm,
        Self::CreditPayRetrieve,
        Self::PaySuccess,
        Self::PayFailed,
        Self::PayExpire,
        Self::CustomerSubscriptionCreated,
        Self::CustomerSubscriptionUpdated,
        Self::CustomerSubscriptionDeleted,
        Self::InvoicePaymentSucceeded,
        Self::InvoicePaymentFailed,
        Self::UserRegister,
        Self::UserDeleted,
    ];

    /// Every `pay.notify.*` topic the order saga consumes
    pub const PAY_NOTIFY: [EventType; 8] = [
        Self::PaySuccess,
        Self::PayFailed,
        Self::PayExpire,
        Self::CustomerSubscriptionCreated,
        Self::CustomerSubscriptionUpdated,
        Self::CustomerSubscriptionDeleted,
        Self::InvoicePaymentSucceeded,
        Self::InvoicePaymentFailed,
    ];

    pub const CREDIT_PAY_NOTIFY: [EventType; 4] = [
        Self::CreditPrePaySuccess,
        Self::CreditPrePayFailed,
        Self::CreditPayConfirm,
        Self::CreditPayRetrieve,
    ];
}

impl From<CreditPayEventType> for EventType {
    fn from(kind: CreditPayEventType) -> Self {
        match kind {
            CreditPayEventType::PrePaySuccess => Self::CreditPrePaySuccess,
            CreditPayEventType::PrePayFailed => Self::CreditPrePayFailed,
            CreditPayEventType::PayConfirm => Self::CreditPayConfirm,
            CreditPayEventType::PayRetrieve => Self::CreditPayRetrieve,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity and trace id, carried across asynchronous delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub user_id: Option<Uuid>,
    pub trace_id: Uuid,
}

impl EventContext {
    pub fn new(user_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            trace_id: Uuid::new_v4(),
        }
    }

    pub fn for_user(user_id: Uuid) -> Self {
        Self::new(Some(user_id))
    }
}

/// Payment session transition, mirrors one outbox row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditPayNotify {
    pub outbox_id: Uuid,
    pub record_id: Uuid,
    pub kind: CreditPayEventType,
    pub bill_id: Option<Uuid>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
}

/// Outcome reported by the payment gateway
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayNotify {
    pub order_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub pay_order_id: Option<String>,
    pub subscription_id: Option<String>,
    pub period_start: Option<time::OffsetDateTime>,
    pub period_end: Option<time::OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotify {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    CreditPay(CreditPayNotify),
    Pay(PayNotify),
    User(UserNotify),
}

#[derive(Debug, Clone)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    pub context: EventContext,
    pub payload: EventPayload,
    pub occurred_at: time::OffsetDateTime,
}

impl Event {
    pub fn new(event_type: EventType, context: EventContext, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            context,
            payload,
            occurred_at: time::OffsetDateTime::now_utc(),
        }
    }

    pub fn credit_pay(context: EventContext, notify: CreditPayNotify) -> Self {
        Self::new(notify.kind.into(), context, EventPayload::CreditPay(notify))
    }

    pub fn pay(event_type: EventType, notify: PayNotify) -> Self {
        let context = EventContext::new(notify.user_id);
        Self::new(event_type, context, EventPayload::Pay(notify))
    }

    pub fn user_register(user_id: Uuid) -> Self {
        Self::new(
            EventType::UserRegister,
            EventContext::for_user(user_id),
            EventPayload::User(UserNotify { user_id }),
        )
    }

    pub fn user_deleted(user_id: Uuid) -> Self {
        Self::new(
            EventType::UserDeleted,
            EventContext::for_user(user_id),
            EventPayload::User(UserNotify { user_id }),
        )
    }
}
