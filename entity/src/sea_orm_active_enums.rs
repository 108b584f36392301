use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipType {
    #[sea_orm(string_value = "FREE")]
    Free,
    #[sea_orm(string_value = "PROFESSIONAL")]
    Professional,
}

/// Which of the two balances a mutation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditType {
    #[sea_orm(string_value = "CREDIT")]
    Credit,
    #[sea_orm(string_value = "ADD_ON_CREDIT")]
    AddOnCredit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditInOutType {
    #[sea_orm(string_value = "INCOME")]
    Income,
    #[sea_orm(string_value = "EXPENSE")]
    Expense,
}

/// Reason code of a ledger mutation. Stored on every bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditPayType {
    #[sea_orm(string_value = "UNSPECIFIED")]
    Unspecified,
    #[sea_orm(string_value = "SUB_FREE")]
    SubFree,
    #[sea_orm(string_value = "SUB_PRO")]
    SubPro,
    #[sea_orm(string_value = "SUB_PRO_ADD_ON_CREDIT")]
    SubProAddOnCredit,
    #[sea_orm(string_value = "SERVICE_COST")]
    ServiceCost,
    #[sea_orm(string_value = "SERVICE_RETRIEVE")]
    ServiceRetrieve,
    #[sea_orm(string_value = "EXPIRED")]
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditServiceType {
    #[sea_orm(string_value = "UNSPECIFIED")]
    Unspecified,
    #[sea_orm(string_value = "DOCS_UPLOAD")]
    DocsUpload,
    #[sea_orm(string_value = "AI_COPILOT")]
    AiCopilot,
    #[sea_orm(string_value = "TRANSLATE")]
    Translate,
    #[sea_orm(string_value = "NOTE")]
    Note,
}

/// Lifecycle of a credit payment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditPaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "AWAITING_CONFIRMATION")]
    AwaitingConfirmation,
    #[sea_orm(string_value = "SUCCESS")]
    Success,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

/// Outbox event kinds written by the payment session machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditPayEventType {
    #[sea_orm(string_value = "PRE_PAY_SUCCESS")]
    PrePaySuccess,
    #[sea_orm(string_value = "PRE_PAY_FAILED")]
    PrePayFailed,
    #[sea_orm(string_value = "PAY_CONFIRM")]
    PayConfirm,
    #[sea_orm(string_value = "PAY_RETRIEVE")]
    PayRetrieve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PAID")]
    Paid,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
    #[sea_orm(string_value = "PAYMENT_FAILED")]
    PaymentFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    #[sea_orm(num_value = 1)]
    SubFree,
    #[sea_orm(num_value = 2)]
    SubPro,
    #[sea_orm(num_value = 3)]
    SubProAddOnCredit,
}
