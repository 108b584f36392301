//! Extension methods for the payment session enums
//!
//! The session machine is PENDING -> AWAITING_CONFIRMATION -> {SUCCESS, CANCELLED},
//! plus PENDING -> FAILED. Nothing else is legal and no state is revisited.
use entity::sea_orm_active_enums::{CreditPayEventType, CreditPaymentStatus};

pub trait PaymentStatusExt {
    /// SUCCESS, FAILED and CANCELLED never change again
    fn is_terminal(&self) -> bool;

    fn can_transition_to(&self, next: CreditPaymentStatus) -> bool;
}

impl PaymentStatusExt for CreditPaymentStatus {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            CreditPaymentStatus::Success | CreditPaymentStatus::Failed | CreditPaymentStatus::Cancelled
        )
    }

    fn can_transition_to(&self, next: CreditPaymentStatus) -> bool {
        use CreditPaymentStatus::*;
        matches!(
            (self, next),
            (Pending, AwaitingConfirmation)
                | (Pending, Failed)
                | (AwaitingConfirmation, Success)
                | (AwaitingConfirmation, Cancelled)
        )
    }
}

pub trait PayEventTypeExt {
    /// Status a record must be in for the event to apply
    fn source_status(&self) -> CreditPaymentStatus;

    /// Status the record ends in once the event is applied
    fn target_status(&self) -> CreditPaymentStatus;
}

impl PayEventTypeExt for CreditPayEventType {
    fn source_status(&self) -> CreditPaymentStatus {
        match self {
            CreditPayEventType::PrePaySuccess | CreditPayEventType::PrePayFailed => {
                CreditPaymentStatus::Pending
            }
            CreditPayEventType::PayConfirm | CreditPayEventType::PayRetrieve => {
                CreditPaymentStatus::AwaitingConfirmation
            }
        }
    }

    fn target_status(&self) -> CreditPaymentStatus {
        match self {
            CreditPayEventType::PrePaySuccess => CreditPaymentStatus::AwaitingConfirmation,
            CreditPayEventType::PrePayFailed => CreditPaymentStatus::Failed,
            CreditPayEventType::PayConfirm => CreditPaymentStatus::Success,
            CreditPayEventType::PayRetrieve => CreditPaymentStatus::Cancelled,
        }
    }
}
