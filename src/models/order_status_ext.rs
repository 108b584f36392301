//! Extension methods for order statuses
use entity::sea_orm_active_enums::OrderStatus;

pub trait OrderStatusExt {
    fn can_transition_to(&self, next: OrderStatus) -> bool;
}

impl OrderStatusExt for OrderStatus {
    fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, PaymentFailed)
                | (Pending, Cancelled)
                | (Paid, Processing)
                | (Processing, Completed)
        )
    }
}
