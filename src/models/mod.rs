// Request/Response models and ledger value objects
pub mod common;
pub mod credit;
pub mod membership;
pub mod order_status_ext; // Extension methods for entity::sea_orm_active_enums::OrderStatus
pub mod payment_status_ext; // Extension methods for the payment session enums
