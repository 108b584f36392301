pub mod prelude;

pub mod credit_bills;
pub mod credit_pay_events;
pub mod credit_payment_records;
pub mod credits;
pub mod orders;
pub mod sea_orm_active_enums;
pub mod user_memberships;
