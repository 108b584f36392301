pub use super::credit_bills::Entity as CreditBills;
pub use super::credit_pay_events::Entity as CreditPayEvents;
pub use super::credit_payment_records::Entity as CreditPaymentRecords;
pub use super::credits::Entity as Credits;
pub use super::orders::Entity as Orders;
pub use super::user_memberships::Entity as UserMemberships;
