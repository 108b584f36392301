// Service modules
pub mod credit_payment_service;
pub mod credit_service;
pub mod feature_cost;
pub mod membership_service;
pub mod order_service;
pub mod user_membership_service;

pub use credit_payment_service::{CreditPaymentRecordHandler, CreditPaymentService};
pub use credit_service::{CreditService, LedgerOperation};
pub use membership_service::{MembershipEventHandler, MembershipService};
pub use order_service::{OrderEventHandler, OrderService};
pub use user_membership_service::UserMembershipService;

use crate::{
    config::Config,
    events::{EventBus, EventType},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Every service, sharing one connection pool and one bus
#[derive(Clone)]
pub struct Services {
    pub bus: Arc<EventBus>,
    pub credit: Arc<CreditService>,
    pub credit_payment: Arc<CreditPaymentService>,
    pub user_membership: Arc<UserMembershipService>,
    pub order: Arc<OrderService>,
    pub membership: Arc<MembershipService>,
}

impl Services {
    /// Construct the services and subscribe their handlers
    pub async fn build(db: DatabaseConnection, config: &Config) -> Self {
        let bus = Arc::new(EventBus::new());
        let membership_config = Arc::new(config.membership.clone());

        let credit = Arc::new(CreditService::new(db.clone(), &config.ledger));
        let credit_payment = Arc::new(CreditPaymentService::new(
            db.clone(),
            credit.clone(),
            bus.clone(),
        ));
        let user_membership = Arc::new(UserMembershipService::new(
            db.clone(),
            credit.clone(),
            membership_config.clone(),
        ));
        let order = Arc::new(OrderService::new(
            db.clone(),
            credit.clone(),
            user_membership.clone(),
            membership_config.clone(),
        ));
        let membership = Arc::new(MembershipService::new(
            credit.clone(),
            credit_payment.clone(),
            user_membership.clone(),
            order.clone(),
            membership_config,
        ));

        bus.subscribe_all(
            &EventType::CREDIT_PAY_NOTIFY,
            Arc::new(CreditPaymentRecordHandler::new(db, &config.payment)),
        )
        .await;
        bus.subscribe_all(&EventType::PAY_NOTIFY, Arc::new(OrderEventHandler::new(&order)))
            .await;
        bus.subscribe_all(
            &[EventType::UserRegister, EventType::UserDeleted],
            Arc::new(MembershipEventHandler::new(&membership)),
        )
        .await;

        Self {
            bus,
            credit,
            credit_payment,
            user_membership,
            order,
            membership,
        }
    }
}
