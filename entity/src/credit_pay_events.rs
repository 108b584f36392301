use super::sea_orm_active_enums::CreditPayEventType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Outbox row for a payment session transition. `processed_at` is set once applied.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credit_pay_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub record_id: Uuid,
    pub user_id: Uuid,
    pub event_type: CreditPayEventType,
    pub bill_id: Option<Uuid>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
    pub occurred_at: TimeDateTimeWithTimeZone,
    pub processed_at: Option<TimeDateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
