use super::sea_orm_active_enums::{CreditPaymentStatus, CreditServiceType, CreditType};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credit_payment_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub membership_id: Uuid,
    pub service_type: CreditServiceType,
    pub credit_type: CreditType,
    pub credit: i64,
    pub status: CreditPaymentStatus,
    pub content: String,
    pub remark: String,
    pub pay_at: Option<TimeDateTimeWithTimeZone>,
    pub rel_credit_bid: Option<Uuid>,
    pub retrieve_credit_bid: Option<Uuid>,
    pub error_code: Option<i32>,
    pub error_message: Option<String>,
    pub transaction_at: Option<TimeDateTimeWithTimeZone>,
    pub confirm_at: Option<TimeDateTimeWithTimeZone>,
    pub confirm_expired_at: Option<TimeDateTimeWithTimeZone>,
    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
