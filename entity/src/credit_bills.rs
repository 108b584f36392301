use super::sea_orm_active_enums::{CreditInOutType, CreditPayType, CreditType};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only ledger row. `seq` is the account version the mutation produced.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credit_bills")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub credit_id: Uuid,
    pub seq: i64,
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub bill_type: CreditPayType,
    pub credit_type: CreditType,
    pub in_out_type: CreditInOutType,
    pub credit: i64,
    pub before_credit: i64,
    pub after_credit: i64,
    pub add_on_credit: i64,
    pub before_add_on_credit: i64,
    pub after_add_on_credit: i64,
    pub content: String,
    pub remark: String,
    pub created_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
