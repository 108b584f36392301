use super::sea_orm_active_enums::{OrderStatus, OrderType};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub membership_id: Uuid,
    pub order_type: OrderType,
    pub order_status: OrderStatus,
    pub sub_name: String,
    pub sub_credit: i64,
    pub sub_add_on_credit: i64,
    pub sub_start_date: TimeDateTimeWithTimeZone,
    pub sub_end_date: TimeDateTimeWithTimeZone,
    pub price: i64,
    pub number_count: i32,
    pub total_amount: i64,
    pub currency: String,
    pub pay_order_id: Option<String>,
    pub pay_time: Option<TimeDateTimeWithTimeZone>,
    pub pay_expired_at: TimeDateTimeWithTimeZone,
    pub stripe_pay_mode: String,
    pub stripe_price_id: String,
    pub stripe_subscription_id: Option<String>,
    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
