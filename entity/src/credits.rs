use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Spendable balances of one membership. Amounts carry two implied decimals.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub credit: i64,
    pub add_on_credit: i64,
    /// Bumped on every balance write; writers compare-and-swap on it.
    pub version: i64,
    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user_memberships::Entity",
        from = "Column::MembershipId",
        to = "super::user_memberships::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    UserMemberships,
}

impl Related<super::user_memberships::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserMemberships.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
