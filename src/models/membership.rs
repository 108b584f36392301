use entity::sea_orm_active_enums::MembershipType;
use serde::Serialize;
use uuid::Uuid;

/// Membership summary shown to the member
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipBaseInfo {
    pub user_id: Uuid,
    pub membership_id: Uuid,
    pub membership_type: MembershipType,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at: time::OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_at: time::OffsetDateTime,
    pub is_expired: bool,
    /// Whole days left in the current window, zero once expired
    pub expired_day: i64,
    pub credit: i64,
    pub add_on_credit: i64,
}
