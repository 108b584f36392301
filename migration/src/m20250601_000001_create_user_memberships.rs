use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserMemberships::Table)
                    .if_not_exists()
                    .col(pk_uuid(UserMemberships::Id))
                    .col(uuid(UserMemberships::UserId))
                    .col(string_len(UserMemberships::MembershipType, 32))
                    .col(timestamp_with_time_zone(UserMemberships::StartAt))
                    .col(timestamp_with_time_zone(UserMemberships::EndAt))
                    .col(string_null(UserMemberships::StripeSubscriptionId))
                    .col(timestamp_with_time_zone(UserMemberships::CreatedAt))
                    .col(timestamp_with_time_zone(UserMemberships::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // One membership per user
        manager
            .create_index(
                Index::create()
                    .name("idx_user_memberships_user_id")
                    .table(UserMemberships::Table)
                    .col(UserMemberships::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Expiry sweep scans by end_at
        manager
            .create_index(
                Index::create()
                    .name("idx_user_memberships_end_at")
                    .table(UserMemberships::Table)
                    .col(UserMemberships::EndAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserMemberships::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum UserMemberships {
    Table,
    Id,
    UserId,
    MembershipType,
    StartAt,
    EndAt,
    StripeSubscriptionId,
    CreatedAt,
    UpdatedAt,
}
