use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(pk_uuid(Orders::Id))
                    .col(uuid(Orders::UserId))
                    .col(uuid(Orders::MembershipId))
                    .col(integer(Orders::OrderType))
                    .col(string_len(Orders::OrderStatus, 32))
                    .col(string(Orders::SubName))
                    .col(big_integer(Orders::SubCredit))
                    .col(big_integer(Orders::SubAddOnCredit))
                    .col(timestamp_with_time_zone(Orders::SubStartDate))
                    .col(timestamp_with_time_zone(Orders::SubEndDate))
                    .col(big_integer(Orders::Price))
                    .col(integer(Orders::NumberCount))
                    .col(big_integer(Orders::TotalAmount))
                    .col(string_len(Orders::Currency, 8))
                    .col(string_null(Orders::PayOrderId))
                    .col(timestamp_with_time_zone_null(Orders::PayTime))
                    .col(timestamp_with_time_zone(Orders::PayExpiredAt))
                    .col(string(Orders::StripePayMode))
                    .col(string(Orders::StripePriceId))
                    .col(string_null(Orders::StripeSubscriptionId))
                    .col(timestamp_with_time_zone(Orders::CreatedAt))
                    .col(timestamp_with_time_zone(Orders::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // Monthly add-on cap counts a user's orders by type
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_user_type_created")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .col(Orders::OrderType)
                    .col(Orders::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    UserId,
    MembershipId,
    OrderType,
    OrderStatus,
    SubName,
    SubCredit,
    SubAddOnCredit,
    SubStartDate,
    SubEndDate,
    Price,
    NumberCount,
    TotalAmount,
    Currency,
    PayOrderId,
    PayTime,
    PayExpiredAt,
    StripePayMode,
    StripePriceId,
    StripeSubscriptionId,
    CreatedAt,
    UpdatedAt,
}
