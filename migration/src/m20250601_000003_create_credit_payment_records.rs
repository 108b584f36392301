use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CreditPaymentRecords::Table)
                    .if_not_exists()
                    .col(pk_uuid(CreditPaymentRecords::Id))
                    .col(uuid(CreditPaymentRecords::UserId))
                    .col(uuid(CreditPaymentRecords::MembershipId))
                    .col(string_len(CreditPaymentRecords::ServiceType, 32))
                    .col(string_len(CreditPaymentRecords::CreditType, 32))
                    .col(big_integer(CreditPaymentRecords::Credit))
                    .col(string_len(CreditPaymentRecords::Status, 32))
                    .col(string(CreditPaymentRecords::Content))
                    .col(string(CreditPaymentRecords::Remark))
                    .col(timestamp_with_time_zone_null(CreditPaymentRecords::PayAt))
                    .col(uuid_null(CreditPaymentRecords::RelCreditBid))
                    .col(uuid_null(CreditPaymentRecords::RetrieveCreditBid))
                    .col(integer_null(CreditPaymentRecords::ErrorCode))
                    .col(string_null(CreditPaymentRecords::ErrorMessage))
                    .col(timestamp_with_time_zone_null(
                        CreditPaymentRecords::TransactionAt,
                    ))
                    .col(timestamp_with_time_zone_null(CreditPaymentRecords::ConfirmAt))
                    .col(timestamp_with_time_zone_null(
                        CreditPaymentRecords::ConfirmExpiredAt,
                    ))
                    .col(timestamp_with_time_zone(CreditPaymentRecords::CreatedAt))
                    .col(timestamp_with_time_zone(CreditPaymentRecords::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // Confirm-expiry sweep: status + deadline
        manager
            .create_index(
                Index::create()
                    .name("idx_credit_payment_records_status_confirm_expired_at")
                    .table(CreditPaymentRecords::Table)
                    .col(CreditPaymentRecords::Status)
                    .col(CreditPaymentRecords::ConfirmExpiredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CreditPayEvents::Table)
                    .if_not_exists()
                    .col(pk_uuid(CreditPayEvents::Id))
                    .col(uuid(CreditPayEvents::RecordId))
                    .col(uuid(CreditPayEvents::UserId))
                    .col(string_len(CreditPayEvents::EventType, 32))
                    .col(uuid_null(CreditPayEvents::BillId))
                    .col(integer_null(CreditPayEvents::ErrorCode))
                    .col(string_null(CreditPayEvents::ErrorMessage))
                    .col(timestamp_with_time_zone(CreditPayEvents::OccurredAt))
                    .col(timestamp_with_time_zone_null(CreditPayEvents::ProcessedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credit_pay_events_record_id")
                    .table(CreditPayEvents::Table)
                    .col(CreditPayEvents::RecordId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CreditPayEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CreditPaymentRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CreditPaymentRecords {
    Table,
    Id,
    UserId,
    MembershipId,
    ServiceType,
    CreditType,
    Credit,
    Status,
    Content,
    Remark,
    PayAt,
    RelCreditBid,
    RetrieveCreditBid,
    ErrorCode,
    ErrorMessage,
    TransactionAt,
    ConfirmAt,
    ConfirmExpiredAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CreditPayEvents {
    Table,
    Id,
    RecordId,
    UserId,
    EventType,
    BillId,
    ErrorCode,
    ErrorMessage,
    OccurredAt,
    ProcessedAt,
}
