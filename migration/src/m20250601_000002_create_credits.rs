use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250601_000001_create_user_memberships::UserMemberships;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Credits::Table)
                    .if_not_exists()
                    .col(pk_uuid(Credits::Id))
                    .col(uuid(Credits::MembershipId))
                    .col(uuid(Credits::UserId))
                    .col(big_integer(Credits::Credit).default(0))
                    .col(big_integer(Credits::AddOnCredit).default(0))
                    .col(big_integer(Credits::Version).default(0))
                    .col(timestamp_with_time_zone(Credits::CreatedAt))
                    .col(timestamp_with_time_zone(Credits::UpdatedAt))
                    .check(Expr::col(Credits::Credit).gte(0))
                    .check(Expr::col(Credits::AddOnCredit).gte(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_credits_membership_id")
                            .from(Credits::Table, Credits::MembershipId)
                            .to(UserMemberships::Table, UserMemberships::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credits_membership_id")
                    .table(Credits::Table)
                    .col(Credits::MembershipId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Bills outlive their account, so no foreign key back to credits
        manager
            .create_table(
                Table::create()
                    .table(CreditBills::Table)
                    .if_not_exists()
                    .col(pk_uuid(CreditBills::Id))
                    .col(uuid(CreditBills::CreditId))
                    .col(big_integer(CreditBills::Seq))
                    .col(uuid(CreditBills::MembershipId))
                    .col(uuid(CreditBills::UserId))
                    .col(string_len(CreditBills::BillType, 32))
                    .col(string_len(CreditBills::CreditType, 32))
                    .col(string_len(CreditBills::InOutType, 16))
                    .col(big_integer(CreditBills::Credit))
                    .col(big_integer(CreditBills::BeforeCredit))
                    .col(big_integer(CreditBills::AfterCredit))
                    .col(big_integer(CreditBills::AddOnCredit))
                    .col(big_integer(CreditBills::BeforeAddOnCredit))
                    .col(big_integer(CreditBills::AfterAddOnCredit))
                    .col(string(CreditBills::Content))
                    .col(string(CreditBills::Remark))
                    .col(timestamp_with_time_zone(CreditBills::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credit_bills_credit_seq")
                    .table(CreditBills::Table)
                    .col(CreditBills::CreditId)
                    .col(CreditBills::Seq)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credit_bills_membership_id")
                    .table(CreditBills::Table)
                    .col(CreditBills::MembershipId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CreditBills::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Credits::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Credits {
    Table,
    Id,
    MembershipId,
    UserId,
    Credit,
    AddOnCredit,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CreditBills {
    Table,
    Id,
    CreditId,
    Seq,
    MembershipId,
    UserId,
    BillType,
    CreditType,
    InOutType,
    Credit,
    BeforeCredit,
    AfterCredit,
    AddOnCredit,
    BeforeAddOnCredit,
    AfterAddOnCredit,
    Content,
    Remark,
    CreatedAt,
}
