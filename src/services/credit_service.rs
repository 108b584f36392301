use crate::{
    config::LedgerConfig,
    error::{ApiError, Result},
    models::credit::{CreditPayIntent, LedgerAudit},
};
use entity::{
    credit_bills, credits,
    sea_orm_active_enums::{CreditInOutType, CreditPayType, CreditType},
};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, sea_query::OnConflict, ConnectionTrait,
    DatabaseConnection, DatabaseTransaction, TransactionTrait,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Ledger operations. Callers pick one directly or let
/// [`CreditService::in_or_out_credit`] choose from the intent's reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOperation {
    /// Zero primary credit, then add the plan's allotment (SUB_FREE, SUB_PRO)
    GrantSubscription,
    /// Add to add-on credit (SUB_PRO_ADD_ON_CREDIT)
    GrantAddOn,
    /// Spend from the balance named by the intent's credit type (SERVICE_COST)
    Debit,
    /// Exact inverse of a debit (SERVICE_RETRIEVE)
    CreditBack,
    /// Zero both balances (EXPIRED)
    ExpireToZero,
}

impl LedgerOperation {
    pub fn for_pay_type(pay_type: CreditPayType) -> Result<Self> {
        match pay_type {
            CreditPayType::SubFree | CreditPayType::SubPro => Ok(Self::GrantSubscription),
            CreditPayType::SubProAddOnCredit => Ok(Self::GrantAddOn),
            CreditPayType::ServiceCost => Ok(Self::Debit),
            CreditPayType::ServiceRetrieve => Ok(Self::CreditBack),
            CreditPayType::Expired => Ok(Self::ExpireToZero),
            CreditPayType::Unspecified => {
                Err(ApiError::CreditBillTypeUnknown(format!("{:?}", pay_type)))
            }
        }
    }
}

/// Owns every write to credit balances. Each write is paired with exactly one
/// bill in the same transaction.
pub struct CreditService {
    db: DatabaseConnection,
    max_retries: u32,
}

impl CreditService {
    pub fn new(db: DatabaseConnection, config: &LedgerConfig) -> Self {
        Self {
            db,
            max_retries: config.max_retries,
        }
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Create the zero-balance account of a membership
    #[instrument(skip(self))]
    pub async fn new_credit_account(
        &self,
        user_id: Uuid,
        membership_id: Uuid,
    ) -> Result<credits::Model> {
        let txn = self.db.begin().await?;
        let account = self
            .new_credit_account_in_txn(&txn, user_id, membership_id)
            .await?;
        txn.commit().await?;
        Ok(account)
    }

    #[instrument(skip(self, txn))]
    pub async fn new_credit_account_in_txn(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        membership_id: Uuid,
    ) -> Result<credits::Model> {
        let now = time::OffsetDateTime::now_utc();
        let account_id = Uuid::new_v4();

        let account = credits::ActiveModel {
            id: Set(account_id),
            membership_id: Set(membership_id),
            user_id: Set(user_id),
            credit: Set(0),
            add_on_credit: Set(0),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // Unique on membership_id; a concurrent creator leaves zero rows inserted
        let inserted = credits::Entity::insert(account)
            .on_conflict(
                OnConflict::column(credits::Column::MembershipId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(txn)
            .await?;

        if inserted == 0 {
            return Err(ApiError::UserCreditAccountAlreadyExists(
                membership_id.to_string(),
            ));
        }

        let account = credits::Entity::find_by_id(account_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ApiError::Internal(anyhow::anyhow!(
                    "Failed to read credit account {} after insert",
                    account_id
                ))
            })?;

        info!(user_id = %user_id, membership_id = %membership_id, "Created credit account");
        Ok(account)
    }

    /// Remove the account. Its bills stay as the audit trail.
    #[instrument(skip(self))]
    pub async fn delete_credit_account(&self, membership_id: Uuid) -> Result<()> {
        let txn = self.db.begin().await?;
        self.delete_credit_account_in_txn(&txn, membership_id).await?;
        txn.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, txn))]
    pub async fn delete_credit_account_in_txn(
        &self,
        txn: &DatabaseTransaction,
        membership_id: Uuid,
    ) -> Result<()> {
        let result = credits::Entity::delete_many()
            .filter(credits::Column::MembershipId.eq(membership_id))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ApiError::UserCreditAccountNotFound(
                membership_id.to_string(),
            ));
        }

        info!(membership_id = %membership_id, "Deleted credit account");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_by_membership_id(&self, membership_id: Uuid) -> Result<credits::Model> {
        find_account(&self.db, membership_id).await
    }

    /// Read-only check that primary credit covers `amount`
    #[instrument(skip(self))]
    pub async fn check_credit_enough(
        &self,
        user_id: Uuid,
        membership_id: Uuid,
        amount: i64,
    ) -> Result<bool> {
        let account = find_account(&self.db, membership_id).await?;
        Ok(account.credit >= amount)
    }

    /// Read-only check that add-on credit covers `amount`
    #[instrument(skip(self))]
    pub async fn check_add_on_credit_enough(
        &self,
        user_id: Uuid,
        membership_id: Uuid,
        amount: i64,
    ) -> Result<bool> {
        let account = find_account(&self.db, membership_id).await?;
        Ok(account.add_on_credit >= amount)
    }

    /// Single entry for tag-driven callers; dispatches on `intent.pay_type`.
    /// Returns the id of the last bill written.
    #[instrument(skip(self, intent), fields(pay_type = ?intent.pay_type))]
    pub async fn in_or_out_credit(
        &self,
        user_id: Uuid,
        membership_id: Uuid,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        let operation = LedgerOperation::for_pay_type(intent.pay_type)?;
        self.apply(operation, user_id, membership_id, intent).await
    }

    /// [`Self::in_or_out_credit`] inside a caller-owned transaction, no retry.
    pub async fn in_or_out_credit_in_txn(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        membership_id: Uuid,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        let operation = LedgerOperation::for_pay_type(intent.pay_type)?;
        self.apply_in_txn(txn, operation, user_id, membership_id, intent)
            .await
    }

    pub async fn grant_subscription(
        &self,
        user_id: Uuid,
        membership_id: Uuid,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        self.apply(LedgerOperation::GrantSubscription, user_id, membership_id, intent)
            .await
    }

    pub async fn grant_add_on(
        &self,
        user_id: Uuid,
        membership_id: Uuid,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        self.apply(LedgerOperation::GrantAddOn, user_id, membership_id, intent)
            .await
    }

    pub async fn debit(
        &self,
        user_id: Uuid,
        membership_id: Uuid,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        self.apply(LedgerOperation::Debit, user_id, membership_id, intent)
            .await
    }

    pub async fn credit_back(
        &self,
        user_id: Uuid,
        membership_id: Uuid,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        self.apply(LedgerOperation::CreditBack, user_id, membership_id, intent)
            .await
    }

    pub async fn expire_to_zero(
        &self,
        user_id: Uuid,
        membership_id: Uuid,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        self.apply(LedgerOperation::ExpireToZero, user_id, membership_id, intent)
            .await
    }

    /// Zero both balances through the regular mutation path
    #[instrument(skip(self))]
    pub async fn credit_account_expired_all_credit(
        &self,
        user_id: Uuid,
        membership_id: Uuid,
    ) -> Result<Uuid> {
        self.expire_to_zero(user_id, membership_id, &expired_intent())
            .await
    }

    pub async fn credit_account_expired_all_credit_in_txn(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        membership_id: Uuid,
    ) -> Result<Uuid> {
        self.apply_in_txn(
            txn,
            LedgerOperation::ExpireToZero,
            user_id,
            membership_id,
            &expired_intent(),
        )
        .await
    }

    /// Run one operation in its own transaction, retrying lost version races
    #[instrument(skip(self, intent))]
    pub async fn apply(
        &self,
        operation: LedgerOperation,
        user_id: Uuid,
        membership_id: Uuid,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        let mut attempt = 0;
        loop {
            let txn = self.db.begin().await?;
            match self
                .apply_in_txn(&txn, operation, user_id, membership_id, intent)
                .await
            {
                Ok(bill_id) => {
                    txn.commit().await?;
                    return Ok(bill_id);
                }
                Err(ApiError::ConcurrentModification(reason)) if attempt < self.max_retries => {
                    txn.rollback().await?;
                    attempt += 1;
                    warn!(
                        membership_id = %membership_id,
                        attempt,
                        "Retrying ledger write after conflict: {}",
                        reason
                    );
                }
                Err(e) => {
                    txn.rollback().await?;
                    return Err(e);
                }
            }
        }
    }

    /// Run one operation inside `txn`. A version conflict surfaces as
    /// `ConcurrentModification` and leaves retrying to the transaction owner.
    pub async fn apply_in_txn(
        &self,
        txn: &DatabaseTransaction,
        operation: LedgerOperation,
        user_id: Uuid,
        membership_id: Uuid,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        if intent.credit < 0 || intent.add_on_credit < 0 {
            return Err(ApiError::BadRequest(
                "credit amounts must not be negative".to_string(),
            ));
        }

        let mut account = credits::Entity::find()
            .filter(credits::Column::MembershipId.eq(membership_id))
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| ApiError::UserCreditAccountNotFound(membership_id.to_string()))?;

        let bill_id = match operation {
            LedgerOperation::GrantSubscription => {
                // Renewal is one unit: a failed reset aborts the grant with it
                self.reset_credit_zero(txn, &mut account, CreditPayType::Expired, intent)
                    .await?;
                self.in_credit(txn, &mut account, intent.credit, intent).await?
            }
            LedgerOperation::GrantAddOn => {
                self.in_add_on_credit(txn, &mut account, intent.add_on_credit, intent)
                    .await?
            }
            LedgerOperation::Debit => match intent.credit_type {
                CreditType::AddOnCredit => {
                    self.out_add_on_credit(txn, &mut account, intent.amount(), intent)
                        .await?
                }
                CreditType::Credit => {
                    self.out_credit(txn, &mut account, intent.amount(), intent)
                        .await?
                }
            },
            LedgerOperation::CreditBack => match intent.credit_type {
                CreditType::AddOnCredit => {
                    self.in_add_on_credit(txn, &mut account, intent.amount(), intent)
                        .await?
                }
                CreditType::Credit => self.in_credit(txn, &mut account, intent.amount(), intent).await?,
            },
            LedgerOperation::ExpireToZero => {
                self.reset_credit_zero(txn, &mut account, intent.pay_type, intent)
                    .await?;
                self.reset_add_on_credit_zero(txn, &mut account, intent)
                    .await?
            }
        };

        info!(
            user_id = %user_id,
            membership_id = %membership_id,
            operation = ?operation,
            credit = account.credit,
            add_on_credit = account.add_on_credit,
            "Applied ledger operation"
        );

        Ok(bill_id)
    }

    async fn in_credit(
        &self,
        txn: &DatabaseTransaction,
        account: &mut credits::Model,
        amount: i64,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        let change = BalanceChange {
            bill_type: intent.pay_type,
            credit_type: CreditType::Credit,
            in_out_type: CreditInOutType::Income,
            credit_delta: amount,
            add_on_credit_delta: 0,
        };
        self.write(txn, account, change, intent).await
    }

    async fn out_credit(
        &self,
        txn: &DatabaseTransaction,
        account: &mut credits::Model,
        amount: i64,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        if account.credit < amount {
            return Err(ApiError::CreditNotEnough {
                need: amount,
                have: account.credit,
            });
        }
        let change = BalanceChange {
            bill_type: intent.pay_type,
            credit_type: CreditType::Credit,
            in_out_type: CreditInOutType::Expense,
            credit_delta: -amount,
            add_on_credit_delta: 0,
        };
        self.write(txn, account, change, intent).await
    }

    async fn in_add_on_credit(
        &self,
        txn: &DatabaseTransaction,
        account: &mut credits::Model,
        amount: i64,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        let change = BalanceChange {
            bill_type: intent.pay_type,
            credit_type: CreditType::AddOnCredit,
            in_out_type: CreditInOutType::Income,
            credit_delta: 0,
            add_on_credit_delta: amount,
        };
        self.write(txn, account, change, intent).await
    }

    async fn out_add_on_credit(
        &self,
        txn: &DatabaseTransaction,
        account: &mut credits::Model,
        amount: i64,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        if account.add_on_credit < amount {
            return Err(ApiError::CreditAddOnNotEnough {
                need: amount,
                have: account.add_on_credit,
            });
        }
        let change = BalanceChange {
            bill_type: intent.pay_type,
            credit_type: CreditType::AddOnCredit,
            in_out_type: CreditInOutType::Expense,
            credit_delta: 0,
            add_on_credit_delta: -amount,
        };
        self.write(txn, account, change, intent).await
    }

    async fn reset_credit_zero(
        &self,
        txn: &DatabaseTransaction,
        account: &mut credits::Model,
        bill_type: CreditPayType,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        let change = BalanceChange {
            bill_type,
            credit_type: CreditType::Credit,
            in_out_type: CreditInOutType::Expense,
            credit_delta: -account.credit,
            add_on_credit_delta: 0,
        };
        self.write(txn, account, change, intent).await
    }

    async fn reset_add_on_credit_zero(
        &self,
        txn: &DatabaseTransaction,
        account: &mut credits::Model,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        let change = BalanceChange {
            bill_type: intent.pay_type,
            credit_type: CreditType::AddOnCredit,
            in_out_type: CreditInOutType::Expense,
            credit_delta: 0,
            add_on_credit_delta: -account.add_on_credit,
        };
        self.write(txn, account, change, intent).await
    }

    /// Compare-and-swap the balances on `version`, then append the bill.
    async fn write(
        &self,
        txn: &DatabaseTransaction,
        account: &mut credits::Model,
        change: BalanceChange,
        intent: &CreditPayIntent,
    ) -> Result<Uuid> {
        let before_credit = account.credit;
        let before_add_on_credit = account.add_on_credit;
        let after_credit = before_credit + change.credit_delta;
        let after_add_on_credit = before_add_on_credit + change.add_on_credit_delta;

        if after_credit < 0 {
            return Err(ApiError::CreditNotEnough {
                need: -change.credit_delta,
                have: before_credit,
            });
        }
        if after_add_on_credit < 0 {
            return Err(ApiError::CreditAddOnNotEnough {
                need: -change.add_on_credit_delta,
                have: before_add_on_credit,
            });
        }

        let now = time::OffsetDateTime::now_utc();
        let next_version = account.version + 1;

        let updated = credits::Entity::update_many()
            .col_expr(credits::Column::Credit, Expr::value(after_credit))
            .col_expr(credits::Column::AddOnCredit, Expr::value(after_add_on_credit))
            .col_expr(credits::Column::Version, Expr::value(next_version))
            .col_expr(credits::Column::UpdatedAt, Expr::value(now))
            .filter(credits::Column::Id.eq(account.id))
            .filter(credits::Column::Version.eq(account.version))
            .exec(txn)
            .await?;

        if updated.rows_affected == 0 {
            return Err(ApiError::ConcurrentModification(format!(
                "credit account {} moved past version {}",
                account.id, account.version
            )));
        }

        let bill_id = Uuid::new_v4();
        let bill = credit_bills::ActiveModel {
            id: Set(bill_id),
            credit_id: Set(account.id),
            seq: Set(next_version),
            membership_id: Set(account.membership_id),
            user_id: Set(account.user_id),
            bill_type: Set(change.bill_type),
            credit_type: Set(change.credit_type),
            in_out_type: Set(change.in_out_type),
            credit: Set(change.credit_delta),
            before_credit: Set(before_credit),
            after_credit: Set(after_credit),
            add_on_credit: Set(change.add_on_credit_delta),
            before_add_on_credit: Set(before_add_on_credit),
            after_add_on_credit: Set(after_add_on_credit),
            content: Set(intent.content.clone()),
            remark: Set(intent.remark.clone()),
            created_at: Set(now),
        };
        bill.insert(txn).await?;

        account.credit = after_credit;
        account.add_on_credit = after_add_on_credit;
        account.version = next_version;
        account.updated_at = now;

        debug!(
            bill_id = %bill_id,
            bill_type = ?change.bill_type,
            credit_delta = change.credit_delta,
            add_on_credit_delta = change.add_on_credit_delta,
            "Wrote credit bill"
        );

        Ok(bill_id)
    }

    /// Bills of the membership's current account in the order they were written.
    /// Bills of a deleted account stay behind under their own `credit_id`.
    #[instrument(skip(self))]
    pub async fn list_bills(&self, membership_id: Uuid) -> Result<Vec<credit_bills::Model>> {
        let account = find_account(&self.db, membership_id).await?;
        account_bills(&self.db, account.id).await
    }

    /// Replay every bill from (0, 0) and compare with the stored balances
    #[instrument(skip(self))]
    pub async fn audit(&self, membership_id: Uuid) -> Result<LedgerAudit> {
        let account = find_account(&self.db, membership_id).await?;
        let bills = account_bills(&self.db, account.id).await?;

        let mut replayed_credit = 0;
        let mut replayed_add_on_credit = 0;
        let mut broken_bills = Vec::new();

        for bill in &bills {
            let continuous = bill.before_credit == replayed_credit
                && bill.before_add_on_credit == replayed_add_on_credit;
            let balanced = bill.after_credit == bill.before_credit + bill.credit
                && bill.after_add_on_credit == bill.before_add_on_credit + bill.add_on_credit;
            if !continuous || !balanced {
                broken_bills.push(bill.id);
            }
            replayed_credit += bill.credit;
            replayed_add_on_credit += bill.add_on_credit;
        }

        let audit = LedgerAudit {
            bill_count: bills.len(),
            replayed_credit,
            replayed_add_on_credit,
            credit: account.credit,
            add_on_credit: account.add_on_credit,
            broken_bills,
        };

        if !audit.is_consistent() {
            warn!(membership_id = %membership_id, ?audit, "Ledger replay mismatch");
        }

        Ok(audit)
    }
}

struct BalanceChange {
    bill_type: CreditPayType,
    credit_type: CreditType,
    in_out_type: CreditInOutType,
    credit_delta: i64,
    add_on_credit_delta: i64,
}

fn expired_intent() -> CreditPayIntent {
    CreditPayIntent::new(CreditPayType::Expired).with_content("membership expired", "")
}

async fn find_account<C: ConnectionTrait>(db: &C, membership_id: Uuid) -> Result<credits::Model> {
    credits::Entity::find()
        .filter(credits::Column::MembershipId.eq(membership_id))
        .one(db)
        .await?
        .ok_or_else(|| ApiError::UserCreditAccountNotFound(membership_id.to_string()))
}

async fn account_bills<C: ConnectionTrait>(
    db: &C,
    credit_id: Uuid,
) -> Result<Vec<credit_bills::Model>> {
    let bills = credit_bills::Entity::find()
        .filter(credit_bills::Column::CreditId.eq(credit_id))
        .order_by_asc(credit_bills::Column::Seq)
        .all(db)
        .await?;
    Ok(bills)
}
