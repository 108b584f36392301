use crate::{
    config::MembershipConfig,
    error::{ApiError, Result},
    models::membership::MembershipBaseInfo,
    services::CreditService,
};
use entity::{sea_orm_active_enums::MembershipType, user_memberships};
use sea_orm::{
    entity::*, query::*, sea_query::OnConflict, DatabaseConnection, DatabaseTransaction,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Membership records and their 1:1 credit account
pub struct UserMembershipService {
    db: DatabaseConnection,
    credit_service: Arc<CreditService>,
    membership_config: Arc<MembershipConfig>,
}

impl UserMembershipService {
    pub fn new(
        db: DatabaseConnection,
        credit_service: Arc<CreditService>,
        membership_config: Arc<MembershipConfig>,
    ) -> Self {
        Self {
            db,
            credit_service,
            membership_config,
        }
    }

    #[instrument(skip(self))]
    pub async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<user_memberships::Model>> {
        let membership = user_memberships::Entity::find()
            .filter(user_memberships::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?;
        Ok(membership)
    }

    pub async fn get_by_user_id(&self, user_id: Uuid) -> Result<user_memberships::Model> {
        self.find_by_user_id(user_id)
            .await?
            .ok_or_else(|| ApiError::UserAccountNotFound(user_id.to_string()))
    }

    /// Create a FREE membership and its credit account in one transaction.
    ///
    /// The window starts out already elapsed, so the free subscription that
    /// follows is accepted and sets the real window.
    #[instrument(skip(self))]
    pub async fn new_account(&self, user_id: Uuid) -> Result<user_memberships::Model> {
        let now = time::OffsetDateTime::now_utc();
        let membership_id = Uuid::new_v4();

        let txn = self.db.begin().await?;

        let membership = user_memberships::ActiveModel {
            id: Set(membership_id),
            user_id: Set(user_id),
            membership_type: Set(MembershipType::Free),
            start_at: Set(now - time::Duration::minutes(10)),
            end_at: Set(now - time::Duration::minutes(5)),
            stripe_subscription_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = user_memberships::Entity::insert(membership)
            .on_conflict(
                OnConflict::column(user_memberships::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        if inserted == 0 {
            txn.rollback().await?;
            return Err(ApiError::UserAccountAlreadyExists(user_id.to_string()));
        }

        self.credit_service
            .new_credit_account_in_txn(&txn, user_id, membership_id)
            .await?;

        let membership = user_memberships::Entity::find_by_id(membership_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ApiError::Internal(anyhow::anyhow!(
                    "Failed to read membership {} after insert",
                    membership_id
                ))
            })?;

        txn.commit().await?;

        info!(user_id = %user_id, membership_id = %membership_id, "Created membership account");
        Ok(membership)
    }

    /// Delete the credit account, then the membership
    #[instrument(skip(self))]
    pub async fn delete_account(&self, user_id: Uuid) -> Result<()> {
        let txn = self.db.begin().await?;

        let membership = user_memberships::Entity::find()
            .filter(user_memberships::Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ApiError::UserAccountNotFound(user_id.to_string()))?;

        match self
            .credit_service
            .delete_credit_account_in_txn(&txn, membership.id)
            .await
        {
            Ok(()) => {}
            Err(ApiError::UserCreditAccountNotFound(_)) => {
                warn!(membership_id = %membership.id, "Membership had no credit account");
            }
            Err(e) => return Err(e),
        }

        user_memberships::Entity::delete_by_id(membership.id)
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(user_id = %user_id, membership_id = %membership.id, "Deleted membership account");
        Ok(())
    }

    pub async fn update_account_type_in_txn(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        membership_type: MembershipType,
        stripe_subscription_id: Option<String>,
        start_at: time::OffsetDateTime,
        end_at: time::OffsetDateTime,
    ) -> Result<user_memberships::Model> {
        let membership = user_memberships::Entity::find()
            .filter(user_memberships::Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| ApiError::UserAccountNotFound(user_id.to_string()))?;

        let mut active: user_memberships::ActiveModel = membership.into();
        active.membership_type = Set(membership_type);
        active.start_at = Set(start_at);
        active.end_at = Set(end_at);
        if stripe_subscription_id.is_some() || membership_type == MembershipType::Free {
            active.stripe_subscription_id = Set(stripe_subscription_id);
        }
        active.updated_at = Set(time::OffsetDateTime::now_utc());

        let membership = active.update(txn).await?;

        info!(
            user_id = %user_id,
            membership_type = ?membership_type,
            end_at = %end_at,
            "Updated membership type"
        );
        Ok(membership)
    }

    #[instrument(skip(self))]
    pub async fn update_account_type(
        &self,
        user_id: Uuid,
        membership_type: MembershipType,
        stripe_subscription_id: Option<String>,
        start_at: time::OffsetDateTime,
        end_at: time::OffsetDateTime,
    ) -> Result<user_memberships::Model> {
        let txn = self.db.begin().await?;
        let membership = self
            .update_account_type_in_txn(
                &txn,
                user_id,
                membership_type,
                stripe_subscription_id,
                start_at,
                end_at,
            )
            .await?;
        txn.commit().await?;
        Ok(membership)
    }

    /// `(expired, type)`; expired once the window end has passed
    #[instrument(skip(self))]
    pub async fn check_expired(&self, user_id: Uuid) -> Result<(bool, MembershipType)> {
        let membership = self.get_by_user_id(user_id).await?;
        let expired = window_ended(membership.end_at, time::OffsetDateTime::now_utc());
        Ok((expired, membership.membership_type))
    }

    #[instrument(skip(self))]
    pub async fn has_perm_use_add_on_credit(&self, user_id: Uuid) -> Result<bool> {
        let membership = self.get_by_user_id(user_id).await?;
        Ok(self
            .membership_config
            .type_config(membership.membership_type)
            .base
            .is_enable_add_on_credit)
    }

    #[instrument(skip(self))]
    pub async fn get_base_info(&self, user_id: Uuid) -> Result<MembershipBaseInfo> {
        let membership = self.get_by_user_id(user_id).await?;
        let account = self
            .credit_service
            .get_by_membership_id(membership.id)
            .await?;

        let now = time::OffsetDateTime::now_utc();
        let is_expired = window_ended(membership.end_at, now);
        let expired_day = if is_expired {
            0
        } else {
            (membership.end_at - now).whole_days()
        };

        Ok(MembershipBaseInfo {
            user_id,
            membership_id: membership.id,
            membership_type: membership.membership_type,
            name: self
                .membership_config
                .type_config(membership.membership_type)
                .name
                .clone(),
            start_at: membership.start_at,
            end_at: membership.end_at,
            is_expired,
            expired_day,
            credit: account.credit,
            add_on_credit: account.add_on_credit,
        })
    }

    /// Memberships whose window has ended, oldest first
    #[instrument(skip(self))]
    pub async fn get_account_expired_list(
        &self,
        membership_type: Option<MembershipType>,
        limit: u64,
    ) -> Result<Vec<user_memberships::Model>> {
        self.get_account_expired_list_at(membership_type, time::OffsetDateTime::now_utc(), limit)
            .await
    }

    /// Memberships whose window had ended at `now`; same boundary as [`Self::check_expired`]
    #[instrument(skip(self))]
    pub async fn get_account_expired_list_at(
        &self,
        membership_type: Option<MembershipType>,
        now: time::OffsetDateTime,
        limit: u64,
    ) -> Result<Vec<user_memberships::Model>> {
        let mut query = user_memberships::Entity::find()
            .filter(user_memberships::Column::EndAt.lt(now))
            .order_by_asc(user_memberships::Column::EndAt)
            .limit(limit);
        if let Some(membership_type) = membership_type {
            query = query.filter(user_memberships::Column::MembershipType.eq(membership_type));
        }
        Ok(query.all(&self.db).await?)
    }

    pub async fn get_free_account_expired_list(
        &self,
        limit: u64,
    ) -> Result<Vec<user_memberships::Model>> {
        self.get_account_expired_list(Some(MembershipType::Free), limit)
            .await
    }

    pub async fn get_pro_account_expired_list(
        &self,
        limit: u64,
    ) -> Result<Vec<user_memberships::Model>> {
        self.get_account_expired_list(Some(MembershipType::Professional), limit)
            .await
    }

    /// Downgrade to FREE and zero both balances, as one unit
    #[instrument(skip(self))]
    pub async fn expired_account_to_free(&self, user_id: Uuid) -> Result<()> {
        let mut attempt = 0;
        loop {
            let txn = self.db.begin().await?;
            match self.expired_account_to_free_in_txn(&txn, user_id).await {
                Ok(()) => {
                    txn.commit().await?;
                    return Ok(());
                }
                Err(ApiError::ConcurrentModification(reason))
                    if attempt < self.credit_service.max_retries() =>
                {
                    txn.rollback().await?;
                    attempt += 1;
                    warn!(user_id = %user_id, attempt, "Retrying downgrade: {}", reason);
                }
                Err(e) => {
                    txn.rollback().await?;
                    return Err(e);
                }
            }
        }
    }

    async fn expired_account_to_free_in_txn(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
    ) -> Result<()> {
        let membership = user_memberships::Entity::find()
            .filter(user_memberships::Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| ApiError::UserAccountNotFound(user_id.to_string()))?;

        let membership_id = membership.id;
        let mut active: user_memberships::ActiveModel = membership.into();
        active.membership_type = Set(MembershipType::Free);
        active.stripe_subscription_id = Set(None);
        active.updated_at = Set(time::OffsetDateTime::now_utc());
        active.update(txn).await?;

        self.credit_service
            .credit_account_expired_all_credit_in_txn(txn, user_id, membership_id)
            .await?;

        info!(user_id = %user_id, "Downgraded expired membership to free");
        Ok(())
    }
}

/// A window is over once `end_at` lies strictly before `now`
fn window_ended(end_at: time::OffsetDateTime, now: time::OffsetDateTime) -> bool {
    end_at < now
}
