use crate::{
    config::MembershipConfig,
    error::{ApiError, Result},
    events::{Event, EventHandler, EventPayload, EventType},
    services::{
        feature_cost::{
            AiCopilotCost, CreditFeature, DocsUploadCost, NoteCost, NoteKind, TranslateCost,
            TranslateKind,
        },
        CreditPaymentService, CreditService, OrderService, UserMembershipService,
    },
};
use async_trait::async_trait;
use entity::{
    sea_orm_active_enums::{CreditType, MembershipType, OrderType},
    user_memberships,
};
use std::{
    future::Future,
    sync::{Arc, Weak},
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Member-facing flows: account lifecycle, feature charging and expiry
pub struct MembershipService {
    credit_service: Arc<CreditService>,
    credit_payment_service: Arc<CreditPaymentService>,
    user_membership_service: Arc<UserMembershipService>,
    order_service: Arc<OrderService>,
    membership_config: Arc<MembershipConfig>,
}

impl MembershipService {
    pub fn new(
        credit_service: Arc<CreditService>,
        credit_payment_service: Arc<CreditPaymentService>,
        user_membership_service: Arc<UserMembershipService>,
        order_service: Arc<OrderService>,
        membership_config: Arc<MembershipConfig>,
    ) -> Self {
        Self {
            credit_service,
            credit_payment_service,
            user_membership_service,
            order_service,
            membership_config,
        }
    }

    /// Existing membership, or a new one with its first free period
    #[instrument(skip(self))]
    pub async fn check_account_and_new(&self, user_id: Uuid) -> Result<user_memberships::Model> {
        match self.user_membership_service.find_by_user_id(user_id).await? {
            Some(membership) => Ok(membership),
            None => self.new_membership_account(user_id).await,
        }
    }

    #[instrument(skip(self))]
    pub async fn new_membership_account(&self, user_id: Uuid) -> Result<user_memberships::Model> {
        self.user_membership_service.new_account(user_id).await?;
        self.auto_subscribe_member_free(user_id).await?;
        self.user_membership_service.get_by_user_id(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn delete_membership_account(&self, user_id: Uuid) -> Result<()> {
        self.user_membership_service.delete_account(user_id).await
    }

    /// Free plan order, settled immediately
    #[instrument(skip(self))]
    pub async fn auto_subscribe_member_free(&self, user_id: Uuid) -> Result<()> {
        let order = self
            .order_service
            .subscribe(user_id, OrderType::SubFree, 1)
            .await?;
        self.order_service
            .do_order_pay_success_handler(order.id, None, None)
            .await
    }

    /// Charge for a feature around `action`.
    ///
    /// `action` receives the payment session id when credit was taken. A failed
    /// action refunds the session before its error is returned. Without
    /// `auto_confirm` the session stays open for the caller or the expiry sweep.
    #[instrument(skip(self, feature, action))]
    pub async fn charge_around<T, F, Fut>(
        &self,
        user_id: Uuid,
        feature: Option<&dyn CreditFeature>,
        auto_confirm: bool,
        action: F,
    ) -> Result<T>
    where
        F: FnOnce(Option<Uuid>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let membership = self.check_account_and_new(user_id).await?;
        let feature = feature.ok_or(ApiError::CheckPermissionAndPayConfigFunNoNull)?;

        let tier = self
            .membership_config
            .type_config(membership.membership_type);
        let charge = feature.resolve(tier)?;

        if !charge.needs_pay {
            debug!(service_type = ?feature.service_type(), "Feature runs uncharged");
            return action(None).await;
        }

        let mut intent = charge.intent;
        let need = intent.credit;
        let primary_enough = self
            .credit_service
            .check_credit_enough(user_id, membership.id, need)
            .await?;
        if !primary_enough {
            let account = self
                .credit_service
                .get_by_membership_id(membership.id)
                .await?;
            if !self
                .user_membership_service
                .has_perm_use_add_on_credit(user_id)
                .await?
            {
                return Err(ApiError::CreditNotEnough {
                    need,
                    have: account.credit,
                });
            }
            if !self
                .credit_service
                .check_add_on_credit_enough(user_id, membership.id, need)
                .await?
            {
                return Err(ApiError::CreditAddOnNotEnough {
                    need,
                    have: account.add_on_credit,
                });
            }
            intent = intent
                .with_add_on_credit(need)
                .with_credit(0)
                .with_credit_type(CreditType::AddOnCredit);
        }

        let record_id = self
            .credit_payment_service
            .new_payment_order(membership.id, user_id, &intent)
            .await?;
        self.credit_payment_service
            .pay(user_id, membership.id, record_id)
            .await?;

        let value = match action(Some(record_id)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(record_id = %record_id, "Charged action failed, refunding: {}", e);
                if let Err(refund) = self.credit_payment_service.retrieve(Some(record_id)).await {
                    error!(record_id = %record_id, "Refund after failed action failed: {}", refund);
                }
                return Err(e);
            }
        };

        if auto_confirm {
            // The action already happened; an unconfirmed session is settled by the sweep
            if let Err(e) = self.credit_payment_service.confirm(Some(record_id)).await {
                warn!(record_id = %record_id, "Auto confirm failed: {}", e);
            }
        } else {
            info!(record_id = %record_id, "Credit session left for caller confirmation");
        }

        Ok(value)
    }

    pub async fn credit_fun_docs_upload<T, F, Fut>(
        &self,
        user_id: Uuid,
        cost: DocsUploadCost,
        auto_confirm: bool,
        action: F,
    ) -> Result<T>
    where
        F: FnOnce(Option<Uuid>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.charge_around(user_id, Some(&cost), auto_confirm, action)
            .await
    }

    pub async fn credit_fun_ai<T, F, Fut>(
        &self,
        user_id: Uuid,
        model_key: &str,
        auto_confirm: bool,
        action: F,
    ) -> Result<T>
    where
        F: FnOnce(Option<Uuid>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cost = AiCopilotCost {
            model_key: model_key.to_string(),
        };
        self.charge_around(user_id, Some(&cost), auto_confirm, action)
            .await
    }

    pub async fn credit_fun_translate<T, F, Fut>(
        &self,
        user_id: Uuid,
        kind: TranslateKind,
        auto_confirm: bool,
        action: F,
    ) -> Result<T>
    where
        F: FnOnce(Option<Uuid>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cost = TranslateCost { kind };
        self.charge_around(user_id, Some(&cost), auto_confirm, action)
            .await
    }

    pub async fn credit_fun_note<T, F, Fut>(
        &self,
        user_id: Uuid,
        kind: NoteKind,
        action: F,
    ) -> Result<T>
    where
        F: FnOnce(Option<Uuid>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cost = NoteCost { kind };
        self.charge_around(user_id, Some(&cost), true, action).await
    }

    pub async fn confirm_credit_fun(&self, record_id: Option<Uuid>) -> Result<()> {
        self.credit_payment_service.confirm(record_id).await
    }

    pub async fn retrieve_credit_fun(&self, record_id: Option<Uuid>) -> Result<()> {
        self.credit_payment_service.retrieve(record_id).await
    }

    /// `user.register` creates the account, `user.deleted` removes it.
    /// Both tolerate redelivery.
    #[instrument(skip(self))]
    pub async fn handle_user_notify(&self, event_type: EventType, user_id: Uuid) -> Result<()> {
        match event_type {
            EventType::UserRegister => match self.new_membership_account(user_id).await {
                Ok(_) => Ok(()),
                Err(ApiError::UserAccountAlreadyExists(_)) => {
                    debug!(user_id = %user_id, "Membership already exists");
                    Ok(())
                }
                Err(e) => Err(e),
            },
            EventType::UserDeleted => match self.delete_membership_account(user_id).await {
                Ok(()) => Ok(()),
                Err(ApiError::UserAccountNotFound(_)) => {
                    debug!(user_id = %user_id, "Membership already deleted");
                    Ok(())
                }
                Err(e) => Err(e),
            },
            other => {
                warn!(event_type = %other, "Membership handler received unrelated event");
                Ok(())
            }
        }
    }

    pub async fn get_account_expired_list(
        &self,
        membership_type: Option<MembershipType>,
        limit: u64,
    ) -> Result<Vec<user_memberships::Model>> {
        self.user_membership_service
            .get_account_expired_list(membership_type, limit)
            .await
    }

    /// Renew an elapsed membership on the free plan, downgrading Pro first
    #[instrument(skip(self))]
    pub async fn handle_account_expired(&self, membership_id: Uuid, user_id: Uuid) -> Result<()> {
        let (expired, membership_type) =
            self.user_membership_service.check_expired(user_id).await?;
        if !expired {
            return Err(ApiError::AccountNotExpired(membership_id.to_string()));
        }

        info!(
            membership_id = %membership_id,
            membership_type = ?membership_type,
            "Handling expired membership"
        );

        if membership_type == MembershipType::Professional {
            self.user_membership_service
                .expired_account_to_free(user_id)
                .await?;
        }
        self.auto_subscribe_member_free(user_id).await
    }
}

/// Bus adapter for `user.register` / `user.deleted`
pub struct MembershipEventHandler {
    membership_service: Weak<MembershipService>,
}

impl MembershipEventHandler {
    pub fn new(membership_service: &Arc<MembershipService>) -> Self {
        Self {
            membership_service: Arc::downgrade(membership_service),
        }
    }
}

#[async_trait]
impl EventHandler for MembershipEventHandler {
    fn name(&self) -> &'static str {
        "membership"
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let EventPayload::User(notify) = &event.payload else {
            return Ok(());
        };
        let Some(membership_service) = self.membership_service.upgrade() else {
            return Ok(());
        };
        membership_service
            .handle_user_notify(event.event_type, notify.user_id)
            .await
    }
}
