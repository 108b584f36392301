use axum::{
    extract::{Path, State},
    Json,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    error::Result,
    models::{
        common::SuccessResponse,
        credit::CreditBillView,
        membership::MembershipBaseInfo,
    },
};

/// GET /api/v1/members/{user_id}
#[instrument(skip(state))]
pub async fn get_member(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SuccessResponse<MembershipBaseInfo>>> {
    let info = state
        .services
        .user_membership
        .get_base_info(user_id)
        .await?;

    Ok(Json(SuccessResponse::new(info)))
}

/// GET /api/v1/members/{user_id}/bills
#[instrument(skip(state))]
pub async fn get_member_bills(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SuccessResponse<Vec<CreditBillView>>>> {
    let membership = state
        .services
        .user_membership
        .get_by_user_id(user_id)
        .await?;

    let bills = state
        .services
        .credit
        .list_bills(membership.id)
        .await?
        .into_iter()
        .map(CreditBillView::from)
        .collect();

    Ok(Json(SuccessResponse::new(bills)))
}
