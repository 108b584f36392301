use axum::{
    extract::{Path, State},
    Json,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    error::Result,
    models::common::{MessageResponse, SuccessResponse},
};

/// POST /api/v1/credit-sessions/{record_id}/confirm
#[instrument(skip(state))]
pub async fn confirm_session(
    State(state): State<AppState>,
    Path(record_id): Path<Uuid>,
) -> Result<Json<SuccessResponse<MessageResponse>>> {
    // Unknown ids surface as 4106 rather than a silent no-op
    state.services.credit_payment.get_record(record_id).await?;
    state
        .services
        .membership
        .confirm_credit_fun(Some(record_id))
        .await?;

    Ok(Json(SuccessResponse::new(MessageResponse::new(
        "credit session confirmed",
    ))))
}

/// POST /api/v1/credit-sessions/{record_id}/retrieve
#[instrument(skip(state))]
pub async fn retrieve_session(
    State(state): State<AppState>,
    Path(record_id): Path<Uuid>,
) -> Result<Json<SuccessResponse<MessageResponse>>> {
    state.services.credit_payment.get_record(record_id).await?;
    state
        .services
        .membership
        .retrieve_credit_fun(Some(record_id))
        .await?;

    Ok(Json(SuccessResponse::new(MessageResponse::new(
        "credit session retrieved",
    ))))
}
