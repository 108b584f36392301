use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::{app_state::AppState, error::Result, models::common::SuccessResponse};

#[derive(Debug, Deserialize)]
pub struct CancelOrderQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderResponse {
    pub order_id: Uuid,
    /// False when the order had already left PENDING
    pub cancelled: bool,
}

/// POST /api/v1/orders/{order_id}/cancel?user_id=
#[instrument(skip(state))]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<CancelOrderQuery>,
) -> Result<Json<SuccessResponse<CancelOrderResponse>>> {
    let cancelled = state
        .services
        .order
        .cancel_order(query.user_id, order_id)
        .await?;

    Ok(Json(SuccessResponse::new(CancelOrderResponse {
        order_id,
        cancelled,
    })))
}
