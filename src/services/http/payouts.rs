use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::{dispatch, ApiError, AppState};
use crate::{models::withdrawals::NewWithdrawal, services::payouts::PayoutRequest};

pub(super) async fn request_withdrawal(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<NewWithdrawal>,
) -> Result<impl IntoResponse, ApiError> {
    let withdrawal = dispatch(&state.payout_channel, "Payouts", |response| {
        PayoutRequest::RequestWithdrawal {
            user_id,
            request,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(withdrawal)))
}

pub(super) async fn list_withdrawals(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let withdrawals = dispatch(&state.payout_channel, "Payouts", |response| {
        PayoutRequest::ListWithdrawals { user_id, response }
    })
    .await?;

    Ok(Json(withdrawals))
}
