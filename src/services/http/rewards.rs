use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::{dispatch, ApiError, AppState};
use crate::{rewards::RewardConfig, services::rewards::RewardRequest};

#[derive(Deserialize)]
pub struct BadgeBody {
    badge: String,
}

#[derive(Deserialize)]
pub struct CreditBody {
    amount_in_cents: i64,
}

pub(super) async fn watch_ad(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = dispatch(&state.reward_channel, "Rewards", |response| {
        RewardRequest::WatchAd { user_id, response }
    })
    .await?;

    Ok(Json(receipt))
}

pub(super) async fn spin(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = dispatch(&state.reward_channel, "Rewards", |response| {
        RewardRequest::Spin { user_id, response }
    })
    .await?;

    Ok(Json(receipt))
}

pub(super) async fn award_badge(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<BadgeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let account = dispatch(&state.reward_channel, "Rewards", |response| {
        RewardRequest::AwardBadge {
            user_id,
            badge: body.badge,
            response,
        }
    })
    .await?;

    Ok(Json(account))
}

pub(super) async fn credit(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<CreditBody>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = dispatch(&state.reward_channel, "Rewards", |response| {
        RewardRequest::Credit {
            user_id,
            amount_in_cents: body.amount_in_cents,
            response,
        }
    })
    .await?;

    Ok(Json(receipt))
}

pub(super) async fn get_config(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let config = dispatch(&state.reward_channel, "Rewards", |response| {
        RewardRequest::GetConfig { response }
    })
    .await?;

    Ok(Json(config))
}

pub(super) async fn update_config(
    State(state): State<AppState>,
    Json(config): Json<RewardConfig>,
) -> Result<impl IntoResponse, ApiError> {
    let config = dispatch(&state.reward_channel, "Rewards", |response| {
        RewardRequest::UpdateConfig { config, response }
    })
    .await?;

    Ok(Json(config))
}
