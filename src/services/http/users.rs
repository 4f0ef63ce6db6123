use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::{dispatch, ApiError, AppState};
use crate::{models::users::NewUser, services::accounts::AccountRequest};

const DEFAULT_LEADERBOARD_SIZE: usize = 10;
const MAX_LEADERBOARD_SIZE: usize = 100;

#[derive(Deserialize)]
pub struct LeaderboardParams {
    limit: Option<usize>,
}

pub(super) async fn sign_in(
    State(state): State<AppState>,
    Json(user): Json<NewUser>,
) -> Result<impl IntoResponse, ApiError> {
    let account = dispatch(&state.account_channel, "Accounts", |response| {
        AccountRequest::SignIn { user, response }
    })
    .await?;

    Ok((StatusCode::OK, Json(account)))
}

pub(super) async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let account = dispatch(&state.account_channel, "Accounts", |response| {
        AccountRequest::GetAccount { id, response }
    })
    .await?;

    Ok(Json(account))
}

pub(super) async fn get_eligibility(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let eligibility = dispatch(&state.account_channel, "Accounts", |response| {
        AccountRequest::GetEligibility { id, response }
    })
    .await?;

    Ok(Json(eligibility))
}

pub(super) async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let activity = dispatch(&state.account_channel, "Accounts", |response| {
        AccountRequest::GetActivity { id, response }
    })
    .await?;

    Ok(Json(activity))
}

pub(super) async fn get_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
        .min(MAX_LEADERBOARD_SIZE);

    let entries = dispatch(&state.account_channel, "Accounts", |response| {
        AccountRequest::Leaderboard { limit, response }
    })
    .await?;

    Ok(Json(entries))
}

pub(super) async fn lookup_referral_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = dispatch(&state.account_channel, "Accounts", |response| {
        AccountRequest::LookupReferralCode { code, response }
    })
    .await?;

    Ok(Json(owner))
}
