use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::{
    accounts::AccountRequest, payouts::PayoutRequest, rewards::RewardRequest, ServiceError,
};
use crate::rewards::RewardError;

mod payouts;
mod rewards;
mod users;

#[derive(Clone)]
struct AppState {
    account_channel: mpsc::Sender<AccountRequest>,
    reward_channel: mpsc::Sender<RewardRequest>,
    payout_channel: mpsc::Sender<PayoutRequest>,
}

struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError(e)
    }
}

fn classify(error: &ServiceError) -> (StatusCode, &'static str) {
    match error {
        ServiceError::Reward(e) => match e {
            RewardError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "account_not_found"),
            RewardError::ReferralCodeNotFound(_) => {
                (StatusCode::NOT_FOUND, "referral_code_not_found")
            }
            RewardError::DailyLimitExceeded => (StatusCode::CONFLICT, "daily_limit_exceeded"),
            RewardError::AlreadySpunToday => (StatusCode::CONFLICT, "already_spun_today"),
            RewardError::DuplicateReferral => (StatusCode::CONFLICT, "duplicate_referral"),
            RewardError::PendingWithdrawalExists => {
                (StatusCode::CONFLICT, "pending_withdrawal_exists")
            }
            RewardError::Contention => (StatusCode::CONFLICT, "contention"),
            RewardError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
            RewardError::SelfReferral => (StatusCode::BAD_REQUEST, "self_referral"),
            RewardError::InvalidReferralCode(_) => {
                (StatusCode::BAD_REQUEST, "invalid_referral_code")
            }
            RewardError::InvalidBadge(_) => (StatusCode::BAD_REQUEST, "invalid_badge"),
            RewardError::WithdrawalBelowMinimum(_, _) => {
                (StatusCode::BAD_REQUEST, "withdrawal_below_minimum")
            }
            RewardError::InsufficientBalance(_, _) => {
                (StatusCode::BAD_REQUEST, "insufficient_balance")
            }
            RewardError::InvalidWithdrawal(_) => (StatusCode::BAD_REQUEST, "invalid_withdrawal"),
            RewardError::InvalidConfig(_) => (StatusCode::BAD_REQUEST, "invalid_config"),
            RewardError::FeatureDisabled(_) => (StatusCode::FORBIDDEN, "feature_disabled"),
            RewardError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        },
        ServiceError::Repository(_, _) => (StatusCode::INTERNAL_SERVER_ERROR, "repository_error"),
        ServiceError::Communication(_, _) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "communication_error")
        }
        ServiceError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = classify(&self.0);
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }

        (
            status,
            Json(json!({
                "error": kind,
                "details": self.0.to_string()
            })),
        )
            .into_response()
    }
}

async fn dispatch<R, T>(
    channel: &mpsc::Sender<R>,
    service: &str,
    request: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> R,
) -> Result<T, ApiError> {
    let (response_tx, response_rx) = oneshot::channel();

    if let Err(e) = channel.send(request(response_tx)).await {
        return Err(ServiceError::Communication(service.to_string(), e.to_string()).into());
    }

    match response_rx.await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ServiceError::Communication(service.to_string(), e.to_string()).into()),
    }
}

pub async fn start_http_server(
    listen: &str,
    account_channel: mpsc::Sender<AccountRequest>,
    reward_channel: mpsc::Sender<RewardRequest>,
    payout_channel: mpsc::Sender<PayoutRequest>,
) -> Result<(), anyhow::Error> {
    let app_state = AppState {
        account_channel,
        reward_channel,
        payout_channel,
    };

    let app = Router::new()
        .route("/users", post(users::sign_in))
        .route("/users/{id}", get(users::get_account))
        .route("/users/{id}/eligibility", get(users::get_eligibility))
        .route("/users/{id}/activity", get(users::get_activity))
        .route("/referral-codes/{code}", get(users::lookup_referral_code))
        .route("/leaderboard", get(users::get_leaderboard))
        .route("/users/{id}/ads", post(rewards::watch_ad))
        .route("/users/{id}/spins", post(rewards::spin))
        .route("/users/{id}/badges", post(rewards::award_badge))
        .route("/users/{id}/credits", post(rewards::credit))
        .route(
            "/admin/config",
            get(rewards::get_config).put(rewards::update_config),
        )
        .route(
            "/users/{id}/withdrawals",
            get(payouts::list_withdrawals).post(payouts::request_withdrawal),
        )
        .route("/health", get(|| async { "OK" }))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
