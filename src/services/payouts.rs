use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::{ConfigHandle, RequestHandler, Service, ServiceError};
use crate::{
    models::withdrawals::{NewWithdrawal, WithdrawalRequest},
    repositories::{Repository, StoreError},
    rewards::{payout, RewardError},
};

pub enum PayoutRequest {
    RequestWithdrawal {
        user_id: String,
        request: NewWithdrawal,
        response: oneshot::Sender<Result<WithdrawalRequest, ServiceError>>,
    },
    ListWithdrawals {
        user_id: String,
        response: oneshot::Sender<Result<Vec<WithdrawalRequest>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct PayoutRequestHandler {
    repository: Arc<dyn Repository>,
    config: ConfigHandle,
}

fn repository_error(e: StoreError) -> ServiceError {
    ServiceError::Repository("Withdrawals".to_string(), e.to_string())
}

impl PayoutRequestHandler {
    pub fn new(repository: Arc<dyn Repository>, config: ConfigHandle) -> Self {
        Self { repository, config }
    }

    async fn request_withdrawal(
        &self,
        user_id: &str,
        request: NewWithdrawal,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalRequest, ServiceError> {
        let account = self
            .repository
            .load(user_id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| RewardError::AccountNotFound(user_id.to_string()))?;
        let config = self.config.snapshot().await;

        let withdrawal = payout::open_withdrawal(&account, &request, now, &config)?;
        match self.repository.insert_withdrawal(&withdrawal).await {
            Ok(()) => {}
            Err(StoreError::PendingWithdrawalExists) => {
                log::warn!("Withdrawal rejected for {}: one is already pending.", user_id);
                return Err(RewardError::PendingWithdrawalExists.into());
            }
            Err(e) => {
                log::error!("Failed to store withdrawal for {}: {}", user_id, e);
                return Err(repository_error(e));
            }
        }

        log::info!(
            "Withdrawal {} of {} cents requested by {} via {}.",
            withdrawal.id,
            withdrawal.amount_in_cents,
            user_id,
            withdrawal.method
        );
        Ok(withdrawal)
    }

    async fn withdrawals(&self, user_id: &str) -> Result<Vec<WithdrawalRequest>, ServiceError> {
        self.repository
            .withdrawals_for(user_id)
            .await
            .map_err(repository_error)
    }
}

#[async_trait]
impl RequestHandler<PayoutRequest> for PayoutRequestHandler {
    async fn handle_request(&self, request: PayoutRequest) {
        match request {
            PayoutRequest::RequestWithdrawal {
                user_id,
                request,
                response,
            } => {
                let withdrawal = self.request_withdrawal(&user_id, request, Utc::now()).await;
                let _ = response.send(withdrawal);
            }
            PayoutRequest::ListWithdrawals { user_id, response } => {
                let withdrawals = self.withdrawals(&user_id).await;
                let _ = response.send(withdrawals);
            }
        }
    }
}

pub struct PayoutService;

impl PayoutService {
    pub fn new() -> Self {
        PayoutService {}
    }
}

#[async_trait]
impl Service<PayoutRequest, PayoutRequestHandler> for PayoutService {}
