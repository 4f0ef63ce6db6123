use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::{
    repositories::Repository,
    rewards::{ledger::RewardLedger, RewardConfig, RewardError},
    settings::Settings,
};

pub mod accounts;
pub mod http;
pub mod payouts;
pub mod rewards;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Reward(#[from] RewardError),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Repository error: {0} - {1}")]
    Repository(String, String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

#[derive(Clone)]
pub struct ConfigHandle(Arc<RwLock<RewardConfig>>);

impl ConfigHandle {
    pub fn new(config: RewardConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub async fn snapshot(&self) -> RewardConfig {
        self.0.read().await.clone()
    }

    pub async fn replace(&self, config: RewardConfig) -> Result<RewardConfig, RewardError> {
        config.validate()?;

        let mut current = self.0.write().await;
        *current = config.clone();
        Ok(config)
    }
}

pub async fn start_services(
    repository: Arc<dyn Repository>,
    settings: Settings,
) -> Result<(), anyhow::Error> {
    let (account_tx, mut account_rx) = mpsc::channel(512);
    let (reward_tx, mut reward_rx) = mpsc::channel(512);
    let (payout_tx, mut payout_rx) = mpsc::channel(512);

    let config = ConfigHandle::new(settings.rewards);
    let ledger = RewardLedger::new(repository.clone());

    let mut account_service = accounts::AccountService::new();
    let mut reward_service = rewards::RewardService::new();
    let mut payout_service = payouts::PayoutService::new();

    log::info!("Starting account service.");
    let account_handler =
        accounts::AccountRequestHandler::new(repository.clone(), ledger.clone(), config.clone());
    tokio::spawn(async move {
        account_service.run(account_handler, &mut account_rx).await;
    });

    log::info!("Starting reward service.");
    let reward_handler =
        rewards::RewardRequestHandler::new(repository.clone(), ledger.clone(), config.clone());
    tokio::spawn(async move {
        reward_service.run(reward_handler, &mut reward_rx).await;
    });

    log::info!("Starting payout service.");
    let payout_handler = payouts::PayoutRequestHandler::new(repository.clone(), config.clone());
    tokio::spawn(async move {
        payout_service.run(payout_handler, &mut payout_rx).await;
    });

    log::info!("Starting HTTP server.");
    http::start_http_server(&settings.http.listen, account_tx, reward_tx, payout_tx).await
}
