use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::{ConfigHandle, RequestHandler, Service, ServiceError};
use crate::{
    models::{activities::RewardReceipt, users::UserAccount},
    repositories::Repository,
    rewards::{
        eligibility, ledger::RewardLedger, wheel::SpinWheel, Feature, RewardConfig, RewardError,
    },
};

pub enum RewardRequest {
    WatchAd {
        user_id: String,
        response: oneshot::Sender<Result<RewardReceipt, ServiceError>>,
    },
    Spin {
        user_id: String,
        response: oneshot::Sender<Result<RewardReceipt, ServiceError>>,
    },
    AwardBadge {
        user_id: String,
        badge: String,
        response: oneshot::Sender<Result<UserAccount, ServiceError>>,
    },
    Credit {
        user_id: String,
        amount_in_cents: i64,
        response: oneshot::Sender<Result<RewardReceipt, ServiceError>>,
    },
    GetConfig {
        response: oneshot::Sender<Result<RewardConfig, ServiceError>>,
    },
    UpdateConfig {
        config: RewardConfig,
        response: oneshot::Sender<Result<RewardConfig, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct RewardRequestHandler {
    repository: Arc<dyn Repository>,
    ledger: RewardLedger,
    config: ConfigHandle,
}

impl RewardRequestHandler {
    pub fn new(repository: Arc<dyn Repository>, ledger: RewardLedger, config: ConfigHandle) -> Self {
        Self {
            repository,
            ledger,
            config,
        }
    }

    async fn watch_ad(&self, user_id: &str, now: DateTime<Utc>) -> Result<RewardReceipt, ServiceError> {
        let config = self.config.snapshot().await;
        if !config.ads_enabled {
            return Err(RewardError::FeatureDisabled(Feature::Ads).into());
        }

        let (account, credited_in_cents) = self.ledger.record_ad_watch(user_id, now, &config).await?;

        Ok(RewardReceipt {
            credited_in_cents,
            account,
        })
    }

    async fn spin(&self, user_id: &str, now: DateTime<Utc>) -> Result<RewardReceipt, ServiceError> {
        let config = self.config.snapshot().await;
        if !config.spin_enabled {
            return Err(RewardError::FeatureDisabled(Feature::Spin).into());
        }

        // Don't draw for accounts that can't spin anyway. The ledger
        // re-checks under the version guard.
        let account = self
            .repository
            .load(user_id)
            .await
            .map_err(|e| ServiceError::Repository("Rewards".to_string(), e.to_string()))?
            .ok_or_else(|| RewardError::AccountNotFound(user_id.to_string()))?;
        if !eligibility::can_spin(&account, now, &config) {
            return Err(RewardError::AlreadySpunToday.into());
        }

        let prize = SpinWheel::new(&config.spin_prize_table_in_cents)
            .draw(&mut rand::thread_rng())
            .ok_or_else(|| RewardError::InvalidConfig("empty spin prize table".to_string()))?;

        let (account, credited_in_cents) = self.ledger.record_spin(user_id, now, prize, &config).await?;

        Ok(RewardReceipt {
            credited_in_cents,
            account,
        })
    }

    async fn award_badge(
        &self,
        user_id: &str,
        badge: &str,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, ServiceError> {
        let badge = badge.trim();
        if badge.is_empty() {
            return Err(RewardError::InvalidBadge(badge.to_string()).into());
        }

        let config = self.config.snapshot().await;
        let account = self.ledger.award_badge(user_id, badge, now, &config).await?;
        log::info!("Badge {} held by {}.", badge, user_id);

        Ok(account)
    }

    async fn credit(
        &self,
        user_id: &str,
        amount_in_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<RewardReceipt, ServiceError> {
        let config = self.config.snapshot().await;
        let account = self
            .ledger
            .credit_balance(user_id, amount_in_cents, now, &config)
            .await?;

        Ok(RewardReceipt {
            credited_in_cents: amount_in_cents,
            account,
        })
    }

    async fn update_config(&self, config: RewardConfig) -> Result<RewardConfig, ServiceError> {
        let config = self.config.replace(config).await?;
        log::info!("Reward configuration updated: {:?}", config);

        Ok(config)
    }
}

#[async_trait]
impl RequestHandler<RewardRequest> for RewardRequestHandler {
    async fn handle_request(&self, request: RewardRequest) {
        match request {
            RewardRequest::WatchAd { user_id, response } => {
                let receipt = self.watch_ad(&user_id, Utc::now()).await;
                let _ = response.send(receipt);
            }
            RewardRequest::Spin { user_id, response } => {
                let receipt = self.spin(&user_id, Utc::now()).await;
                let _ = response.send(receipt);
            }
            RewardRequest::AwardBadge {
                user_id,
                badge,
                response,
            } => {
                let account = self.award_badge(&user_id, &badge, Utc::now()).await;
                let _ = response.send(account);
            }
            RewardRequest::Credit {
                user_id,
                amount_in_cents,
                response,
            } => {
                let receipt = self.credit(&user_id, amount_in_cents, Utc::now()).await;
                let _ = response.send(receipt);
            }
            RewardRequest::GetConfig { response } => {
                let _ = response.send(Ok(self.config.snapshot().await));
            }
            RewardRequest::UpdateConfig { config, response } => {
                let config = self.update_config(config).await;
                let _ = response.send(config);
            }
        }
    }
}

pub struct RewardService;

impl RewardService {
    pub fn new() -> Self {
        RewardService {}
    }
}

#[async_trait]
impl Service<RewardRequest, RewardRequestHandler> for RewardService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryRepository;

    async fn handler_with(config: RewardConfig, ids: &[&str]) -> RewardRequestHandler {
        let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        for (i, id) in ids.iter().enumerate() {
            let account = UserAccount::new(
                id.to_string(),
                id.to_string(),
                format!("{}@example.com", id),
                format!("CODE{:02}", i),
                None,
                Utc::now(),
            );
            repository.insert(&account).await.unwrap();
        }
        let ledger = RewardLedger::new(repository.clone());

        RewardRequestHandler::new(repository, ledger, ConfigHandle::new(config))
    }

    #[tokio::test]
    async fn ad_watch_credits_configured_reward() {
        let handler = handler_with(RewardConfig::default(), &["a"]).await;

        let receipt = handler.watch_ad("a", Utc::now()).await.unwrap();

        assert_eq!(receipt.credited_in_cents, 500);
        assert_eq!(receipt.account.balance_in_cents, 500);
        assert_eq!(receipt.account.daily_ads_today, 1);
    }

    #[tokio::test]
    async fn disabled_features_are_rejected() {
        let config = RewardConfig {
            ads_enabled: false,
            spin_enabled: false,
            ..RewardConfig::default()
        };
        let handler = handler_with(config, &["a"]).await;

        assert!(matches!(
            handler.watch_ad("a", Utc::now()).await,
            Err(ServiceError::Reward(RewardError::FeatureDisabled(Feature::Ads)))
        ));
        assert!(matches!(
            handler.spin("a", Utc::now()).await,
            Err(ServiceError::Reward(RewardError::FeatureDisabled(Feature::Spin)))
        ));
    }

    #[tokio::test]
    async fn spin_pays_a_table_prize_once_per_day() {
        let handler = handler_with(RewardConfig::default(), &["a"]).await;
        let now = Utc::now();

        let receipt = handler.spin("a", now).await.unwrap();
        assert!(RewardConfig::default()
            .spin_prize_table_in_cents
            .contains(&receipt.credited_in_cents));
        assert_eq!(receipt.account.balance_in_cents, receipt.credited_in_cents);

        assert!(matches!(
            handler.spin("a", now).await,
            Err(ServiceError::Reward(RewardError::AlreadySpunToday))
        ));
    }

    #[tokio::test]
    async fn spin_for_unknown_account() {
        let handler = handler_with(RewardConfig::default(), &[]).await;

        assert!(matches!(
            handler.spin("ghost", Utc::now()).await,
            Err(ServiceError::Reward(RewardError::AccountNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn badges_are_not_duplicated() {
        let handler = handler_with(RewardConfig::default(), &["a"]).await;
        let now = Utc::now();

        handler.award_badge("a", "first-ad", now).await.unwrap();
        let account = handler.award_badge("a", " first-ad ", now).await.unwrap();

        assert_eq!(account.badges, vec!["first-ad".to_string()]);
        assert_eq!(account.balance_in_cents, 0);
    }

    #[tokio::test]
    async fn credit_rejects_non_positive_amounts() {
        let handler = handler_with(RewardConfig::default(), &["a"]).await;

        assert!(matches!(
            handler.credit("a", 0, Utc::now()).await,
            Err(ServiceError::Reward(RewardError::InvalidAmount(0)))
        ));

        let receipt = handler.credit("a", 1234, Utc::now()).await.unwrap();
        assert_eq!(receipt.account.total_earnings_in_cents, 1234);
    }

    #[tokio::test]
    async fn config_updates_apply_to_later_requests() {
        let handler = handler_with(RewardConfig::default(), &["a"]).await;

        let invalid = RewardConfig {
            max_ads_per_day: 0,
            ..RewardConfig::default()
        };
        assert!(matches!(
            handler.update_config(invalid).await,
            Err(ServiceError::Reward(RewardError::InvalidConfig(_)))
        ));

        let updated = RewardConfig {
            ad_reward_in_cents: 700,
            ..RewardConfig::default()
        };
        handler.update_config(updated).await.unwrap();

        let receipt = handler.watch_ad("a", Utc::now()).await.unwrap();
        assert_eq!(receipt.credited_in_cents, 700);
    }
}
