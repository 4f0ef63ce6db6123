use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::{ConfigHandle, RequestHandler, Service, ServiceError};
use crate::{
    models::{
        activities::Activity,
        users::{self, LeaderboardEntry, NewUser, ReferralCodeOwner, UserAccount},
    },
    repositories::{Repository, StoreError},
    rewards::{eligibility::Eligibility, ledger::RewardLedger, RewardConfig, RewardError},
};

const MAX_REFERRAL_CODE_ATTEMPTS: usize = 16;

pub enum AccountRequest {
    SignIn {
        user: NewUser,
        response: oneshot::Sender<Result<UserAccount, ServiceError>>,
    },
    GetAccount {
        id: String,
        response: oneshot::Sender<Result<UserAccount, ServiceError>>,
    },
    GetEligibility {
        id: String,
        response: oneshot::Sender<Result<Eligibility, ServiceError>>,
    },
    GetActivity {
        id: String,
        response: oneshot::Sender<Result<Vec<Activity>, ServiceError>>,
    },
    Leaderboard {
        limit: usize,
        response: oneshot::Sender<Result<Vec<LeaderboardEntry>, ServiceError>>,
    },
    LookupReferralCode {
        code: String,
        response: oneshot::Sender<Result<ReferralCodeOwner, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct AccountRequestHandler {
    repository: Arc<dyn Repository>,
    ledger: RewardLedger,
    config: ConfigHandle,
}

fn repository_error(e: StoreError) -> ServiceError {
    ServiceError::Repository("Accounts".to_string(), e.to_string())
}

impl AccountRequestHandler {
    pub fn new(repository: Arc<dyn Repository>, ledger: RewardLedger, config: ConfigHandle) -> Self {
        Self {
            repository,
            ledger,
            config,
        }
    }

    async fn load(&self, id: &str) -> Result<UserAccount, ServiceError> {
        self.repository
            .load(id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| RewardError::AccountNotFound(id.to_string()).into())
    }

    async fn sign_in(&self, user: NewUser, now: DateTime<Utc>) -> Result<UserAccount, ServiceError> {
        let config = self.config.snapshot().await;

        // A code supplied on a later sign-in is ignored. A bonus that failed
        // when the account was created is settled here instead.
        if let Some(account) = self.repository.load(&user.identity_id).await.map_err(repository_error)? {
            self.settle_referral(&account, now, &config).await;
            return Ok(account);
        }

        let code = user.referral_code.as_deref().and_then(users::normalize_referral_code);
        let referrer = match code {
            Some(code) if config.referrals_enabled => Some(
                self.repository
                    .find_by_referral_code(&code)
                    .await
                    .map_err(repository_error)?
                    .ok_or(RewardError::InvalidReferralCode(code))?,
            ),
            Some(code) => {
                log::info!(
                    "Referrals disabled, ignoring code {} for {}.",
                    code,
                    user.identity_id
                );
                None
            }
            None => None,
        };

        let mut created = None;
        for _ in 0..MAX_REFERRAL_CODE_ATTEMPTS {
            let account = UserAccount::new(
                user.identity_id.clone(),
                user.display_name.clone(),
                user.email.clone(),
                users::generate_referral_code(),
                referrer.as_ref().map(|r| r.referral_code.clone()),
                now,
            );

            match self.repository.insert(&account).await {
                Ok(()) => {
                    created = Some(account);
                    break;
                }
                Err(StoreError::DuplicateReferralCode) => continue,
                Err(StoreError::DuplicateAccount) => {
                    // Lost a race against a concurrent first sign-in.
                    let account = self.load(&user.identity_id).await?;
                    self.settle_referral(&account, now, &config).await;
                    return Ok(account);
                }
                Err(e) => return Err(repository_error(e)),
            }
        }

        let account = created.ok_or_else(|| {
            ServiceError::Internal("Could not allocate a unique referral code.".to_string())
        })?;
        log::info!("Created account {} ({}).", account.id, account.referral_code);

        self.settle_referral(&account, now, &config).await;

        Ok(account)
    }

    // Pays the referrer of `account` unless that already happened. Failures
    // are logged and picked up again on the account's next sign-in.
    async fn settle_referral(&self, account: &UserAccount, now: DateTime<Utc>, config: &RewardConfig) {
        let code = match account.used_referral_code.as_deref() {
            Some(code) if config.referrals_enabled => code,
            _ => return,
        };

        match self.repository.referral_recorded(&account.id).await {
            Ok(true) => return,
            Ok(false) => (),
            Err(e) => {
                log::error!("Could not check referral bonus for {}: {}", account.id, e);
                return;
            }
        }

        let referrer = match self.repository.find_by_referral_code(code).await {
            Ok(Some(referrer)) => referrer,
            Ok(None) => {
                log::error!("Referrer with code {} of {} is gone.", code, account.id);
                return;
            }
            Err(e) => {
                log::error!("Could not load referrer {} of {}: {}", code, account.id, e);
                return;
            }
        };

        match self
            .ledger
            .record_referral_bonus(&referrer.id, account, now, config)
            .await
        {
            Ok(_) | Err(RewardError::DuplicateReferral) => (),
            Err(e) => log::error!(
                "Referral bonus for {} referring {} failed, retrying on next sign-in: {}",
                referrer.id,
                account.id,
                e
            ),
        }
    }

    async fn eligibility(&self, id: &str, now: DateTime<Utc>) -> Result<Eligibility, ServiceError> {
        let account = self.load(id).await?;
        let config = self.config.snapshot().await;

        Ok(Eligibility::evaluate(&account, now, &config))
    }

    async fn activity(&self, id: &str) -> Result<Vec<Activity>, ServiceError> {
        self.load(id).await?;

        self.repository.activity_for(id).await.map_err(repository_error)
    }

    async fn lookup_referral_code(&self, code: &str) -> Result<ReferralCodeOwner, ServiceError> {
        let code = users::normalize_referral_code(code)
            .ok_or_else(|| RewardError::InvalidReferralCode(code.to_string()))?;
        let owner = self
            .repository
            .find_by_referral_code(&code)
            .await
            .map_err(repository_error)?
            .ok_or(RewardError::ReferralCodeNotFound(code))?;

        Ok(ReferralCodeOwner {
            referral_code: owner.referral_code,
            user_id: owner.id,
            display_name: owner.display_name,
        })
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        let accounts = self
            .repository
            .top_earners(limit)
            .await
            .map_err(repository_error)?;

        Ok(accounts
            .into_iter()
            .enumerate()
            .map(|(i, account)| LeaderboardEntry {
                rank: i + 1,
                user_id: account.id,
                display_name: account.display_name,
                total_earnings_in_cents: account.total_earnings_in_cents,
            })
            .collect())
    }
}

#[async_trait]
impl RequestHandler<AccountRequest> for AccountRequestHandler {
    async fn handle_request(&self, request: AccountRequest) {
        match request {
            AccountRequest::SignIn { user, response } => {
                let account = self.sign_in(user, Utc::now()).await;
                let _ = response.send(account);
            }
            AccountRequest::GetAccount { id, response } => {
                let account = self.load(&id).await;
                let _ = response.send(account);
            }
            AccountRequest::GetEligibility { id, response } => {
                let eligibility = self.eligibility(&id, Utc::now()).await;
                let _ = response.send(eligibility);
            }
            AccountRequest::GetActivity { id, response } => {
                let activity = self.activity(&id).await;
                let _ = response.send(activity);
            }
            AccountRequest::Leaderboard { limit, response } => {
                let entries = self.leaderboard(limit).await;
                let _ = response.send(entries);
            }
            AccountRequest::LookupReferralCode { code, response } => {
                let owner = self.lookup_referral_code(&code).await;
                let _ = response.send(owner);
            }
        }
    }
}

pub struct AccountService;

impl AccountService {
    pub fn new() -> Self {
        AccountService {}
    }
}

#[async_trait]
impl Service<AccountRequest, AccountRequestHandler> for AccountService {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::{
        models::{
            activities::ActivityKind,
            withdrawals::WithdrawalRequest,
        },
        repositories::{memory::MemoryRepository, AccountRepository, WithdrawalRepository},
    };

    // Fails the first save that carries a referral activity.
    #[derive(Default)]
    struct FlakyReferralStore {
        inner: MemoryRepository,
        failed_once: AtomicBool,
    }

    #[async_trait]
    impl AccountRepository for FlakyReferralStore {
        async fn load(&self, id: &str) -> Result<Option<UserAccount>, StoreError> {
            self.inner.load(id).await
        }

        async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserAccount>, StoreError> {
            self.inner.find_by_referral_code(code).await
        }

        async fn insert(&self, account: &UserAccount) -> Result<(), StoreError> {
            self.inner.insert(account).await
        }

        async fn save(
            &self,
            account: &UserAccount,
            expected_version: i64,
            activity: Option<&Activity>,
        ) -> Result<UserAccount, StoreError> {
            let referral = activity.map_or(false, |a| a.kind == ActivityKind::Referral);
            if referral && !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Backend("connection reset".to_string()));
            }

            self.inner.save(account, expected_version, activity).await
        }

        async fn top_earners(&self, limit: usize) -> Result<Vec<UserAccount>, StoreError> {
            self.inner.top_earners(limit).await
        }

        async fn activity_for(&self, user_id: &str) -> Result<Vec<Activity>, StoreError> {
            self.inner.activity_for(user_id).await
        }

        async fn referral_recorded(&self, referred_id: &str) -> Result<bool, StoreError> {
            self.inner.referral_recorded(referred_id).await
        }
    }

    #[async_trait]
    impl WithdrawalRepository for FlakyReferralStore {
        async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), StoreError> {
            self.inner.insert_withdrawal(request).await
        }

        async fn withdrawals_for(&self, user_id: &str) -> Result<Vec<WithdrawalRequest>, StoreError> {
            self.inner.withdrawals_for(user_id).await
        }
    }

    fn handler_over(repository: Arc<dyn Repository>, config: RewardConfig) -> AccountRequestHandler {
        let ledger = RewardLedger::new(repository.clone());

        AccountRequestHandler::new(repository, ledger, ConfigHandle::new(config))
    }

    fn handler_with(config: RewardConfig) -> AccountRequestHandler {
        handler_over(Arc::new(MemoryRepository::new()), config)
    }

    fn new_user(id: &str, referral_code: Option<&str>) -> NewUser {
        NewUser {
            identity_id: id.to_string(),
            display_name: format!("User {}", id),
            email: format!("{}@example.com", id),
            referral_code: referral_code.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn sign_in_creates_once() {
        let handler = handler_with(RewardConfig::default());
        let now = Utc::now();

        let first = handler.sign_in(new_user("a", None), now).await.unwrap();
        let second = handler.sign_in(new_user("a", None), now).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.balance_in_cents, 0);
        assert_eq!(first.used_referral_code, None);
    }

    #[tokio::test]
    async fn referred_sign_up_credits_the_referrer() {
        let handler = handler_with(RewardConfig::default());
        let now = Utc::now();

        let referrer = handler.sign_in(new_user("a", None), now).await.unwrap();
        let code = referrer.referral_code.to_ascii_lowercase();
        let referred = handler
            .sign_in(new_user("b", Some(&code)), now)
            .await
            .unwrap();
        assert_eq!(referred.used_referral_code, Some(referrer.referral_code.clone()));

        // A repeat sign-in must not pay the referrer again.
        handler.sign_in(new_user("b", Some(&code)), now).await.unwrap();

        let referrer = handler.load("a").await.unwrap();
        assert_eq!(referrer.referral_count, 1);
        assert_eq!(referrer.balance_in_cents, 5000);
        assert_eq!(handler.activity("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_referral_code_rejects_sign_up() {
        let handler = handler_with(RewardConfig::default());

        let result = handler
            .sign_in(new_user("b", Some("NOPE00")), Utc::now())
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::Reward(RewardError::InvalidReferralCode(_)))
        ));
        assert!(handler.repository.load("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_referrals_create_without_bonus() {
        let handler = handler_with(RewardConfig {
            referrals_enabled: false,
            ..RewardConfig::default()
        });
        let now = Utc::now();

        let referrer = handler.sign_in(new_user("a", None), now).await.unwrap();
        handler
            .sign_in(new_user("b", Some(&referrer.referral_code)), now)
            .await
            .unwrap();

        let referrer = handler.load("a").await.unwrap();
        assert_eq!(referrer.referral_count, 0);
        assert_eq!(referrer.balance_in_cents, 0);

        // The code was never redeemed, so turning referrals back on pays nothing.
        handler.config.replace(RewardConfig::default()).await.unwrap();
        let referred = handler.sign_in(new_user("b", None), now).await.unwrap();
        assert_eq!(referred.used_referral_code, None);
        assert_eq!(handler.load("a").await.unwrap().referral_count, 0);
    }

    #[tokio::test]
    async fn failed_referral_bonus_is_settled_on_next_sign_in() {
        let handler = handler_over(
            Arc::new(FlakyReferralStore::default()),
            RewardConfig::default(),
        );
        let now = Utc::now();

        let referrer = handler.sign_in(new_user("a", None), now).await.unwrap();
        let referred = handler
            .sign_in(new_user("b", Some(&referrer.referral_code)), now)
            .await
            .unwrap();
        assert_eq!(referred.used_referral_code, Some(referrer.referral_code.clone()));
        assert_eq!(handler.load("a").await.unwrap().referral_count, 0);

        handler.sign_in(new_user("b", None), now).await.unwrap();
        handler.sign_in(new_user("b", None), now).await.unwrap();

        let referrer = handler.load("a").await.unwrap();
        assert_eq!(referrer.referral_count, 1);
        assert_eq!(referrer.balance_in_cents, 5000);
        let activity = handler.activity("a").await.unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].kind, ActivityKind::Referral);
        assert_eq!(activity[0].reference_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn leaderboard_ranks_by_total_earnings() {
        let handler = handler_with(RewardConfig::default());
        let now = Utc::now();
        let config = RewardConfig::default();

        for id in ["a", "b", "c"] {
            handler.sign_in(new_user(id, None), now).await.unwrap();
        }
        handler.ledger.credit_balance("b", 900, now, &config).await.unwrap();
        handler.ledger.credit_balance("c", 300, now, &config).await.unwrap();

        let board = handler.leaderboard(2).await.unwrap();
        let ranked: Vec<_> = board.iter().map(|e| (e.rank, e.user_id.as_str())).collect();
        assert_eq!(ranked, vec![(1, "b"), (2, "c")]);
    }

    #[tokio::test]
    async fn referral_codes_resolve_to_their_owner() {
        let handler = handler_with(RewardConfig::default());
        let account = handler.sign_in(new_user("a", None), Utc::now()).await.unwrap();

        let owner = handler
            .lookup_referral_code(&format!(" {} ", account.referral_code.to_ascii_lowercase()))
            .await
            .unwrap();
        assert_eq!(owner.user_id, "a");
        assert_eq!(owner.referral_code, account.referral_code);

        assert!(matches!(
            handler.lookup_referral_code("NOPE00").await,
            Err(ServiceError::Reward(RewardError::ReferralCodeNotFound(_)))
        ));
        assert!(matches!(
            handler.lookup_referral_code("  ").await,
            Err(ServiceError::Reward(RewardError::InvalidReferralCode(_)))
        ));
    }

    #[tokio::test]
    async fn eligibility_requires_an_account() {
        let handler = handler_with(RewardConfig::default());

        assert!(matches!(
            handler.eligibility("ghost", Utc::now()).await,
            Err(ServiceError::Reward(RewardError::AccountNotFound(_)))
        ));
    }
}
