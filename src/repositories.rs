use async_trait::async_trait;

use crate::models::{activities::Activity, users::UserAccount, withdrawals::WithdrawalRequest};

pub mod memory;
pub mod postgres;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,
    #[error("Version conflict")]
    VersionConflict,
    #[error("Referral already recorded")]
    DuplicateReferral,
    #[error("Account already exists")]
    DuplicateAccount,
    #[error("Referral code already taken")]
    DuplicateReferralCode,
    #[error("A pending withdrawal already exists")]
    PendingWithdrawalExists,
    #[error("Backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait AccountRepository: Send + Sync + 'static {
    async fn load(&self, id: &str) -> Result<Option<UserAccount>, StoreError>;

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserAccount>, StoreError>;

    async fn insert(&self, account: &UserAccount) -> Result<(), StoreError>;

    /// Compare-and-swap on `version`. The account and the optional activity
    /// are written together or not at all; the stored copy gets
    /// `expected_version + 1` and is returned.
    async fn save(
        &self,
        account: &UserAccount,
        expected_version: i64,
        activity: Option<&Activity>,
    ) -> Result<UserAccount, StoreError>;

    async fn top_earners(&self, limit: usize) -> Result<Vec<UserAccount>, StoreError>;

    async fn activity_for(&self, user_id: &str) -> Result<Vec<Activity>, StoreError>;

    async fn referral_recorded(&self, referred_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait WithdrawalRepository: Send + Sync + 'static {
    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), StoreError>;

    async fn withdrawals_for(&self, user_id: &str) -> Result<Vec<WithdrawalRequest>, StoreError>;
}

pub trait Repository: AccountRepository + WithdrawalRepository {}

impl<T> Repository for T where T: AccountRepository + WithdrawalRepository {}
