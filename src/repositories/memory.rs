use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

use super::{AccountRepository, StoreError, WithdrawalRepository};
use crate::models::{
    activities::{Activity, ActivityKind},
    users::UserAccount,
    withdrawals::{WithdrawalRequest, WithdrawalStatus},
};

// Locks are always taken in the order
// accounts -> referral_codes | referrals -> activities.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    accounts: Arc<DashMap<String, UserAccount>>,
    referral_codes: Arc<DashMap<String, String>>,
    referrals: Arc<DashMap<String, Uuid>>,
    activities: Arc<DashMap<String, Vec<Activity>>>,
    withdrawals: Arc<DashMap<String, Vec<WithdrawalRequest>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for MemoryRepository {
    async fn load(&self, id: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.accounts.get(id).map(|account| account.value().clone()))
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserAccount>, StoreError> {
        let owner = match self.referral_codes.get(code) {
            Some(owner) => owner.value().clone(),
            None => return Ok(None),
        };

        self.load(&owner).await
    }

    async fn insert(&self, account: &UserAccount) -> Result<(), StoreError> {
        match self.accounts.entry(account.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateAccount),
            Entry::Vacant(slot) => {
                match self.referral_codes.entry(account.referral_code.clone()) {
                    Entry::Occupied(_) => return Err(StoreError::DuplicateReferralCode),
                    Entry::Vacant(code) => {
                        code.insert(account.id.clone());
                    }
                }
                slot.insert(account.clone());
                Ok(())
            }
        }
    }

    async fn save(
        &self,
        account: &UserAccount,
        expected_version: i64,
        activity: Option<&Activity>,
    ) -> Result<UserAccount, StoreError> {
        let mut stored = self
            .accounts
            .get_mut(&account.id)
            .ok_or(StoreError::NotFound)?;

        if stored.version != expected_version {
            return Err(StoreError::VersionConflict);
        }

        if let Some(activity) = activity {
            if activity.kind == ActivityKind::Referral {
                let referred = activity.reference_id.clone().ok_or_else(|| {
                    StoreError::Backend("Referral activity without referred user.".to_string())
                })?;

                match self.referrals.entry(referred) {
                    Entry::Occupied(_) => return Err(StoreError::DuplicateReferral),
                    Entry::Vacant(slot) => {
                        slot.insert(activity.id);
                    }
                }
            }

            self.activities
                .entry(activity.user_id.clone())
                .or_default()
                .push(activity.clone());
        }

        let mut saved = account.clone();
        saved.version = expected_version + 1;
        *stored = saved.clone();

        Ok(saved)
    }

    async fn top_earners(&self, limit: usize) -> Result<Vec<UserAccount>, StoreError> {
        let mut accounts: Vec<UserAccount> = self
            .accounts
            .iter()
            .map(|account| account.value().clone())
            .collect();

        accounts.sort_by(|a, b| {
            b.total_earnings_in_cents
                .cmp(&a.total_earnings_in_cents)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        accounts.truncate(limit);

        Ok(accounts)
    }

    async fn activity_for(&self, user_id: &str) -> Result<Vec<Activity>, StoreError> {
        let mut activities = self
            .activities
            .get(user_id)
            .map(|a| a.value().clone())
            .unwrap_or_default();
        activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(activities)
    }

    async fn referral_recorded(&self, referred_id: &str) -> Result<bool, StoreError> {
        Ok(self.referrals.contains_key(referred_id))
    }
}

#[async_trait]
impl WithdrawalRepository for MemoryRepository {
    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), StoreError> {
        let mut requests = self.withdrawals.entry(request.user_id.clone()).or_default();

        if requests
            .iter()
            .any(|r| r.status == WithdrawalStatus::Pending)
        {
            return Err(StoreError::PendingWithdrawalExists);
        }

        requests.push(request.clone());
        Ok(())
    }

    async fn withdrawals_for(&self, user_id: &str) -> Result<Vec<WithdrawalRequest>, StoreError> {
        let mut requests = self
            .withdrawals
            .get(user_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(requests)
    }
}
