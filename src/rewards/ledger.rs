use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{
    calendar::same_calendar_day,
    eligibility::{can_spin, can_watch_ad},
    RewardConfig, RewardError,
};
use crate::{
    models::{
        activities::{Activity, ActivityKind},
        users::UserAccount,
    },
    repositories::{Repository, StoreError},
};

// Pure account mutations. Every precondition is checked before the first
// field is written, so a failed call leaves the account untouched.
impl UserAccount {
    pub fn credit(&mut self, amount_in_cents: i64) -> Result<(), RewardError> {
        if amount_in_cents <= 0 {
            return Err(RewardError::InvalidAmount(amount_in_cents));
        }

        let balance = self
            .balance_in_cents
            .checked_add(amount_in_cents)
            .ok_or(RewardError::InvalidAmount(amount_in_cents))?;
        let total_earnings = self
            .total_earnings_in_cents
            .checked_add(amount_in_cents)
            .ok_or(RewardError::InvalidAmount(amount_in_cents))?;

        self.balance_in_cents = balance;
        self.total_earnings_in_cents = total_earnings;
        Ok(())
    }

    pub fn apply_ad_watch(
        &mut self,
        now: DateTime<Utc>,
        config: &RewardConfig,
    ) -> Result<i64, RewardError> {
        if !can_watch_ad(self, now, config) {
            return Err(RewardError::DailyLimitExceeded);
        }

        let reward = config.ad_reward_in_cents;
        let mut next = self.clone();
        next.credit(reward)?;

        next.daily_ads_today = if same_calendar_day(self.last_ad_date, now, &config.timezone()) {
            self.daily_ads_today + 1
        } else {
            1
        };
        next.last_ad_date = Some(now);
        next.total_ads_watched += 1;

        *self = next;
        Ok(reward)
    }

    pub fn apply_spin(
        &mut self,
        now: DateTime<Utc>,
        prize_in_cents: i64,
        config: &RewardConfig,
    ) -> Result<i64, RewardError> {
        if !can_spin(self, now, config) {
            return Err(RewardError::AlreadySpunToday);
        }

        self.credit(prize_in_cents)?;
        self.last_spin_date = Some(now);
        Ok(prize_in_cents)
    }

    pub fn apply_referral_bonus(&mut self, bonus_in_cents: i64) -> Result<i64, RewardError> {
        self.credit(bonus_in_cents)?;
        self.referral_count += 1;
        Ok(bonus_in_cents)
    }

    pub fn award_badge(&mut self, badge: &str) -> bool {
        if self.has_badge(badge) {
            return false;
        }

        self.badges.push(badge.to_string());
        true
    }
}

struct Outcome {
    credited_in_cents: i64,
    activity: Option<Activity>,
}

/// Serializes mutations per account through optimistic compare-and-swap on
/// the account version. A losing writer reloads and re-evaluates its
/// preconditions against the winner's state.
#[derive(Clone)]
pub struct RewardLedger {
    repository: Arc<dyn Repository>,
}

impl RewardLedger {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    async fn commit<F>(
        &self,
        id: &str,
        now: DateTime<Utc>,
        config: &RewardConfig,
        mut mutate: F,
    ) -> Result<(UserAccount, i64), RewardError>
    where
        F: FnMut(&mut UserAccount) -> Result<Outcome, RewardError> + Send,
    {
        let mut attempts = 0;

        loop {
            let current = self
                .repository
                .load(id)
                .await
                .map_err(|e| RewardError::Store(e.to_string()))?
                .ok_or_else(|| RewardError::AccountNotFound(id.to_string()))?;

            let mut next = current.clone();
            let outcome = mutate(&mut next)?;
            next.updated_at = now;

            match self
                .repository
                .save(&next, current.version, outcome.activity.as_ref())
                .await
            {
                Ok(saved) => return Ok((saved, outcome.credited_in_cents)),
                Err(StoreError::VersionConflict) => {
                    attempts += 1;
                    if attempts > config.max_conflict_retries {
                        log::warn!("Giving up on account {} after {} conflicts.", id, attempts);
                        return Err(RewardError::Contention);
                    }
                    log::debug!("Version conflict on account {}, retrying ({}).", id, attempts);
                }
                Err(StoreError::DuplicateReferral) => return Err(RewardError::DuplicateReferral),
                Err(StoreError::NotFound) => return Err(RewardError::AccountNotFound(id.to_string())),
                Err(e) => return Err(RewardError::Store(e.to_string())),
            }
        }
    }

    pub async fn credit_balance(
        &self,
        id: &str,
        amount_in_cents: i64,
        now: DateTime<Utc>,
        config: &RewardConfig,
    ) -> Result<UserAccount, RewardError> {
        if amount_in_cents <= 0 {
            return Err(RewardError::InvalidAmount(amount_in_cents));
        }

        let (account, _) = self
            .commit(id, now, config, |account| {
                account.credit(amount_in_cents)?;
                Ok(Outcome {
                    credited_in_cents: amount_in_cents,
                    activity: Some(Activity::new(
                        &account.id,
                        ActivityKind::Credit,
                        amount_in_cents,
                        None,
                        now,
                    )),
                })
            })
            .await?;

        log::info!("Credited {} cents to {}.", amount_in_cents, id);
        Ok(account)
    }

    pub async fn record_ad_watch(
        &self,
        id: &str,
        now: DateTime<Utc>,
        config: &RewardConfig,
    ) -> Result<(UserAccount, i64), RewardError> {
        let result = self
            .commit(id, now, config, |account| {
                let reward = account.apply_ad_watch(now, config)?;
                Ok(Outcome {
                    credited_in_cents: reward,
                    activity: Some(Activity::new(
                        &account.id,
                        ActivityKind::AdWatch,
                        reward,
                        None,
                        now,
                    )),
                })
            })
            .await;

        match &result {
            Ok((account, reward)) => log::info!(
                "Ad watch credited {} cents to {} ({} today).",
                reward,
                id,
                account.daily_ads_today
            ),
            Err(RewardError::DailyLimitExceeded) => {
                log::warn!("Ad watch rejected for {}: daily limit reached.", id)
            }
            Err(_) => (),
        }

        result
    }

    pub async fn record_spin(
        &self,
        id: &str,
        now: DateTime<Utc>,
        prize_in_cents: i64,
        config: &RewardConfig,
    ) -> Result<(UserAccount, i64), RewardError> {
        if prize_in_cents <= 0 {
            return Err(RewardError::InvalidAmount(prize_in_cents));
        }

        let result = self
            .commit(id, now, config, |account| {
                let prize = account.apply_spin(now, prize_in_cents, config)?;
                Ok(Outcome {
                    credited_in_cents: prize,
                    activity: Some(Activity::new(
                        &account.id,
                        ActivityKind::Spin,
                        prize,
                        None,
                        now,
                    )),
                })
            })
            .await;

        match &result {
            Ok((_, prize)) => log::info!("Spin credited {} cents to {}.", prize, id),
            Err(RewardError::AlreadySpunToday) => {
                log::warn!("Spin rejected for {}: already spun today.", id)
            }
            Err(_) => (),
        }

        result
    }

    /// Credits the referrer once for `referred`. The referred user's id is the
    /// idempotency key; a second call fails with `DuplicateReferral`.
    pub async fn record_referral_bonus(
        &self,
        referrer_id: &str,
        referred: &UserAccount,
        now: DateTime<Utc>,
        config: &RewardConfig,
    ) -> Result<(UserAccount, i64), RewardError> {
        if referred.id == referrer_id
            || referred.used_referral_code.as_deref() == Some(referred.referral_code.as_str())
        {
            return Err(RewardError::SelfReferral);
        }

        let used_code = referred
            .used_referral_code
            .clone()
            .ok_or_else(|| RewardError::InvalidReferralCode(String::new()))?;
        let bonus = config.referral_bonus_in_cents;
        let referred_id = referred.id.clone();

        let result = self
            .commit(referrer_id, now, config, |account| {
                if account.referral_code != used_code {
                    return Err(RewardError::InvalidReferralCode(used_code.clone()));
                }

                let credited = account.apply_referral_bonus(bonus)?;
                Ok(Outcome {
                    credited_in_cents: credited,
                    activity: Some(Activity::new(
                        &account.id,
                        ActivityKind::Referral,
                        credited,
                        Some(referred_id.clone()),
                        now,
                    )),
                })
            })
            .await;

        match &result {
            Ok((account, bonus)) => log::info!(
                "Referral bonus of {} cents credited to {} for {} ({} referrals).",
                bonus,
                referrer_id,
                referred.id,
                account.referral_count
            ),
            Err(RewardError::DuplicateReferral) => log::warn!(
                "Referral bonus for {} already applied to {}.",
                referred.id,
                referrer_id
            ),
            Err(_) => (),
        }

        result
    }

    pub async fn award_badge(
        &self,
        id: &str,
        badge: &str,
        now: DateTime<Utc>,
        config: &RewardConfig,
    ) -> Result<UserAccount, RewardError> {
        // Nothing to write when the badge is already held.
        let current = self
            .repository
            .load(id)
            .await
            .map_err(|e| RewardError::Store(e.to_string()))?
            .ok_or_else(|| RewardError::AccountNotFound(id.to_string()))?;
        if current.has_badge(badge) {
            return Ok(current);
        }

        let (account, _) = self
            .commit(id, now, config, |account| {
                account.award_badge(badge);
                Ok(Outcome {
                    credited_in_cents: 0,
                    activity: None,
                })
            })
            .await?;

        Ok(account)
    }
}
