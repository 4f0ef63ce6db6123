use std::fmt;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

pub mod calendar;
pub mod eligibility;
pub mod ledger;
pub mod payout;
pub mod wheel;

const MAX_UTC_OFFSET_MINUTES: i32 = 23 * 60 + 59;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RewardConfig {
    pub ad_reward_in_cents: i64,
    pub max_ads_per_day: i64,
    pub referral_bonus_in_cents: i64,
    pub spin_prize_table_in_cents: Vec<i64>,
    pub min_withdrawal_in_cents: i64,
    pub utc_offset_minutes: i32,
    pub ads_enabled: bool,
    pub spin_enabled: bool,
    pub referrals_enabled: bool,
    pub max_conflict_retries: u32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            ad_reward_in_cents: 5 * 100,
            max_ads_per_day: 20,
            referral_bonus_in_cents: 50 * 100,
            spin_prize_table_in_cents: vec![500, 1000, 1500, 2000, 2500, 5000],
            min_withdrawal_in_cents: 250 * 100,
            utc_offset_minutes: 0,
            ads_enabled: true,
            spin_enabled: true,
            referrals_enabled: true,
            max_conflict_retries: 8,
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<(), RewardError> {
        if self.ad_reward_in_cents <= 0 {
            return Err(RewardError::InvalidConfig(
                "ad_reward_in_cents must be positive".to_string(),
            ));
        }
        if self.max_ads_per_day <= 0 {
            return Err(RewardError::InvalidConfig(
                "max_ads_per_day must be positive".to_string(),
            ));
        }
        if self.referral_bonus_in_cents <= 0 {
            return Err(RewardError::InvalidConfig(
                "referral_bonus_in_cents must be positive".to_string(),
            ));
        }
        if self.spin_prize_table_in_cents.is_empty()
            || self.spin_prize_table_in_cents.iter().any(|p| *p <= 0)
        {
            return Err(RewardError::InvalidConfig(
                "spin_prize_table_in_cents must hold positive prizes".to_string(),
            ));
        }
        if self.min_withdrawal_in_cents <= 0 {
            return Err(RewardError::InvalidConfig(
                "min_withdrawal_in_cents must be positive".to_string(),
            ));
        }
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(RewardError::InvalidConfig(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            )));
        }

        Ok(())
    }

    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Ads,
    Spin,
    Referrals,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Ads => f.write_str("ads"),
            Feature::Spin => f.write_str("spin"),
            Feature::Referrals => f.write_str("referrals"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RewardError {
    #[error("Daily ad limit reached")]
    DailyLimitExceeded,
    #[error("Already spun today")]
    AlreadySpunToday,
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),
    #[error("Referral bonus already applied for this user")]
    DuplicateReferral,
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("An account cannot refer itself")]
    SelfReferral,
    #[error("Invalid referral code: {0}")]
    InvalidReferralCode(String),
    #[error("Referral code not found: {0}")]
    ReferralCodeNotFound(String),
    #[error("Feature disabled: {0}")]
    FeatureDisabled(Feature),
    #[error("Withdrawal amount {0} is below the minimum {1}")]
    WithdrawalBelowMinimum(i64, i64),
    #[error("Withdrawal amount {0} exceeds balance {1}")]
    InsufficientBalance(i64, i64),
    #[error("Invalid badge: {0:?}")]
    InvalidBadge(String),
    #[error("Invalid withdrawal: {0}")]
    InvalidWithdrawal(String),
    #[error("A withdrawal request is already pending")]
    PendingWithdrawalExists,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Account is busy, try again")]
    Contention,
    #[error("Store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RewardConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.timezone(), Utc.fix());
    }

    #[test]
    fn rejects_non_positive_prizes() {
        let config = RewardConfig {
            spin_prize_table_in_cents: vec![500, 0],
            ..RewardConfig::default()
        };
        assert!(matches!(config.validate(), Err(RewardError::InvalidConfig(_))));

        let config = RewardConfig {
            spin_prize_table_in_cents: Vec::new(),
            ..RewardConfig::default()
        };
        assert!(matches!(config.validate(), Err(RewardError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_out_of_range_offsets() {
        let config = RewardConfig {
            utc_offset_minutes: 24 * 60,
            ..RewardConfig::default()
        };
        assert!(matches!(config.validate(), Err(RewardError::InvalidConfig(_))));

        let config = RewardConfig {
            utc_offset_minutes: 5 * 60,
            ..RewardConfig::default()
        };
        assert_eq!(config.timezone().local_minus_utc(), 5 * 3600);
    }
}
