use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    calendar::{next_day_start, same_calendar_day},
    RewardConfig,
};
use crate::models::users::UserAccount;

/// Stale counters from a previous calendar day read as zero.
pub fn ads_watched_today(account: &UserAccount, now: DateTime<Utc>, config: &RewardConfig) -> i64 {
    if same_calendar_day(account.last_ad_date, now, &config.timezone()) {
        account.daily_ads_today
    } else {
        0
    }
}

pub fn can_watch_ad(account: &UserAccount, now: DateTime<Utc>, config: &RewardConfig) -> bool {
    ads_watched_today(account, now, config) < config.max_ads_per_day
}

pub fn ads_remaining_today(account: &UserAccount, now: DateTime<Utc>, config: &RewardConfig) -> i64 {
    (config.max_ads_per_day - ads_watched_today(account, now, config)).max(0)
}

pub fn can_spin(account: &UserAccount, now: DateTime<Utc>, config: &RewardConfig) -> bool {
    !same_calendar_day(account.last_spin_date, now, &config.timezone())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub can_watch_ad: bool,
    pub can_spin: bool,
    pub ads_watched_today: i64,
    pub ads_remaining_today: i64,
    pub next_reset: Option<DateTime<Utc>>,
}

impl Eligibility {
    pub fn evaluate(account: &UserAccount, now: DateTime<Utc>, config: &RewardConfig) -> Self {
        Self {
            can_watch_ad: can_watch_ad(account, now, config),
            can_spin: can_spin(account, now, config),
            ads_watched_today: ads_watched_today(account, now, config),
            ads_remaining_today: ads_remaining_today(account, now, config),
            next_reset: next_day_start(now, &config.timezone()),
        }
    }
}
