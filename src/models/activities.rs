use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::users::UserAccount;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    AdWatch,
    Spin,
    Referral,
    Credit,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::AdWatch => "ad_watch",
            ActivityKind::Spin => "spin",
            ActivityKind::Referral => "referral",
            ActivityKind::Credit => "credit",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ad_watch" => Ok(ActivityKind::AdWatch),
            "spin" => Ok(ActivityKind::Spin),
            "referral" => Ok(ActivityKind::Referral),
            "credit" => Ok(ActivityKind::Credit),
            other => Err(format!("Unknown activity kind: {}", other)),
        }
    }
}

// For referrals `reference_id` holds the referred user's id and is unique
// across all referral activities.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: String,
    pub kind: ActivityKind,
    pub amount_in_cents: i64,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        user_id: &str,
        kind: ActivityKind,
        amount_in_cents: i64,
        reference_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind,
            amount_in_cents,
            reference_id,
            created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RewardReceipt {
    pub credited_in_cents: i64,
    pub account: UserAccount,
}
