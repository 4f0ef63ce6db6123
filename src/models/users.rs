use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

const REFERRAL_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const REFERRAL_CODE_LEN: usize = 6;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct UserAccount {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub referral_code: String,
    pub used_referral_code: Option<String>,
    pub balance_in_cents: i64,
    pub total_earnings_in_cents: i64,
    pub total_ads_watched: i64,
    pub referral_count: i64,
    pub badges: Vec<String>,
    pub daily_ads_today: i64,
    pub last_ad_date: Option<DateTime<Utc>>,
    pub last_spin_date: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(
        id: String,
        display_name: String,
        email: String,
        referral_code: String,
        used_referral_code: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            display_name,
            email,
            referral_code,
            used_referral_code,
            balance_in_cents: 0,
            total_earnings_in_cents: 0,
            total_ads_watched: 0,
            referral_count: 0,
            badges: Vec::new(),
            daily_ads_today: 0,
            last_ad_date: None,
            last_spin_date: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_badge(&self, badge: &str) -> bool {
        self.badges.iter().any(|b| b == badge)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub identity_id: String,
    pub display_name: String,
    pub email: String,
    pub referral_code: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ReferralCodeOwner {
    pub referral_code: String,
    pub user_id: String,
    pub display_name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub display_name: String,
    pub total_earnings_in_cents: i64,
}

pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();

    (0..REFERRAL_CODE_LEN)
        .map(|_| REFERRAL_CODE_ALPHABET[rng.gen_range(0..REFERRAL_CODE_ALPHABET.len())] as char)
        .collect()
}

pub fn normalize_referral_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }

    Some(code.to_ascii_uppercase())
}
