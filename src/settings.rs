use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

use crate::rewards::RewardConfig;

#[derive(Debug, Deserialize)]
pub struct Http {
    pub listen: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    pub backend: Backend,
    pub postgres: Option<Postgres>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub http: Http,
    pub storage: Storage,
    #[serde(default)]
    pub rewards: RewardConfig,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .build()?;

        Self::finish(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;

        if settings.storage.backend == Backend::Postgres && settings.storage.postgres.is_none() {
            return Err(ConfigError::Message(
                "storage.postgres is required for the postgres backend".to_string(),
            ));
        }
        settings
            .rewards
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_section_falls_back_to_defaults() {
        let settings = Settings::from_toml(
            r#"
            [http]
            listen = "127.0.0.1:8080"

            [storage]
            backend = "memory"

            [rewards]
            max_ads_per_day = 10
            utc_offset_minutes = 300
            "#,
        )
        .unwrap();

        assert_eq!(settings.storage.backend, Backend::Memory);
        assert_eq!(settings.rewards.max_ads_per_day, 10);
        assert_eq!(settings.rewards.utc_offset_minutes, 300);
        assert_eq!(settings.rewards.ad_reward_in_cents, 500);
        assert_eq!(
            settings.rewards.spin_prize_table_in_cents,
            vec![500, 1000, 1500, 2000, 2500, 5000]
        );
    }

    #[test]
    fn postgres_backend_needs_a_url() {
        let result = Settings::from_toml(
            r#"
            [http]
            listen = "127.0.0.1:8080"

            [storage]
            backend = "postgres"
            "#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn invalid_rewards_are_rejected_at_load() {
        let result = Settings::from_toml(
            r#"
            [http]
            listen = "127.0.0.1:8080"

            [storage]
            backend = "memory"

            [rewards]
            ad_reward_in_cents = 0
            "#,
        );

        assert!(result.is_err());
    }
}
