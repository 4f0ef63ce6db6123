use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use super::{AccountRepository, StoreError, WithdrawalRepository};
use crate::models::{activities::Activity, users::UserAccount, withdrawals::WithdrawalRequest};

const REFERRAL_CODE_CONSTRAINT: &str = "accounts_referral_code_key";

#[derive(Clone)]
pub struct PgRepository {
    conn: PgPool,
}

impl PgRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    log::error!("Postgres query failed: {}", e);
    StoreError::Backend(e.to_string())
}

fn unique_violation(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .filter(|db| db.is_unique_violation())
        .map(|db| db.constraint().unwrap_or_default().to_string())
}

fn activity_from_row(row: &PgRow) -> Result<Activity, StoreError> {
    let kind: String = row.try_get("kind").map_err(backend)?;

    Ok(Activity {
        id: row.try_get("id").map_err(backend)?,
        user_id: row.try_get("user_id").map_err(backend)?,
        kind: kind.parse().map_err(StoreError::Backend)?,
        amount_in_cents: row.try_get("amount_in_cents").map_err(backend)?,
        reference_id: row.try_get("reference_id").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn withdrawal_from_row(row: &PgRow) -> Result<WithdrawalRequest, StoreError> {
    let status: String = row.try_get("status").map_err(backend)?;

    Ok(WithdrawalRequest {
        id: row.try_get("id").map_err(backend)?,
        user_id: row.try_get("user_id").map_err(backend)?,
        amount_in_cents: row.try_get("amount_in_cents").map_err(backend)?,
        method: row.try_get("method").map_err(backend)?,
        account_number: row.try_get("account_number").map_err(backend)?,
        full_name: row.try_get("full_name").map_err(backend)?,
        status: status.parse().map_err(StoreError::Backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

#[async_trait]
impl AccountRepository for PgRepository {
    async fn load(&self, id: &str) -> Result<Option<UserAccount>, StoreError> {
        sqlx::query_as::<_, UserAccount>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await
            .map_err(backend)
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserAccount>, StoreError> {
        sqlx::query_as::<_, UserAccount>("SELECT * FROM accounts WHERE referral_code = $1")
            .bind(code)
            .fetch_optional(&self.conn)
            .await
            .map_err(backend)
    }

    async fn insert(&self, account: &UserAccount) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts
            (id, display_name, email, referral_code, used_referral_code, balance_in_cents,
             total_earnings_in_cents, total_ads_watched, referral_count, badges,
             daily_ads_today, last_ad_date, last_spin_date, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(&account.id)
        .bind(&account.display_name)
        .bind(&account.email)
        .bind(&account.referral_code)
        .bind(&account.used_referral_code)
        .bind(account.balance_in_cents)
        .bind(account.total_earnings_in_cents)
        .bind(account.total_ads_watched)
        .bind(account.referral_count)
        .bind(&account.badges)
        .bind(account.daily_ads_today)
        .bind(account.last_ad_date)
        .bind(account.last_spin_date)
        .bind(account.version)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.conn)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match unique_violation(&e) {
                Some(constraint) if constraint == REFERRAL_CODE_CONSTRAINT => {
                    Err(StoreError::DuplicateReferralCode)
                }
                Some(_) => Err(StoreError::DuplicateAccount),
                None => Err(backend(e)),
            },
        }
    }

    async fn save(
        &self,
        account: &UserAccount,
        expected_version: i64,
        activity: Option<&Activity>,
    ) -> Result<UserAccount, StoreError> {
        let mut tx = self.conn.begin().await.map_err(backend)?;

        let saved = sqlx::query_as::<_, UserAccount>(
            r#"
            UPDATE accounts SET
                display_name = $3, email = $4, balance_in_cents = $5,
                total_earnings_in_cents = $6, total_ads_watched = $7, referral_count = $8,
                badges = $9, daily_ads_today = $10, last_ad_date = $11, last_spin_date = $12,
                updated_at = $13, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(&account.id)
        .bind(expected_version)
        .bind(&account.display_name)
        .bind(&account.email)
        .bind(account.balance_in_cents)
        .bind(account.total_earnings_in_cents)
        .bind(account.total_ads_watched)
        .bind(account.referral_count)
        .bind(&account.badges)
        .bind(account.daily_ads_today)
        .bind(account.last_ad_date)
        .bind(account.last_spin_date)
        .bind(account.updated_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        let saved = match saved {
            Some(saved) => saved,
            None => {
                let exists: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM accounts WHERE id = $1")
                        .bind(&account.id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(backend)?;

                return match exists {
                    Some(_) => Err(StoreError::VersionConflict),
                    None => Err(StoreError::NotFound),
                };
            }
        };

        if let Some(activity) = activity {
            let result = sqlx::query(
                r#"
                INSERT INTO activities (id, user_id, kind, amount_in_cents, reference_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(activity.id)
            .bind(&activity.user_id)
            .bind(activity.kind.as_str())
            .bind(activity.amount_in_cents)
            .bind(&activity.reference_id)
            .bind(activity.created_at)
            .execute(&mut *tx)
            .await;

            if let Err(e) = result {
                return match unique_violation(&e) {
                    Some(_) => Err(StoreError::DuplicateReferral),
                    None => Err(backend(e)),
                };
            }
        }

        tx.commit().await.map_err(backend)?;

        Ok(saved)
    }

    async fn top_earners(&self, limit: usize) -> Result<Vec<UserAccount>, StoreError> {
        sqlx::query_as::<_, UserAccount>(
            "SELECT * FROM accounts ORDER BY total_earnings_in_cents DESC, created_at ASC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.conn)
        .await
        .map_err(backend)
    }

    async fn activity_for(&self, user_id: &str) -> Result<Vec<Activity>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM activities WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await
        .map_err(backend)?;

        rows.iter().map(activity_from_row).collect()
    }

    async fn referral_recorded(&self, referred_id: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM activities WHERE kind = 'referral' AND reference_id = $1)",
        )
        .bind(referred_id)
        .fetch_one(&self.conn)
        .await
        .map_err(backend)
    }
}

#[async_trait]
impl WithdrawalRepository for PgRepository {
    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO withdrawals
            (id, user_id, amount_in_cents, method, account_number, full_name, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(request.id)
        .bind(&request.user_id)
        .bind(request.amount_in_cents)
        .bind(&request.method)
        .bind(&request.account_number)
        .bind(&request.full_name)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .execute(&self.conn)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match unique_violation(&e) {
                Some(_) => Err(StoreError::PendingWithdrawalExists),
                None => Err(backend(e)),
            },
        }
    }

    async fn withdrawals_for(&self, user_id: &str) -> Result<Vec<WithdrawalRequest>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM withdrawals WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await
        .map_err(backend)?;

        rows.iter().map(withdrawal_from_row).collect()
    }
}

#[cfg(all(test, feature = "postgres-tests"))]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::models::{
        activities::ActivityKind,
        withdrawals::WithdrawalStatus,
    };

    fn account(id: &str, code: &str) -> UserAccount {
        UserAccount::new(
            id.to_string(),
            format!("User {}", id),
            format!("{}@example.com", id),
            code.to_string(),
            None,
            Utc::now(),
        )
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn save_tells_conflicts_from_missing_accounts(pool: PgPool) {
        let repository = PgRepository::new(pool);
        let original = account("a", "AAAAAA");
        repository.insert(&original).await.unwrap();

        let mut next = original.clone();
        next.balance_in_cents = 500;
        let saved = repository.save(&next, 0, None).await.unwrap();
        assert_eq!(saved.version, 1);

        assert!(matches!(
            repository.save(&next, 0, None).await,
            Err(StoreError::VersionConflict)
        ));
        assert!(matches!(
            repository.save(&account("ghost", "GGGGGG"), 0, None).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            repository.insert(&account("b", "AAAAAA")).await,
            Err(StoreError::DuplicateReferralCode)
        ));
        assert!(matches!(
            repository.insert(&account("a", "CCCCCC")).await,
            Err(StoreError::DuplicateAccount)
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_referral_rolls_back_the_account_update(pool: PgPool) {
        let repository = PgRepository::new(pool);
        let referrer = account("a", "AAAAAA");
        repository.insert(&referrer).await.unwrap();
        let now = Utc::now();

        let mut paid = referrer.clone();
        paid.balance_in_cents = 5000;
        paid.total_earnings_in_cents = 5000;
        paid.referral_count = 1;
        let first = Activity::new("a", ActivityKind::Referral, 5000, Some("b".to_string()), now);
        let saved = repository.save(&paid, 0, Some(&first)).await.unwrap();
        assert!(repository.referral_recorded("b").await.unwrap());

        let mut twice = saved.clone();
        twice.balance_in_cents = 10_000;
        twice.total_earnings_in_cents = 10_000;
        twice.referral_count = 2;
        let again = Activity::new("a", ActivityKind::Referral, 5000, Some("b".to_string()), now);
        assert!(matches!(
            repository.save(&twice, saved.version, Some(&again)).await,
            Err(StoreError::DuplicateReferral)
        ));

        let stored = repository.load("a").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.balance_in_cents, 5000);
        assert_eq!(stored.referral_count, 1);
        assert_eq!(repository.activity_for("a").await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn one_pending_withdrawal_per_user(pool: PgPool) {
        let repository = PgRepository::new(pool);
        repository.insert(&account("a", "AAAAAA")).await.unwrap();

        let request = |amount_in_cents| WithdrawalRequest {
            id: Uuid::new_v4(),
            user_id: "a".to_string(),
            amount_in_cents,
            method: "GCash".to_string(),
            account_number: "09171234567".to_string(),
            full_name: "Ada Lovelace".to_string(),
            status: WithdrawalStatus::Pending,
            created_at: Utc::now(),
        };

        repository.insert_withdrawal(&request(25_000)).await.unwrap();
        assert!(matches!(
            repository.insert_withdrawal(&request(30_000)).await,
            Err(StoreError::PendingWithdrawalExists)
        ));
        assert_eq!(repository.withdrawals_for("a").await.unwrap().len(), 1);
    }
}
