use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{RewardConfig, RewardError};
use crate::models::{
    users::UserAccount,
    withdrawals::{NewWithdrawal, WithdrawalRequest, WithdrawalStatus},
};

pub fn open_withdrawal(
    account: &UserAccount,
    request: &NewWithdrawal,
    now: DateTime<Utc>,
    config: &RewardConfig,
) -> Result<WithdrawalRequest, RewardError> {
    let amount = request.amount_in_cents;

    if amount < config.min_withdrawal_in_cents {
        return Err(RewardError::WithdrawalBelowMinimum(
            amount,
            config.min_withdrawal_in_cents,
        ));
    }
    if amount > account.balance_in_cents {
        return Err(RewardError::InsufficientBalance(amount, account.balance_in_cents));
    }

    let method = request.method.trim();
    let account_number = request.account_number.trim();
    let full_name = request.full_name.trim();
    if method.is_empty() {
        return Err(RewardError::InvalidWithdrawal("method is required".to_string()));
    }
    if account_number.is_empty() {
        return Err(RewardError::InvalidWithdrawal(
            "account number is required".to_string(),
        ));
    }
    if full_name.is_empty() {
        return Err(RewardError::InvalidWithdrawal("full name is required".to_string()));
    }

    Ok(WithdrawalRequest {
        id: Uuid::new_v4(),
        user_id: account.id.clone(),
        amount_in_cents: amount,
        method: method.to_string(),
        account_number: account_number.to_string(),
        full_name: full_name.to_string(),
        status: WithdrawalStatus::Pending,
        created_at: now,
    })
}
