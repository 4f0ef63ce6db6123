pub mod activities;
pub mod users;
pub mod withdrawals;
