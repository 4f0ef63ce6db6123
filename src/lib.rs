pub mod models;
pub mod repositories;
pub mod rewards;
pub mod services;
pub mod settings;
