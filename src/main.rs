use std::{fs, path::Path, sync::Arc};

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use earnzilla_rewards::{
    repositories::{memory::MemoryRepository, postgres::PgRepository, Repository},
    services,
    settings::{Backend, Settings},
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::new(&args.config)?;

    init_logging(&args.log4rs)?;
    log::info!("Starting EarnZilla rewards service.");

    let repository: Arc<dyn Repository> = match settings.storage.backend {
        Backend::Memory => {
            log::warn!("Using the in-memory store; balances are lost on restart.");
            Arc::new(MemoryRepository::new())
        }
        Backend::Postgres => {
            let postgres = settings
                .storage
                .postgres
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Missing storage.postgres settings."))?;
            let pool = PgPoolOptions::new()
                .max_connections(postgres.max_connections)
                .connect(&postgres.url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            log::info!("Connected to database.");

            Arc::new(PgRepository::new(pool))
        }
    };

    services::start_services(repository, settings).await
}

fn init_logging(path: &str) -> Result<()> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
