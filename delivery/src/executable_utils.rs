use clap::Parser;
use common::config::Config;
use tracing_subscriber::EnvFilter;

use crate::model::GenericError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "config/dev.yaml")]
    pub config: String,
}

pub fn initialize_executable() -> Result<Config, GenericError> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config = Config::load(&args.config)?;

    // The environment wins over the config file for the database URL.
    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        config.common.database_url = database_url;
    }

    Ok(config)
}

pub fn initialize_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}
