use std::sync::Arc;

use anyhow::{Context, anyhow};
use delivery::api::{AppState, run_backend};
use delivery::eta::EtaSettings;
use delivery::executable_utils::{initialize_executable, initialize_tracing};
use delivery::geocode::YandexGeocoder;
use delivery::storage::PgDeliveryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = initialize_executable().map_err(|e| anyhow!("{e}"))?;
    initialize_tracing(&config.backend.log_level);

    let store = PgDeliveryStore::new(&config.common.database_url)
        .await
        .context("connecting to database")?;
    store.run_migrations().await.context("running migrations")?;

    let geocoder = YandexGeocoder::new(&config.geocoder)?;
    let state = AppState::new(
        Arc::new(store),
        Arc::new(geocoder),
        EtaSettings::from(&config.delivery),
    );

    run_backend(&config, state).await.map_err(|e| anyhow!("{e}"))
}
