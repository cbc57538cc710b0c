use std::sync::Arc;

use stockroom_infra::{
    FulfillmentService, FulfillmentStore, InMemoryFulfillmentStore, PostgresFulfillmentStore,
    StoreError,
};

use crate::config::Config;

pub type DynFulfillmentStore = Arc<dyn FulfillmentStore<Error = StoreError>>;

/// Shared state handed to every handler.
pub struct AppServices {
    pub fulfillment: FulfillmentService<DynFulfillmentStore>,
}

impl AppServices {
    pub fn new(store: DynFulfillmentStore) -> Self {
        Self {
            fulfillment: FulfillmentService::new(store),
        }
    }
}

/// Postgres when `DATABASE_URL` is configured (migrations applied on startup),
/// otherwise an empty in-memory store.
pub async fn build_services(config: &Config) -> Result<AppServices, StoreError> {
    let store: DynFulfillmentStore = match &config.database_url {
        Some(url) => {
            let store = PostgresFulfillmentStore::connect(
                url,
                config.database_max_connections,
                config.lock_timeout,
            )
            .await?;
            store.migrate().await?;
            tracing::info!(
                max_connections = config.database_max_connections,
                "using postgres fulfillment store"
            );
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory fulfillment store");
            Arc::new(InMemoryFulfillmentStore::with_lock_timeout(
                config.lock_timeout,
            ))
        }
    };
    Ok(AppServices::new(store))
}
