//! Service wiring: picks a storage backend and builds the ledger and workflow on it.

use std::sync::Arc;

use tracing::{info, warn};

use orderflow_core::{Clock, SystemClock};
use orderflow_infra::store::{PostgresStore, ProductCatalog, StoreError, Stores};
use orderflow_infra::{InventoryLedger, OrderWorkflow, UuidIdGenerator};

use crate::config::AppConfig;

/// Everything the handlers need, shared behind an `Arc`.
#[derive(Clone)]
pub struct AppServices {
    pub workflow: OrderWorkflow,
    pub catalog: Arc<dyn ProductCatalog>,
}

impl AppServices {
    pub fn new(stores: Stores, default_low_stock_threshold: i64) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = InventoryLedger::new(&stores, clock.clone())
            .with_default_threshold(default_low_stock_threshold);
        let workflow = OrderWorkflow::new(&stores, ledger, Arc::new(UuidIdGenerator), clock);
        Self {
            workflow,
            catalog: stores.catalog,
        }
    }

    /// Fresh in-memory backend (tests, local development).
    pub fn in_memory(default_low_stock_threshold: i64) -> Self {
        Self::new(Stores::in_memory(), default_low_stock_threshold)
    }

    pub fn ledger(&self) -> &InventoryLedger {
        self.workflow.ledger()
    }
}

/// Build services for `config`: Postgres when `DATABASE_URL` is set, otherwise
/// the in-memory backend.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.db_max_connections).await?;
            store.migrate().await?;
            info!(max_connections = config.db_max_connections, "using postgres backend");
            Ok(AppServices::new(
                store.into_stores(),
                config.default_low_stock_threshold,
            ))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory backend (state is lost on restart)");
            Ok(AppServices::in_memory(config.default_low_stock_threshold))
        }
    }
}
