use std::sync::Arc;

use stockledger_core::PositionId;
use stockledger_infra::{
    config::AppConfig,
    lifecycle::{LifecycleError, MaterialLifecycle, MoveOutcome},
    reporting::{BalanceReportQuery, BalanceRow, TransactionReportQuery, TransactionRow},
    store::{InMemoryInventoryStore, PostgresInventoryStore},
};
use stockledger_inventory::{
    IncomingRecord, LedgerBalance, LedgerEntry, MaterialPosition, MaterialType, MoveMaterial,
    NewIncoming, ReceiveMaterial, RemoveMaterial,
};

/// Lifecycle wiring behind the HTTP handlers, one variant per storage backend.
#[derive(Debug, Clone)]
pub enum AppServices {
    InMemory {
        lifecycle: Arc<MaterialLifecycle<InMemoryInventoryStore>>,
    },
    Persistent {
        lifecycle: Arc<MaterialLifecycle<PostgresInventoryStore>>,
    },
}

/// Run `$call` against whichever lifecycle backs the services.
macro_rules! with_lifecycle {
    ($services:expr, $lc:ident => $call:expr) => {
        match $services {
            AppServices::InMemory { lifecycle: $lc } => $call,
            AppServices::Persistent { lifecycle: $lc } => $call,
        }
    };
}

pub fn build_in_memory_services() -> AppServices {
    AppServices::InMemory {
        lifecycle: Arc::new(MaterialLifecycle::new(InMemoryInventoryStore::new())),
    }
}

/// Postgres when a database is configured, in-memory otherwise.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let Some(db) = &config.database else {
        tracing::warn!("no database configured; using the in-memory store");
        return Ok(build_in_memory_services());
    };

    let store = PostgresInventoryStore::connect(db).await?;
    if db.run_migrations {
        store.migrate().await?;
        tracing::info!("database migrations applied");
    }
    Ok(AppServices::Persistent {
        lifecycle: Arc::new(MaterialLifecycle::new(store)),
    })
}

impl AppServices {
    pub async fn stage(&self, input: NewIncoming) -> Result<IncomingRecord, LifecycleError> {
        with_lifecycle!(self, lc => lc.stage(input).await)
    }

    pub async fn incoming(&self) -> Result<Vec<IncomingRecord>, LifecycleError> {
        with_lifecycle!(self, lc => lc.incoming().await)
    }

    pub async fn receive(&self, cmd: ReceiveMaterial) -> Result<MaterialPosition, LifecycleError> {
        with_lifecycle!(self, lc => lc.receive(cmd).await)
    }

    pub async fn move_material(&self, cmd: MoveMaterial) -> Result<MoveOutcome, LifecycleError> {
        with_lifecycle!(self, lc => lc.move_material(cmd).await)
    }

    pub async fn remove(&self, cmd: RemoveMaterial) -> Result<MaterialPosition, LifecycleError> {
        with_lifecycle!(self, lc => lc.remove(cmd).await)
    }

    pub async fn positions(&self) -> Result<Vec<MaterialPosition>, LifecycleError> {
        with_lifecycle!(self, lc => lc.positions().await)
    }

    pub async fn ledger(&self, id: PositionId) -> Result<Vec<LedgerEntry>, LifecycleError> {
        with_lifecycle!(self, lc => lc.ledger(id).await)
    }

    pub async fn audit(&self, id: PositionId) -> Result<LedgerBalance, LifecycleError> {
        with_lifecycle!(self, lc => lc.audit(id).await)
    }

    pub fn material_types(&self) -> &'static [MaterialType] {
        with_lifecycle!(self, lc => lc.material_types())
    }

    pub async fn transaction_report(
        &self,
        query: &TransactionReportQuery,
    ) -> Result<Vec<TransactionRow>, LifecycleError> {
        with_lifecycle!(self, lc => lc.transaction_report(query).await)
    }

    pub async fn balance_report(
        &self,
        query: &BalanceReportQuery,
    ) -> Result<Vec<BalanceRow>, LifecycleError> {
        with_lifecycle!(self, lc => lc.balance_report(query).await)
    }
}
