use sqlx::{postgres::PgPool, Postgres, Transaction};
use wlan_client::{db, AccessPointKey, LibraryKey, NewLibrary, Utilization};

use crate::pipeline::{PipelineError, StoreTransaction, UtilizationStore};

pub struct PgUtilizationStore {
    pool: PgPool,
    batch_size: usize,
}

impl PgUtilizationStore {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.clamp(1, db::MAX_UPSERT_BATCH),
        }
    }
}

#[async_trait::async_trait]
impl UtilizationStore for PgUtilizationStore {
    type Tx = PgStoreTransaction;

    async fn begin(&self) -> Result<Self::Tx, PipelineError> {
        Ok(PgStoreTransaction {
            tx: self.pool.begin().await?,
            batch_size: self.batch_size,
        })
    }
}

/// Rolls back on drop unless committed.
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
    batch_size: usize,
}

#[async_trait::async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn resolve_library(&mut self, library: &NewLibrary<'_>) -> Result<LibraryKey, PipelineError> {
        Ok(db::resolve_library(&mut *self.tx, library).await?)
    }

    async fn resolve_access_point(
        &mut self,
        name: &str,
        library: LibraryKey,
    ) -> Result<AccessPointKey, PipelineError> {
        Ok(db::resolve_access_point(&mut *self.tx, name, library).await?)
    }

    async fn upsert_utilization(&mut self, rows: &[Utilization]) -> Result<u64, PipelineError> {
        let mut affected = 0;
        for batch in rows.chunks(self.batch_size) {
            affected += db::upsert_utilization(&mut *self.tx, batch).await?;
            metrics::counter!("utilization_rows_upserted_total").increment(batch.len() as u64);
        }
        Ok(affected)
    }

    async fn commit(self) -> Result<(), PipelineError> {
        Ok(self.tx.commit().await?)
    }
}
