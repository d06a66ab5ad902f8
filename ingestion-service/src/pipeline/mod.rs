use std::time::SystemTime;

use wlan_client::{AccessPointKey, LibraryKey, NewLibrary, Utilization};

use crate::sources::graphite::{RawSeries, SeriesQuery};

pub mod crawl;

pub use crawl::{CrawlReport, CrawlState, Crawler, LibraryOutcome};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("topology error: {0}")]
    Topology(String),
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Store(e.to_string())
    }
}

/// Metrics backend returning every series matching one wildcard target.
#[async_trait::async_trait]
pub trait SeriesSource: Send + Sync {
    async fn fetch(&self, query: &SeriesQuery) -> Result<Envelope<Vec<RawSeries>>, PipelineError>;
}

/// Transactional store for the library / access point / utilization rows.
#[async_trait::async_trait]
pub trait UtilizationStore: Send + Sync {
    type Tx: StoreTransaction;

    async fn begin(&self) -> Result<Self::Tx, PipelineError>;
}

/// One open unit of work. Dropping it without `commit` discards every change.
#[async_trait::async_trait]
pub trait StoreTransaction: Send + Sized {
    async fn resolve_library(&mut self, library: &NewLibrary<'_>) -> Result<LibraryKey, PipelineError>;

    async fn resolve_access_point(
        &mut self,
        name: &str,
        library: LibraryKey,
    ) -> Result<AccessPointKey, PipelineError>;

    /// Insert or overwrite rows keyed on `(accesspoint_id, timestamp)`.
    async fn upsert_utilization(&mut self, rows: &[Utilization]) -> Result<u64, PipelineError>;

    async fn commit(self) -> Result<(), PipelineError>;
}
