use std::{collections::BTreeMap, sync::Arc};

use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use wlan_client::{AccessPoint, AccessPointKey, Library, LibraryKey, NewLibrary, Utilization};

use crate::pipeline::{PipelineError, StoreTransaction, UtilizationStore};

/// Rows held by [`MemoryStore`], with the same uniqueness rules as the
/// relational schema.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    libraries: Vec<Library>,
    access_points: Vec<AccessPoint>,
    utilization: BTreeMap<(AccessPointKey, OffsetDateTime), i64>,
}

impl MemoryState {
    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn access_points(&self) -> &[AccessPoint] {
        &self.access_points
    }

    pub fn utilization_rows(&self) -> Vec<Utilization> {
        self.utilization
            .iter()
            .map(|((ap, ts), count)| Utilization {
                accesspoint_id: *ap,
                timestamp: *ts,
                user_count: *count,
            })
            .collect()
    }

    pub fn access_point(&self, name: &str) -> Option<&AccessPoint> {
        self.access_points.iter().find(|ap| ap.name == name)
    }

    /// `(timestamp, user_count)` pairs stored for the access point `name`.
    pub fn profile(&self, name: &str) -> Vec<(OffsetDateTime, i64)> {
        let Some(ap) = self.access_point(name) else {
            return Vec::new();
        };
        self.utilization
            .iter()
            .filter(|((key, _), _)| *key == ap.id)
            .map(|((_, ts), count)| (*ts, *count))
            .collect()
    }

    fn resolve_library(&mut self, library: &NewLibrary<'_>) -> LibraryKey {
        if let Some(existing) = self.libraries.iter().find(|l| l.bib == library.bib) {
            return existing.id;
        }
        let id = LibraryKey(self.libraries.len() as i64 + 1);
        self.libraries.push(Library {
            id,
            name: library.name.to_owned(),
            bib: library.bib.to_owned(),
            uni: library.uni.map(str::to_owned),
            location: library.location.map(str::to_owned),
        });
        id
    }

    fn resolve_access_point(&mut self, name: &str, library: LibraryKey) -> Result<AccessPointKey, PipelineError> {
        if let Some(existing) = self.access_point(name) {
            return Ok(existing.id);
        }
        if !self.libraries.iter().any(|l| l.id == library) {
            return Err(PipelineError::Store(format!("unknown library key {}", library.0)));
        }
        let id = AccessPointKey(self.access_points.len() as i64 + 1);
        self.access_points.push(AccessPoint {
            id,
            name: name.to_owned(),
            library_id: library,
        });
        Ok(id)
    }

    fn upsert(&mut self, row: &Utilization) -> Result<(), PipelineError> {
        if !self.access_points.iter().any(|ap| ap.id == row.accesspoint_id) {
            return Err(PipelineError::Store(format!(
                "unknown access point key {}",
                row.accesspoint_id.0
            )));
        }
        if row.user_count < 0 {
            return Err(PipelineError::Store("user_count must be non-negative".to_string()));
        }
        self.utilization
            .insert((row.accesspoint_id, row.timestamp), row.user_count);
        Ok(())
    }
}

/// In-process store used for dry runs and tests.
///
/// A transaction holds the store lock until it commits or is dropped, and
/// works on a staged copy, so uncommitted changes are never visible.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl UtilizationStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, PipelineError> {
        let committed = self.state.clone().lock_owned().await;
        let staged = committed.clone();
        Ok(MemoryTransaction { committed, staged })
    }
}

pub struct MemoryTransaction {
    committed: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait::async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn resolve_library(&mut self, library: &NewLibrary<'_>) -> Result<LibraryKey, PipelineError> {
        Ok(self.staged.resolve_library(library))
    }

    async fn resolve_access_point(
        &mut self,
        name: &str,
        library: LibraryKey,
    ) -> Result<AccessPointKey, PipelineError> {
        self.staged.resolve_access_point(name, library)
    }

    async fn upsert_utilization(&mut self, rows: &[Utilization]) -> Result<u64, PipelineError> {
        for row in rows {
            self.staged.upsert(row)?;
        }
        metrics::counter!("utilization_rows_upserted_total").increment(rows.len() as u64);
        Ok(rows.len() as u64)
    }

    async fn commit(self) -> Result<(), PipelineError> {
        let MemoryTransaction { mut committed, staged } = self;
        *committed = staged;
        Ok(())
    }
}
