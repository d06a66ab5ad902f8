//! Per-library crawl: resolve the library, fetch its series, aggregate, resolve
//! access points, upsert and commit.
//!
//! Each library runs in its own store transaction. Any error before the commit
//! drops the transaction (rolling it back) and the run moves on to the next
//! library.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    time::{Duration, Instant, SystemTime},
};

use tokio::time::MissedTickBehavior;

use crate::{
    config::GraphiteConfig,
    sources::graphite::{wildcard_targets, RawSeries, SeriesQuery},
    topology::{LibraryTopology, Topology},
    transform::aggregate,
};

use super::{PipelineError, SeriesSource, StoreTransaction, UtilizationStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Pending,
    LibraryResolved,
    Fetched,
    Aggregated,
    ApResolved,
    Written,
    Committed,
    Failed,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CrawlState::Pending => "pending",
            CrawlState::LibraryResolved => "library_resolved",
            CrawlState::Fetched => "fetched",
            CrawlState::Aggregated => "aggregated",
            CrawlState::ApResolved => "ap_resolved",
            CrawlState::Written => "written",
            CrawlState::Committed => "committed",
            CrawlState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryOutcome {
    pub library: String,
    pub state: CrawlState,
    /// Last state reached before failing.
    pub failed_at: Option<CrawlState>,
    pub error: Option<String>,
    pub fetch_errors: usize,
    pub series: usize,
    pub access_points: usize,
    pub rows_written: u64,
}

impl LibraryOutcome {
    fn new(library: &str) -> Self {
        Self {
            library: library.to_owned(),
            state: CrawlState::Pending,
            failed_at: None,
            error: None,
            fetch_errors: 0,
            series: 0,
            access_points: 0,
            rows_written: 0,
        }
    }

    fn fail(&mut self, error: &PipelineError) {
        self.failed_at = Some(self.state);
        self.state = CrawlState::Failed;
        self.error = Some(error.to_string());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub outcomes: Vec<LibraryOutcome>,
}

impl CrawlReport {
    pub fn committed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.state == CrawlState::Committed).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.state == CrawlState::Failed).count()
    }

    pub fn rows_written(&self) -> u64 {
        self.outcomes.iter().map(|o| o.rows_written).sum()
    }

    pub fn outcome(&self, library: &str) -> Option<&LibraryOutcome> {
        self.outcomes.iter().find(|o| o.library == library)
    }
}

/// Query window and target layout for one crawl.
#[derive(Debug, Clone)]
struct QueryPlan {
    from: String,
    until: Option<String>,
    target_prefix: String,
    ssid_pattern: String,
    max_targets_per_query: usize,
}

pub struct Crawler<S, K> {
    source: S,
    store: K,
    plan: QueryPlan,
}

impl<S, K> Crawler<S, K>
where
    S: SeriesSource,
    K: UtilizationStore,
{
    pub fn new(source: S, store: K, cfg: &GraphiteConfig) -> Self {
        Self {
            source,
            store,
            plan: QueryPlan {
                from: cfg.from.clone(),
                until: cfg.until.clone(),
                target_prefix: cfg.target_prefix.clone(),
                ssid_pattern: cfg.ssid_pattern.clone(),
                max_targets_per_query: cfg.max_targets_per_query,
            },
        }
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    /// Crawl every library in order. Failures stay local to their library.
    pub async fn run(&self, topology: &Topology) -> CrawlReport {
        let mut report = CrawlReport::default();
        for (key, library) in topology.libraries() {
            report.outcomes.push(self.crawl_library(key, library).await);
        }

        tracing::info!(
            libraries = report.outcomes.len(),
            committed = report.committed(),
            failed = report.failed(),
            rows_written = report.rows_written(),
            "crawl finished"
        );
        report
    }

    /// Crawl every `interval` until `shutdown` resolves and return the number of
    /// completed runs. A crawl still in progress at shutdown is abandoned; its
    /// open transaction is dropped and rolled back.
    pub async fn run_every<F>(&self, topology: &Topology, interval: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut runs = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => break,
            }
            tokio::select! {
                _ = self.run(topology) => runs += 1,
                _ = &mut shutdown => {
                    tracing::warn!("shutdown during crawl, current library rolled back");
                    break;
                }
            }
        }

        tracing::info!(runs, "shutdown requested");
        runs
    }

    pub async fn crawl_library(&self, key: &str, library: &LibraryTopology) -> LibraryOutcome {
        let started = Instant::now();
        let mut outcome = LibraryOutcome::new(key);

        if let Err(e) = self.advance(key, library, &mut outcome).await {
            tracing::error!(
                library = key,
                state = %outcome.state,
                error = %e,
                "library crawl failed, transaction rolled back"
            );
            outcome.fail(&e);
        }

        let label = if outcome.state == CrawlState::Committed { "committed" } else { "failed" };
        metrics::counter!("crawl_libraries_total", "outcome" => label).increment(1);
        metrics::histogram!("crawl_library_duration_seconds").record(started.elapsed().as_secs_f64());

        outcome
    }

    async fn advance(
        &self,
        key: &str,
        library: &LibraryTopology,
        outcome: &mut LibraryOutcome,
    ) -> Result<(), PipelineError> {
        let location = library.location();
        let new_library = library.new_library(key, location.as_deref())?;

        let mut tx = self.store.begin().await?;
        let library_key = tx.resolve_library(&new_library).await?;
        outcome.state = CrawlState::LibraryResolved;

        let (series, received_at) = self.fetch(key, library, outcome).await;
        outcome.series = series.len();
        outcome.state = CrawlState::Fetched;

        if series.is_empty() {
            tracing::info!(library = key, "no data fetched");
            tx.commit().await?;
            outcome.state = CrawlState::Committed;
            return Ok(());
        }

        let aggregation = aggregate(&series);
        outcome.state = CrawlState::Aggregated;
        if aggregation.skipped_series + aggregation.discarded_points + aggregation.invalid_values > 0 {
            tracing::warn!(
                library = key,
                skipped_series = aggregation.skipped_series,
                discarded_points = aggregation.discarded_points,
                invalid_values = aggregation.invalid_values,
                "aggregation dropped input"
            );
        }

        let mut keys = HashMap::new();
        for name in aggregation.buckets.access_points() {
            let ap_key = tx.resolve_access_point(name, library_key).await?;
            keys.insert(name.to_owned(), ap_key);
        }
        outcome.access_points = keys.len();
        outcome.state = CrawlState::ApResolved;

        let rows = aggregation.buckets.to_rows(&keys);
        tx.upsert_utilization(&rows).await?;
        outcome.state = CrawlState::Written;

        tx.commit().await?;
        outcome.rows_written = rows.len() as u64;
        outcome.state = CrawlState::Committed;

        if let Some(Ok(age)) = received_at.map(|at| SystemTime::now().duration_since(at)) {
            metrics::histogram!("crawl_fetch_to_commit_seconds").record(age.as_secs_f64());
        }

        tracing::info!(
            library = key,
            access_points = outcome.access_points,
            rows = outcome.rows_written,
            "library committed"
        );
        Ok(())
    }

    /// Fetch every target chunk for `library`, with the time the first chunk
    /// arrived. A failing chunk contributes no series; the others are still used.
    async fn fetch(
        &self,
        key: &str,
        library: &LibraryTopology,
        outcome: &mut LibraryOutcome,
    ) -> (Vec<RawSeries>, Option<SystemTime>) {
        let names = library.access_point_names();
        let targets = wildcard_targets(
            &self.plan.target_prefix,
            &names,
            &self.plan.ssid_pattern,
            self.plan.max_targets_per_query,
        );

        let mut series = Vec::new();
        let mut received_at = None;
        for target in targets {
            let query = SeriesQuery {
                from: self.plan.from.clone(),
                until: self.plan.until.clone(),
                target,
            };
            match self.source.fetch(&query).await {
                Ok(env) => {
                    received_at.get_or_insert(env.received_at);
                    series.extend(env.payload);
                }
                Err(e) => {
                    outcome.fetch_errors += 1;
                    metrics::counter!("graphite_fetch_errors_total").increment(1);
                    tracing::warn!(library = key, target_pattern = %query.target, error = %e, "fetch failed, treating as no data");
                }
            }
        }
        (series, received_at)
    }
}
