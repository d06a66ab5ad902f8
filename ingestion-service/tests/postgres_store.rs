//! Runs against a real Postgres when `TEST_DATABASE_URL` is set; otherwise
//! every test returns early.

use sqlx::postgres::{PgPool, PgPoolOptions};
use time::{macros::datetime, OffsetDateTime};
use wlan_client::{db, NewLibrary};
use wlan_ingestion_service::{
    config::GraphiteConfig,
    pipeline::{Crawler, Envelope, PipelineError, SeriesSource, StoreTransaction, UtilizationStore},
    sinks::PgUtilizationStore,
    sources::graphite::{decode_series, RawSeries, SeriesQuery},
    topology::{AccessPointRef, LibraryTopology, Room, Topology},
};

async fn pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new().max_connections(4).connect(&url).await.unwrap();
    db::create_schema(&pool).await.unwrap();
    Some(pool)
}

/// Unique suffix so repeated runs against one database do not collide.
fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", OffsetDateTime::now_utc().unix_timestamp_nanos())
}

struct OneTarget(Vec<RawSeries>);

#[async_trait::async_trait]
impl SeriesSource for OneTarget {
    async fn fetch(&self, _query: &SeriesQuery) -> Result<Envelope<Vec<RawSeries>>, PipelineError> {
        Ok(Envelope::now(self.0.clone()))
    }
}

#[tokio::test]
async fn example_crawl_is_idempotent_in_postgres() {
    let Some(pool) = pool().await else { return };
    let ap = unique("apa01-0mg");
    let body = format!(
        r#"[
            {{"target": "ap.{ap}.ssid.@A", "datapoints": [[2, 1000], [null, 1060]]}},
            {{"target": "ap.{ap}.ssid.@B", "datapoints": [[3, 1000]]}}
        ]"#
    );

    let mut lib = LibraryTopology::new("Universitätsbibliothek");
    lib.rooms.insert(
        "EG".to_string(),
        Room {
            name: "EG".to_string(),
            aps: vec![AccessPointRef {
                name: ap.clone(),
                url: String::new(),
            }],
        },
    );
    let mut topology = Topology::default();
    topology.insert(unique("bib1"), lib);

    let crawler = Crawler::new(
        OneTarget(decode_series(&body).unwrap()),
        PgUtilizationStore::new(pool.clone(), 1),
        &GraphiteConfig::default(),
    );

    for _ in 0..2 {
        let report = crawler.run(&topology).await;
        assert_eq!(report.committed(), 1);

        let mut conn = pool.acquire().await.unwrap();
        let profile = db::access_point_profile(&mut conn, &ap).await.unwrap();
        let samples: Vec<_> = profile.iter().map(|u| (u.timestamp, u.user_count)).collect();
        assert_eq!(
            samples,
            vec![
                (datetime!(1970-01-01 00:16:40 UTC), 5),
                (datetime!(1970-01-01 00:17:40 UTC), 0),
            ]
        );
    }
}

#[tokio::test]
async fn concurrent_resolutions_agree_on_one_key() {
    let Some(pool) = pool().await else { return };
    let store = PgUtilizationStore::new(pool.clone(), 100);
    let bib = unique("bib");
    let ap = unique("apx01-0mg");
    let new_library = NewLibrary {
        bib: &bib,
        name: "Stabi",
        uni: None,
        location: None,
    };

    let mut setup = store.begin().await.unwrap();
    let library = setup.resolve_library(&new_library).await.unwrap();
    assert_eq!(setup.resolve_library(&new_library).await.unwrap(), library);
    setup.commit().await.unwrap();

    let mut first = store.begin().await.unwrap();
    let second = store.begin().await.unwrap();
    let first_key = first.resolve_access_point(&ap, library).await.unwrap();

    // The second insert blocks on the first transaction's uncommitted row.
    let ap_name = ap.clone();
    let racing = tokio::spawn(async move {
        let mut second = second;
        let key = second.resolve_access_point(&ap_name, library).await.unwrap();
        second.commit().await.unwrap();
        key
    });
    first.commit().await.unwrap();

    assert_eq!(racing.await.unwrap(), first_key);
}
