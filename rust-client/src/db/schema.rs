use anyhow::Result;
use sqlx::PgPool;

const SCHEMA_SQL: &str = include_str!("../../sql/schema/01_wlan_utilization.sql");

/// Create the library, access point and utilization tables if they do not
/// exist yet. Safe to call on every startup.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::raw_sql(SCHEMA_SQL).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}
