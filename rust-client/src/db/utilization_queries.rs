use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::domain::Utilization;

/// Upper bound on rows per upsert statement. Each row binds three parameters
/// and Postgres accepts at most 65535 per statement.
pub const MAX_UPSERT_BATCH: usize = 10_000;

/// Build one multi-row upsert keyed on `(accesspoint_id, timestamp)`.
///
/// `rows` must not repeat a key; Postgres refuses to update the same row twice
/// in one statement.
pub fn build_upsert(rows: &[Utilization]) -> QueryBuilder<'static, Postgres> {
    let mut builder =
        QueryBuilder::<Postgres>::new("INSERT INTO utilization (accesspoint_id, timestamp, user_count) ");

    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.accesspoint_id)
            .push_bind(row.timestamp)
            .push_bind(row.user_count);
    });
    builder.push(
        " ON CONFLICT (accesspoint_id, timestamp) DO UPDATE SET user_count = EXCLUDED.user_count",
    );

    builder
}

/// Upsert `rows`, overwriting `user_count` for keys that already exist.
/// Returns the number of rows inserted or updated.
pub async fn upsert_utilization(conn: &mut PgConnection, rows: &[Utilization]) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut affected = 0;
    for chunk in rows.chunks(MAX_UPSERT_BATCH) {
        let mut builder = build_upsert(chunk);
        affected += builder.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(affected)
}

/// Time-ordered samples stored for one access point.
pub async fn access_point_profile(conn: &mut PgConnection, name: &str) -> Result<Vec<Utilization>, sqlx::Error> {
    sqlx::query_as::<_, Utilization>(
        r#"
        SELECT u.accesspoint_id, u.timestamp, u.user_count
        FROM utilization u
        JOIN accesspoint ap ON ap.id = u.accesspoint_id
        WHERE ap.name = $1
        ORDER BY u.timestamp
        "#,
    )
    .bind(name)
    .fetch_all(conn)
    .await
}
