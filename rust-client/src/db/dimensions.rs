//! Insert-if-absent resolution of dimension rows.
//!
//! Each resolver attempts the insert first inside a savepoint and only reads
//! the existing row after the store reports a uniqueness violation. Reading
//! first and inserting afterwards would race with a concurrent writer; the
//! unique constraint is what makes two resolutions agree on one key.

use sqlx::{Connection, PgConnection};

use crate::domain::{AccessPointKey, LibraryKey, NewLibrary};

/// Return the key of the library with `library.bib`, creating the row on first
/// sight. An existing row is never updated.
pub async fn resolve_library(
    conn: &mut PgConnection,
    library: &NewLibrary<'_>,
) -> Result<LibraryKey, sqlx::Error> {
    let mut savepoint = conn.begin().await?;
    let inserted = sqlx::query_scalar::<_, LibraryKey>(
        r#"
        INSERT INTO library (name, bib, uni, location)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(library.name)
    .bind(library.bib)
    .bind(library.uni)
    .bind(library.location)
    .fetch_one(&mut *savepoint)
    .await;

    match inserted {
        Ok(key) => {
            savepoint.commit().await?;
            Ok(key)
        }
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            savepoint.rollback().await?;
            find_library_key(conn, library.bib).await
        }
        Err(e) => Err(e),
    }
}

/// Return the key of the access point called `name`, creating it under
/// `library` on first sight.
///
/// When the name already exists the stored key is returned as-is, even if it
/// belongs to a different library than `library`.
pub async fn resolve_access_point(
    conn: &mut PgConnection,
    name: &str,
    library: LibraryKey,
) -> Result<AccessPointKey, sqlx::Error> {
    let mut savepoint = conn.begin().await?;
    let inserted = sqlx::query_scalar::<_, AccessPointKey>(
        r#"
        INSERT INTO accesspoint (name, library_id)
        VALUES ($1, $2)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(library)
    .fetch_one(&mut *savepoint)
    .await;

    match inserted {
        Ok(key) => {
            savepoint.commit().await?;
            Ok(key)
        }
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            savepoint.rollback().await?;
            find_access_point_key(conn, name).await
        }
        Err(e) => Err(e),
    }
}

pub async fn find_library_key(conn: &mut PgConnection, bib: &str) -> Result<LibraryKey, sqlx::Error> {
    sqlx::query_scalar::<_, LibraryKey>("SELECT id FROM library WHERE bib = $1")
        .bind(bib)
        .fetch_one(conn)
        .await
}

pub async fn find_access_point_key(
    conn: &mut PgConnection,
    name: &str,
) -> Result<AccessPointKey, sqlx::Error> {
    sqlx::query_scalar::<_, AccessPointKey>("SELECT id FROM accesspoint WHERE name = $1")
        .bind(name)
        .fetch_one(conn)
        .await
}
