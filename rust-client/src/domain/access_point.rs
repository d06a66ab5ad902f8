use super::library::LibraryKey;

/// Surrogate key of an `accesspoint` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[sqlx(transparent)]
pub struct AccessPointKey(pub i64);

#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccessPoint {
    pub id: AccessPointKey,
    /// Globally unique; an access point belongs to one library for its lifetime.
    pub name: String,
    pub library_id: LibraryKey,
}
