/// Surrogate key of a `library` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[sqlx(transparent)]
pub struct LibraryKey(pub i64);

#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Library {
    pub id: LibraryKey,
    pub name: String,
    /// Business identifier; unique across all libraries.
    pub bib: String,
    pub uni: Option<String>,
    pub location: Option<String>,
}

/// Fields needed to create a library on first sight. Never used to update.
#[derive(Debug, Clone, Copy)]
pub struct NewLibrary<'a> {
    pub bib: &'a str,
    pub name: &'a str,
    pub uni: Option<&'a str>,
    pub location: Option<&'a str>,
}
