use time::OffsetDateTime;

use super::access_point::AccessPointKey;

/// One fact row, unique on `(accesspoint_id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Utilization {
    pub accesspoint_id: AccessPointKey,
    pub timestamp: OffsetDateTime,
    pub user_count: i64,
}
