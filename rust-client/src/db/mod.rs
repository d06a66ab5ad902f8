pub mod dimensions;
pub mod schema;
pub mod utilization_queries;

pub use dimensions::{find_access_point_key, find_library_key, resolve_access_point, resolve_library};
pub use schema::create_schema;
pub use utilization_queries::{access_point_profile, upsert_utilization, MAX_UPSERT_BATCH};
