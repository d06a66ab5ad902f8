pub mod graphite;

pub use graphite::{GraphiteSource, RawSeries, SeriesQuery};
