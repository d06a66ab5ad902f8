pub mod access_point;
pub mod library;
pub mod utilization;

pub use access_point::{AccessPoint, AccessPointKey};
pub use library::{Library, LibraryKey, NewLibrary};
pub use utilization::Utilization;
