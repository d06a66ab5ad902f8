pub mod db;
pub mod domain;

pub use domain::{AccessPoint, AccessPointKey, Library, LibraryKey, NewLibrary, Utilization};
