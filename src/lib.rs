pub mod address;
pub mod arcgis;
pub mod config;
pub mod error;
pub mod kmz;
pub mod lotplan;
pub mod merge;
pub mod pipeline;
pub mod predicate;
pub mod resolver;

pub use error::{ParcelError, Result};
