pub mod checker;
pub mod config;
pub mod core;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod ports;
pub mod uniqueness_checker;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::UniquenessCheckerConfig;
pub use uniqueness_checker::{UniquenessChecker, UniquenessCheckResponses};
