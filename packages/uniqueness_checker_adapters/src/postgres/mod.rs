pub mod categorizer;
pub mod config;
pub mod errors;
pub mod pg;
mod pg_deploy;
mod utils;

pub use pg_deploy::{create_database, run_migration};
