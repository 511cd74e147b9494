// postgres exports
pub mod postgres;
pub use postgres::config::PgConfig;
pub use postgres::errors::PgError;
pub use postgres::pg::PgBackingStore;
