pub mod env;
pub mod otel;
