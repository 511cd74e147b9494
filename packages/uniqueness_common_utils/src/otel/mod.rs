pub mod initialiser;
pub mod metric_constants;
