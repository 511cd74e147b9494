use uniqueness_checker_adapters::{postgres::create_database, PgConfig};
use uniqueness_common_utils::otel::initialiser::init_otel_logs_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    init_otel_logs_tracing("pg_create_database".into(), false, None, "info")?;

    let pg_config = PgConfig::from_env();
    create_database(pg_config).await?;

    Ok(())
}
