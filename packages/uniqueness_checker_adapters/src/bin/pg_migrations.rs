use uniqueness_checker_adapters::{postgres::run_migration, PgConfig};
use uniqueness_common_utils::otel::initialiser::init_otel_logs_tracing;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    init_otel_logs_tracing("pg_migrations".into(), false, None, "info")?;

    let pg_config = PgConfig::from_env();

    run_migration(pg_config, embedded::migrations::runner()).await
}
