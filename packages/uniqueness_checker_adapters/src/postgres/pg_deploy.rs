use refinery::Runner;
use tokio_postgres::{error::SqlState, tls::NoTlsStream, Client, Connection, Socket};
use tracing::{error, info};

use crate::PgConfig;

/// Connect to postgres using the connection string provided
async fn pg_connect(connection_string: String) -> Result<(Client, Connection<Socket, NoTlsStream>), tokio_postgres::Error> {
    let connection = tokio_postgres::connect(connection_string.as_str(), tokio_postgres::NoTls).await?;
    Ok(connection)
}

/// Drive the connection in the background until the client is dropped.
fn spawn_connection(connection: Connection<Socket, NoTlsStream>) {
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("connection error: {}", e);
        }
    });
}

/// Create database
async fn create_db(client: &Client, database: &str) -> Result<(), tokio_postgres::Error> {
    let create_db_ddl = format!("CREATE DATABASE \"{}\" ", database.replace('"', "\"\""));
    client.execute(&create_db_ddl, &[]).await?;

    Ok(())
}

/// Create the configured database unless it already exists.
pub async fn create_database(pg_config: PgConfig) -> Result<(), tokio_postgres::Error> {
    info!("Establishing connection to {}", pg_config.get_public_connection_string());
    match pg_connect(pg_config.get_database_connection_string()).await {
        Ok((_, connection)) => {
            drop(connection);
            info!("Database {} already exists", pg_config.database);
        }
        //Create database if connection to database failed as the database doesn't exist.
        Err(error) if error.code() == Some(&SqlState::UNDEFINED_DATABASE) => {
            info!("Database {} not found, creating one", pg_config.database);

            let (client, connection) = pg_connect(pg_config.get_base_connection_string()).await?;
            spawn_connection(connection);

            create_db(&client, &pg_config.database).await?;
        }
        Err(error) => {
            error!("Unable to connect to {}: {:?}", pg_config.database, error.code());
            return Err(error);
        }
    };

    info!("Completed all operations");

    Ok(())
}

/// Apply the embedded `uniqueness_*` table migrations.
pub async fn run_migration(pg_config: PgConfig, runner: Runner) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    info!("Running DB migrations on {}", pg_config.get_public_connection_string());
    let (mut client, connection) = pg_connect(pg_config.get_database_connection_string()).await?;
    spawn_connection(connection);

    let migration_report = runner.run_async(&mut client).await?;
    for migration in migration_report.applied_migrations() {
        info!("Migration Applied -  Name: {}, Version: {}", migration.name(), migration.version());
    }
    info!("DB migrations finished!");

    Ok(())
}
