use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use crate::{config::DatabaseConfig, database::error::QueryError};

pub async fn connect(config: &DatabaseConfig) -> Result<Pool<Postgres>, QueryError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    log::info!(
        "connected to database ({} connections max)",
        config.max_connections
    );
    Ok(pool)
}

pub async fn migrate(pool: &Pool<Postgres>) -> Result<(), QueryError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| QueryError::from(sqlx::Error::from(e)))?;

    log::info!("database migrations applied");
    Ok(())
}
