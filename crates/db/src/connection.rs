use std::time::Duration;

use relay_core::config::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

/// Opens the SQLite pool described by `database`. Foreign keys and WAL are
/// non-negotiable; the busy timeout is an operator knob because writer
/// contention varies by deployment.
pub async fn connect(database: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let busy_timeout_ms = database.busy_timeout_ms.max(1);
    SqlitePoolOptions::new()
        .max_connections(database.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(database.timeout_secs.max(1)))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&database.url)
        .await
}

/// Single-connection pool over a shared-cache in-memory database. Tests use
/// this so reads observe writes from the same logical database without a
/// file on disk.
pub fn ephemeral_config() -> DatabaseConfig {
    DatabaseConfig {
        url: "sqlite::memory:?cache=shared".to_string(),
        max_connections: 1,
        timeout_secs: 5,
        ..DatabaseConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use relay_core::config::DatabaseConfig;

    use super::{connect, ephemeral_config};

    #[tokio::test]
    async fn busy_timeout_pragma_follows_config() {
        let config = DatabaseConfig { busy_timeout_ms: 1_234, ..ephemeral_config() };
        let pool = connect(&config).await.expect("pool should connect");

        let (busy_timeout,): (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .expect("pragma should be queryable");
        assert_eq!(busy_timeout, 1_234);

        pool.close().await;
    }

    #[tokio::test]
    async fn foreign_keys_are_always_enforced() {
        let pool = connect(&ephemeral_config()).await.expect("pool should connect");

        let (foreign_keys,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("pragma should be queryable");
        assert_eq!(foreign_keys, 1);

        pool.close().await;
    }
}
