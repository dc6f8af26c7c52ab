use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Configure SQLite pragmas for every new connection.
async fn configure_sqlite_pragmas(conn: &mut sqlx::SqliteConnection) -> Result<(), sqlx::Error> {
    use sqlx::Executor;

    // WAL lets readers proceed while an audit writes
    conn.execute("PRAGMA journal_mode = WAL").await?;
    conn.execute("PRAGMA synchronous = NORMAL").await?;
    conn.execute("PRAGMA busy_timeout = 5000").await?;
    conn.execute("PRAGMA temp_store = MEMORY").await?;
    conn.execute("PRAGMA foreign_keys = ON").await?;

    Ok(())
}

/// Open (creating if needed) the database at `database_url` and run migrations.
pub async fn init_db(database_url: &str) -> Result<SqlitePool> {
    tracing::info!("Database URL: {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url {}", database_url))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                configure_sqlite_pragmas(conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
        .with_context(|| format!("failed to connect to database at {}", database_url))?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    tracing::info!("Database initialized at {}", database_url);
    Ok(pool)
}
