use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name  TEXT NOT NULL,
    username   TEXT NOT NULL UNIQUE,
    email      TEXT NOT NULL UNIQUE,
    password   TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

/// Open the pool and make sure the `users` table exists.
pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    // in-memory databases are per connection
    let max = if url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new().max_connections(max).connect(url).await?;
    sqlx::query(SCHEMA).execute(&pool).await?;
    tracing::info!("database ready");
    Ok(pool)
}
