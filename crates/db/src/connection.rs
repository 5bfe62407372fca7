use std::time::Duration;

use libdesk_core::config::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect_from_config(database: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&database.url, database.max_connections, database.timeout_secs).await
}

/// Opens a pool whose connections all enforce foreign keys and wait on a
/// locked database instead of failing immediately.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = if is_in_memory(database_url) {
        // The database lives only as long as its connection: keep exactly one, never recycled.
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections.max(1))
    };

    options
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

pub async fn ping(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{connect_with_settings, is_in_memory, ping};
    use crate::migrations::run_pending;

    #[tokio::test]
    async fn connections_enforce_foreign_keys() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        let enabled: i64 =
            sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(&pool).await.expect("pragma");

        assert_eq!(enabled, 1);
        ping(&pool).await.expect("ping");
    }

    #[tokio::test]
    async fn in_memory_pool_is_pinned_to_one_connection() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory(":memory:"));
        assert!(is_in_memory("sqlite://library?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://library.db?mode=rwc"));

        let pool = connect_with_settings("sqlite::memory:", 5, 30).await.expect("connect");
        assert_eq!(pool.options().get_max_connections(), 1);

        run_pending(&pool).await.expect("run migrations");
        let books: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM books").fetch_one(&pool).await.expect("count");
        assert_eq!(books, 0);
    }

    #[tokio::test]
    async fn file_pool_keeps_configured_size() {
        let dir = TempDir::new().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("library.db").display());

        let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
        assert_eq!(pool.options().get_max_connections(), 4);
    }
}
