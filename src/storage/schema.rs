use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Migration` or `DatabaseError::Other` for
    /// other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // The database holds subscriber Pocket tokens: pre-create the file
        // with user-only permissions so there is no window where it exists
        // with default umask permissions.
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::PermissionsExt;
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if let Some(parent) = db_path.parent() {
                if parent.exists() {
                    use std::os::unix::fs::OpenOptionsExt;
                    let _file = std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600)
                        .open(db_path)
                        .ok(); // If creation fails, SQLite reports the error at connect_with.
                }
            }
        }

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. Handles transient contention between
        // the feed-check and dispatch timers automatically. Using pragma()
        // ensures all connections in the pool inherit the setting.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; 5 connections covers the concurrent blog
        // fetches plus the dispatch tick.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All schema changes are wrapped in a single transaction: if any step
    /// fails the database is left in its previous consistent state. All
    /// statements use `IF NOT EXISTS` so re-running on an existing database
    /// is a no-op.
    async fn migrate(&self) -> Result<()> {
        // Enable foreign keys (per-connection setting, outside the transaction)
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blogs (
                id INTEGER PRIMARY KEY,
                url TEXT UNIQUE NOT NULL,
                feed_url TEXT NOT NULL,
                title TEXT,
                category TEXT,
                approved INTEGER NOT NULL DEFAULT 0,
                suspended INTEGER NOT NULL DEFAULT 0,
                suspension_lifted_at INTEGER,
                failing INTEGER NOT NULL DEFAULT 0,
                legacy_handle TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                twitter_handle TEXT,
                mastodon_handle TEXT,
                pocket_username TEXT,
                pocket_token TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_blogs (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                blog_id INTEGER NOT NULL REFERENCES blogs(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, blog_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pocket_exclusions (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                blog_id INTEGER NOT NULL REFERENCES blogs(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, blog_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // An article is logically unique by (guid OR link); that cross-column
        // rule cannot be a UNIQUE constraint, so ingestion enforces it via
        // the existence check and these two indexes keep that check fast.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                blog_id INTEGER NOT NULL REFERENCES blogs(id) ON DELETE CASCADE,
                guid TEXT NOT NULL,
                link TEXT NOT NULL,
                title TEXT NOT NULL,
                author TEXT,
                published INTEGER NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                tweet_times INTEGER NOT NULL DEFAULT 0,
                tweet_last_sent INTEGER,
                toot_times INTEGER NOT NULL DEFAULT 0,
                toot_last_sent INTEGER,
                fetched_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_guid ON articles(guid)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_link ON articles(link)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_blog ON articles(blog_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published DESC)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS announcements (
                id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL CHECK (kind IN ('tweet', 'toot')),
                message TEXT NOT NULL,
                content_warning TEXT,
                scheduled INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_announcements_scheduled ON announcements(scheduled)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
