use anyhow::Result;

use super::schema::Database;
use super::types::Blog;

const BLOG_COLUMNS: &str = "id, url, feed_url, title, category, approved, suspended, \
                            suspension_lifted_at, failing, legacy_handle";

impl Database {
    // ========================================================================
    // Blog Lifecycle
    // ========================================================================

    /// Register a new blog (unapproved until an admin approves it).
    /// Returns the new blog id; registering the same URL twice updates the
    /// feed URL and metadata instead of failing.
    pub async fn register_blog(
        &self,
        url: &str,
        feed_url: &str,
        title: Option<&str>,
        category: Option<&str>,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO blogs (url, feed_url, title, category)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                feed_url = excluded.feed_url,
                title = excluded.title,
                category = excluded.category
            RETURNING id
        "#,
        )
        .bind(url)
        .bind(feed_url)
        .bind(title)
        .bind(category)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Approve a blog, optionally updating its title from the discovered feed.
    pub async fn approve_blog(&self, blog_id: i64, title: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE blogs SET approved = 1, title = COALESCE(?, title) WHERE id = ?")
            .bind(title)
            .bind(blog_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn suspend_blog(&self, blog_id: i64) -> Result<()> {
        sqlx::query("UPDATE blogs SET suspended = 1 WHERE id = ?")
            .bind(blog_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Lift a suspension. The lift timestamp is recorded so that articles
    /// published during the suspension window stay excluded from ingestion.
    pub async fn unsuspend_blog(&self, blog_id: i64, now: i64) -> Result<()> {
        sqlx::query("UPDATE blogs SET suspended = 0, suspension_lifted_at = ? WHERE id = ?")
            .bind(now)
            .bind(blog_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Set or clear the failing flag. Idempotent: setting an already-set
    /// flag is not an error.
    pub async fn set_blog_failing(&self, blog_id: i64, failing: bool) -> Result<()> {
        sqlx::query("UPDATE blogs SET failing = ? WHERE id = ?")
            .bind(failing)
            .bind(blog_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_blog_legacy_handle(&self, blog_id: i64, handle: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE blogs SET legacy_handle = ? WHERE id = ?")
            .bind(handle)
            .bind(blog_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a blog; articles cascade.
    pub async fn delete_blog(&self, blog_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM blogs WHERE id = ?")
            .bind(blog_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Blog Queries
    // ========================================================================

    /// All blogs the recurring feed check should poll: approved and not
    /// currently suspended.
    pub async fn list_approved_unsuspended_blogs(&self) -> Result<Vec<Blog>> {
        let blogs = sqlx::query_as::<_, Blog>(&format!(
            "SELECT {BLOG_COLUMNS} FROM blogs WHERE approved = 1 AND suspended = 0 ORDER BY url"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(blogs)
    }

    pub async fn get_blog(&self, blog_id: i64) -> Result<Option<Blog>> {
        let blog =
            sqlx::query_as::<_, Blog>(&format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE id = ?"))
                .bind(blog_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(blog)
    }
}
