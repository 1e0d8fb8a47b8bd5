use anyhow::Result;

use super::schema::Database;
use super::types::{ChannelKind, Subscriber};

impl Database {
    // ========================================================================
    // Users & Ownership
    // ========================================================================

    /// Add a user, or update their handles if the email is already known.
    pub async fn upsert_user(
        &self,
        email: &str,
        twitter_handle: Option<&str>,
        mastodon_handle: Option<&str>,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO users (email, twitter_handle, mastodon_handle)
            VALUES (?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                twitter_handle = excluded.twitter_handle,
                mastodon_handle = excluded.mastodon_handle
            RETURNING id
        "#,
        )
        .bind(email)
        .bind(twitter_handle)
        .bind(mastodon_handle)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Record that a user owns a blog. Idempotent.
    pub async fn assign_blog_owner(&self, user_id: i64, blog_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO user_blogs (user_id, blog_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(blog_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The blog owner's handle for a channel, if the owning user has one.
    /// When a blog has several owners the earliest-registered one wins.
    pub async fn owner_handle(&self, blog_id: i64, kind: ChannelKind) -> Result<Option<String>> {
        let query = match kind {
            ChannelKind::Tweet => {
                "SELECT u.twitter_handle FROM users u \
                 JOIN user_blogs ub ON ub.user_id = u.id \
                 WHERE ub.blog_id = ? AND u.twitter_handle IS NOT NULL \
                 ORDER BY u.id LIMIT 1"
            }
            ChannelKind::Toot => {
                "SELECT u.mastodon_handle FROM users u \
                 JOIN user_blogs ub ON ub.user_id = u.id \
                 WHERE ub.blog_id = ? AND u.mastodon_handle IS NOT NULL \
                 ORDER BY u.id LIMIT 1"
            }
        };

        let row: Option<(String,)> = sqlx::query_as(query)
            .bind(blog_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(handle,)| handle))
    }

    // ========================================================================
    // Pocket Subscriptions
    // ========================================================================

    /// Link a Pocket account to a user.
    pub async fn link_pocket(&self, email: &str, username: &str, token: &str) -> Result<()> {
        sqlx::query("UPDATE users SET pocket_username = ?, pocket_token = ? WHERE email = ?")
            .bind(username)
            .bind(token)
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove a user's Pocket credentials. Called automatically when the
    /// save API reports the token as revoked. Idempotent.
    pub async fn unlink_pocket(&self, email: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET pocket_username = NULL, pocket_token = NULL WHERE email = ?",
        )
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Let a subscriber opt out of one blog's articles.
    pub async fn exclude_blog_from_pocket(&self, user_id: i64, blog_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO pocket_exclusions (user_id, blog_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(blog_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All users with a linked Pocket account who have not excluded the
    /// given blog.
    pub async fn pocket_subscribers(&self, excluding_blog: i64) -> Result<Vec<Subscriber>> {
        let subscribers = sqlx::query_as::<_, Subscriber>(
            r#"
            SELECT id AS user_id, email, pocket_token
            FROM users
            WHERE pocket_token IS NOT NULL
              AND id NOT IN (
                  SELECT user_id FROM pocket_exclusions WHERE blog_id = ?
              )
            ORDER BY id
        "#,
        )
        .bind(excluding_blog)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscribers)
    }
}
