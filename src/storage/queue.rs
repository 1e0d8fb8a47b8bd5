use anyhow::Result;

use super::schema::Database;
use super::types::{ChannelKind, NewAnnouncement, QueuedAnnouncement};

/// Row type for the pop query (kind comes back as TEXT)
type AnnouncementRow = (i64, String, String, Option<String>, i64);

impl Database {
    // ========================================================================
    // Announcement Queue
    // ========================================================================

    /// Queue announcements that are not tied to an article (blog-registration
    /// announcements).
    pub async fn enqueue_announcements(&self, announcements: &[NewAnnouncement]) -> Result<()> {
        if announcements.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for a in announcements {
            sqlx::query(
                "INSERT INTO announcements (kind, message, content_warning, scheduled) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(a.kind.as_str())
            .bind(&a.message)
            .bind(&a.content_warning)
            .bind(a.scheduled)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// Queue announcements for an article and bump that article's per-channel
    /// counters in the same transaction.
    ///
    /// Incrementing at enqueue time rather than at dispatch time reserves the
    /// announcement slot: a burst of feed-check ticks before the dispatcher
    /// drains the queue cannot queue the same article twice.
    pub async fn enqueue_article_announcements(
        &self,
        article_id: i64,
        announcements: &[NewAnnouncement],
        now: i64,
    ) -> Result<()> {
        if announcements.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for a in announcements {
            sqlx::query(
                "INSERT INTO announcements (kind, message, content_warning, scheduled) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(a.kind.as_str())
            .bind(&a.message)
            .bind(&a.content_warning)
            .bind(a.scheduled)
            .execute(&mut *tx)
            .await?;

            let update = match a.kind {
                ChannelKind::Tweet => {
                    "UPDATE articles SET tweet_times = tweet_times + 1, tweet_last_sent = ? \
                     WHERE id = ?"
                }
                ChannelKind::Toot => {
                    "UPDATE articles SET toot_times = toot_times + 1, toot_last_sent = ? \
                     WHERE id = ?"
                }
            };
            sqlx::query(update)
                .bind(now)
                .bind(article_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// Atomically pop the announcement with the soonest scheduled time.
    ///
    /// The delete and the read are a single statement, so a crash between
    /// "pop" and "send" can lose one send but can never hand the same
    /// announcement to two dispatch ticks.
    pub async fn pop_next_announcement(&self) -> Result<Option<QueuedAnnouncement>> {
        let row: Option<AnnouncementRow> = sqlx::query_as(
            r#"
            DELETE FROM announcements
            WHERE id = (
                SELECT id FROM announcements
                ORDER BY scheduled ASC, id ASC
                LIMIT 1
            )
            RETURNING id, kind, message, content_warning, scheduled
        "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, kind, message, content_warning, scheduled)) = row else {
            return Ok(None);
        };

        // The CHECK constraint on the kind column makes this infallible in
        // practice; an unknown value would mean schema corruption.
        let kind = ChannelKind::parse(&kind)
            .ok_or_else(|| anyhow::anyhow!("unknown announcement kind in queue: {kind}"))?;

        Ok(Some(QueuedAnnouncement {
            id,
            kind,
            message,
            content_warning,
            scheduled,
        }))
    }

    /// Number of pending announcements.
    pub async fn announcement_queue_len(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM announcements")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }
}
