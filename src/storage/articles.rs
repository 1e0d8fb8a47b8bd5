use anyhow::Result;

use super::schema::Database;
use super::types::{Article, ArticleDbRow, ChannelState, NewArticle};

const ARTICLE_COLUMNS: &str = "id, blog_id, guid, link, title, author, published, tags, \
                               tweet_times, tweet_last_sent, toot_times, toot_last_sent, \
                               fetched_at";

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Check whether an article with this link OR guid has already been
    /// ingested. Feeds sometimes re-serve a post with a changed URL parameter
    /// or a regenerated guid; matching on either field keeps the store free
    /// of duplicates for the same logical post.
    pub async fn article_exists(&self, link: &str, guid: &str) -> Result<bool> {
        let row: (i64,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM articles WHERE link = ? OR guid = ?)")
                .bind(link)
                .bind(guid)
                .fetch_one(&self.pool)
                .await?;

        Ok(row.0 != 0)
    }

    /// Insert a new article with zeroed announcement counters and return it
    /// with its assigned id.
    pub async fn insert_article(&self, article: &NewArticle) -> Result<Article> {
        let now = chrono::Utc::now().timestamp();
        let tags_json = serde_json::to_string(&article.tags)?;

        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO articles (blog_id, guid, link, title, author, published, tags, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(article.blog_id)
        .bind(&article.guid)
        .bind(&article.link)
        .bind(&article.title)
        .bind(&article.author)
        .bind(article.published)
        .bind(&tags_json)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Article {
            id: row.0,
            blog_id: article.blog_id,
            guid: article.guid.clone(),
            link: article.link.clone(),
            title: article.title.clone(),
            author: article.author.clone(),
            published: article.published,
            tags: article.tags.clone(),
            tweeted: ChannelState::default(),
            tooted: ChannelState::default(),
            fetched_at: now,
        })
    }

    pub async fn get_article(&self, article_id: i64) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"
        ))
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ArticleDbRow::into_article))
    }

    /// Articles published at or after the cutoff, oldest first. This is
    /// the re-announcement sweep's working set.
    pub async fn list_articles_published_since(&self, cutoff: i64) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE published >= ? ORDER BY published ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }

    /// All articles for a blog, newest first.
    pub async fn get_articles_for_blog(&self, blog_id: i64) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE blog_id = ? ORDER BY published DESC"
        ))
        .bind(blog_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }
}
