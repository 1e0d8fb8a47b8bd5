//! The recurring feed-check pipeline.
//!
//! One tick fetches every approved, unsuspended blog concurrently, filters
//! each fetched item, inserts what is new, queues announcements for recent
//! articles, and fans them out to Pocket. Every failure is handled at the
//! blog or item granularity, so nothing here ever aborts the batch.

use crate::announce::{
    compose_article_announcements, compose_blog_announcements, ResolvedAuthors,
};
use crate::config::Config;
use crate::feed::{fetch_feed, RawItem};
use crate::pocket::{self, PocketClient};
use crate::storage::{Article, Blog, ChannelKind, Database, NewArticle};
use futures::stream::{self, StreamExt};
use std::time::Duration;

/// Upper bound on concurrent feed fetches within one tick.
const MAX_CONCURRENT_FETCHES: usize = 10;

/// Why the ingestion filter rejected an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// New enough, allowed, not filtered: ingest it
    Ingest,
    /// Carries a tag from the exclusion list
    ExcludedTag,
    /// Published during a (since lifted) suspension window
    SuspensionWindow,
    /// An inclusion list is configured and none of the item's tags match
    NotIncluded,
}

/// Apply the tag and suspension rules to one item. `tags` must already be
/// lowercased. Existence checking is separate because it needs the store.
pub fn filter_item(tags: &[String], published: i64, blog: &Blog, config: &Config) -> FilterVerdict {
    if tags
        .iter()
        .any(|tag| config.excluded_tags.iter().any(|ex| ex == tag))
    {
        return FilterVerdict::ExcludedTag;
    }

    // A post published during a suspension stays excluded after the
    // suspension is lifted.
    if let Some(lifted_at) = blog.suspension_lifted_at {
        if published <= lifted_at {
            return FilterVerdict::SuspensionWindow;
        }
    }

    if !config.included_tags.is_empty()
        && !tags
            .iter()
            .any(|tag| config.included_tags.iter().any(|inc| inc == tag))
    {
        return FilterVerdict::NotIncluded;
    }

    FilterVerdict::Ingest
}

/// True when the publish time falls within the announce/fan-out window.
pub fn within_recency_cutoff(published: i64, now: i64, cutoff_hours: i64) -> bool {
    now - published <= cutoff_hours * 3600
}

/// One feed-check tick over every approved, unsuspended blog.
pub async fn check_feeds(
    db: &Database,
    client: &reqwest::Client,
    config: &Config,
    pocket: Option<&PocketClient>,
) {
    let blogs = match db.list_approved_unsuspended_blogs().await {
        Ok(blogs) => blogs,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list blogs for the feed check");
            return;
        }
    };

    if blogs.is_empty() {
        tracing::debug!("No approved blogs to check");
        return;
    }

    tracing::info!(blogs = blogs.len(), "Checking feeds");

    stream::iter(blogs)
        .map(|blog| {
            let db = db.clone();
            async move { process_blog(&db, client, config, pocket, blog).await }
        })
        .buffer_unordered(MAX_CONCURRENT_FETCHES)
        .collect::<Vec<()>>()
        .await;

    // Articles still inside the recency window may be due for a repeat
    // announcement under the per-channel hours-between policy.
    reannounce_recent_articles(db, config).await;
}

/// Fetch one blog's feed and run every item through the filter. A fetch
/// failure flags the blog and ends its turn; a fetch success clears the
/// flag, even when the feed is empty.
async fn process_blog(
    db: &Database,
    client: &reqwest::Client,
    config: &Config,
    pocket: Option<&PocketClient>,
    blog: Blog,
) {
    let timeout = Duration::from_secs(config.feed_fetch_timeout_secs);

    let items = match fetch_feed(client, &blog.feed_url, timeout).await {
        Ok(items) => {
            if blog.failing {
                if let Err(e) = db.set_blog_failing(blog.id, false).await {
                    tracing::warn!(blog = %blog.url, error = %e, "Failed to clear failing flag");
                }
            }
            items
        }
        Err(e) => {
            tracing::warn!(blog = %blog.url, error = %e, "Feed fetch failed, marking blog failing");
            if let Err(e) = db.set_blog_failing(blog.id, true).await {
                tracing::warn!(blog = %blog.url, error = %e, "Failed to set failing flag");
            }
            return;
        }
    };

    for item in items {
        if let Err(e) = process_item(db, config, pocket, &blog, item).await {
            tracing::warn!(blog = %blog.url, error = %e, "Failed to process feed item");
        }
    }
}

/// Filter, dedupe, insert, announce, fan out: one fetched item.
async fn process_item(
    db: &Database,
    config: &Config,
    pocket: Option<&PocketClient>,
    blog: &Blog,
    item: RawItem,
) -> anyhow::Result<()> {
    let tags: Vec<String> = item.tags.iter().map(|t| t.to_lowercase()).collect();

    match filter_item(&tags, item.published, blog, config) {
        FilterVerdict::Ingest => {}
        verdict => {
            tracing::debug!(blog = %blog.url, link = %item.link, ?verdict, "Item filtered out");
            return Ok(());
        }
    }

    // Idempotence under re-fetch: the same logical post never inserts twice,
    // even if the feed changed its URL parameters or regenerated the guid.
    if db.article_exists(&item.link, &item.guid).await? {
        return Ok(());
    }

    let article = db
        .insert_article(&NewArticle {
            blog_id: blog.id,
            guid: item.guid,
            link: item.link,
            title: item.title,
            author: item.author,
            published: item.published,
            tags,
        })
        .await?;

    tracing::info!(blog = %blog.url, title = %article.title, "Ingested new article");

    let now = chrono::Utc::now().timestamp();
    if !within_recency_cutoff(article.published, now, config.announce_recency_cutoff_hours) {
        // Old posts enter the hub silently: backfills and migrated archives
        // must not flood the channels.
        return Ok(());
    }

    let queued = announce_article(db, config, blog, &article, now).await?;

    if queued {
        if let Some(pocket) = pocket {
            pocket::fan_out(db, pocket, blog.id, &article.link).await;
        }
    }

    Ok(())
}

/// Compose and queue announcements for an article, reserving the
/// per-channel slots in the same transaction. Returns whether anything was
/// queued.
async fn announce_article(
    db: &Database,
    config: &Config,
    blog: &Blog,
    article: &Article,
    now: i64,
) -> anyhow::Result<bool> {
    let authors = resolve_authors(db, blog, article.author.as_deref()).await?;
    let announcements = compose_article_announcements(article, &authors, config, now);
    if announcements.is_empty() {
        return Ok(false);
    }

    db.enqueue_article_announcements(article.id, &announcements, now)
        .await?;

    tracing::info!(
        title = %article.title,
        count = announcements.len(),
        "Queued article announcements"
    );
    Ok(true)
}

/// Sweep articles inside the recency window for channels that are due a
/// repeat announcement.
async fn reannounce_recent_articles(db: &Database, config: &Config) {
    let now = chrono::Utc::now().timestamp();
    let cutoff = now - config.announce_recency_cutoff_hours * 3600;

    let articles = match db.list_articles_published_since(cutoff).await {
        Ok(articles) => articles,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list recent articles for re-announcement");
            return;
        }
    };

    for article in articles {
        let blog = match db.get_blog(article.blog_id).await {
            Ok(Some(blog)) if blog.approved && !blog.suspended => blog,
            Ok(_) => continue, // deleted, unapproved, or suspended since ingestion
            Err(e) => {
                tracing::warn!(article = article.id, error = %e, "Failed to load blog for re-announcement");
                continue;
            }
        };

        if let Err(e) = announce_article(db, config, &blog, &article, now).await {
            tracing::warn!(article = article.id, error = %e, "Failed to queue repeat announcement");
        }
    }
}

/// Resolve the display handle for each channel: blog owner's handle, then
/// the blog-level legacy handle, then the feed item's author field.
pub async fn resolve_authors(
    db: &Database,
    blog: &Blog,
    raw_author: Option<&str>,
) -> anyhow::Result<ResolvedAuthors> {
    Ok(ResolvedAuthors {
        tweet: resolve_author(db, blog, raw_author, ChannelKind::Tweet).await?,
        toot: resolve_author(db, blog, raw_author, ChannelKind::Toot).await?,
    })
}

async fn resolve_author(
    db: &Database,
    blog: &Blog,
    raw_author: Option<&str>,
    kind: ChannelKind,
) -> anyhow::Result<Option<String>> {
    if let Some(handle) = db.owner_handle(blog.id, kind).await? {
        return Ok(Some(handle));
    }
    Ok(blog
        .legacy_handle
        .clone()
        .or_else(|| raw_author.map(str::to_owned)))
}

/// Queue the one-off registration announcements for a freshly approved
/// blog. Called by the approval flow, not by the recurring pipeline.
pub async fn announce_new_blog(db: &Database, config: &Config, blog_id: i64) -> anyhow::Result<()> {
    let Some(blog) = db.get_blog(blog_id).await? else {
        anyhow::bail!("blog {blog_id} not found");
    };

    let authors = resolve_authors(db, &blog, None).await?;
    let now = chrono::Utc::now().timestamp();
    let announcements = compose_blog_announcements(&blog, &authors, config, now);
    if announcements.is_empty() {
        return Ok(());
    }

    db.enqueue_announcements(&announcements).await?;
    tracing::info!(blog = %blog.url, count = announcements.len(), "Queued registration announcements");
    Ok(())
}
