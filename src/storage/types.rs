use sqlx::FromRow;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has the database locked
    #[error("Another instance of tidepool appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Channels
// ============================================================================

/// The two social channels an announcement can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Tweet,
    Toot,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Tweet => "tweet",
            ChannelKind::Toot => "toot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tweet" => Some(ChannelKind::Tweet),
            "toot" => Some(ChannelKind::Toot),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Blogs
// ============================================================================

/// A member blog as stored in the database.
///
/// `suspension_lifted_at` is stamped when a suspension is lifted; articles
/// published at or before that instant are permanently excluded from
/// ingestion even though the blog itself is active again.
#[derive(Debug, Clone, FromRow)]
pub struct Blog {
    pub id: i64,
    pub url: String,
    pub feed_url: String,
    pub title: Option<String>,
    pub category: Option<String>,
    pub approved: bool,
    pub suspended: bool,
    pub suspension_lifted_at: Option<i64>,
    pub failing: bool,
    /// Blog-level social handle predating per-user handles
    pub legacy_handle: Option<String>,
}

// ============================================================================
// Articles
// ============================================================================

/// Per-channel announcement state for one article: how many times it has
/// been queued on that channel, and when it was last queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub times: i64,
    pub last_sent: Option<i64>,
}

/// An ingested article.
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub blog_id: i64,
    pub guid: String,
    pub link: String,
    pub title: String,
    pub author: Option<String>,
    pub published: i64,
    /// Normalized lowercase tags
    pub tags: Vec<String>,
    pub tweeted: ChannelState,
    pub tooted: ChannelState,
    pub fetched_at: i64,
}

impl Article {
    pub fn channel_state(&self, kind: ChannelKind) -> ChannelState {
        match kind {
            ChannelKind::Tweet => self.tweeted,
            ChannelKind::Toot => self.tooted,
        }
    }
}

/// An article about to be inserted (no id or announcement state yet).
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub blog_id: i64,
    pub guid: String,
    pub link: String,
    pub title: String,
    pub author: Option<String>,
    pub published: i64,
    pub tags: Vec<String>,
}

/// Internal row type for article queries (used by sqlx FromRow).
/// Converts to Article via into_article(), parsing the JSON tag column.
#[derive(Debug, FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: i64,
    pub blog_id: i64,
    pub guid: String,
    pub link: String,
    pub title: String,
    pub author: Option<String>,
    pub published: i64,
    pub tags: String,
    pub tweet_times: i64,
    pub tweet_last_sent: Option<i64>,
    pub toot_times: i64,
    pub toot_last_sent: Option<i64>,
    pub fetched_at: i64,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        // A malformed tag column yields no tags rather than a failed query
        let tags: Vec<String> = serde_json::from_str(&self.tags).unwrap_or_default();
        Article {
            id: self.id,
            blog_id: self.blog_id,
            guid: self.guid,
            link: self.link,
            title: self.title,
            author: self.author,
            published: self.published,
            tags,
            tweeted: ChannelState {
                times: self.tweet_times,
                last_sent: self.tweet_last_sent,
            },
            tooted: ChannelState {
                times: self.toot_times,
                last_sent: self.toot_last_sent,
            },
            fetched_at: self.fetched_at,
        }
    }
}

// ============================================================================
// Announcements
// ============================================================================

/// An announcement about to be queued.
#[derive(Debug, Clone)]
pub struct NewAnnouncement {
    pub kind: ChannelKind,
    pub message: String,
    pub content_warning: Option<String>,
    pub scheduled: i64,
}

/// A queued announcement as returned by the atomic pop.
#[derive(Debug, Clone)]
pub struct QueuedAnnouncement {
    pub id: i64,
    pub kind: ChannelKind,
    pub message: String,
    pub content_warning: Option<String>,
    pub scheduled: i64,
}

// ============================================================================
// Subscribers
// ============================================================================

/// A user with a linked Pocket account, as seen by the fan-out.
#[derive(Debug, Clone, FromRow)]
pub struct Subscriber {
    pub user_id: i64,
    pub email: String,
    pub pocket_token: String,
}
