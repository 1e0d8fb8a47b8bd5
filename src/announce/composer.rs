use crate::config::{ChannelConfig, Config};
use crate::storage::{Article, Blog, ChannelKind, ChannelState, NewAnnouncement};
use crate::util::{contains_word, truncate_chars};

/// Title length caps before the ellipsis is applied.
const TWEET_TITLE_MAX: usize = 150;
const TOOT_TITLE_MAX: usize = 300;

/// The handle (or raw author) to display per channel, resolved by the
/// caller in preference order: blog owner's channel handle, then the
/// blog-level legacy handle, then the feed item's author field.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAuthors {
    pub tweet: Option<String>,
    pub toot: Option<String>,
}

impl ResolvedAuthors {
    fn for_channel(&self, kind: ChannelKind) -> Option<&str> {
        match kind {
            ChannelKind::Tweet => self.tweet.as_deref(),
            ChannelKind::Toot => self.toot.as_deref(),
        }
        .filter(|a| !a.is_empty())
    }
}

/// Whether an article is due for (another) announcement on a channel.
///
/// True when the channel is enabled AND the article has never been sent
/// there, or enough hours have passed since the last send and the send
/// count is still under the per-article cap.
pub fn needs_announcing(state: ChannelState, policy: &ChannelConfig, now: i64) -> bool {
    if !policy.enabled {
        return false;
    }
    if state.times == 0 {
        return true;
    }
    if state.times >= policy.max_per_article {
        return false;
    }
    match state.last_sent {
        Some(last) => now - last >= policy.hours_between * 3600,
        None => true,
    }
}

/// Compose zero, one, or two announcements for an article.
///
/// The caller must queue these via the storage operation that also bumps
/// the article's per-channel counters, so the slot is reserved before the
/// dispatcher ever runs.
pub fn compose_article_announcements(
    article: &Article,
    authors: &ResolvedAuthors,
    config: &Config,
    now: i64,
) -> Vec<NewAnnouncement> {
    let mut announcements = Vec::new();

    if needs_announcing(article.tweeted, &config.tweet, now) {
        announcements.push(NewAnnouncement {
            kind: ChannelKind::Tweet,
            message: article_message(article, authors, config, ChannelKind::Tweet),
            content_warning: None,
            scheduled: now,
        });
    }

    if needs_announcing(article.tooted, &config.toot, now) {
        let warning = content_warning(article, &config.toot.content_warning_terms);
        announcements.push(NewAnnouncement {
            kind: ChannelKind::Toot,
            message: article_message(article, authors, config, ChannelKind::Toot),
            content_warning: warning,
            scheduled: now,
        });
    }

    announcements
}

/// Compose the one-off announcements for a newly approved blog.
pub fn compose_blog_announcements(
    blog: &Blog,
    authors: &ResolvedAuthors,
    config: &Config,
    now: i64,
) -> Vec<NewAnnouncement> {
    let mut announcements = Vec::new();

    for (kind, policy) in [
        (ChannelKind::Tweet, &config.tweet),
        (ChannelKind::Toot, &config.toot),
    ] {
        if !policy.enabled {
            continue;
        }
        announcements.push(NewAnnouncement {
            kind,
            message: blog_message(blog, authors.for_channel(kind), config),
            content_warning: None,
            scheduled: now,
        });
    }

    announcements
}

fn article_message(
    article: &Article,
    authors: &ResolvedAuthors,
    config: &Config,
    kind: ChannelKind,
) -> String {
    let (state, title_max) = match kind {
        ChannelKind::Tweet => (article.tweeted, TWEET_TITLE_MAX),
        ChannelKind::Toot => (article.tooted, TOOT_TITLE_MAX),
    };

    let separator = separator_for(state.times);
    let title = truncate_chars(&article.title, title_max);

    let mut parts: Vec<&str> = vec![title.as_ref()];
    if let Some(author) = authors.for_channel(kind) {
        parts.push(author);
    }
    parts.push(&article.link);

    let mut message = parts.join(separator);
    if let Some(hashtag) = club_hashtag(&article.tags, config) {
        message.push(' ');
        message.push_str(hashtag);
    }
    message
}

/// `{url} by {handle} has been added to {app_name}! It's about {category}!`
/// with the `by` clause and the category sentence dropped when absent.
fn blog_message(blog: &Blog, author: Option<&str>, config: &Config) -> String {
    let mut message = match author {
        Some(author) => format!(
            "{} by {} has been added to {}!",
            blog.url, author, config.app_name
        ),
        None => format!("{} has been added to {}!", blog.url, config.app_name),
    };
    if let Some(category) = blog.category.as_deref().filter(|c| !c.is_empty()) {
        message.push_str(&format!(" It's about {category}!"));
    }
    message
}

/// Cosmetic separator variety: the style alternates with the parity of the
/// send count. Zero and odd counts use `" - "`, even non-zero counts use
/// `" / "`. Not semantically load-bearing, but deterministic.
fn separator_for(times: i64) -> &'static str {
    if times > 0 && times % 2 == 0 {
        " / "
    } else {
        " - "
    }
}

/// The club hashtag, when any of the article's tags (after applying the
/// tag-normalization map) equals the configured club tag.
fn club_hashtag<'a>(tags: &[String], config: &'a Config) -> Option<&'a str> {
    if config.club_tag.is_empty() || config.club_hashtag.is_empty() {
        return None;
    }

    let is_club = tags.iter().any(|tag| {
        let canonical = config
            .tag_transforms
            .get(tag.as_str())
            .map(String::as_str)
            .unwrap_or(tag);
        canonical == config.club_tag
    });

    is_club.then_some(config.club_hashtag.as_str())
}

/// Scan the article's tags and case-folded title for trigger terms as whole
/// words; the union of matched canonical terms (config order, deduplicated)
/// becomes the warning label. Substring hits do not count: "studied" must
/// not trigger "died".
fn content_warning(article: &Article, terms: &[String]) -> Option<String> {
    if terms.is_empty() {
        return None;
    }

    let title_folded = article.title.to_lowercase();
    let mut matched: Vec<&str> = Vec::new();

    for term in terms {
        let term_folded = term.to_lowercase();
        let in_title = contains_word(&title_folded, &term_folded);
        // Tags are stored lowercased by the ingestion filter
        let in_tags = article
            .tags
            .iter()
            .any(|tag| contains_word(tag, &term_folded));
        if (in_title || in_tags) && !matched.contains(&term.as_str()) {
            matched.push(term);
        }
    }

    if matched.is_empty() {
        None
    } else {
        Some(matched.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.app_name = "Tidepool".to_string();
        config.tweet.enabled = true;
        config.toot.enabled = true;
        config.toot.content_warning_terms =
            vec!["death".to_string(), "died".to_string(), "grief".to_string()];
        config.club_tag = "blogclub".to_string();
        config.club_hashtag = "#BlogClub".to_string();
        config
            .tag_transforms
            .insert("blog club".to_string(), "blogclub".to_string());
        config
    }

    fn test_article(title: &str, tags: &[&str]) -> Article {
        Article {
            id: 1,
            blog_id: 1,
            guid: "guid-1".to_string(),
            link: "https://example.com/post".to_string(),
            title: title.to_string(),
            author: Some("Alice".to_string()),
            published: 1_700_000_000,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            tweeted: ChannelState::default(),
            tooted: ChannelState::default(),
            fetched_at: 1_700_000_000,
        }
    }

    fn authors() -> ResolvedAuthors {
        ResolvedAuthors {
            tweet: Some("@alice".to_string()),
            toot: Some("@alice@glam.social".to_string()),
        }
    }

    const NOW: i64 = 1_700_100_000;

    // ------------------------------------------------------------------
    // needs_announcing
    // ------------------------------------------------------------------

    #[test]
    fn test_never_announced_article_needs_both_channels() {
        let config = test_config();
        let article = test_article("Fresh", &[]);
        assert!(needs_announcing(article.tweeted, &config.tweet, NOW));
        assert!(needs_announcing(article.tooted, &config.toot, NOW));
    }

    #[test]
    fn test_disabled_channel_never_needs_announcing() {
        let mut config = test_config();
        config.tweet.enabled = false;
        let state = ChannelState::default();
        assert!(!needs_announcing(state, &config.tweet, NOW));
    }

    #[test]
    fn test_at_max_never_needs_announcing_regardless_of_elapsed() {
        let config = test_config();
        let state = ChannelState {
            times: config.tweet.max_per_article,
            last_sent: Some(NOW - 365 * 24 * 3600),
        };
        assert!(!needs_announcing(state, &config.tweet, NOW));
    }

    #[test]
    fn test_too_soon_for_repeat() {
        let config = test_config();
        let state = ChannelState {
            times: 1,
            last_sent: Some(NOW - (config.tweet.hours_between * 3600 - 60)),
        };
        assert!(!needs_announcing(state, &config.tweet, NOW));
    }

    #[test]
    fn test_repeat_due_after_hours_between() {
        let config = test_config();
        let state = ChannelState {
            times: 1,
            last_sent: Some(NOW - config.tweet.hours_between * 3600),
        };
        assert!(needs_announcing(state, &config.tweet, NOW));
    }

    // ------------------------------------------------------------------
    // Message composition
    // ------------------------------------------------------------------

    #[test]
    fn test_compose_emits_both_channels() {
        let config = test_config();
        let article = test_article("A Post", &[]);
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);

        assert_eq!(announcements.len(), 2);
        assert_eq!(announcements[0].kind, ChannelKind::Tweet);
        assert_eq!(
            announcements[0].message,
            "A Post - @alice - https://example.com/post"
        );
        assert_eq!(announcements[1].kind, ChannelKind::Toot);
        assert_eq!(
            announcements[1].message,
            "A Post - @alice@glam.social - https://example.com/post"
        );
        assert_eq!(announcements[1].content_warning, None);
    }

    #[test]
    fn test_author_segment_omitted_when_absent() {
        let config = test_config();
        let article = test_article("A Post", &[]);
        let announcements =
            compose_article_announcements(&article, &ResolvedAuthors::default(), &config, NOW);
        assert_eq!(
            announcements[0].message,
            "A Post - https://example.com/post"
        );
    }

    #[test]
    fn test_separator_alternates_with_send_count() {
        assert_eq!(separator_for(0), " - ");
        assert_eq!(separator_for(1), " - ");
        assert_eq!(separator_for(2), " / ");
        assert_eq!(separator_for(3), " - ");
        assert_eq!(separator_for(4), " / ");
    }

    #[test]
    fn test_second_announcement_uses_even_separator() {
        let config = test_config();
        let mut article = test_article("A Post", &[]);
        article.tweeted = ChannelState {
            times: 2,
            last_sent: Some(NOW - 24 * 3600),
        };
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);
        let tweet = announcements
            .iter()
            .find(|a| a.kind == ChannelKind::Tweet)
            .unwrap();
        assert_eq!(
            tweet.message,
            "A Post / @alice / https://example.com/post"
        );
    }

    #[test]
    fn test_title_truncation_150_for_tweet_300_for_toot() {
        let config = test_config();
        let long_title = "x".repeat(400);
        let article = test_article(&long_title, &[]);
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);

        let tweet = &announcements[0];
        let toot = &announcements[1];
        assert!(tweet.message.starts_with(&"x".repeat(150)));
        assert!(tweet.message.contains("... - @alice"));
        assert!(!tweet.message.starts_with(&"x".repeat(151)));
        assert!(toot.message.starts_with(&"x".repeat(300)));
        assert!(!toot.message.starts_with(&"x".repeat(301)));
    }

    #[test]
    fn test_short_title_not_truncated() {
        let config = test_config();
        let article = test_article("Short", &[]);
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);
        assert!(!announcements[0].message.contains("..."));
    }

    // ------------------------------------------------------------------
    // Club hashtag
    // ------------------------------------------------------------------

    #[test]
    fn test_club_tag_appends_hashtag() {
        let config = test_config();
        let article = test_article("Club Post", &["blogclub"]);
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);
        assert!(announcements[0].message.ends_with(" #BlogClub"));
        assert!(announcements[1].message.ends_with(" #BlogClub"));
    }

    #[test]
    fn test_club_tag_matched_through_transform_map() {
        let config = test_config();
        let article = test_article("Club Post", &["blog club"]);
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);
        assert!(announcements[0].message.ends_with(" #BlogClub"));
    }

    #[test]
    fn test_non_club_post_has_no_hashtag() {
        let config = test_config();
        let article = test_article("Ordinary Post", &["libraries"]);
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);
        assert!(!announcements[0].message.contains('#'));
    }

    // ------------------------------------------------------------------
    // Content warnings
    // ------------------------------------------------------------------

    #[test]
    fn test_warning_from_tag() {
        let config = test_config();
        let article = test_article("Remembering a friend", &["died"]);
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);
        let toot = announcements
            .iter()
            .find(|a| a.kind == ChannelKind::Toot)
            .unwrap();
        assert_eq!(toot.content_warning.as_deref(), Some("died"));
    }

    #[test]
    fn test_warning_from_title_case_folded() {
        let config = test_config();
        let article = test_article("On Grief and Libraries", &[]);
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);
        let toot = announcements
            .iter()
            .find(|a| a.kind == ChannelKind::Toot)
            .unwrap();
        assert_eq!(toot.content_warning.as_deref(), Some("grief"));
    }

    #[test]
    fn test_multiple_warnings_union_in_config_order() {
        let config = test_config();
        let article = test_article("Grief after a death", &["died"]);
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);
        let toot = announcements
            .iter()
            .find(|a| a.kind == ChannelKind::Toot)
            .unwrap();
        assert_eq!(toot.content_warning.as_deref(), Some("death, died, grief"));
    }

    #[test]
    fn test_substring_does_not_trigger_warning() {
        let config = test_config();
        let article = test_article("What I studied this year", &["studiedhard"]);
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);
        let toot = announcements
            .iter()
            .find(|a| a.kind == ChannelKind::Toot)
            .unwrap();
        assert_eq!(toot.content_warning, None);
    }

    #[test]
    fn test_tweet_never_carries_warning() {
        let config = test_config();
        let article = test_article("A death in the family", &[]);
        let announcements = compose_article_announcements(&article, &authors(), &config, NOW);
        let tweet = announcements
            .iter()
            .find(|a| a.kind == ChannelKind::Tweet)
            .unwrap();
        assert_eq!(tweet.content_warning, None);
    }

    // ------------------------------------------------------------------
    // Blog announcements
    // ------------------------------------------------------------------

    fn test_blog() -> Blog {
        Blog {
            id: 1,
            url: "https://blog.example.com".to_string(),
            feed_url: "https://blog.example.com/feed".to_string(),
            title: Some("Example Blog".to_string()),
            category: Some("libraries".to_string()),
            approved: true,
            suspended: false,
            suspension_lifted_at: None,
            failing: false,
            legacy_handle: None,
        }
    }

    #[test]
    fn test_blog_announcement_with_owner_and_category() {
        let config = test_config();
        let announcements = compose_blog_announcements(&test_blog(), &authors(), &config, NOW);
        assert_eq!(announcements.len(), 2);
        assert_eq!(
            announcements[0].message,
            "https://blog.example.com by @alice has been added to Tidepool! It's about libraries!"
        );
        assert_eq!(announcements[0].content_warning, None);
    }

    #[test]
    fn test_blog_announcement_without_owner_or_category() {
        let config = test_config();
        let mut blog = test_blog();
        blog.category = None;
        let announcements =
            compose_blog_announcements(&blog, &ResolvedAuthors::default(), &config, NOW);
        assert_eq!(
            announcements[0].message,
            "https://blog.example.com has been added to Tidepool!"
        );
    }

    #[test]
    fn test_blog_announcement_skips_disabled_channels() {
        let mut config = test_config();
        config.tweet.enabled = false;
        let announcements = compose_blog_announcements(&test_blog(), &authors(), &config, NOW);
        assert_eq!(announcements.len(), 1);
        assert_eq!(announcements[0].kind, ChannelKind::Toot);
    }
}
