//! Integration tests for the announcement path: slot reservation at
//! compose time, atomic queue pops, and dispatch against a mocked
//! channel API.

use proptest::prelude::*;
use secrecy::SecretString;
use tidepool::announce::{
    compose_article_announcements, dispatch_tick, ChannelSet, MastodonClient, ResolvedAuthors,
};
use tidepool::config::Config;
use tidepool::storage::{ChannelKind, Database, NewAnnouncement, NewArticle};
use tidepool::util::{contains_word, truncate_chars};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NOW: i64 = 1_700_000_000;

fn test_config() -> Config {
    let mut config = Config::default();
    config.tweet.enabled = true; // max 3, every 10 hours
    config.toot.enabled = true; // max 2, every 18 hours
    config.toot.content_warning_terms = vec!["death".to_string()];
    config
}

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn announcement(kind: ChannelKind, message: &str, scheduled: i64) -> NewAnnouncement {
    NewAnnouncement {
        kind,
        message: message.to_string(),
        content_warning: None,
        scheduled,
    }
}

async fn seeded_article(db: &Database, title: &str) -> i64 {
    let blog_id = db
        .register_blog("https://blog.example.com", "https://blog.example.com/feed", None, None)
        .await
        .unwrap();
    db.approve_blog(blog_id, None).await.unwrap();

    let article = db
        .insert_article(&NewArticle {
            blog_id,
            guid: "g1".to_string(),
            link: "https://blog.example.com/post".to_string(),
            title: title.to_string(),
            author: Some("Alice".to_string()),
            published: NOW,
            tags: vec!["libraries".to_string()],
        })
        .await
        .unwrap();
    article.id
}

// ============================================================================
// Queue Pop Semantics
// ============================================================================

#[tokio::test]
async fn test_pop_returns_item_once_then_empty() {
    let db = test_db().await;
    db.enqueue_announcements(&[announcement(ChannelKind::Toot, "only one", 100)])
        .await
        .unwrap();

    let first = db.pop_next_announcement().await.unwrap();
    let second = db.pop_next_announcement().await.unwrap();

    assert_eq!(first.unwrap().message, "only one");
    assert!(second.is_none(), "second pop must find an empty queue");
}

#[tokio::test]
async fn test_pop_orders_by_scheduled_time() {
    let db = test_db().await;
    db.enqueue_announcements(&[
        announcement(ChannelKind::Toot, "third", 300),
        announcement(ChannelKind::Tweet, "first", 100),
        announcement(ChannelKind::Toot, "second", 200),
    ])
    .await
    .unwrap();

    let order: Vec<String> = [
        db.pop_next_announcement().await.unwrap().unwrap(),
        db.pop_next_announcement().await.unwrap().unwrap(),
        db.pop_next_announcement().await.unwrap().unwrap(),
    ]
    .into_iter()
    .map(|a| a.message)
    .collect();

    assert_eq!(order, vec!["first", "second", "third"]);
}

// ============================================================================
// Slot Reservation (compose-time counter increment)
// ============================================================================

#[tokio::test]
async fn test_composing_reserves_the_announcement_slot() {
    let db = test_db().await;
    let config = test_config();
    let article_id = seeded_article(&db, "A Post").await;

    let article = db.get_article(article_id).await.unwrap().unwrap();
    let announcements =
        compose_article_announcements(&article, &ResolvedAuthors::default(), &config, NOW);
    assert_eq!(announcements.len(), 2);

    db.enqueue_article_announcements(article_id, &announcements, NOW)
        .await
        .unwrap();

    // Counters were bumped with the enqueue, before any dispatch happened
    let article = db.get_article(article_id).await.unwrap().unwrap();
    assert_eq!(article.tweeted.times, 1);
    assert_eq!(article.tweeted.last_sent, Some(NOW));
    assert_eq!(article.tooted.times, 1);

    // An overlapping tick a moment later composes nothing
    let again = compose_article_announcements(&article, &ResolvedAuthors::default(), &config, NOW + 60);
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_repeat_announcements_respect_hours_between_per_channel() {
    let db = test_db().await;
    let config = test_config();
    let article_id = seeded_article(&db, "A Post").await;

    let article = db.get_article(article_id).await.unwrap().unwrap();
    let first = compose_article_announcements(&article, &ResolvedAuthors::default(), &config, NOW);
    db.enqueue_article_announcements(article_id, &first, NOW)
        .await
        .unwrap();

    // Eleven hours on: the tweet channel (10h) is due again, the toot
    // channel (18h) is not
    let eleven_hours_on = NOW + 11 * 3600;
    let article = db.get_article(article_id).await.unwrap().unwrap();
    let repeats =
        compose_article_announcements(&article, &ResolvedAuthors::default(), &config, eleven_hours_on);

    assert_eq!(repeats.len(), 1);
    assert_eq!(repeats[0].kind, ChannelKind::Tweet);
}

#[tokio::test]
async fn test_max_per_article_caps_total_announcements() {
    let db = test_db().await;
    let config = test_config();
    let article_id = seeded_article(&db, "A Post").await;

    // Simulate weeks of feed-check ticks, each far enough apart that the
    // hours-between rule is always satisfied
    let mut tweets_queued = 0;
    for day in 0..14 {
        let tick = NOW + day * 24 * 3600;
        let article = db.get_article(article_id).await.unwrap().unwrap();
        let announcements =
            compose_article_announcements(&article, &ResolvedAuthors::default(), &config, tick);
        tweets_queued += announcements
            .iter()
            .filter(|a| a.kind == ChannelKind::Tweet)
            .count();
        db.enqueue_article_announcements(article_id, &announcements, tick)
            .await
            .unwrap();
    }

    assert_eq!(tweets_queued as i64, config.tweet.max_per_article);

    let article = db.get_article(article_id).await.unwrap().unwrap();
    assert_eq!(article.tweeted.times, config.tweet.max_per_article);
    assert_eq!(article.tooted.times, config.toot.max_per_article);
}

// ============================================================================
// Dispatch Against A Mocked Channel
// ============================================================================

#[tokio::test]
async fn test_dispatch_posts_toot_with_content_warning() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .and(body_string_contains("spoiler_text=death"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let db = test_db().await;
    db.enqueue_announcements(&[NewAnnouncement {
        kind: ChannelKind::Toot,
        message: "A difficult post - link".to_string(),
        content_warning: Some("death".to_string()),
        scheduled: 100,
    }])
    .await
    .unwrap();

    let channels = ChannelSet::default().with_channel(Box::new(MastodonClient::new(
        reqwest::Client::new(),
        mock_server.uri(),
        SecretString::from("token"),
    )));

    dispatch_tick(&db, &channels).await;
    assert_eq!(db.announcement_queue_len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_each_tick_drains_exactly_one() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let db = test_db().await;
    db.enqueue_announcements(&[
        announcement(ChannelKind::Toot, "one", 100),
        announcement(ChannelKind::Toot, "two", 200),
    ])
    .await
    .unwrap();

    let channels = ChannelSet::default().with_channel(Box::new(MastodonClient::new(
        reqwest::Client::new(),
        mock_server.uri(),
        SecretString::from("token"),
    )));

    dispatch_tick(&db, &channels).await;
    assert_eq!(db.announcement_queue_len().await.unwrap(), 1);

    dispatch_tick(&db, &channels).await;
    assert_eq!(db.announcement_queue_len().await.unwrap(), 0);
}

// ============================================================================
// Matcher And Truncation Properties
// ============================================================================

proptest! {
    /// A term buried inside a longer alphanumeric run never matches.
    #[test]
    fn prop_embedded_term_is_not_a_word_match(term in "[a-z]{3,8}") {
        let haystack = format!("aa{term}zz");
        prop_assert!(!contains_word(&haystack, &term));
    }

    /// A term standing alone between spaces always matches.
    #[test]
    fn prop_spaced_term_matches(
        term in "[a-z]{3,8}",
        prefix in "[a-z ]{0,12}",
        suffix in "[a-z ]{0,12}",
    ) {
        let haystack = format!("{prefix} {term} {suffix}");
        prop_assert!(contains_word(&haystack, &term));
    }

    /// Truncation never exceeds the cap plus the ellipsis, and never
    /// splits a multi-byte character.
    #[test]
    fn prop_truncation_bounds(s in "\\PC{0,64}", max in 1usize..32) {
        let out = truncate_chars(&s, max);
        prop_assert!(out.chars().count() <= max + 3);
        if s.chars().count() <= max {
            prop_assert_eq!(out.as_ref(), s.as_str());
        } else {
            prop_assert!(out.ends_with("..."));
        }
    }
}
