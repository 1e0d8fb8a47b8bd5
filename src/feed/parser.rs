use sha2::{Digest, Sha256};

/// One entry of a fetched feed, normalized for ingestion.
#[derive(Debug, Clone)]
pub struct RawItem {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub published: i64,
    /// Tags exactly as the feed served them; normalization happens in the
    /// ingestion filter.
    pub tags: Vec<String>,
}

/// Result of parsing a feed document.
pub struct ParseResult {
    pub items: Vec<RawItem>,
    /// Entries dropped for having no link or no publish date
    pub skipped: usize,
}

/// Parse RSS/Atom bytes into normalized items.
///
/// Entries without a link are unusable (there is nothing to announce or
/// save). Entries without a publish date are almost always stray pages that
/// leaked into the feed, so they are dropped too rather than guessed at.
pub fn parse_feed(bytes: &[u8]) -> Result<ParseResult, feed_rs::parser::ParseFeedError> {
    let feed = feed_rs::parser::parse(bytes)?;

    let total = feed.entries.len();
    let items: Vec<RawItem> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone())?;
            let published = entry.published.or(entry.updated)?.timestamp();
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());
            let author = entry
                .authors
                .first()
                .map(|a| a.name.clone())
                .filter(|name| !name.trim().is_empty());
            let tags = entry
                .categories
                .iter()
                .map(|c| c.term.clone())
                .filter(|t| !t.trim().is_empty())
                .collect();

            let existing_id = if entry.id.is_empty() {
                None
            } else {
                Some(entry.id.as_str())
            };
            let guid = generate_guid(existing_id, &link, &title, published);

            Some(RawItem {
                guid,
                title,
                link,
                author,
                published,
                tags,
            })
        })
        .collect();

    let skipped = total - items.len();
    Ok(ParseResult { items, skipped })
}

/// Use the feed-supplied id when present; otherwise derive a stable guid
/// from the entry itself so re-fetches dedupe correctly.
fn generate_guid(existing: Option<&str>, link: &str, title: &str, published: i64) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!("{}|{}|{}", link, title, published);
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
