use crate::feed::fetcher::{fetch_feed, FetchError};
use crate::util::validate_url;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Path endings that mark an anchor href as a probable feed link.
/// Each may also appear with an `.xml` extension or a trailing slash.
const FEED_PATH_NAMES: [&str; 4] = ["feed", "rss", "rss2", "atom"];

/// A feed located on a member's site at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedInfo {
    pub feed_url: String,
    /// From the feed link's title attribute, else the page title
    pub title: Option<String>,
}

/// Outcome of the interactive feed validity check. Never an Err: the
/// registration flow shows the reason inline rather than failing.
#[derive(Debug, Clone)]
pub struct FeedCheck {
    pub ok: bool,
    pub error: Option<String>,
}

/// Errors that can occur during feed discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The site URL failed validation (bad scheme, private address)
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Neither a feed link element nor a feed-like anchor was found
    #[error("no link to an RSS or Atom feed found at this URL")]
    NoFeedFound,
    /// HTTP request failed
    #[error("network error: {0}")]
    Network(String),
    /// Request exceeded the discovery timeout
    #[error("request timed out")]
    Timeout,
}

/// Fetch a site's HTML and locate its feed.
///
/// Used only at blog-registration time, never in the recurring pipeline.
pub async fn discover(
    client: &reqwest::Client,
    site_url: &str,
) -> Result<FeedInfo, DiscoveryError> {
    let validated = validate_url(site_url).map_err(|e| DiscoveryError::InvalidUrl(e.to_string()))?;
    let url_str = validated.to_string();

    let html = tokio::time::timeout(DISCOVERY_TIMEOUT, fetch_page(client, &url_str))
        .await
        .map_err(|_| DiscoveryError::Timeout)??;

    find_feed_in_page(&html, &url_str)
}

/// Fetch the candidate feed URL and confirm it parses as a feed.
///
/// Returns `{ok, error}` rather than an error because the registration flow
/// calls this interactively and reports the reason to the submitter.
pub async fn check_feed_url(client: &reqwest::Client, feed_url: &str) -> FeedCheck {
    match fetch_feed(client, feed_url, DISCOVERY_TIMEOUT).await {
        Ok(_) => FeedCheck {
            ok: true,
            error: None,
        },
        Err(FetchError::NotFound) => FeedCheck {
            ok: false,
            error: Some("URL does not exist".to_string()),
        },
        Err(FetchError::Parse(_)) => FeedCheck {
            ok: false,
            error: Some("Not a feed".to_string()),
        },
        Err(e) => FeedCheck {
            ok: false,
            error: Some(e.to_string()),
        },
    }
}

async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String, DiscoveryError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| DiscoveryError::Network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(DiscoveryError::Network(format!(
            "HTTP status {}",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len as usize > MAX_PAGE_SIZE {
            return Err(DiscoveryError::Network("response too large".to_string()));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DiscoveryError::Network(e.to_string()))?;
        if bytes.len().saturating_add(chunk.len()) > MAX_PAGE_SIZE {
            return Err(DiscoveryError::Network("response too large".to_string()));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Locate a feed in fetched HTML.
///
/// Strategy (a): a `<link>` element advertising an RSS or Atom type.
/// Strategy (b): an anchor whose href looks like a feed path, since some sites
/// link their feed in the body but never declare it in the head.
/// Relative hrefs resolve against the site URL.
pub fn find_feed_in_page(html: &str, site_url: &str) -> Result<FeedInfo, DiscoveryError> {
    if let Some((href, link_title)) = find_feed_link_element(html) {
        let title = link_title.or_else(|| page_title(html));
        return Ok(FeedInfo {
            feed_url: resolve_url(&href, site_url),
            title,
        });
    }

    if let Some(href) = find_feed_anchor(html, site_url) {
        return Ok(FeedInfo {
            feed_url: resolve_url(&href, site_url),
            title: page_title(html),
        });
    }

    Err(DiscoveryError::NoFeedFound)
}

/// Scan `<link>` tags for an RSS/Atom type attribute, returning the href
/// and the tag's own title attribute if present.
fn find_feed_link_element(html: &str) -> Option<(String, Option<String>)> {
    let html_lower = html.to_lowercase();
    let mut search_from = 0;

    while let Some(link_start) = html_lower[search_from..].find("<link") {
        let abs_start = search_from + link_start;
        let remaining = &html_lower[abs_start..];

        let tag_end = remaining.find('>')?;
        let tag = &remaining[..=tag_end];

        if tag.contains("application/rss+xml") || tag.contains("application/atom+xml") {
            // Extract from the original (non-lowered) HTML to preserve case
            let original_tag = &html[abs_start..abs_start + tag_end + 1];
            if let Some(href) = extract_attr_value(original_tag, "href") {
                let title = extract_attr_value(original_tag, "title").map(str::to_owned);
                return Some((href.to_owned(), title));
            }
        }

        search_from = abs_start + tag_end + 1;
    }

    None
}

/// Scan anchor elements for a same-site href with a feed-like path.
fn find_feed_anchor(html: &str, site_url: &str) -> Option<String> {
    let html_lower = html.to_lowercase();
    let site_host = url::Url::parse(site_url).ok().and_then(|u| {
        u.host_str().map(str::to_owned)
    });
    let mut search_from = 0;

    while let Some(a_start) = html_lower[search_from..].find("<a") {
        let abs_start = search_from + a_start;
        let remaining = &html_lower[abs_start..];

        let tag_end = match remaining.find('>') {
            Some(pos) => pos,
            None => break,
        };

        let original_tag = &html[abs_start..abs_start + tag_end + 1];
        if let Some(href) = extract_attr_value(original_tag, "href") {
            if is_feed_like_href(href) && is_same_site(href, site_host.as_deref()) {
                return Some(href.to_owned());
            }
        }

        search_from = abs_start + tag_end + 1;
    }

    None
}

/// True when the href's final path segment is `feed`, `rss`, `rss2` or
/// `atom`, optionally with an `.xml` extension, case-insensitive. A query
/// string or trailing slash does not disqualify it.
fn is_feed_like_href(href: &str) -> bool {
    let path = href
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .trim_end_matches('/');
    let segment = path.rsplit('/').next().unwrap_or("").to_lowercase();
    let name = segment.strip_suffix(".xml").unwrap_or(&segment);

    FEED_PATH_NAMES.contains(&name)
}

/// Absolute hrefs must stay on the member's own site; relative hrefs always
/// qualify.
fn is_same_site(href: &str, site_host: Option<&str>) -> bool {
    if !href.starts_with("http://") && !href.starts_with("https://") {
        return true;
    }
    match (url::Url::parse(href), site_host) {
        (Ok(parsed), Some(host)) => parsed.host_str() == Some(host),
        _ => false,
    }
}

/// The page `<title>` contents, whitespace-trimmed.
fn page_title(html: &str) -> Option<String> {
    let html_lower = html.to_lowercase();
    let start = html_lower.find("<title")?;
    let open_end = start + html_lower[start..].find('>')?;
    let close = open_end + html_lower[open_end..].find("</title")?;

    let title = html[open_end + 1..close].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_owned())
    }
}

/// Extracts the value of an attribute from a tag string (case-preserving).
fn extract_attr_value<'a>(tag: &'a str, attr_name: &str) -> Option<&'a str> {
    let tag_lower = tag.to_lowercase();
    let attr_prefix = format!("{attr_name}=");

    let attr_start = tag_lower.find(&attr_prefix)?;
    let value_start = attr_start + attr_prefix.len();

    if value_start >= tag.len() {
        return None;
    }

    let rest = &tag[value_start..];
    let quote = rest.as_bytes().first()?;

    if *quote != b'"' && *quote != b'\'' {
        return None;
    }

    let quote_char = *quote as char;
    let inner = &rest[1..];
    let end = inner.find(quote_char)?;

    Some(&inner[..end])
}

/// Resolves a potentially relative URL against the site URL.
fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_owned();
    }

    // Protocol-relative: normalize through the URL parser
    if href.starts_with("//") {
        let with_scheme = format!("https:{}", href);
        if let Ok(parsed) = url::Url::parse(&with_scheme) {
            return parsed.to_string();
        }
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }

    href.to_owned()
}
