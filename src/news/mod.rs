// src/news/mod.rs
pub mod cache;
pub mod source;

use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::news::source::FeedSource;

pub const UNKNOWN_SOURCE: &str = "Unknown Source";

/// One entry of the news list served at `/api/news`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    /// Publish date exactly as it appeared in the feed.
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub source: String,
    pub description: String,
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("news_fetch_total", "Feed fetches attempted.");
        describe_counter!("news_fetch_errors_total", "Feed fetch/read failures.");
        describe_counter!("news_items_total", "Items extracted from fetched feeds.");
        describe_counter!("news_cache_hits_total", "News requests served from cache.");
        describe_histogram!("news_parse_ms", "Feed extraction time in milliseconds.");
    });
}

macro_rules! cached_regex {
    ($pat:expr) => {{
        static RE: OnceCell<Regex> = OnceCell::new();
        RE.get_or_init(|| Regex::new($pat).expect("static regex"))
    }};
}

fn re_item() -> &'static Regex {
    cached_regex!(r"(?s)<item>(.*?)</item>")
}

/// First capture of the first pattern that matches, tried in order.
fn first_capture<'a>(block: &'a str, patterns: &[&Regex]) -> Option<&'a str> {
    patterns
        .iter()
        .find_map(|re| re.captures(block).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
}

fn field_title(block: &str) -> &str {
    let cdata = cached_regex!(r"<title><!\[CDATA\[(.*?)\]\]></title>");
    let plain = cached_regex!(r"<title>(.*?)</title>");
    first_capture(block, &[cdata, plain]).unwrap_or_default()
}

fn field_link(block: &str) -> &str {
    first_capture(block, &[cached_regex!(r"<link>(.*?)</link>")]).unwrap_or_default()
}

fn field_pub_date(block: &str) -> &str {
    first_capture(block, &[cached_regex!(r"<pubDate>(.*?)</pubDate>")]).unwrap_or_default()
}

fn field_source(block: &str) -> &str {
    first_capture(block, &[cached_regex!(r#"<source url=".*?">(.*?)</source>"#)])
        .unwrap_or(UNKNOWN_SOURCE)
}

fn field_description(block: &str) -> &str {
    let cdata = cached_regex!(r"<description><!\[CDATA\[(.*?)\]\]></description>");
    let plain = cached_regex!(r"<description>(.*?)</description>");
    first_capture(block, &[cdata, plain]).unwrap_or_default()
}

/// Strip the markup feed aggregators put into item descriptions.
///
/// Links and font tags are replaced by their inner text, `&nbsp;` becomes a
/// plain space, any other tag is dropped and the result is trimmed. Applying
/// it to its own output changes nothing.
pub fn clean_description(raw: &str) -> String {
    let re_a = cached_regex!(r"<a[^>]*>(.*?)</a>");
    let re_font = cached_regex!(r"<font[^>]*>(.*?)</font>");
    let re_tags = cached_regex!(r"<[^>]+>");

    let out = re_a.replace_all(raw, "$1");
    let out = re_font.replace_all(&out, "$1");
    let out = re_tags.replace_all(&out, "");
    // After tag removal, so a tag split inside the entity cannot leave one behind.
    let out = out.replace("&nbsp;", " ");
    out.trim().to_string()
}

/// Extract news items from raw RSS text, in document order.
///
/// Each `<item>` block is read on its own. Missing fields fall back to
/// defaults; blocks without a title or a link are skipped.
pub fn extract_items(feed: &str) -> Vec<NewsItem> {
    let mut out = Vec::new();
    for caps in re_item().captures_iter(feed) {
        let Some(block) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };

        let title = field_title(block);
        let link = field_link(block);
        if title.is_empty() || link.is_empty() {
            tracing::debug!(target: "news", "skipping item without title or link");
            continue;
        }

        let description = clean_description(field_description(block));
        out.push(NewsItem {
            title: title.to_string(),
            link: link.to_string(),
            pub_date: field_pub_date(block).to_string(),
            source: field_source(block).to_string(),
            description: if description.is_empty() {
                title.to_string()
            } else {
                description
            },
        });
    }
    out
}

/// Fetch the feed once and extract its items.
pub async fn fetch_news(source: &dyn FeedSource) -> AppResult<Vec<NewsItem>> {
    ensure_metrics_described();
    counter!("news_fetch_total").increment(1);

    let body = match source.fetch_text().await {
        Ok(b) => b,
        Err(e) => {
            counter!("news_fetch_errors_total").increment(1);
            return Err(e);
        }
    };

    let t0 = std::time::Instant::now();
    let items = extract_items(&body);
    metrics::histogram!("news_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("news_items_total").increment(items.len() as u64);

    tracing::info!(
        target: "news",
        source = source.name(),
        items = items.len(),
        bytes = body.len(),
        "feed extracted"
    );
    Ok(items)
}
