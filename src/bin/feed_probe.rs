//! Fetch a feed (URL or local file) and print what the news endpoint would serve.
//!
//! Usage: feed_probe <url-or-path>   (defaults to $NEWS_API_URL)

use std::sync::Arc;

use meda_gateway::news::{
    fetch_news,
    source::{FeedSource, FixtureFeed, HttpFeed},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    meda_gateway::telemetry::init_tracing();

    let target = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("NEWS_API_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("usage: feed_probe <url-or-path> (or set NEWS_API_URL)"))?;

    let source: Arc<dyn FeedSource> = if target.starts_with("http://") || target.starts_with("https://") {
        Arc::new(HttpFeed::from_url(target.clone())?)
    } else {
        let text = std::fs::read_to_string(&target)?;
        Arc::new(FixtureFeed::from_fixture(&text))
    };

    let items = fetch_news(source.as_ref()).await?;
    for (i, it) in items.iter().enumerate() {
        println!("{:>3}. {} [{}]", i + 1, it.title, it.source);
        println!("     {}", it.link);
        if !it.pub_date.is_empty() {
            println!("     {}", it.pub_date);
        }
    }
    println!("{} item(s)", items.len());
    Ok(())
}
