// src/news/cache.rs
//! Short-lived cache for the extracted news list. Failures are never cached.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::counter;

use crate::error::AppResult;
use crate::news::{fetch_news, source::FeedSource, NewsItem};

struct Entry {
    fetched_at: Instant,
    items: Arc<Vec<NewsItem>>,
}

pub struct NewsCache {
    ttl: Duration,
    slot: Mutex<Option<Entry>>,
}

impl NewsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    fn fresh(&self) -> Option<Arc<Vec<NewsItem>>> {
        let g = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        g.as_ref()
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.items))
    }

    /// Cached items if still fresh, otherwise fetch from `source` and remember the result.
    pub async fn get_or_fetch(&self, source: &dyn FeedSource) -> AppResult<Arc<Vec<NewsItem>>> {
        if let Some(items) = self.fresh() {
            counter!("news_cache_hits_total").increment(1);
            return Ok(items);
        }

        let items = Arc::new(fetch_news(source).await?);
        if !self.ttl.is_zero() {
            let mut g = self.slot.lock().unwrap_or_else(|p| p.into_inner());
            *g = Some(Entry {
                fetched_at: Instant::now(),
                items: Arc::clone(&items),
            });
        }
        Ok(items)
    }

    pub fn invalidate(&self) {
        let mut g = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *g = None;
    }
}
