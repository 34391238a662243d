//! Thread-safe bounded crawl queue.
//!
//! Three disjoint sets track every URL the crawl has seen: `pending`,
//! `in_progress`, and `visited`, all keyed by the normalized URL. A URL is
//! in at most one set at any time, and a visited URL is never re-enqueued.
//! All operations run to completion under one lock and never suspend, so
//! the disjointness invariant holds without cooperation from callers.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::utils::normalize_url;

/// One unit of crawl work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// Original (non-normalized) URL, used for navigation
    pub url: String,
    pub depth: u32,
    /// Number of retry attempts so far (0 = first attempt)
    pub retries: u32,
}

/// Counters and flags exposed for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub in_progress: usize,
    pub visited: usize,
    pub completed: usize,
    pub skipped: usize,
    pub links_discovered: usize,
    pub max_depth_reached: bool,
    pub max_pages_reached: bool,
}

struct QueueInner {
    pending: VecDeque<QueueItem>,
    /// Normalized URLs currently queued (mirror of `pending` for O(1) membership)
    pending_keys: HashSet<String>,
    /// Normalized URL -> item handed out by `take`
    in_progress: HashMap<String, QueueItem>,
    visited: HashSet<String>,
    completed: usize,
    skipped: usize,
    links_discovered: usize,
    max_depth_reached: bool,
    max_pages_reached: bool,
}

/// The sole coordination primitive between crawl workers
pub struct CrawlQueue {
    inner: Mutex<QueueInner>,
    max_depth: u32,
    max_pages: usize,
    max_retries: u32,
}

impl CrawlQueue {
    #[must_use]
    pub fn new(max_depth: u32, max_pages: usize, max_retries: u32) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                pending_keys: HashSet::new(),
                in_progress: HashMap::new(),
                visited: HashSet::new(),
                completed: 0,
                skipped: 0,
                links_discovered: 0,
                max_depth_reached: false,
                max_pages_reached: false,
            }),
            max_depth,
            max_pages,
            max_retries,
        }
    }

    /// Offer a URL at the given depth.
    ///
    /// Returns `false` for URLs that fail to normalize, exceed the depth
    /// limit (setting `max_depth_reached`), or are already pending,
    /// in progress, or visited.
    pub fn add(&self, url: &str, depth: u32) -> bool {
        let Ok(key) = normalize_url(url) else {
            return false;
        };

        let mut inner = self.inner.lock();

        if depth > 0 {
            inner.links_discovered += 1;
        }

        if depth > self.max_depth {
            inner.max_depth_reached = true;
            return false;
        }

        if inner.visited.contains(&key)
            || inner.pending_keys.contains(&key)
            || inner.in_progress.contains_key(&key)
        {
            return false;
        }

        inner.pending_keys.insert(key);
        inner.pending.push_back(QueueItem {
            url: url.to_string(),
            depth,
            retries: 0,
        });
        true
    }

    /// Pop the next item, moving it into `in_progress`.
    ///
    /// Returns `None` once the page budget is spent (setting
    /// `max_pages_reached`) or when nothing is pending.
    pub fn take(&self) -> Option<QueueItem> {
        let mut inner = self.inner.lock();

        if inner.completed >= self.max_pages {
            inner.max_pages_reached = true;
            return None;
        }

        let item = inner.pending.pop_front()?;
        let key = normalize_url(&item.url).unwrap_or_else(|_| item.url.clone());
        inner.pending_keys.remove(&key);
        inner.in_progress.insert(key, item.clone());
        Some(item)
    }

    /// Mark a taken URL as successfully processed
    pub fn complete(&self, url: &str) {
        let key = normalize_url(url).unwrap_or_else(|_| url.to_string());
        let mut inner = self.inner.lock();
        inner.in_progress.remove(&key);
        inner.visited.insert(key);
        inner.completed += 1;
    }

    /// Return a failed item for another attempt.
    ///
    /// Exhausted items are marked visited (failed) and counted as skipped;
    /// the return value says whether the retry was accepted.
    pub fn retry(&self, item: &QueueItem) -> bool {
        let key = normalize_url(&item.url).unwrap_or_else(|_| item.url.clone());
        let mut inner = self.inner.lock();
        inner.in_progress.remove(&key);

        if item.retries >= self.max_retries {
            inner.visited.insert(key);
            inner.skipped += 1;
            return false;
        }

        inner.pending_keys.insert(key);
        inner.pending.push_back(QueueItem {
            url: item.url.clone(),
            depth: item.depth,
            retries: item.retries + 1,
        });
        true
    }

    /// True when the page budget is spent or all work has drained
    #[must_use]
    pub fn is_done(&self) -> bool {
        let inner = self.inner.lock();
        inner.completed >= self.max_pages
            || (inner.pending.is_empty() && inner.in_progress.is_empty())
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            pending: inner.pending.len(),
            in_progress: inner.in_progress.len(),
            visited: inner.visited.len(),
            completed: inner.completed,
            skipped: inner.skipped,
            links_discovered: inner.links_discovered,
            max_depth_reached: inner.max_depth_reached,
            max_pages_reached: inner.max_pages_reached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_take_complete_moves_between_sets() {
        let queue = CrawlQueue::new(5, 100, 2);
        assert!(queue.add("https://x.test/", 0));

        let item = queue.take().unwrap();
        assert_eq!(item.url, "https://x.test/");
        let stats = queue.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.in_progress, 1);

        queue.complete(&item.url);
        let stats = queue.stats();
        assert_eq!(stats.in_progress, 0);
        assert_eq!(stats.visited, 1);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn visited_urls_are_never_re_enqueued() {
        let queue = CrawlQueue::new(5, 100, 2);
        queue.add("https://x.test/a", 0);
        let item = queue.take().unwrap();
        queue.complete(&item.url);

        assert!(!queue.add("https://x.test/a", 1));
        // Normalized variants are the same URL
        assert!(!queue.add("https://x.test/a/", 1));
        assert!(!queue.add("https://x.test/a#frag", 1));
        assert_eq!(queue.stats().pending, 0);
    }

    #[test]
    fn duplicate_pending_and_in_progress_are_rejected() {
        let queue = CrawlQueue::new(5, 100, 2);
        assert!(queue.add("https://x.test/a", 0));
        assert!(!queue.add("https://x.test/a", 0));

        let item = queue.take().unwrap();
        assert!(!queue.add(&item.url, 1));
    }

    #[test]
    fn depth_limit_sets_flag_and_rejects() {
        let queue = CrawlQueue::new(0, 100, 2);
        assert!(queue.add("https://x.test/", 0));
        assert!(!queue.add("https://x.test/too-deep", 1));
        assert!(queue.stats().max_depth_reached);
    }

    #[test]
    fn zero_max_pages_finishes_immediately() {
        let queue = CrawlQueue::new(5, 0, 2);
        queue.add("https://x.test/", 0);
        assert!(queue.take().is_none());
        assert!(queue.is_done());
        let stats = queue.stats();
        assert!(stats.max_pages_reached);
        assert_eq!(stats.completed, 0);
    }

    #[test]
    fn retry_requeues_until_exhausted() {
        let queue = CrawlQueue::new(5, 100, 2);
        queue.add("https://x.test/flaky", 0);

        // First attempt + two retries, all failing
        let mut item = queue.take().unwrap();
        assert!(queue.retry(&item)); // retries 0 -> accepted
        item = queue.take().unwrap();
        assert_eq!(item.retries, 1);
        assert!(queue.retry(&item));
        item = queue.take().unwrap();
        assert_eq!(item.retries, 2);
        assert!(!queue.retry(&item)); // exhausted

        let stats = queue.stats();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.visited, 1);
        assert!(queue.is_done());
    }

    #[test]
    fn crawl_with_retries_scenario() {
        // maxPages=3, maxRetries=2: seed discovers two links, one link
        // fails three times, the other succeeds.
        let queue = CrawlQueue::new(5, 3, 2);
        queue.add("https://x.test/", 0);

        let seed = queue.take().unwrap();
        queue.add("https://x.test/l1", 1);
        queue.add("https://x.test/l2", 1);
        queue.complete(&seed.url);

        let mut failures = 0;
        while let Some(item) = queue.take() {
            if item.url.ends_with("/l1") {
                failures += 1;
                queue.retry(&item);
            } else {
                queue.complete(&item.url);
            }
        }

        let stats = queue.stats();
        assert_eq!(failures, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.skipped, 1);
        assert!(!stats.max_pages_reached);
        assert!(queue.is_done());
    }

    #[test]
    fn disjointness_holds_throughout() {
        let queue = CrawlQueue::new(5, 100, 1);
        for i in 0..20 {
            queue.add(&format!("https://x.test/p{i}"), 0);
        }

        while let Some(item) = queue.take() {
            let stats = queue.stats();
            assert_eq!(
                stats.pending + stats.in_progress + stats.visited,
                20,
                "sets must partition all offered URLs"
            );
            if item.url.ends_with('3') {
                queue.retry(&item);
            } else {
                queue.complete(&item.url);
            }
        }
    }

    #[test]
    fn completed_plus_skipped_bounded_by_discovered() {
        let queue = CrawlQueue::new(5, 100, 0);
        queue.add("https://x.test/", 0);
        let seed = queue.take().unwrap();
        for i in 0..5 {
            queue.add(&format!("https://x.test/l{i}"), 1);
        }
        queue.complete(&seed.url);

        while let Some(item) = queue.take() {
            if item.url.ends_with("l0") {
                queue.retry(&item);
            } else {
                queue.complete(&item.url);
            }
        }

        let stats = queue.stats();
        assert!(stats.completed + stats.skipped <= stats.links_discovered + 1);
    }
}
