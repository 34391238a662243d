//! Crawl queue invariants and boundary behavior through the public API.

use sitereplay::CrawlQueue;

#[test]
fn seed_only_when_depth_zero() {
    // maxDepth = 0: only the seed is crawled and the flag records that
    // deeper links were seen
    let queue = CrawlQueue::new(0, 100, 2);
    assert!(queue.add("https://x.test/", 0));

    let seed = queue.take().unwrap();
    assert!(!queue.add("https://x.test/child", 1));
    queue.complete(&seed.url);

    let stats = queue.stats();
    assert!(stats.max_depth_reached);
    assert_eq!(stats.completed, 1);
    assert!(queue.is_done());
}

#[test]
fn page_budget_stops_the_crawl() {
    let queue = CrawlQueue::new(5, 2, 2);
    for i in 0..5 {
        queue.add(&format!("https://x.test/p{i}"), 0);
    }

    let mut visited = 0;
    while let Some(item) = queue.take() {
        queue.complete(&item.url);
        visited += 1;
    }

    assert_eq!(visited, 2);
    let stats = queue.stats();
    assert!(stats.max_pages_reached);
    assert!(queue.is_done());
}

#[test]
fn concurrent_workers_see_each_url_once() {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    let queue = Arc::new(CrawlQueue::new(5, 1000, 0));
    for i in 0..200 {
        queue.add(&format!("https://x.test/page/{i}"), 0);
    }

    let seen = Arc::new(Mutex::new(HashSet::new()));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let queue = Arc::clone(&queue);
        let seen = Arc::clone(&seen);
        handles.push(std::thread::spawn(move || {
            while let Some(item) = queue.take() {
                let fresh = seen.lock().unwrap().insert(item.url.clone());
                assert!(fresh, "URL handed to two workers: {}", item.url);
                queue.complete(&item.url);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(seen.lock().unwrap().len(), 200);
    assert_eq!(queue.stats().completed, 200);
    assert!(queue.is_done());
}

#[test]
fn query_order_does_not_create_duplicates() {
    let queue = CrawlQueue::new(5, 100, 2);
    assert!(queue.add("https://x.test/p?a=1&b=2", 0));
    assert!(!queue.add("https://x.test/p?b=2&a=1", 0));
    assert_eq!(queue.stats().pending, 1);
}

#[test]
fn non_http_urls_are_rejected() {
    let queue = CrawlQueue::new(5, 100, 2);
    assert!(!queue.add("not a url", 0));
    assert!(!queue.add("", 1));
    assert_eq!(queue.stats().pending, 0);
}
