//! Parallel crawl engine: queue, workers, and progress events.

pub mod progress;
pub mod queue;
pub mod worker;

pub use progress::{LifecycleStage, PagePhase, ProgressBus, ProgressEvent};
pub use queue::{CrawlQueue, QueueItem, QueueStats};
pub use worker::{SharedCrawlState, WorkerContext, backoff_delay, run_worker};
