// Request pacing for external sources.
//
// Each adapter owns a pacer holding the minimum interval between
// consecutive requests to one host. The core pipeline never waits; only
// adapters pace themselves.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Enforces a minimum interval between requests.
#[derive(Clone)]
pub struct RequestPacer {
    last: Arc<Mutex<Option<Instant>>>,
    interval: Duration,
}

impl RequestPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            last: Arc::new(Mutex::new(None)),
            interval,
        }
    }

    /// Wait until the interval since the previous request has elapsed.
    /// The first call returns immediately.
    pub async fn pace(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
