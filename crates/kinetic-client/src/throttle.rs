//! Per-second rate throttle.
//!
//! Admits work against two limits that share one-second windows: a record
//! count and a cumulative byte size. A caller that would exceed either limit
//! waits for the next window. A request larger than a whole window's budget
//! is admitted into an empty window on its own, so it cannot starve.
//!
//! The limits come from the dispatcher's `msg_count_rate_limit` and
//! `msg_size_rate_limit` accessors; the dispatcher itself never throttles.

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::trace;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u64,
    bytes: u64,
}

#[derive(Debug)]
pub struct RateThrottle {
    count_limit: u64,
    size_limit: u64,
    window: Mutex<Window>,
}

impl RateThrottle {
    pub fn new(count_limit: u64, size_limit: u64) -> Self {
        Self {
            count_limit,
            size_limit,
            window: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
                bytes: 0,
            }),
        }
    }

    pub fn count_limit(&self) -> u64 {
        self.count_limit
    }

    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    /// Wait until `count` records totalling `bytes` fit in the current window,
    /// then charge them to it.
    pub async fn acquire(&self, count: u64, bytes: u64) {
        loop {
            let next_window = {
                let mut window = self.window.lock().await;
                if self.admit(&mut window, count, bytes) {
                    return;
                }
                window.started + WINDOW
            };
            trace!(count, bytes, "Rate limit reached, waiting for next window");
            sleep_until(next_window).await;
        }
    }

    /// Charge without waiting. Returns false when the window is exhausted.
    pub async fn try_acquire(&self, count: u64, bytes: u64) -> bool {
        let mut window = self.window.lock().await;
        self.admit(&mut window, count, bytes)
    }

    fn admit(&self, window: &mut Window, count: u64, bytes: u64) -> bool {
        let now = Instant::now();
        if now.duration_since(window.started) >= WINDOW {
            window.started = now;
            window.count = 0;
            window.bytes = 0;
        }

        let empty = window.count == 0 && window.bytes == 0;
        let fits = window.count + count <= self.count_limit
            && window.bytes + bytes <= self.size_limit;
        if !(empty || fits) {
            return false;
        }
        window.count += count;
        window.bytes += bytes;
        true
    }
}
