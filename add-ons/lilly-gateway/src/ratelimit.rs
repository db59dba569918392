//! Fixed-window per-IP rate limiting for the API routes.
//!
//! One window per client address; the first request in a window starts it and
//! the count resets when the window has elapsed. Stale entries are dropped
//! opportunistically on each check so the map stays proportional to the
//! number of recently active clients.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    windows: DashMap<IpAddr, Window>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
        }
    }

    /// Records one request from `ip`. Returns false when the client has
    /// exhausted its window.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut allowed = true;
        {
            let mut entry = self.windows.entry(ip).or_insert_with(|| Window {
                started: now,
                count: 0,
            });
            if now.duration_since(entry.started) >= self.window {
                entry.started = now;
                entry.count = 0;
            }
            entry.count += 1;
            if entry.count > self.limit {
                allowed = false;
            }
        }
        if !allowed {
            debug!(target: "lilly::gateway", %ip, "rate limit exceeded");
        }
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window * 2);
        allowed
    }
}
