//! Fixed-window, per-client rate limiting for the generation path.
//!
//! Being limited never rejects a request; it only suppresses generation.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at_ms: i64,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<String, Window>,
    window_ms: i64,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window_ms: i64, max_requests: u32) -> Self {
        Self {
            windows: HashMap::new(),
            window_ms,
            max_requests,
        }
    }

    /// Records one request from `client` and reports whether it is over the
    /// ceiling for the current window. Limited requests are not counted.
    pub fn check(&mut self, client: &str, now_ms: i64) -> bool {
        let window = self.windows.entry(client.to_string()).or_insert(Window {
            started_at_ms: now_ms,
            count: 0,
        });

        if now_ms - window.started_at_ms >= self.window_ms {
            *window = Window {
                started_at_ms: now_ms,
                count: 0,
            };
        }

        if window.count >= self.max_requests {
            return true;
        }
        window.count += 1;
        false
    }

    /// Forgets windows that have fully elapsed.
    pub fn prune(&mut self, now_ms: i64) {
        let window_ms = self.window_ms;
        self.windows
            .retain(|_, w| now_ms - w.started_at_ms < window_ms);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
