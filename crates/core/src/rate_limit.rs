//! Fixed-window admission limiter keyed by source address.
//!
//! Used by the real-time hub to cap how many new connections a single
//! network address may open per window. State is process-local and is lost
//! on restart.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use chrono::Duration;

use crate::clock::Clock;
use crate::types::Timestamp;

/// Default number of connection attempts admitted per window.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default window length in seconds.
pub const DEFAULT_WINDOW_SECS: i64 = 60;

/// Returned when an address has used up its attempts for the current window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Too many connection attempts from {addr}; retry after {retry_after_secs}s")]
pub struct RateLimited {
    pub addr: IpAddr,
    pub retry_after_secs: i64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Timestamp,
    attempts: u32,
}

/// Per-address attempt counter with a fixed window.
pub struct ConnectionRateLimiter {
    max_attempts: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl ConnectionRateLimiter {
    pub fn new(max_attempts: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_attempts,
            window,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record a connection attempt from `addr`.
    ///
    /// Every attempt counts, including rejected ones, so a client hammering
    /// the endpoint stays locked out until its window elapses.
    pub fn check(&self, addr: IpAddr) -> Result<(), RateLimited> {
        let now = self.clock.now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        let entry = windows.entry(addr).or_insert(Window {
            started_at: now,
            attempts: 0,
        });
        if now - entry.started_at >= self.window {
            *entry = Window {
                started_at: now,
                attempts: 0,
            };
        }
        entry.attempts = entry.attempts.saturating_add(1);

        if entry.attempts > self.max_attempts {
            let retry_after = self.window - (now - entry.started_at);
            return Err(RateLimited {
                addr,
                retry_after_secs: retry_after.num_seconds().max(1),
            });
        }
        Ok(())
    }

    /// Drop every window that has fully elapsed. Returns how many were
    /// removed.
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|_, w| now - w.started_at < self.window);
        before - windows.len()
    }

    /// Number of addresses currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
