//! Sliding-window token budget in front of every generation call.
//!
//! [`RateWindow`] is the pure bookkeeping: timestamps are passed in, so it can
//! be driven from property tests. [`RateLimiter`] wraps it for shared async
//! use: admissions are serialized by an async mutex, while the window itself
//! sits behind a short-lived sync mutex that is never held across a sleep.

use crate::config::RateLimitConfig;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Length of the trailing accounting window
pub const WINDOW: Duration = Duration::from_secs(60);

/// Reservation handed out by an admission; settle it with the real usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an admission must be recorded or released"]
pub struct Admission {
    id: u64,
    estimated_tokens: u64,
}

impl Admission {
    #[must_use]
    pub const fn estimated_tokens(&self) -> u64 {
        self.estimated_tokens
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    id: u64,
    at: Instant,
    tokens: u64,
}

/// Token usage over the trailing [`WINDOW`], oldest first
#[derive(Debug)]
pub struct RateWindow {
    budget: u64,
    entries: VecDeque<WindowEntry>,
    next_id: u64,
}

impl RateWindow {
    #[must_use]
    pub const fn new(budget: u64) -> Self {
        Self {
            budget,
            entries: VecDeque::new(),
            next_id: 0,
        }
    }

    #[must_use]
    pub const fn budget(&self) -> u64 {
        self.budget
    }

    /// Drop entries that are a full window old or older
    pub fn purge(&mut self, now: Instant) {
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.at) >= WINDOW {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    #[must_use]
    pub fn used(&self) -> u64 {
        self.entries.iter().map(|e| e.tokens).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How long to wait before `estimated` tokens fit, or `None` to admit now.
    ///
    /// Call after [`purge`](Self::purge). An empty window always admits, so a
    /// single request larger than the budget cannot wait forever. The wait is
    /// at most `WINDOW + margin`.
    #[must_use]
    pub fn wait_time(&self, estimated: u64, now: Instant, margin: Duration) -> Option<Duration> {
        let oldest = self.entries.front()?;
        if self.used().saturating_add(estimated) <= self.budget {
            return None;
        }
        let age = now.saturating_duration_since(oldest.at);
        Some(WINDOW.saturating_sub(age) + margin)
    }

    /// Count `estimated` tokens against the window until settled
    pub fn reserve(&mut self, estimated: u64, now: Instant) -> Admission {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(WindowEntry {
            id,
            at: now,
            tokens: estimated,
        });
        Admission {
            id,
            estimated_tokens: estimated,
        }
    }

    /// Replace a reservation with the actual usage, stamped at completion.
    ///
    /// A reservation that already aged out is recorded as a fresh entry.
    pub fn settle(&mut self, admission: Admission, actual: u64, now: Instant) {
        self.remove(admission);
        // `now` is the latest timestamp seen, so the deque stays ordered
        self.entries.push_back(WindowEntry {
            id: admission.id,
            at: now,
            tokens: actual,
        });
    }

    /// Forget a reservation whose call never went out
    pub fn release(&mut self, admission: Admission) {
        self.remove(admission);
    }

    fn remove(&mut self, admission: Admission) {
        if let Some(pos) = self.entries.iter().position(|e| e.id == admission.id) {
            self.entries.remove(pos);
        }
    }
}

/// Shared admission gate; clone the `Arc` to share it across runs
#[derive(Debug)]
pub struct RateLimiter {
    window: Mutex<RateWindow>,
    turn: tokio::sync::Mutex<()>,
    safety_margin: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(tokens_per_minute: u64, safety_margin: Duration) -> Self {
        Self {
            window: Mutex::new(RateWindow::new(tokens_per_minute)),
            turn: tokio::sync::Mutex::new(()),
            safety_margin,
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.tokens_per_minute,
            Duration::from_secs(config.safety_margin_secs),
        )
    }

    fn lock_window(&self) -> MutexGuard<'_, RateWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until `estimated_tokens` fit in the window, then reserve them
    pub async fn admit(&self, estimated_tokens: u64) -> Admission {
        let _turn = self.turn.lock().await;

        loop {
            let wait = {
                let mut window = self.lock_window();
                let now = Instant::now();
                window.purge(now);
                match window.wait_time(estimated_tokens, now, self.safety_margin) {
                    None => {
                        log::debug!(
                            "Admitted ~{} tokens ({}/{} used)",
                            estimated_tokens,
                            window.used(),
                            window.budget()
                        );
                        return window.reserve(estimated_tokens, now);
                    }
                    Some(wait) => {
                        log::info!(
                            "Rate limit approaching: {}/{} tokens used, sleeping {:.1}s",
                            window.used(),
                            window.budget(),
                            wait.as_secs_f64()
                        );
                        wait
                    }
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Account the real usage of an admitted call
    pub fn record(&self, admission: Admission, actual_tokens: u64) {
        if actual_tokens > admission.estimated_tokens() {
            log::debug!(
                "Call used {} tokens, estimate was {}",
                actual_tokens,
                admission.estimated_tokens()
            );
        }
        self.lock_window().settle(admission, actual_tokens, Instant::now());
    }

    /// Return the reservation of a call that failed before consuming tokens
    pub fn release(&self, admission: Admission) {
        self.lock_window().release(admission);
    }

    /// Tokens currently counted in the window
    #[must_use]
    pub fn used_tokens(&self) -> u64 {
        let mut window = self.lock_window();
        window.purge(Instant::now());
        window.used()
    }
}
