use reqwest::header::HeaderMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// Reddit's rate-limit counting interval, used only to seed `reset_at`
/// before the first response header update arrives.
const DEFAULT_WINDOW: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct RateLimiterState {
    remaining: Option<f64>,
    used: Option<f64>,
    next_request_at: Instant,
    reset_at: Instant,
}

/// Paces outgoing requests using Reddit's `x-ratelimit-*` response headers.
/// `delay()` is called immediately before sending a request, `update()`
/// immediately after receiving a response. The limiter is advisory: a caller
/// who bypasses `delay()` will simply see 429s from the server.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<RateLimiterState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(RateLimiterState {
                remaining: None,
                used: None,
                next_request_at: now,
                reset_at: now + DEFAULT_WINDOW,
            }),
        }
    }

    /// Sleeps until the earliest moment the next request may be sent,
    /// clamped so that a stale computation never sleeps past the window's
    /// own reset.
    pub async fn delay(&self) {
        let wait = {
            let state = self.state.lock().await;
            let now = Instant::now();
            if state.next_request_at <= now {
                return;
            }
            let wait = state.next_request_at - now;
            let max_wait = state.reset_at.saturating_duration_since(now);
            wait.min(max_wait)
        };

        if wait > Duration::ZERO {
            debug!("rate limiter pacing request, sleeping {:?}", wait);
            sleep(wait).await;
        }
    }

    /// Updates pacing state from a response's rate-limit headers. Missing
    /// headers (e.g. unauthenticated endpoints) clear the enforced delay
    /// without touching anything else.
    pub async fn update(&self, headers: &HeaderMap) {
        let remaining = header_f64(headers, "x-ratelimit-remaining");
        let used = header_f64(headers, "x-ratelimit-used");
        let reset_secs = header_f64(headers, "x-ratelimit-reset");

        let mut state = self.state.lock().await;

        let (remaining, used, reset_secs) = match (remaining, used, reset_secs) {
            (Some(r), Some(u), Some(s)) => (r, u, s),
            _ => {
                state.next_request_at = Instant::now();
                return;
            }
        };

        let now = Instant::now();
        let reset_at = now + Duration::from_secs_f64(reset_secs.max(0.0));

        // Under concurrent updates, the one carrying the later reset wins so
        // the window never regresses backwards.
        if reset_at >= state.reset_at {
            state.reset_at = reset_at;
        }

        // `remaining < 1.0` (not just `== 0.0`) takes the full-window-wait
        // branch: a fractional remaining below 1 would otherwise compute
        // `s / remaining > s`, landing past `reset_at` and violating the
        // invariant that `next_request_at` never exceeds it.
        let next_at = if remaining < 1.0 {
            reset_at
        } else if remaining <= used {
            (now + Duration::from_secs_f64(reset_secs / remaining)).min(reset_at)
        } else {
            now
        };

        state.next_request_at = next_at;
        state.remaining = Some(remaining);
        state.used = Some(used);
    }

    pub async fn remaining(&self) -> Option<f64> {
        self.state.lock().await.remaining
    }

    pub async fn used(&self) -> Option<f64> {
        self.state.lock().await.used
    }
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}
