use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use habitsync_core::user_fingerprint;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;

/// Sync routes guarded by a per-user fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectedEndpoint {
    SyncPull,
    SyncPush,
    /// Shares the pull budget; it is a read of the same user's data.
    ConflictList,
}

impl ProtectedEndpoint {
    const COUNT: usize = 3;

    pub const fn label(self) -> &'static str {
        match self {
            Self::SyncPull => "sync_pull",
            Self::SyncPush => "sync_push",
            Self::ConflictList => "sync_conflicts",
        }
    }

    const fn slot(self) -> usize {
        match self {
            Self::SyncPull => 0,
            Self::SyncPush => 1,
            Self::ConflictList => 2,
        }
    }
}

/// Fixed-window limiter keyed by endpoint and user.
///
/// Windows that have run out are swept at most once per window length, so
/// the table only holds users seen during roughly the last two windows.
pub struct EndpointRateLimiter {
    windows: Mutex<WindowTable>,
    window: Duration,
    limits: [u32; ProtectedEndpoint::COUNT],
    allowed: [AtomicU64; ProtectedEndpoint::COUNT],
    limited: [AtomicU64; ProtectedEndpoint::COUNT],
}

struct WindowTable {
    by_user: HashMap<(ProtectedEndpoint, String), RateWindow>,
    last_sweep: Instant,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub pull_allowed: u64,
    pub pull_limited: u64,
    pub push_allowed: u64,
    pub push_limited: u64,
    pub conflicts_allowed: u64,
    pub conflicts_limited: u64,
    pub active_windows: usize,
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            config.sync_pull_rate_limit_per_window,
            config.sync_push_rate_limit_per_window,
        )
    }

    fn new(window: Duration, pull_limit: u32, push_limit: u32) -> Self {
        Self {
            windows: Mutex::new(WindowTable {
                by_user: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            window,
            limits: [pull_limit, push_limit, pull_limit],
            allowed: Default::default(),
            limited: Default::default(),
        }
    }

    pub async fn check(&self, endpoint: ProtectedEndpoint, user_id: &str) -> Result<(), AppError> {
        let now = Instant::now();
        let mut table = self.windows.lock().await;
        self.sweep_expired(&mut table, now);

        let entry = table
            .by_user
            .entry((endpoint, user_id.to_string()))
            .or_insert(RateWindow {
                started_at: now,
                count: 0,
            });
        if now.duration_since(entry.started_at) >= self.window {
            *entry = RateWindow {
                started_at: now,
                count: 0,
            };
        }

        if entry.count >= self.limits[endpoint.slot()] {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs()
                .max(1);
            self.limited[endpoint.slot()].fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint = endpoint.label(),
                user = user_fingerprint(user_id),
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                "Rate limit exceeded for sync endpoint",
                retry_after_secs,
            ));
        }

        entry.count += 1;
        self.allowed[endpoint.slot()].fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        let active_windows = self.windows.lock().await.by_user.len();
        let allowed =
            |endpoint: ProtectedEndpoint| self.allowed[endpoint.slot()].load(Ordering::Relaxed);
        let limited =
            |endpoint: ProtectedEndpoint| self.limited[endpoint.slot()].load(Ordering::Relaxed);

        RateLimitMetricsSnapshot {
            pull_allowed: allowed(ProtectedEndpoint::SyncPull),
            pull_limited: limited(ProtectedEndpoint::SyncPull),
            push_allowed: allowed(ProtectedEndpoint::SyncPush),
            push_limited: limited(ProtectedEndpoint::SyncPush),
            conflicts_allowed: allowed(ProtectedEndpoint::ConflictList),
            conflicts_limited: limited(ProtectedEndpoint::ConflictList),
            active_windows,
        }
    }

    fn sweep_expired(&self, table: &mut WindowTable, now: Instant) {
        if now.duration_since(table.last_sweep) < self.window {
            return;
        }
        let before = table.by_user.len();
        table
            .by_user
            .retain(|_, window| now.duration_since(window.started_at) < self.window);
        table.last_sweep = now;

        let evicted = before - table.by_user.len();
        if evicted > 0 {
            tracing::debug!(
                evicted,
                remaining = table.by_user.len(),
                "Swept expired rate windows"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn rate_limiter_blocks_after_limit() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 2, 2);

        limiter
            .check(ProtectedEndpoint::SyncPull, "user-a")
            .await
            .unwrap();
        limiter
            .check(ProtectedEndpoint::SyncPull, "user-a")
            .await
            .unwrap();

        let err = limiter
            .check(ProtectedEndpoint::SyncPull, "user-a")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_, secs) if secs > 0));

        let metrics = limiter.metrics_snapshot().await;
        assert_eq!(metrics.pull_allowed, 2);
        assert_eq!(metrics.pull_limited, 1);
    }

    #[tokio::test]
    async fn rate_limiter_tracks_users_and_endpoints_separately() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 1, 1);

        limiter
            .check(ProtectedEndpoint::SyncPull, "user-a")
            .await
            .unwrap();
        limiter
            .check(ProtectedEndpoint::SyncPush, "user-a")
            .await
            .unwrap();
        limiter
            .check(ProtectedEndpoint::ConflictList, "user-a")
            .await
            .unwrap();
        limiter
            .check(ProtectedEndpoint::SyncPull, "user-b")
            .await
            .unwrap();

        assert!(limiter
            .check(ProtectedEndpoint::SyncPush, "user-a")
            .await
            .is_err());
        let metrics = limiter.metrics_snapshot().await;
        assert_eq!(metrics.push_allowed, 1);
        assert_eq!(metrics.push_limited, 1);
        assert_eq!(metrics.conflicts_allowed, 1);
        assert_eq!(metrics.active_windows, 4);
    }

    #[tokio::test]
    async fn expired_windows_are_evicted() {
        let limiter = EndpointRateLimiter::new(Duration::from_millis(200), 10, 10);

        for user in 0..1_000 {
            limiter
                .check(ProtectedEndpoint::SyncPull, &format!("user-{user}"))
                .await
                .unwrap();
        }
        assert_eq!(limiter.metrics_snapshot().await.active_windows, 1_000);

        tokio::time::sleep(Duration::from_millis(450)).await;
        limiter
            .check(ProtectedEndpoint::SyncPush, "late-user")
            .await
            .unwrap();

        assert_eq!(limiter.metrics_snapshot().await.active_windows, 1);
    }

    #[tokio::test]
    async fn window_reopens_after_expiry() {
        let limiter = EndpointRateLimiter::new(Duration::from_millis(100), 1, 1);

        limiter
            .check(ProtectedEndpoint::SyncPush, "user-a")
            .await
            .unwrap();
        assert!(limiter
            .check(ProtectedEndpoint::SyncPush, "user-a")
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(250)).await;
        limiter
            .check(ProtectedEndpoint::SyncPush, "user-a")
            .await
            .unwrap();
    }
}
