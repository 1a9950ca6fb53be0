//! Inbound rate limiting per client identity.
//!
//! Fixed-window counters. The Redis backend shares counters across instances
//! and increments atomically with a Lua script; the memory backend is for a
//! single instance and tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Bound on the time spent establishing the Redis connection at startup.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Memory backend prunes stale windows once it holds this many identities.
const MEMORY_PRUNE_THRESHOLD: usize = 10_000;

/// INCR the counter, set its TTL on the first hit, return `{count, pttl}`.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
return {count, ttl}
"#;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit store unreachable: {0}")]
    Connect(String),

    #[error("rate limit store error: {0}")]
    Store(String),
}

impl From<redis::RedisError> for RateLimitError {
    fn from(e: redis::RedisError) -> Self {
        Self::Store(e.to_string())
    }
}

/// What to do when the counter store fails at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RateLimitFailureMode {
    /// Reject the request (503).
    #[default]
    Closed,
    /// Let the request through and log a warning.
    Open,
}

impl std::str::FromStr for RateLimitFailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "closed" => Ok(Self::Closed),
            "open" => Ok(Self::Open),
            other => Err(format!("unknown rate limit failure mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Redis { url: String },
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub failure_mode: RateLimitFailureMode,
    pub backend: RateLimitBackend,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            failure_mode: RateLimitFailureMode::Closed,
            backend: RateLimitBackend::Memory,
        }
    }
}

/// Outcome of one counted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the identity's window resets.
    pub retry_after: Duration,
}

/// Backing store for the per-identity window counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one hit on `key` and return the hits so far in the current
    /// window together with the time left in it.
    async fn hit(&self, key: &str, window: Duration) -> Result<(u32, Duration), RateLimitError>;

    fn name(&self) -> &'static str;
}

struct Window {
    started: Instant,
    count: u32,
}

#[derive(Default)]
struct MemoryCounters {
    windows: DashMap<String, Window>,
}

#[async_trait]
impl CounterStore for MemoryCounters {
    async fn hit(&self, key: &str, window: Duration) -> Result<(u32, Duration), RateLimitError> {
        let now = Instant::now();

        if self.windows.len() > MEMORY_PRUNE_THRESHOLD {
            self.windows
                .retain(|_, w| now.duration_since(w.started) < window);
        }

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);
        let elapsed = now.duration_since(entry.started);
        Ok((entry.count, window.saturating_sub(elapsed)))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct RedisCounters {
    conn: ConnectionManager,
    script: redis::Script,
}

#[async_trait]
impl CounterStore for RedisCounters {
    async fn hit(&self, key: &str, window: Duration) -> Result<(u32, Duration), RateLimitError> {
        let mut conn = self.conn.clone();
        let (count, ttl_ms): (i64, i64) = self
            .script
            .key(key)
            .arg(window.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        let retry_after = if ttl_ms > 0 {
            Duration::from_millis(ttl_ms as u64)
        } else {
            window
        };
        Ok((count.clamp(0, u32::MAX as i64) as u32, retry_after))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Counts requests per identity against the configured window.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: Arc<RateLimitConfig>,
}

impl RateLimiter {
    /// In-memory limiter, regardless of the configured backend.
    pub fn memory(config: RateLimitConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryCounters::default()))
    }

    /// Limiter over a caller-supplied counter store. The configured backend
    /// is ignored.
    pub fn with_store(config: RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Build the configured backend. For Redis the store must answer a PING,
    /// otherwise startup fails.
    pub async fn connect(config: RateLimitConfig) -> Result<Self, RateLimitError> {
        let url = match &config.backend {
            RateLimitBackend::Memory => {
                info!(
                    max_requests = config.max_requests,
                    window_secs = config.window.as_secs(),
                    "using in-memory rate limiter"
                );
                return Ok(Self::memory(config));
            }
            RateLimitBackend::Redis { url } => url.clone(),
        };

        let client =
            redis::Client::open(url.as_str()).map_err(|e| RateLimitError::Connect(e.to_string()))?;
        let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| RateLimitError::Connect("connection timed out".into()))?
            .map_err(|e| RateLimitError::Connect(e.to_string()))?;

        let pong: String = tokio::time::timeout(
            CONNECT_TIMEOUT,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        .map_err(|_| RateLimitError::Connect("PING timed out".into()))?
        .map_err(|e| RateLimitError::Connect(e.to_string()))?;
        debug!(%pong, "rate limit store reachable");

        info!(
            max_requests = config.max_requests,
            window_secs = config.window.as_secs(),
            "using redis rate limiter"
        );
        let store = RedisCounters {
            conn,
            script: redis::Script::new(INCREMENT_SCRIPT),
        };
        Ok(Self::with_store(config, Arc::new(store)))
    }

    pub fn failure_mode(&self) -> RateLimitFailureMode {
        self.config.failure_mode
    }

    /// Count one request for `identity` and decide whether it may proceed.
    pub async fn allow(&self, identity: &str) -> Result<RateDecision, RateLimitError> {
        let key = format!("ratelimit:{identity}");
        let (count, retry_after) = self.store.hit(&key, self.config.window).await?;

        let max = self.config.max_requests;
        let decision = RateDecision {
            allowed: count <= max,
            remaining: max.saturating_sub(count),
            retry_after,
        };
        if !decision.allowed {
            warn!(identity, count, max, "rate limit exceeded");
        }
        Ok(decision)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.store.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window: Duration) -> RateLimiter {
        RateLimiter::memory(RateLimitConfig {
            max_requests,
            window,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn request_after_the_limit_is_denied() {
        let rl = limiter(5, Duration::from_secs(60));
        for i in 0..5 {
            let d = rl.allow("10.0.0.1").await.unwrap();
            assert!(d.allowed, "request {i} should pass");
            assert_eq!(d.remaining, 4 - i);
        }
        let denied = rl.allow("10.0.0.1").await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after > Duration::ZERO);
        assert!(denied.retry_after <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn identities_do_not_share_counters() {
        let rl = limiter(1, Duration::from_secs(60));
        assert!(rl.allow("a").await.unwrap().allowed);
        assert!(!rl.allow("a").await.unwrap().allowed);
        assert!(rl.allow("b").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn window_resets_after_it_elapses() {
        let rl = limiter(1, Duration::from_millis(50));
        assert!(rl.allow("c").await.unwrap().allowed);
        assert!(!rl.allow("c").await.unwrap().allowed);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rl.allow("c").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn memory_backend_connects_without_io() {
        let rl = RateLimiter::connect(RateLimitConfig::default()).await.unwrap();
        assert_eq!(rl.failure_mode(), RateLimitFailureMode::Closed);
        assert!(rl.allow("x").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn unreachable_redis_fails_startup() {
        // Reserve a port, then close it so connections are refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = RateLimiter::connect(RateLimitConfig {
            backend: RateLimitBackend::Redis {
                url: format!("redis://127.0.0.1:{port}/"),
            },
            ..Default::default()
        })
        .await;
        assert!(matches!(result, Err(RateLimitError::Connect(_))));
    }

    struct Unreachable;

    #[async_trait]
    impl CounterStore for Unreachable {
        async fn hit(&self, _: &str, _: Duration) -> Result<(u32, Duration), RateLimitError> {
            Err(RateLimitError::Store("connection reset".into()))
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    #[tokio::test]
    async fn store_errors_reach_the_caller() {
        let rl = RateLimiter::with_store(
            RateLimitConfig {
                failure_mode: RateLimitFailureMode::Open,
                ..Default::default()
            },
            Arc::new(Unreachable),
        );
        assert!(matches!(rl.allow("x").await, Err(RateLimitError::Store(_))));
        assert_eq!(rl.failure_mode(), RateLimitFailureMode::Open);
        assert!(format!("{rl:?}").contains("unreachable"));
    }

    #[test]
    fn failure_mode_parses_case_insensitively() {
        assert_eq!(
            "OPEN".parse::<RateLimitFailureMode>(),
            Ok(RateLimitFailureMode::Open)
        );
        assert_eq!(
            "closed".parse::<RateLimitFailureMode>(),
            Ok(RateLimitFailureMode::Closed)
        );
        assert!("sideways".parse::<RateLimitFailureMode>().is_err());
    }
}
