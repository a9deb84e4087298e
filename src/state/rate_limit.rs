use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Above this many tracked recipients, `record_send` drops entries whose
/// cooldown has already expired.
const PRUNE_ABOVE: usize = 1_024;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Minimum spacing between two replies to the same recipient.
    pub recipient_cooldown: Duration,
    /// Minimum spacing between any two sends.
    pub global_floor: Duration,
}

/// Per-recipient cooldown clock plus one global throttle clock.
///
/// Reading ([`allow`](Self::allow)) never mutates; only the `record_*`
/// calls move the clocks. Clones share the same clocks.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    last_send: Arc<DashMap<String, Instant>>,
    last_global: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            last_send: Arc::new(DashMap::new()),
            last_global: Arc::new(Mutex::new(None)),
        }
    }

    /// Both gates must pass: recipient cooldown and global floor.
    pub fn allow(&self, recipient: &str) -> bool {
        self.recipient_ready(recipient) && self.global_wait().is_zero()
    }

    pub fn recipient_ready(&self, recipient: &str) -> bool {
        self.last_send
            .get(recipient)
            .is_none_or(|last| last.elapsed() >= self.config.recipient_cooldown)
    }

    /// How long until the global floor opens again; zero if it already has.
    pub fn global_wait(&self) -> Duration {
        match *self.global() {
            Some(last) => self.config.global_floor.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Stamp both clocks for a reply to `recipient`.
    pub fn record_send(&self, recipient: &str) {
        let now = Instant::now();
        self.last_send.insert(recipient.to_string(), now);
        *self.global() = Some(now);

        if self.last_send.len() > PRUNE_ABOVE {
            let cooldown = self.config.recipient_cooldown;
            self.last_send.retain(|_, last| now.duration_since(*last) < cooldown);
        }
    }

    /// Stamp only the global clock (broadcast batches are exempt from the
    /// per-recipient cooldown).
    pub fn record_global(&self) {
        *self.global() = Some(Instant::now());
    }

    /// Sleep until the global floor allows another send.
    pub async fn wait_global(&self) {
        let wait = self.global_wait();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    fn global(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_global.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            recipient_cooldown: Duration::from_secs(10),
            global_floor: Duration::from_millis(500),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn allow_without_record_is_side_effect_free() {
        let limiter = limiter();
        limiter.record_send("a");
        tokio::time::advance(Duration::from_secs(1)).await;

        let first = limiter.allow("a");
        for _ in 0..5 {
            assert_eq!(limiter.allow("a"), first);
        }
        assert!(!first);
        assert!(limiter.allow("b"));
        assert!(limiter.allow("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn recipient_cooldown_expires() {
        let limiter = limiter();
        limiter.record_send("a");

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!limiter.allow("a"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.allow("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn global_floor_blocks_every_recipient() {
        let limiter = limiter();
        limiter.record_send("a");

        assert!(!limiter.allow("b"));
        assert_eq!(limiter.global_wait(), Duration::from_millis(500));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.allow("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_recipients_are_pruned() {
        let limiter = limiter();
        for i in 0..PRUNE_ABOVE + 500 {
            limiter.record_send(&format!("r{i}@c.us"));
        }
        assert_eq!(limiter.last_send.len(), PRUNE_ABOVE + 500);

        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.record_send("fresh@c.us");

        assert_eq!(limiter.last_send.len(), 1);
        assert!(!limiter.allow("fresh@c.us"));
        assert!(limiter.recipient_ready("r0@c.us"));
    }

    #[tokio::test(start_paused = true)]
    async fn recipients_inside_cooldown_survive_pruning() {
        let limiter = limiter();
        limiter.record_send("recent@c.us");
        for i in 0..PRUNE_ABOVE {
            limiter.record_send(&format!("r{i}@c.us"));
        }

        assert_eq!(limiter.last_send.len(), PRUNE_ABOVE + 1);
        assert!(!limiter.recipient_ready("recent@c.us"));
    }

    #[tokio::test(start_paused = true)]
    async fn record_global_leaves_recipients_alone() {
        let limiter = limiter();
        limiter.record_global();

        assert!(limiter.recipient_ready("a"));
        assert!(!limiter.allow("a"));

        let started = Instant::now();
        limiter.wait_global().await;
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert!(limiter.allow("a"));
    }
}
