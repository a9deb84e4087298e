use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;

use crate::bot::commands::Keywords;
use crate::broadcast::dispatcher::DispatchConfig;
use crate::monitor::debounce::DebounceConfig;
use crate::source::adapters::treasury::TREASURY_RATE_URL;
use crate::source::retry::RetryPolicy;
use crate::state::rate_limit::RateLimitConfig;
use crate::transport::connection::{BackoffPolicy, ConnectionConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub metrics_port: u16,

    pub source_url: String,
    pub source_timeout: Duration,
    /// Extra attempts after the first failed fetch.
    pub source_retries: u32,

    pub poll_interval: Duration,
    pub min_change: Decimal,
    pub debounce_window: Duration,
    pub min_broadcast_interval: Duration,

    pub batch_size: usize,
    pub batch_delay: Duration,
    pub send_timeout: Duration,

    pub reply_cooldown: Duration,
    pub global_send_floor: Duration,

    pub warmup: Duration,
    pub reconnect_base: Duration,
    pub reconnect_growth: f64,
    pub reconnect_max_delay: Duration,
    pub reconnect_max_attempts: u32,

    pub dedup_capacity: usize,
    pub history_capacity: usize,
    pub keywords: Keywords,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_port: 9000,
            source_url: TREASURY_RATE_URL.to_string(),
            source_timeout: Duration::from_millis(2_000),
            source_retries: 1,
            poll_interval: Duration::from_secs(15),
            min_change: Decimal::ONE,
            debounce_window: Duration::from_millis(5_000),
            min_broadcast_interval: Duration::from_secs(60),
            batch_size: 15,
            batch_delay: Duration::from_millis(1_500),
            send_timeout: Duration::from_millis(10_000),
            reply_cooldown: Duration::from_secs(10),
            global_send_floor: Duration::from_millis(300),
            warmup: Duration::from_secs(15),
            reconnect_base: Duration::from_millis(2_000),
            reconnect_growth: 2.0,
            reconnect_max_delay: Duration::from_secs(300),
            reconnect_max_attempts: 8,
            dedup_capacity: 2_000,
            history_capacity: 50,
            keywords: Keywords::default(),
        }
    }
}

/// Parse `key` if set, otherwise keep `default`.
fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn millis(key: &str, default: Duration) -> anyhow::Result<Duration> {
    parse_var(key, default.as_millis() as u64).map(Duration::from_millis)
}

fn secs(key: &str, default: Duration) -> anyhow::Result<Duration> {
    parse_var(key, default.as_secs()).map(Duration::from_secs)
}

fn keyword_list(key: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => parse_keyword_list(&raw).unwrap_or(default),
        Err(_) => default,
    }
}

/// Comma-separated, lower-cased, blanks dropped. `None` if nothing is left.
fn parse_keyword_list(raw: &str) -> Option<Vec<String>> {
    let words: Vec<String> = raw
        .split(',')
        .map(|w| w.trim().trim_start_matches('/').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    (!words.is_empty()).then_some(words)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // dotenvy loads .env, but doesn't override already-set env vars
        dotenvy::dotenv().ok();

        let d = Config::default();
        let keywords = Keywords {
            subscribe: keyword_list("SUBSCRIBE_KEYWORDS", d.keywords.subscribe.clone()),
            unsubscribe: keyword_list("UNSUBSCRIBE_KEYWORDS", d.keywords.unsubscribe.clone()),
            query: keyword_list("QUERY_KEYWORDS", d.keywords.query.clone()),
            help: keyword_list("HELP_KEYWORDS", d.keywords.help.clone()),
        };

        Ok(Self {
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| d.log_level.clone()),
            metrics_port: parse_var("METRICS_PORT", d.metrics_port)?,
            source_url: std::env::var("SOURCE_URL").unwrap_or_else(|_| d.source_url.clone()),
            source_timeout: millis("SOURCE_TIMEOUT_MS", d.source_timeout)?,
            source_retries: parse_var("SOURCE_RETRIES", d.source_retries)?,
            poll_interval: secs("POLL_INTERVAL_SECS", d.poll_interval)?,
            min_change: parse_var("MIN_CHANGE", d.min_change)?,
            debounce_window: millis("DEBOUNCE_MS", d.debounce_window)?,
            min_broadcast_interval: secs("MIN_BROADCAST_INTERVAL_SECS", d.min_broadcast_interval)?,
            batch_size: parse_var("BATCH_SIZE", d.batch_size)?,
            batch_delay: millis("BATCH_DELAY_MS", d.batch_delay)?,
            send_timeout: millis("SEND_TIMEOUT_MS", d.send_timeout)?,
            reply_cooldown: secs("REPLY_COOLDOWN_SECS", d.reply_cooldown)?,
            global_send_floor: millis("GLOBAL_SEND_FLOOR_MS", d.global_send_floor)?,
            warmup: secs("WARMUP_SECS", d.warmup)?,
            reconnect_base: millis("RECONNECT_BASE_MS", d.reconnect_base)?,
            reconnect_growth: parse_var("RECONNECT_GROWTH", d.reconnect_growth)?,
            reconnect_max_delay: secs("RECONNECT_MAX_DELAY_SECS", d.reconnect_max_delay)?,
            reconnect_max_attempts: parse_var("RECONNECT_MAX_ATTEMPTS", d.reconnect_max_attempts)?,
            dedup_capacity: parse_var("DEDUP_CAPACITY", d.dedup_capacity)?,
            history_capacity: parse_var("HISTORY_CAPACITY", d.history_capacity)?,
            keywords,
        })
    }

    pub fn source_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.source_retries + 1, self.source_timeout)
    }

    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig {
            window: self.debounce_window,
            min_interval: self.min_broadcast_interval,
        }
    }

    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            batch_size: self.batch_size,
            batch_delay: self.batch_delay,
            send_timeout: self.send_timeout,
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            recipient_cooldown: self.reply_cooldown,
            global_floor: self.global_send_floor,
        }
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            warmup: self.warmup,
            backoff: BackoffPolicy {
                base: self.reconnect_base,
                growth: self.reconnect_growth,
                max_delay: self.reconnect_max_delay,
                max_attempts: self.reconnect_max_attempts,
            },
        }
    }
}
