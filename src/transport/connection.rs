use std::time::Duration;

use tracing::{error, info, warn};

use super::traits::CloseReason;
use crate::metrics::prometheus::{record_connection_state, record_reconnect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    WarmingUp,
    Ready,
    Reconnecting,
    LoggedOut,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::WarmingUp => "warming_up",
            ConnectionState::Ready => "ready",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::LoggedOut => "logged_out",
        }
    }
}

/// `delay(attempt) = base * growth^attempt`, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub growth: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let growth = self.growth.max(1.0);
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * growth.powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    /// Quiet period after `open` during which inbound traffic is ignored.
    pub warmup: Duration,
    pub backoff: BackoffPolicy,
}

/// What the owner of the transport must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    None,
    /// Arm the warm-up timer; report back with this epoch.
    StartWarmup { epoch: u64, delay: Duration },
    /// Warm-up finished; polling may start.
    Ready,
    /// Sleep `delay`, then report back through `on_reconnect_due`.
    Reconnect { attempt: u32, delay: Duration },
    /// Call `SessionTransport::connect` now.
    Connect,
    /// Session was logged out. Nothing more will happen automatically.
    LoggedOut,
    /// Reconnect budget exhausted.
    GiveUp { attempts: u32 },
}

/// Lifecycle state machine for one transport. Holds no timers itself: every
/// delay is handed to the caller as a [`Directive`], so transitions can be
/// driven without a clock.
#[derive(Debug)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: ConnectionState,
    attempt: u32,
    // Bumped on every open/close so a late warm-up timer can be recognised.
    epoch: u64,
    exhausted: bool,
    last_qr: Option<String>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        record_connection_state(ConnectionState::Connecting);
        Self {
            config,
            state: ConnectionState::Connecting,
            attempt: 0,
            epoch: 0,
            exhausted: false,
            last_qr: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Most recent login QR payload, for an external viewer.
    pub fn last_qr(&self) -> Option<&str> {
        self.last_qr.as_deref()
    }

    pub fn on_qr(&mut self, payload: String) {
        info!(len = payload.len(), "login QR received, scan to authenticate");
        self.last_qr = Some(payload);
    }

    pub fn on_connecting(&mut self) -> Directive {
        if matches!(self.state, ConnectionState::Reconnecting) && !self.exhausted {
            self.transition(ConnectionState::Connecting);
        }
        Directive::None
    }

    pub fn on_open(&mut self) -> Directive {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Reconnecting if !self.exhausted => {
                self.epoch += 1;
                self.last_qr = None;
                self.transition(ConnectionState::WarmingUp);
                Directive::StartWarmup {
                    epoch: self.epoch,
                    delay: self.config.warmup,
                }
            }
            _ => Directive::None,
        }
    }

    pub fn on_warmup_elapsed(&mut self, epoch: u64) -> Directive {
        if self.state != ConnectionState::WarmingUp || epoch != self.epoch {
            return Directive::None;
        }
        self.attempt = 0;
        self.transition(ConnectionState::Ready);
        Directive::Ready
    }

    pub fn on_close(&mut self, reason: &CloseReason) -> Directive {
        match self.state {
            ConnectionState::LoggedOut | ConnectionState::Reconnecting => return Directive::None,
            _ => {}
        }
        self.epoch += 1;

        if reason.is_terminal() {
            error!("session logged out, manual re-authentication required");
            self.transition(ConnectionState::LoggedOut);
            return Directive::LoggedOut;
        }

        self.transition(ConnectionState::Reconnecting);

        let max_attempts = self.config.backoff.max_attempts;
        if self.attempt >= max_attempts {
            self.exhausted = true;
            error!(attempts = self.attempt, "reconnect attempts exhausted");
            return Directive::GiveUp {
                attempts: self.attempt,
            };
        }

        let delay = self.config.backoff.delay(self.attempt);
        self.attempt += 1;
        record_reconnect();
        warn!(
            ?reason,
            attempt = self.attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "session closed, scheduling reconnect"
        );

        Directive::Reconnect {
            attempt: self.attempt,
            delay,
        }
    }

    pub fn on_reconnect_due(&mut self) -> Directive {
        if self.state != ConnectionState::Reconnecting || self.exhausted {
            return Directive::None;
        }
        self.transition(ConnectionState::Connecting);
        Directive::Connect
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        info!(from = self.state.as_str(), to = next.as_str(), "connection state changed");
        self.state = next;
        record_connection_state(next);
    }
}
