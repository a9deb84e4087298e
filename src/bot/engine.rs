use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::commands::{Command, Keywords};
use super::render::{FETCH_FAILED, Renderer, SUBSCRIBED, UNSUBSCRIBED, help_text};
use crate::broadcast::dispatcher::Dispatcher;
use crate::broadcast::types::{BroadcastHistory, BroadcastRecord};
use crate::config::Config;
use crate::error::BotError;
use crate::metrics::prometheus::{
    record_broadcast, record_change_detected, record_duplicate_inbound, record_poll,
    record_rate_limited, record_reply, record_subscribers,
};
use crate::monitor::debounce::{DebounceScheduler, FireDecision};
use crate::monitor::detector::ChangeDetector;
use crate::source::retry::RetryPolicy;
use crate::source::traits::ValueSource;
use crate::source::types::ValueSnapshot;
use crate::state::dedup::DedupGuard;
use crate::state::rate_limit::RateLimiter;
use crate::state::subscribers::SubscriptionRegistry;
use crate::transport::connection::{ConnectionManager, Directive};
use crate::transport::traits::{CloseReason, InboundMessage, SessionTransport, TransportEvent};

/// Engine-internal events: timers firing and spawned work reporting back.
/// Sized to absorb a burst of inbound messages without back-pressuring the
/// transport.
const EVENT_CHANNEL_BUFFER: usize = 1_024;

#[derive(Debug)]
pub enum Event {
    WarmupElapsed { epoch: u64 },
    ReconnectDue,
    Polled(anyhow::Result<ValueSnapshot>),
    DebounceFired { generation: u64 },
    /// `None` if the dispatcher refused the request.
    BroadcastFinished(Option<BroadcastRecord>),
    /// The dispatch task panicked or was cancelled before reporting.
    BroadcastAborted,
}

enum Reply {
    Text(String),
    /// Fetch and render the current value; on failure send the retry hint.
    Fresh,
}

/// Single-writer event loop.
///
/// All state lives here and is only mutated from [`Engine::run`]. Anything
/// that does network I/O (polls, replies, broadcasts, connects) is spawned and
/// reports back through the event channel.
pub struct Engine {
    source: Arc<dyn ValueSource>,
    transport: Arc<dyn SessionTransport>,
    retry: RetryPolicy,
    render: Renderer,
    keywords: Keywords,
    poll_interval: Duration,
    send_timeout: Duration,

    connection: ConnectionManager,
    detector: ChangeDetector,
    debounce: DebounceScheduler<Event>,
    dispatcher: Dispatcher,
    registry: SubscriptionRegistry,
    limiter: RateLimiter,
    dedup: DedupGuard,
    history: BroadcastHistory,

    poll_in_flight: bool,
    broadcasting: bool,

    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    transport_tx: mpsc::Sender<TransportEvent>,
    transport_rx: mpsc::Receiver<TransportEvent>,
}

impl Engine {
    pub fn new(
        config: &Config,
        source: Arc<dyn ValueSource>,
        transport: Arc<dyn SessionTransport>,
        render: Renderer,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let (transport_tx, transport_rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);

        let registry = SubscriptionRegistry::new();
        let limiter = RateLimiter::new(config.rate_limit());
        let retry = config.source_retry();

        let dispatcher = Dispatcher::new(
            transport.clone(),
            source.clone(),
            retry,
            render,
            registry.clone(),
            limiter.clone(),
            config.dispatch(),
        );
        let debounce = DebounceScheduler::new(config.debounce(), events_tx.clone(), |generation| {
            Event::DebounceFired { generation }
        });

        Self {
            source,
            transport,
            retry,
            render,
            keywords: config.keywords.clone(),
            poll_interval: config.poll_interval,
            send_timeout: config.send_timeout,
            connection: ConnectionManager::new(config.connection()),
            detector: ChangeDetector::new(config.min_change),
            debounce,
            dispatcher,
            registry,
            limiter,
            dedup: DedupGuard::new(config.dedup_capacity),
            history: BroadcastHistory::new(config.history_capacity),
            poll_in_flight: false,
            broadcasting: false,
            events_tx,
            events_rx,
            transport_tx,
            transport_rx,
        }
    }

    #[cfg(test)]
    pub fn registry(&self) -> SubscriptionRegistry {
        self.registry.clone()
    }

    #[cfg(test)]
    pub fn history(&self) -> &BroadcastHistory {
        &self.history
    }

    #[cfg(test)]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    #[cfg(test)]
    pub fn baseline(&self) -> Option<&ValueSnapshot> {
        self.detector.last_broadcast()
    }

    /// Connect the transport and process events until a terminal condition.
    pub async fn run(&mut self) -> Result<(), BotError> {
        info!(
            source = self.source.name(),
            transport = self.transport.name(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "engine started"
        );
        self.connect();

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = self.transport_rx.recv() => {
                    let event = event.ok_or(BotError::ChannelClosed)?;
                    self.on_transport_event(event)?;
                }
                event = self.events_rx.recv() => {
                    let event = event.ok_or(BotError::ChannelClosed)?;
                    self.on_event(event)?;
                }
                _ = poll.tick() => self.on_poll_tick(),
            }
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    fn connect(&self) {
        let transport = self.transport.clone();
        let tx = self.transport_tx.clone();

        tokio::spawn(async move {
            if let Err(err) = transport.connect(tx.clone()).await {
                warn!(error = %err, "transport connect failed");
                let _ = tx
                    .send(TransportEvent::Close(CloseReason::Other(err.to_string())))
                    .await;
            }
        });
    }

    fn on_transport_event(&mut self, event: TransportEvent) -> Result<(), BotError> {
        match event {
            TransportEvent::Connecting => {
                let directive = self.connection.on_connecting();
                self.apply(directive)
            }
            TransportEvent::Open => {
                let directive = self.connection.on_open();
                self.apply(directive)
            }
            TransportEvent::Qr(payload) => {
                self.connection.on_qr(payload);
                if let Some(qr) = self.connection.last_qr() {
                    debug!(payload = qr, "login QR payload");
                }
                Ok(())
            }
            TransportEvent::Close(reason) => {
                let directive = self.connection.on_close(&reason);
                self.apply(directive)
            }
            TransportEvent::Message(message) => {
                self.on_inbound(message);
                Ok(())
            }
        }
    }

    fn apply(&mut self, directive: Directive) -> Result<(), BotError> {
        match directive {
            Directive::None => {}
            Directive::StartWarmup { epoch, delay } => {
                info!(warmup_ms = delay.as_millis() as u64, "session open, warming up");
                self.after(delay, Event::WarmupElapsed { epoch });
            }
            Directive::Ready => info!("session ready, polling enabled"),
            Directive::Reconnect { delay, .. } => {
                self.debounce.cancel();
                self.after(delay, Event::ReconnectDue);
            }
            Directive::Connect => self.connect(),
            Directive::LoggedOut => {
                self.debounce.cancel();
                return Err(BotError::LoggedOut);
            }
            Directive::GiveUp { attempts } => {
                self.debounce.cancel();
                return Err(BotError::ReconnectExhausted { attempts });
            }
        }
        Ok(())
    }

    fn after(&self, delay: Duration, event: Event) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event).await;
        });
    }

    fn on_event(&mut self, event: Event) -> Result<(), BotError> {
        match event {
            Event::WarmupElapsed { epoch } => {
                let directive = self.connection.on_warmup_elapsed(epoch);
                self.apply(directive)?;
            }
            Event::ReconnectDue => {
                let directive = self.connection.on_reconnect_due();
                self.apply(directive)?;
            }
            Event::Polled(result) => self.on_polled(result),
            Event::DebounceFired { generation } => self.on_debounce_fired(generation),
            Event::BroadcastFinished(record) => self.on_broadcast_finished(record),
            Event::BroadcastAborted => self.on_broadcast_aborted(),
        }
        Ok(())
    }

    // ── Polling and change detection ─────────────────────────────────

    fn on_poll_tick(&mut self) {
        if !self.connection.is_ready() {
            return;
        }
        if self.poll_in_flight {
            debug!("previous poll still running, skipping tick");
            record_poll(self.source.name(), "skipped");
            return;
        }
        self.poll_in_flight = true;

        let source = self.source.clone();
        let retry = self.retry;
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let result = retry.run(source.name(), || source.fetch()).await;
            let _ = tx.send(Event::Polled(result)).await;
        });
    }

    fn on_polled(&mut self, result: anyhow::Result<ValueSnapshot>) {
        self.poll_in_flight = false;

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "poll failed, skipping tick");
                record_poll(self.source.name(), "failed");
                return;
            }
        };
        record_poll(self.source.name(), "ok");

        if !self.connection.is_ready() {
            debug!("connection left ready during poll, discarding result");
            return;
        }

        let idle = !self.debounce.is_pending() && !self.broadcasting;
        if let Some(change) = self.detector.observe(snapshot, idle) {
            info!(
                primary = %change.snapshot.primary,
                secondary = %change.snapshot.secondary,
                delta_primary = %change.since_last_broadcast.primary,
                delta_secondary = %change.since_last_broadcast.secondary,
                "change detected, (re)arming debounce"
            );
            record_change_detected();
            self.debounce.on_change(change);
        }
    }

    // ── Broadcast ────────────────────────────────────────────────────

    fn on_debounce_fired(&mut self, generation: u64) {
        let change = match self.debounce.take_fired(generation) {
            FireDecision::Dispatch(change) => change,
            FireDecision::TooSoon { .. } => {
                record_broadcast("dropped_interval");
                return;
            }
            FireDecision::Stale => return,
        };

        if !self.connection.is_ready() {
            info!("debounce fired while not ready, dropping");
            return;
        }
        if self.broadcasting {
            info!("broadcast already in flight, dropping debounce firing");
            record_broadcast("dropped_busy");
            return;
        }

        // The decision is made here; later polls compare against this value.
        self.detector.mark_broadcast(change.snapshot.clone());
        self.broadcasting = true;

        let dispatcher = self.dispatcher.clone();
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move { dispatcher.broadcast(change.snapshot).await });
        tokio::spawn(async move {
            let event = match task.await {
                Ok(record) => Event::BroadcastFinished(record),
                Err(err) => {
                    warn!(error = %err, "broadcast task died");
                    Event::BroadcastAborted
                }
            };
            let _ = tx.send(event).await;
        });
    }

    fn on_broadcast_finished(&mut self, record: Option<BroadcastRecord>) {
        self.broadcasting = false;

        let Some(record) = record else {
            record_broadcast("dropped_busy");
            return;
        };

        self.detector.mark_broadcast(record.baseline.clone());
        self.debounce.mark_completed();
        record_broadcast("sent");

        let took_ms = record
            .fired_at
            .elapsed()
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        if !record.fully_delivered() {
            warn!(
                delivered = record.delivered(),
                failed = record.failed(),
                took_ms,
                "broadcast partially delivered"
            );
        }
        self.history.push(record);
        debug!(kept = self.history.len(), "broadcast recorded");
    }

    /// The baseline stays at the trigger, so a value that brought the task
    /// down is not retried until it moves again.
    fn on_broadcast_aborted(&mut self) {
        self.broadcasting = false;
        record_broadcast("aborted");
    }

    // ── Inbound ──────────────────────────────────────────────────────

    fn on_inbound(&mut self, message: InboundMessage) {
        if message.is_self || !message.is_chat() {
            return;
        }
        if !self.connection.is_ready() {
            debug!(id = %message.id, state = self.connection.state().as_str(), "ignoring inbound before ready");
            return;
        }
        if self.dedup.check_and_record(&message.id) {
            debug!(id = %message.id, "duplicate inbound ignored");
            record_duplicate_inbound();
            return;
        }

        let Some(command) = self.keywords.parse(&message.text) else {
            return;
        };
        info!(sender = %message.sender, command = command.as_str(), "command received");

        let reply = match command {
            Command::Subscribe => {
                self.registry.subscribe(&message.sender);
                record_subscribers(self.registry.len());
                Reply::Text(SUBSCRIBED.to_string())
            }
            Command::Unsubscribe => {
                self.registry.unsubscribe(&message.sender);
                record_subscribers(self.registry.len());
                Reply::Text(UNSUBSCRIBED.to_string())
            }
            Command::Help => Reply::Text(help_text()),
            Command::Query => Reply::Fresh,
        };

        self.reply(message.sender, command, reply);
    }

    fn reply(&self, recipient: String, command: Command, reply: Reply) {
        if !self.limiter.allow(&recipient) {
            debug!(recipient = %recipient, command = command.as_str(), "reply rate limited");
            record_rate_limited(command.as_str());
            return;
        }
        self.limiter.record_send(&recipient);

        let transport = self.transport.clone();
        let source = self.source.clone();
        let retry = self.retry;
        let render = self.render;
        let send_timeout = self.send_timeout;

        tokio::spawn(async move {
            let text = match reply {
                Reply::Text(text) => text,
                Reply::Fresh => match retry.run(source.name(), || source.fetch()).await {
                    Ok(snapshot) => render(&snapshot),
                    Err(_) => FETCH_FAILED.to_string(),
                },
            };

            let ok = match tokio::time::timeout(send_timeout, transport.send(&recipient, &text)).await {
                Ok(Ok(())) => true,
                Ok(Err(err)) => {
                    warn!(recipient = %recipient, error = %err, "reply failed");
                    false
                }
                Err(_) => {
                    warn!(recipient = %recipient, "reply timed out");
                    false
                }
            };
            record_reply(command.as_str(), ok);
        });
    }
}
