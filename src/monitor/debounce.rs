use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::detector::ChangeEvent;

#[derive(Debug, Clone, Copy)]
pub struct DebounceConfig {
    /// Quiet period that must pass with no new change before firing.
    pub window: Duration,
    /// Minimum spacing between completed broadcasts.
    pub min_interval: Duration,
}

/// What to do with a timer that just fired.
#[derive(Debug, PartialEq)]
pub enum FireDecision {
    /// Broadcast this (latest) event.
    Dispatch(ChangeEvent),
    /// The last broadcast completed too recently; the event is discarded.
    TooSoon { remaining: Duration },
    /// The timer was superseded or cancelled before it was handled.
    Stale,
}

struct Pending {
    generation: u64,
    event: ChangeEvent,
    timer: JoinHandle<()>,
}

/// Trailing-edge debounce with at most one live timer.
///
/// Timers do not call back into the scheduler; they post `fire(generation)`
/// onto the owner's event channel, and the owner hands the generation back
/// through [`take_fired`](Self::take_fired).
pub struct DebounceScheduler<E> {
    config: DebounceConfig,
    tx: mpsc::Sender<E>,
    fire: fn(u64) -> E,
    generation: u64,
    pending: Option<Pending>,
    last_completed: Option<Instant>,
}

impl<E: Send + 'static> DebounceScheduler<E> {
    pub fn new(config: DebounceConfig, tx: mpsc::Sender<E>, fire: fn(u64) -> E) -> Self {
        Self {
            config,
            tx,
            fire,
            generation: 0,
            pending: None,
            last_completed: None,
        }
    }

    /// Cancel any pending timer and arm a fresh one carrying `event`.
    pub fn on_change(&mut self, event: ChangeEvent) {
        if let Some(superseded) = self.pending.take() {
            superseded.timer.abort();
            debug!(generation = superseded.generation, "debounce re-armed");
        }

        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let fired = (self.fire)(generation);
        let window = self.config.window;

        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(fired).await;
        });

        self.pending = Some(Pending {
            generation,
            event,
            timer,
        });
    }

    /// Resolve a fired timer. Only the newest generation yields an event,
    /// and only once the minimum broadcast interval has passed.
    pub fn take_fired(&mut self, generation: u64) -> FireDecision {
        let Some(pending) = self.pending.take_if(|p| p.generation == generation) else {
            return FireDecision::Stale;
        };

        if let Some(last) = self.last_completed {
            let since = last.elapsed();
            if since < self.config.min_interval {
                let remaining = self.config.min_interval - since;
                info!(
                    remaining_ms = remaining.as_millis() as u64,
                    "debounce fired inside minimum broadcast interval, dropping"
                );
                return FireDecision::TooSoon { remaining };
            }
        }

        FireDecision::Dispatch(pending.event)
    }

    /// Stamp the completion of a broadcast for the minimum-interval guard.
    pub fn mark_completed(&mut self) {
        self.last_completed = Some(Instant::now());
    }

    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.timer.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<E> Drop for DebounceScheduler<E> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.timer.abort();
        }
    }
}
