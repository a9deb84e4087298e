use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::types::{BroadcastRecord, DeliveryStatus, RecipientOutcome};
use crate::bot::render::Renderer;
use crate::metrics::prometheus::{record_broadcast_duration_ms, record_broadcast_send};
use crate::source::retry::RetryPolicy;
use crate::source::traits::ValueSource;
use crate::source::types::ValueSnapshot;
use crate::state::rate_limit::RateLimiter;
use crate::state::subscribers::SubscriptionRegistry;
use crate::transport::traits::SessionTransport;

#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
    pub send_timeout: Duration,
}

/// Clears the in-flight flag when a broadcast finishes, including on panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fans one rendered message out to every subscriber in batches.
///
/// Cheap to clone; clones share the in-flight flag, so at most one
/// broadcast runs at a time across all of them.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn SessionTransport>,
    source: Arc<dyn ValueSource>,
    retry: RetryPolicy,
    render: Renderer,
    registry: SubscriptionRegistry,
    limiter: RateLimiter,
    config: DispatchConfig,
    in_flight: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        source: Arc<dyn ValueSource>,
        retry: RetryPolicy,
        render: Renderer,
        registry: SubscriptionRegistry,
        limiter: RateLimiter,
        config: DispatchConfig,
    ) -> Self {
        Self {
            transport,
            source,
            retry,
            render,
            registry,
            limiter,
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Broadcast the current value to all subscribers.
    ///
    /// Returns `None` without doing anything if another broadcast is still
    /// running. `trigger` is rendered only when the fresh re-fetch fails.
    pub async fn broadcast(&self, trigger: ValueSnapshot) -> Option<BroadcastRecord> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("broadcast already in flight, dropping request");
            return None;
        }
        let _in_flight = InFlight(self.in_flight.clone());

        let started = Instant::now();
        let fired_at = SystemTime::now();
        let recipients = self.registry.all();

        if recipients.is_empty() {
            debug!("no subscribers, skipping fan-out");
            return Some(BroadcastRecord {
                baseline: trigger,
                fired_at,
                recipients: Vec::new(),
            });
        }

        let snapshot = match self.retry.run(self.source.name(), || self.source.fetch()).await {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(error = %err, "re-fetch before broadcast failed, rendering trigger snapshot");
                trigger
            }
        };
        let message = (self.render)(&snapshot);

        let batch_size = self.config.batch_size.max(1);
        let mut outcomes = Vec::with_capacity(recipients.len());

        for (index, batch) in recipients.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch_delay).await;
            }
            self.limiter.wait_global().await;

            let sends = batch.iter().map(|recipient| self.send_one(recipient, &message));
            outcomes.extend(join_all(sends).await);
            self.limiter.record_global();
        }

        let record = BroadcastRecord {
            baseline: snapshot,
            fired_at,
            recipients: outcomes,
        };

        let elapsed = started.elapsed();
        record_broadcast_duration_ms(elapsed.as_secs_f64() * 1_000.0);
        info!(
            recipients = record.recipients.len(),
            delivered = record.delivered(),
            failed = record.failed(),
            elapsed_ms = elapsed.as_millis() as u64,
            "broadcast complete"
        );

        Some(record)
    }

    async fn send_one(&self, recipient: &str, message: &str) -> RecipientOutcome {
        let status = match tokio::time::timeout(
            self.config.send_timeout,
            self.transport.send(recipient, message),
        )
        .await
        {
            Ok(Ok(())) => DeliveryStatus::Delivered,
            Ok(Err(err)) => {
                warn!(recipient, error = %err, "broadcast send failed");
                DeliveryStatus::Failed {
                    reason: err.to_string(),
                }
            }
            Err(_) => {
                warn!(recipient, "broadcast send timed out");
                DeliveryStatus::Failed {
                    reason: "send timed out".to_string(),
                }
            }
        };

        let outcome = RecipientOutcome {
            recipient: recipient.to_string(),
            status,
        };
        record_broadcast_send(outcome.is_ok());
        outcome
    }
}
