//! Scripted collaborators for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{Semaphore, mpsc};

use crate::source::traits::ValueSource;
use crate::source::types::ValueSnapshot;
use crate::transport::traits::{InboundMessage, SessionTransport, TransportEvent};

pub fn snap(primary: i64, secondary: i64) -> ValueSnapshot {
    ValueSnapshot::new(Decimal::from(primary), Decimal::from(secondary))
}

pub fn inbound(id: &str, sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        id: id.to_string(),
        sender: sender.to_string(),
        is_self: false,
        text: text.to_string(),
    }
}

/// Returns queued results first, then keeps returning the current value.
#[derive(Default)]
pub struct ScriptedSource {
    queued: Mutex<VecDeque<Result<ValueSnapshot, String>>>,
    current: Mutex<Option<ValueSnapshot>>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(initial: ValueSnapshot) -> Self {
        let source = Self::default();
        source.set(initial);
        source
    }

    pub fn set(&self, value: ValueSnapshot) {
        *self.current.lock().unwrap() = Some(value);
    }

    pub fn fail_next(&self, times: usize) {
        let mut queued = self.queued.lock().unwrap();
        for _ in 0..times {
            queued.push_back(Err("upstream unavailable".into()));
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValueSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch(&self) -> anyhow::Result<ValueSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.queued.lock().unwrap().pop_front() {
            return next.map_err(|e| anyhow!(e));
        }
        self.current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("no value scripted"))
    }
}

/// Records every send; selected recipients fail. With a gate installed,
/// each send waits for a permit released by the test.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    gate: Option<Semaphore>,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    connects: AtomicUsize,
    auto_open: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `connect` immediately reports `Connecting` then `Open`.
    pub fn auto_open() -> Self {
        Self {
            auto_open: true,
            ..Self::default()
        }
    }

    pub fn gated() -> Self {
        Self::new().with_gate()
    }

    /// Hold every send until the test releases a permit.
    pub fn with_gate(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, sends: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(sends);
        }
    }

    pub fn fail_for(&self, recipient: &str) {
        self.failing.lock().unwrap().insert(recipient.to_string());
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(r, _)| r == recipient)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Push an event as if the session produced it.
    pub async fn emit(&self, event: TransportEvent) {
        let tx = self.events.lock().unwrap().clone();
        tx.expect("transport not connected").send(event).await.unwrap();
    }
}

#[async_trait]
impl SessionTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> anyhow::Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.events.lock().unwrap() = Some(events.clone());
        if self.auto_open {
            events.send(TransportEvent::Connecting).await?;
            events.send(TransportEvent::Open).await?;
        }
        Ok(())
    }

    async fn send(&self, recipient: &str, message: &str) -> anyhow::Result<()> {
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if self.failing.lock().unwrap().contains(recipient) {
            return Err(anyhow!("recipient {recipient} unreachable"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_string()));
        Ok(())
    }
}
