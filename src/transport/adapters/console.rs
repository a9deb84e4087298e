use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use crate::transport::traits::{CloseReason, InboundMessage, SessionTransport, TransportEvent};

const DEFAULT_SENDER: &str = "console@c.us";

/// Local stand-in for a chat session: stdin lines are inbound messages,
/// outbound messages go to stdout.
///
/// Line format is `sender: text` or just `text`. Closing stdin logs the
/// session out.
pub struct ConsoleTransport {
    sink: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    reader_started: AtomicBool,
    next_id: Arc<AtomicU64>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self {
            sink: Arc::new(Mutex::new(None)),
            reader_started: AtomicBool::new(false),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_line(line: &str, id: u64) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (sender, text) = match line.split_once(": ") {
        Some((sender, text)) if !sender.contains(' ') => {
            let sender = if sender.contains('@') {
                sender.to_string()
            } else {
                format!("{sender}@c.us")
            };
            (sender, text.trim().to_string())
        }
        _ => (DEFAULT_SENDER.to_string(), line.to_string()),
    };

    Some(InboundMessage {
        id: format!("console-{id}"),
        sender,
        is_self: false,
        text,
    })
}

async fn read_stdin(sink: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>, next_id: Arc<AtomicU64>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let Some(message) = parse_line(&line, next_id.fetch_add(1, Ordering::Relaxed)) else {
            continue;
        };
        debug!(id = %message.id, sender = %message.sender, "console inbound");

        let tx = sink.lock().await.clone();
        if let Some(tx) = tx {
            if tx.send(TransportEvent::Message(message)).await.is_err() {
                return;
            }
        }
    }

    info!("stdin closed, logging console session out");
    if let Some(tx) = sink.lock().await.take() {
        let _ = tx.send(TransportEvent::Close(CloseReason::LoggedOut)).await;
    }
}

#[async_trait]
impl SessionTransport for ConsoleTransport {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> anyhow::Result<()> {
        events
            .send(TransportEvent::Connecting)
            .await
            .context("event channel closed")?;

        *self.sink.lock().await = Some(events.clone());

        if !self.reader_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(read_stdin(self.sink.clone(), self.next_id.clone()));
        }

        events
            .send(TransportEvent::Open)
            .await
            .context("event channel closed")?;
        Ok(())
    }

    async fn send(&self, recipient: &str, message: &str) -> anyhow::Result<()> {
        let mut stdout = tokio::io::stdout();
        let line = format!("── to {recipient}\n{message}\n");
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}
