use async_trait::async_trait;
use tokio::sync::mpsc;

/// Why a session closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The account was logged out; credentials are no longer valid.
    LoggedOut,
    /// Anything else: network drop, server restart, stream error.
    Other(String),
}

impl CloseReason {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CloseReason::LoggedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub sender: String,
    /// Sent by this account (echo of our own messages).
    pub is_self: bool,
    pub text: String,
}

impl InboundMessage {
    /// Private chats and groups. Status feeds and broadcast lists are not
    /// conversations and get no replies.
    pub fn is_chat(&self) -> bool {
        self.sender.ends_with("@s.whatsapp.net")
            || self.sender.ends_with("@c.us")
            || self.sender.contains("@g.us")
    }
}

/// Everything a session reports back, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connecting,
    Open,
    Qr(String),
    Close(CloseReason),
    Message(InboundMessage),
}

/// Opaque chat session. The engine owns lifecycle decisions; the transport
/// only reports what happened and sends what it is told to.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a new session. Lifecycle events and inbound messages for this
    /// session are delivered on `events`. Returning an error is equivalent
    /// to an immediate retryable close.
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> anyhow::Result<()>;

    async fn send(&self, recipient: &str, message: &str) -> anyhow::Result<()>;
}
