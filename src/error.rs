use thiserror::Error;

/// Conditions that stop the engine. Everything else is logged and survived.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BotError {
    #[error("session logged out, re-authenticate the transport")]
    LoggedOut,

    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("event channel closed")]
    ChannelClosed,
}
