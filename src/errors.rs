use thiserror::Error;

use crate::emitter::ListenerError;

/// Error type for tirc methods
#[derive(Debug, Error)]
pub enum Error {
    /// Websocket error
    #[error("Websocket error: {0}")]
    WebsocketError(#[from] tokio_tungstenite::tungstenite::Error),
    /// The transport failed before the connection was opened
    #[error("Connection error: {0}")]
    ConnectFailed(String),
    /// A frame was written while no connection is open
    #[error("Not connected")]
    NotConnected,
    /// `join` had to connect first, and connecting failed
    #[error("Cannot join channel, connection failed: {0}")]
    JoinConnectFailed(Box<Error>),
    /// Message sent to a channel that was never joined
    #[error("Cannot send message, not joined to channel {0}")]
    NotJoined(String),
    /// Channel names must start with `#`
    #[error("Invalid channel name {0:?}")]
    InvalidChannel(String),
    /// IRC parsing error
    #[error("IRC parse error: {0}")]
    IrcParseError(String),
    /// Missing IRC parameter in one of the received messages
    #[error("Missing IRC command parameter at index {0} in the message {1:?}")]
    MissingIrcCommandParameter(usize, String),
    /// The server rejected the nickname or a command during registration
    #[error("Nickname error: {detail}")]
    NicknameRejected {
        /// Numeric reply code
        code: String,
        /// Reply parameters joined by spaces
        detail: String,
    },
    /// Tag content parsing error
    #[error("Tag content parsing error in tag {0}={1}")]
    TagParseError(String, String),
    /// A listener returned an error
    #[error("Listener failed: {0}")]
    Listener(ListenerError),
    /// Send error in an internal message passing channel
    #[error("Internal message channel was unexpectedly closed.")]
    MessageChannelError,
}
