//! Events emitted by the client, either translated from lines received from the twitch
//! servers or produced by the connection itself.

use std::sync::Arc;

use derive_more::Display;

use crate::emitter::{EventMap, ListenerError};
use crate::event::tags::Tags;
use crate::Error;

pub mod tags;

/// Enum containing all events a [`TwitchIrcClient`](crate::TwitchIrcClient) emits.
/// Subscribe to them with the matching [`EventKind`](self::EventKind).
#[derive(Debug, Clone)]
pub enum Event {
    /// The websocket is open and registration was sent
    Open,
    /// The connection closed
    Close,
    /// Transport failure, server side rejection or a failing listener
    Error(ErrorEvent),
    /// The client sent a JOIN for this channel
    Joined(String),
    /// The client sent a PART for this channel
    Left(String),
    /// Someone joined a channel (JOIN from the server)
    UserJoined(UserPresence),
    /// Someone left a channel (PART from the server)
    UserLeft(UserPresence),
    /// Chat message (PRIVMSG)
    Message(ChatMessage),
    /// Server keepalive, carries the PING token. The PONG was already sent.
    Ping(String),
    /// NOTICE from the server
    Notice(Notice),
    /// ROOMSTATE
    RoomState(RoomState),
    /// GLOBALUSERSTATE as received, tags only
    GlobalUserStateTags(GlobalUserStateTags),
    /// GLOBALUSERSTATE with the parsed emote sets
    GlobalUserState(GlobalUserState),
    /// Diagnostic text about what the client is doing
    Debug(String),
}

/// Discriminant of [`Event`](self::Event). `Display` gives the event name.
#[allow(missing_docs)]
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[display(fmt = "open")]
    Open,
    #[display(fmt = "close")]
    Close,
    #[display(fmt = "error")]
    Error,
    #[display(fmt = "joined")]
    Joined,
    #[display(fmt = "left")]
    Left,
    #[display(fmt = "userJoined")]
    UserJoined,
    #[display(fmt = "userLeft")]
    UserLeft,
    #[display(fmt = "message")]
    Message,
    #[display(fmt = "ping")]
    Ping,
    #[display(fmt = "notice")]
    Notice,
    #[display(fmt = "roomstate")]
    RoomState,
    #[display(fmt = "GLOBALUSERSTATE")]
    GlobalUserStateTags,
    #[display(fmt = "globalUserState")]
    GlobalUserState,
    #[display(fmt = "debug")]
    Debug,
}

impl Event {
    /// Name of the event, same as the `Display` of its kind
    pub fn name(&self) -> String {
        self.kind().to_string()
    }
}

impl EventMap for Event {
    type Kind = EventKind;
    const ERROR: EventKind = EventKind::Error;

    fn kind(&self) -> EventKind {
        match self {
            Event::Open => EventKind::Open,
            Event::Close => EventKind::Close,
            Event::Error(_) => EventKind::Error,
            Event::Joined(_) => EventKind::Joined,
            Event::Left(_) => EventKind::Left,
            Event::UserJoined(_) => EventKind::UserJoined,
            Event::UserLeft(_) => EventKind::UserLeft,
            Event::Message(_) => EventKind::Message,
            Event::Ping(_) => EventKind::Ping,
            Event::Notice(_) => EventKind::Notice,
            Event::RoomState(_) => EventKind::RoomState,
            Event::GlobalUserStateTags(_) => EventKind::GlobalUserStateTags,
            Event::GlobalUserState(_) => EventKind::GlobalUserState,
            Event::Debug(_) => EventKind::Debug,
        }
    }

    fn from_listener_error(error: ListenerError) -> Self {
        ErrorEvent::new("Listener failed", Error::Listener(error)).into()
    }
}

/// Payload of [`Event::Error`](self::Event::Error)
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// Human readable summary
    pub message: String,
    /// The underlying error
    pub error: Arc<Error>,
}

impl ErrorEvent {
    pub(crate) fn new<M: Into<String>>(message: M, error: Error) -> Self {
        ErrorEvent {
            message: message.into(),
            error: Arc::new(error),
        }
    }
}

/// Someone joined or left a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPresence {
    /// Channel name including `#`
    pub channel: String,
    /// Username from the message prefix, if it had one
    pub user: Option<String>,
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Channel name including `#`
    pub channel: String,
    /// Message tags
    pub tags: Tags,
    /// Message text
    pub message: String,
    /// Whether this client sent the message. Twitch does not echo own messages, so messages
    /// received from the server always have this unset.
    pub is_self: bool,
}

/// NOTICE from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Channel the notice is about, `*` for connection level notices
    pub channel: String,
    /// Notice text
    pub message: String,
}

/// ROOMSTATE, the chat settings of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomState {
    /// Channel name including `#`
    pub channel: String,
    /// Room settings
    pub tags: Tags,
}

/// GLOBALUSERSTATE tags as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalUserStateTags {
    /// User state tags
    pub tags: Tags,
}

/// GLOBALUSERSTATE with the emote sets split out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalUserState {
    /// Emote set IDs available to the user
    pub emote_sets: Vec<String>,
    /// User state tags
    pub tags: Tags,
}

macro_rules! impl_from_payload {
    ($($payload:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$payload> for Event {
                fn from(payload: $payload) -> Self {
                    Event::$variant(payload)
                }
            }
        )*
    };
}

impl_from_payload!(
    ErrorEvent => Error,
    ChatMessage => Message,
    Notice => Notice,
    RoomState => RoomState,
    GlobalUserStateTags => GlobalUserStateTags,
    GlobalUserState => GlobalUserState,
);
