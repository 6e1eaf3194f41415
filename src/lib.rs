//! Twitch chat client core over IRC on websockets.
//!
//! [`TwitchIrcClient`](crate::TwitchIrcClient) connects, negotiates capabilities, tracks the
//! channels it joined and rate limits chat messages. Everything received from the server is
//! translated into [`Event`](crate::Event)s delivered through a typed
//! [`EventEmitter`](crate::emitter::EventEmitter).

#![warn(missing_docs)]

#[macro_use]
extern crate log;

pub mod client;
pub mod client_messages;
mod dispatch;
pub mod emitter;
mod errors;
pub mod event;
pub mod irc;
pub mod rate_limits;
mod util;

pub use client::*;
pub use client_messages::{Capability, ClientMessage};
pub use emitter::{listener, EmitError, EventEmitter, EventMap, Listener, ListenerError};
pub use errors::*;
pub use event::{Event, EventKind};
pub use rate_limits::RateLimiterConfig;
pub use util::IntoChannels;
