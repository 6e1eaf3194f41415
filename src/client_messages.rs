//! Types to represent messages sent by the client

use std::borrow::Cow;
use std::fmt;

use smallvec::SmallVec;
use tokio_tungstenite::tungstenite::Message;

/// Capabilities requested on connect unless configured otherwise
pub type Capabilities = SmallVec<[Capability; 3]>;

/// Messages to be sent from the client to twitch servers
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    PrivMsg { channel: String, message: String },
    Join(Vec<String>),
    Part(Vec<String>),
    Nick(String),
    /// OAuth token, with or without the `oauth:` prefix
    Pass(String),
    CapRequest(Capabilities),
    /// Reply to a PING, echoing its token if it had one
    Pong(Option<String>),
}

impl ClientMessage {
    /// Send a chat message
    pub fn message<S1: Into<String>, S2: Into<String>>(channel: S1, message: S2) -> Self {
        ClientMessage::PrivMsg {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// The line as it should appear in logs, with the token masked
    pub fn masked(&self) -> Cow<'_, str> {
        match self {
            ClientMessage::Pass(_) => Cow::Borrowed("PASS oauth:****"),
            other => Cow::Owned(other.to_string()),
        }
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            ClientMessage::PrivMsg { channel, message } => {
                write!(f, "PRIVMSG {} :{}", channel, message)
            }
            ClientMessage::Join(channels) => write!(f, "JOIN {}", channels.join(",")),
            ClientMessage::Part(channels) => write!(f, "PART {}", channels.join(",")),
            ClientMessage::CapRequest(caps) => write!(
                f,
                "CAP REQ :{}",
                caps.iter()
                    .map(|cap| -> &str { cap.into() })
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            ClientMessage::Nick(nick) => write!(f, "NICK {}", nick),
            ClientMessage::Pass(pass) => {
                let token = pass.strip_prefix("oauth:").unwrap_or(pass);
                write!(f, "PASS oauth:{}", token)
            }
            ClientMessage::Pong(Some(token)) => write!(f, "PONG :{}", token),
            ClientMessage::Pong(None) => write!(f, "PONG"),
        }
    }
}

impl From<&ClientMessage> for Message {
    fn from(msg: &ClientMessage) -> Self {
        Message::Text(msg.to_string())
    }
}

impl From<ClientMessage> for Message {
    fn from(msg: ClientMessage) -> Self {
        Message::from(&msg)
    }
}

/// Twitch client capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// twitch.tv/membership capability
    Membership,
    /// twitch.tv/tags tags capability
    Tags,
    /// twitch.tv/commands capability
    Commands,
}

impl Capability {
    /// tags, commands, membership
    pub fn defaults() -> Capabilities {
        smallvec::smallvec![Capability::Tags, Capability::Commands, Capability::Membership]
    }
}

impl From<&Capability> for &'static str {
    fn from(cap: &Capability) -> &'static str {
        match cap {
            Capability::Membership => "twitch.tv/membership",
            Capability::Tags => "twitch.tv/tags",
            Capability::Commands => "twitch.tv/commands",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let cap_as_str: &'static str = self.into();
        write!(f, "{}", cap_as_str)
    }
}
