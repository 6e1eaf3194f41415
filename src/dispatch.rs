//! Translation of received IRC lines into client actions

use smallvec::{smallvec, SmallVec};

use crate::client_messages::ClientMessage;
use crate::event::{
    ChatMessage, ErrorEvent, Event, GlobalUserState, GlobalUserStateTags, Notice, RoomState,
    UserPresence,
};
use crate::irc::IrcMessage;
use crate::Error;

/// Something the client has to do in response to a received line
#[derive(Debug)]
pub(crate) enum Action {
    /// Emit an event to the listeners
    Emit(Event),
    /// Write a message to the server
    Reply(ClientMessage),
    /// Registration finished, capabilities may be re-requested
    RequestGlobalUserState,
    /// Diagnostic message
    Debug(String),
}

pub(crate) type Actions = SmallVec<[Action; 3]>;

/// Map a parsed line to the actions it triggers, in order. Unknown commands only produce a
/// debug message, a known command with missing parameters is an error.
pub(crate) fn dispatch(msg: &IrcMessage<'_>) -> Result<Actions, Error> {
    let command = msg.command().to_ascii_uppercase();
    Ok(match command.as_str() {
        "PRIVMSG" => smallvec![Action::Emit(
            ChatMessage {
                channel: msg.try_param(0)?.to_string(),
                tags: msg.tags().clone(),
                message: msg.try_param(1)?.to_string(),
                is_self: false,
            }
            .into()
        )],
        "JOIN" => smallvec![Action::Emit(Event::UserJoined(presence(msg)?))],
        "PART" => smallvec![Action::Emit(Event::UserLeft(presence(msg)?))],
        "NOTICE" => {
            let notice = Notice {
                channel: msg.try_param(0)?.to_string(),
                message: msg.try_param(1)?.to_string(),
            };
            smallvec![
                Action::Debug(format!(
                    "NOTICE received: {} - {}",
                    notice.channel, notice.message
                )),
                Action::Emit(notice.into()),
            ]
        }
        "PING" => {
            let token = msg.param(0);
            let ping = token
                .and_then(|token| token.split(' ').next())
                .unwrap_or_default();
            smallvec![
                Action::Reply(ClientMessage::Pong(token.map(String::from))),
                Action::Emit(Event::Ping(ping.to_string())),
            ]
        }
        "GLOBALUSERSTATE" => {
            let tags = msg.tags().clone();
            let emote_sets = tags.emote_sets().into_iter().map(String::from).collect();
            smallvec![
                Action::Debug("GLOBALUSERSTATE received".to_string()),
                Action::Emit(GlobalUserStateTags { tags: tags.clone() }.into()),
                Action::Emit(GlobalUserState { emote_sets, tags }.into()),
            ]
        }
        "ROOMSTATE" => smallvec![Action::Emit(
            RoomState {
                channel: msg.try_param(0)?.to_string(),
                tags: msg.tags().clone(),
            }
            .into()
        )],
        "CAP" => match msg.param(1) {
            Some(sub) if sub.eq_ignore_ascii_case("ACK") => smallvec![Action::Debug(format!(
                "Capability acknowledgment received: {}",
                msg.param(2).unwrap_or_default()
            ))],
            _ => smallvec![Action::Debug(format!("Capability reply: {}", msg))],
        },
        "001" => smallvec![
            Action::Debug("Successfully registered with Twitch IRC (001)".to_string()),
            Action::RequestGlobalUserState,
        ],
        "002" | "003" | "004" | "372" | "375" | "376" => smallvec![Action::Debug(format!(
            "Connection confirmation received: {}",
            command
        ))],
        "421" | "431" | "432" | "433" => {
            let detail = msg.params().join(" ");
            smallvec![
                Action::Debug(format!("Nickname error {}: {}", command, detail)),
                Action::Emit(
                    ErrorEvent::new(
                        format!("Nickname error: {}", detail),
                        Error::NicknameRejected {
                            code: command.clone(),
                            detail,
                        },
                    )
                    .into()
                ),
            ]
        }
        _ => smallvec![Action::Debug(format!("Unhandled command: {}", command))],
    })
}

fn presence(msg: &IrcMessage<'_>) -> Result<UserPresence, Error> {
    Ok(UserPresence {
        channel: msg.try_param(0)?.to_string(),
        user: msg.sender().map(String::from),
    })
}
