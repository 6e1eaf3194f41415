use std::fmt;

use derive_builder::Builder;
use url::Url;

use crate::client_messages::{Capabilities, Capability};
use crate::emitter::DEFAULT_MAX_LISTENERS;
use crate::rate_limits::RateLimiterConfig;

/// Holds the configuration for a twitch chat client. Pass it to
/// [`TwitchIrcClient::new`](crate::TwitchIrcClient::new) and call `connect` or `join`.
///
/// ```
/// use tirc::ClientConfigBuilder;
///
/// let config = ClientConfigBuilder::default()
///     .nick("MyBot")
///     .token("oauth:abcdef")
///     .build()
///     .unwrap();
/// assert_eq!(config.url.as_str(), "wss://irc-ws.chat.twitch.tv/");
/// ```
#[derive(Clone, Builder)]
#[builder(setter(into))]
pub struct ClientConfig {
    /// The chat server, by default `wss://irc-ws.chat.twitch.tv:443`
    #[builder(default = r#"Url::parse("wss://irc-ws.chat.twitch.tv:443").unwrap()"#)]
    pub url: Url,

    /// Twitch username to use, lowercased by the client
    pub nick: String,

    /// OAuth token to use, with or without the `oauth:` prefix
    pub token: String,

    /// Capabilities requested on connect (default: tags, commands, membership)
    #[builder(default = "Capability::defaults()")]
    pub capabilities: Capabilities,

    /// Rate limiting configuration (default: 20 messages per 30 seconds)
    #[builder(default)]
    pub rate_limiter: RateLimiterConfig,

    /// Listeners per event before a leak warning is logged
    #[builder(default = "DEFAULT_MAX_LISTENERS")]
    pub max_listeners: usize,

    /// Re-send the capability request after the 001 welcome (default: true)
    #[builder(default = "true")]
    pub rerequest_caps_on_welcome: bool,

    /// Emit `debug` events in addition to logging (default: true)
    #[builder(default = "true")]
    pub debug_events: bool,

    /// Send queued messages automatically once the rate limit window resets (default: true)
    #[builder(default = "true")]
    pub drain_queue: bool,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url.as_str())
            .field("nick", &self.nick)
            .field("token", &"****")
            .field("capabilities", &self.capabilities)
            .field("rate_limiter", &self.rate_limiter)
            .field("max_listeners", &self.max_listeners)
            .field("rerequest_caps_on_welcome", &self.rerequest_caps_on_welcome)
            .field("debug_events", &self.debug_events)
            .field("drain_queue", &self.drain_queue)
            .finish()
    }
}
