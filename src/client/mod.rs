//! Client module: connection lifecycle, capability negotiation, channel membership and rate
//! limited sending.
//!
//! All mutable state sits behind one lock which is never held while listeners run, so listeners
//! can call back into the client. Received frames are handled on a reader task, outgoing lines
//! are written by a writer task fed through an unbounded channel.

use std::fmt;
use std::sync::Arc;

use derive_more::Display;
use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

pub use config::*;
pub use transport::{Connector, WebSocketConnector, WsSink, WsStream};

use crate::client_messages::ClientMessage;
use crate::dispatch::{dispatch, Action};
use crate::emitter::{listener, EventEmitter, EventMap, Listener, ListenerError};
use crate::event::{ErrorEvent, Event, EventKind};
use crate::irc;
use crate::rate_limits::{Admission, QueuedMessage, RateLimiter};
use crate::util::{normalize_channel, normalize_channels, IntoChannels};
use crate::Error;

mod config;
mod transport;

/// Lifecycle of the connection. A closed client only reopens through an explicit `connect`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ConnectedState {
    /// `connect` was never called
    Disconnected,
    /// Waiting for the websocket handshake
    Connecting,
    /// Registration was sent, lines can be written
    Open,
    /// The connection failed or was closed
    Closed,
}

/// Point in time view of the client state, see
/// [`TwitchIrcClient::inspect`](self::TwitchIrcClient::inspect)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    /// Connection state
    pub state: ConnectedState,
    /// Lowercased nick
    pub nick: String,
    /// Channels the client believes it is in, in join order
    pub channels: Vec<String>,
    /// Whether the capability request went out on the current connection
    pub capabilities_requested: bool,
    /// Messages counted in the current rate limit window
    pub sent_in_window: u32,
    /// Messages waiting for the next rate limit window
    pub queued: Vec<QueuedMessage>,
}

/// Events collected while the state lock is held, emitted once it is released
#[derive(Default)]
struct Pending {
    events: SmallVec<[Event; 4]>,
}

impl Pending {
    fn debug<S: Into<String>>(&mut self, message: S) {
        let message = message.into();
        debug!("{}", message);
        self.events.push(Event::Debug(message));
    }

    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

struct ConnectionContext {
    state: ConnectedState,
    connection_id: u64,
    outbound: Option<UnboundedSender<Message>>,
    runtime: Option<Handle>,
    joined_channels: Vec<String>,
    rate_limiter: RateLimiter,
    capabilities_requested: bool,
    drain_scheduled: bool,
}

impl ConnectionContext {
    fn is_open(&self) -> bool {
        self.state == ConnectedState::Open && self.outbound.is_some()
    }

    fn write(&self, msg: &ClientMessage) -> Result<(), Error> {
        let outbound = self.outbound.as_ref().ok_or(Error::NotConnected)?;
        debug!("> {}", msg.masked());
        outbound
            .unbounded_send(msg.into())
            .map_err(|_| Error::MessageChannelError)
    }

    fn reset_membership(&mut self, pending: &mut Pending) {
        self.joined_channels.clear();
        let dropped = self.rate_limiter.clear_queue();
        if dropped > 0 {
            pending.debug(format!("Dropped {} queued messages", dropped));
        }
    }
}

struct ClientInner {
    config: ClientConfig,
    nick: String,
    connector: Arc<dyn Connector>,
    events: EventEmitter<Event>,
    context: Mutex<ConnectionContext>,
}

/// Twitch chat client. Cheap to clone, all clones share one connection.
///
/// ```no_run
/// use tirc::{ClientConfigBuilder, Event, EventKind, TwitchIrcClient};
///
/// # async fn run() -> Result<(), tirc::Error> {
/// let config = ClientConfigBuilder::default()
///     .nick("mybot")
///     .token("oauth:abcdef")
///     .build()
///     .unwrap();
/// let client = TwitchIrcClient::new(config);
/// client.on(EventKind::Message, |event: &Event| {
///     if let Event::Message(msg) = event {
///         println!("{}: {}", msg.channel, msg.message);
///     }
///     Ok(())
/// });
/// client.join("#mychannel").await?;
/// client.send_message("#mychannel", "hello")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TwitchIrcClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for TwitchIrcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitchIrcClient")
            .field("nick", &self.inner.nick)
            .field("state", &self.state())
            .finish()
    }
}

impl TwitchIrcClient {
    /// Client connecting over websockets
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(WebSocketConnector))
    }

    /// Client using a custom transport
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let nick = config.nick.to_lowercase();
        let context = ConnectionContext {
            state: ConnectedState::Disconnected,
            connection_id: 0,
            outbound: None,
            runtime: None,
            joined_channels: Vec::new(),
            rate_limiter: RateLimiter::new(&config.rate_limiter, Instant::now()),
            capabilities_requested: false,
            drain_scheduled: false,
        };
        TwitchIrcClient {
            inner: Arc::new(ClientInner {
                events: EventEmitter::with_max_listeners(config.max_listeners),
                nick,
                connector,
                config,
                context: Mutex::new(context),
            }),
        }
    }

    /// The lowercased nick used to log in
    pub fn nick(&self) -> &str {
        &self.inner.nick
    }

    /// Current connection state
    pub fn state(&self) -> ConnectedState {
        self.inner.context.lock().state
    }

    /// Channels the client believes it is in
    pub fn joined_channels(&self) -> Vec<String> {
        self.inner.context.lock().joined_channels.clone()
    }

    /// Snapshot of the connection, membership and rate limiter state
    pub fn inspect(&self) -> ClientSnapshot {
        let ctx = self.inner.context.lock();
        ClientSnapshot {
            state: ctx.state,
            nick: self.inner.nick.clone(),
            channels: ctx.joined_channels.clone(),
            capabilities_requested: ctx.capabilities_requested,
            sent_in_window: ctx.rate_limiter.sent_in_window(),
            queued: ctx.rate_limiter.queued().cloned().collect(),
        }
    }

    /// The event bus of this client, for the less common listener operations
    pub fn events(&self) -> &EventEmitter<Event> {
        &self.inner.events
    }

    /// Register a listener. The returned handle can be passed to [`off`](Self::off).
    pub fn on<F>(&self, kind: EventKind, f: F) -> Listener<Event>
    where
        F: Fn(&Event) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let listener = listener(f);
        self.inner.events.on(kind, listener.clone());
        listener
    }

    /// Register a listener that is removed after its first invocation
    pub fn once<F>(&self, kind: EventKind, f: F) -> Listener<Event>
    where
        F: Fn(&Event) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let listener = listener(f);
        self.inner.events.once(kind, listener.clone());
        listener
    }

    /// Remove a listener registered with [`on`](Self::on) or [`once`](Self::once)
    pub fn off(&self, kind: EventKind, listener: &Listener<Event>) {
        self.inner.events.off(kind, listener);
    }

    /// Open the connection, request capabilities and log in. Resolves once the registration
    /// lines are queued, before the server confirms the login.
    pub async fn connect(&self) -> Result<(), Error> {
        let runtime = Handle::try_current().map_err(|err| Error::ConnectFailed(err.to_string()))?;
        let url = &self.inner.config.url;
        let connection_id = self.with_context(|ctx, pending| {
            if let Some(previous) = ctx.outbound.take() {
                previous.close_channel();
                ctx.reset_membership(pending);
                pending.debug("Closing previous connection");
                pending.emit(Event::Close);
            }
            ctx.state = ConnectedState::Connecting;
            ctx.connection_id += 1;
            pending.debug(format!("Connecting to {}", url));
            ctx.connection_id
        });

        let (sink, stream) = match self.inner.connector.connect(url).await {
            Ok(transport) => transport,
            Err(err) => {
                error!("Connection to {} failed: {}", url, err);
                let message = err.to_string();
                self.with_context(|ctx, pending| {
                    if ctx.connection_id == connection_id {
                        ctx.state = ConnectedState::Closed;
                    }
                    pending.emit(ErrorEvent::new("Connection error", err).into());
                });
                return Err(Error::ConnectFailed(message));
            }
        };
        info!("Connected to {}", url);

        let (outbound, outbound_rx) = mpsc::unbounded();
        runtime.spawn(write_loop(outbound_rx, sink));

        let config = &self.inner.config;
        let nick = &self.inner.nick;
        self.with_context(|ctx, pending| {
            if let Some(previous) = ctx.outbound.replace(outbound) {
                previous.close_channel();
            }
            ctx.runtime = Some(runtime.clone());
            ctx.state = ConnectedState::Open;
            ctx.capabilities_requested = false;
            pending.debug("WebSocket connection opened, requesting capabilities");

            let cap_request = ClientMessage::CapRequest(config.capabilities.clone());
            ctx.write(&cap_request)?;
            ctx.capabilities_requested = true;
            pending.debug(format!("Sent: {}", cap_request));

            for msg in [
                ClientMessage::Pass(config.token.clone()),
                ClientMessage::Nick(nick.clone()),
            ] {
                ctx.write(&msg)?;
                pending.debug(format!("Sent: {}", msg.masked()));
            }
            pending.emit(Event::Open);
            Ok::<_, Error>(())
        })?;

        runtime.spawn(read_loop(self.clone(), stream, connection_id));
        Ok(())
    }

    /// Join one or more channels with a single JOIN line, connecting first if needed.
    /// Channels are added to the membership right away, without waiting for the server.
    pub async fn join<C: IntoChannels>(&self, channels: C) -> Result<(), Error> {
        let channels = normalize_channels(channels)?;
        if channels.is_empty() {
            return Ok(());
        }

        let open = self.inner.context.lock().is_open();
        if !open {
            self.debug("Socket not ready, attempting to connect first");
            if let Err(err) = self.connect().await {
                self.debug(format!("Failed to connect: {}", err));
                return Err(Error::JoinConnectFailed(Box::new(err)));
            }
        }

        self.with_context(|ctx, pending| {
            if !ctx.is_open() {
                return Err(Error::NotConnected);
            }
            let join = ClientMessage::Join(channels.clone());
            ctx.write(&join)?;
            pending.debug(format!("Sent: {}", join));
            for channel in channels {
                if !ctx.joined_channels.contains(&channel) {
                    ctx.joined_channels.push(channel.clone());
                }
                pending.emit(Event::Joined(channel));
            }
            Ok(())
        })
    }

    /// Leave channels with a single PART line. Does nothing while not connected.
    pub fn leave<C: IntoChannels>(&self, channels: C) -> Result<(), Error> {
        let channels = normalize_channels(channels)?;
        self.part(Some(channels))
    }

    /// Leave every joined channel
    pub fn leave_all(&self) -> Result<(), Error> {
        self.part(None)
    }

    fn part(&self, channels: Option<Vec<String>>) -> Result<(), Error> {
        self.with_context(|ctx, pending| {
            if !ctx.is_open() {
                pending.debug("Not connected, nothing to leave");
                return Ok(());
            }
            let channels = channels.unwrap_or_else(|| ctx.joined_channels.clone());
            if channels.is_empty() {
                return Ok(());
            }
            let part = ClientMessage::Part(channels.clone());
            ctx.write(&part)?;
            pending.debug(format!("Sent: {}", part));
            for channel in channels {
                ctx.joined_channels.retain(|joined| joined != &channel);
                let dropped = ctx.rate_limiter.discard_channel(&channel);
                if dropped > 0 {
                    pending.debug(format!(
                        "Dropped {} queued messages for {}",
                        dropped, channel
                    ));
                }
                pending.emit(Event::Left(channel));
            }
            Ok(())
        })
    }

    /// Send a chat message to a joined channel. Over the rate limit the message is queued and
    /// sent once the window resets, if the client is configured to drain its queue.
    pub fn send_message(&self, channel: &str, text: &str) -> Result<(), Error> {
        let channel = normalize_channel(channel)?;
        let drain_at = self.with_context(|ctx, pending| {
            if !ctx.joined_channels.contains(&channel) {
                pending.debug(format!(
                    "Cannot send message, not joined to channel {}",
                    channel
                ));
                return Err(Error::NotJoined(channel.clone()));
            }
            if !ctx.is_open() {
                return Err(Error::NotConnected);
            }
            match ctx.rate_limiter.try_send(Instant::now(), &channel, text) {
                Admission::Send => {
                    ctx.write(&ClientMessage::message(channel.as_str(), text))?;
                    Ok(None)
                }
                Admission::Queued => {
                    pending.debug(format!(
                        "Rate limit reached, queued message for {} ({} waiting)",
                        channel,
                        ctx.rate_limiter.queue_len()
                    ));
                    Ok(self.schedule_drain(ctx))
                }
            }
        })?;
        if let Some((runtime, at)) = drain_at {
            self.spawn_drain(runtime, at);
        }
        Ok(())
    }

    /// Re-send the capability request, which makes twitch answer with GLOBALUSERSTATE.
    /// Only logs when the connection is not open.
    pub fn request_global_user_state(&self) {
        let capabilities = &self.inner.config.capabilities;
        self.with_context(|ctx, pending| {
            if !ctx.is_open() {
                pending.debug("Cannot request GLOBALUSERSTATE, socket not open");
                return;
            }
            let request = ClientMessage::CapRequest(capabilities.clone());
            match ctx.write(&request) {
                Ok(()) => pending.debug(format!("Requested GLOBALUSERSTATE: {}", request)),
                Err(err) => pending.debug(format!("Failed to request GLOBALUSERSTATE: {}", err)),
            }
        })
    }

    /// Close the connection. Membership and queued messages are dropped.
    pub fn close(&self) {
        self.with_context(|ctx, pending| {
            if let Some(outbound) = ctx.outbound.take() {
                outbound.close_channel();
                ctx.state = ConnectedState::Closed;
                ctx.reset_membership(pending);
                pending.debug("Closing connection");
                pending.emit(Event::Close);
            }
        })
    }

    fn with_context<R>(&self, f: impl FnOnce(&mut ConnectionContext, &mut Pending) -> R) -> R {
        let mut pending = Pending::default();
        let result = {
            let mut ctx = self.inner.context.lock();
            f(&mut *ctx, &mut pending)
        };
        for event in pending.events {
            self.fire(event);
        }
        result
    }

    fn fire(&self, event: Event) {
        if let Event::Debug(_) = event {
            if !self.inner.config.debug_events {
                return;
            }
        }
        if let Err(err) = self.inner.events.emit(&event) {
            warn!("Unhandled {} event: {}", event.kind(), err);
        }
    }

    fn debug<S: Into<String>>(&self, message: S) {
        let message = message.into();
        debug!("{}", message);
        self.fire(Event::Debug(message));
    }

    fn is_current(&self, connection_id: u64) -> bool {
        let ctx = self.inner.context.lock();
        ctx.connection_id == connection_id && ctx.outbound.is_some()
    }

    fn handle_frame(&self, frame: &str) {
        for (line, parsed) in irc::parse_frame(frame) {
            debug!("< {}", line);
            if self.inner.config.debug_events {
                self.fire(Event::Debug(format!("[RAW IRC] {}", line)));
            }
            match parsed.and_then(|msg| dispatch(&msg)) {
                Ok(actions) => {
                    for action in actions {
                        self.apply(action);
                    }
                }
                Err(err) => error!("Error handling IRC message {:?}: {}", line, err),
            }
        }
    }

    fn apply(&self, action: Action) {
        match action {
            Action::Emit(event) => self.fire(event),
            Action::Debug(message) => self.debug(message),
            Action::Reply(reply) => {
                let written = self.inner.context.lock().write(&reply);
                if let Err(err) = written {
                    warn!("Could not send {}: {}", reply, err);
                }
            }
            Action::RequestGlobalUserState => {
                let requested = self.inner.context.lock().capabilities_requested;
                if self.inner.config.rerequest_caps_on_welcome && requested {
                    self.request_global_user_state();
                }
            }
        }
    }

    fn transport_error(&self, connection_id: u64, err: WsError) {
        if !self.is_current(connection_id) {
            return;
        }
        error!("Websocket error: {}", err);
        self.with_context(|_, pending| {
            pending.debug(format!("WebSocket error: {}", err));
            pending.emit(ErrorEvent::new("Connection error", err.into()).into());
        })
    }

    fn transport_closed(&self, connection_id: u64) {
        self.with_context(|ctx, pending| {
            if ctx.connection_id != connection_id || ctx.state == ConnectedState::Closed {
                return;
            }
            info!("Disconnected");
            ctx.state = ConnectedState::Closed;
            ctx.outbound = None;
            ctx.reset_membership(pending);
            pending.debug("WebSocket connection closed");
            pending.emit(Event::Close);
        })
    }

    fn schedule_drain(&self, ctx: &mut ConnectionContext) -> Option<(Handle, Instant)> {
        if !self.inner.config.drain_queue || ctx.drain_scheduled {
            return None;
        }
        let runtime = ctx.runtime.clone()?;
        let at = ctx.rate_limiter.next_reset()?;
        ctx.drain_scheduled = true;
        Some((runtime, at))
    }

    fn spawn_drain(&self, runtime: Handle, at: Instant) {
        let client = self.clone();
        runtime.spawn(async move {
            tokio::time::sleep_until(at).await;
            client.drain_queue();
        });
    }

    fn drain_queue(&self) {
        let next = self.with_context(|ctx, pending| {
            ctx.drain_scheduled = false;
            if !ctx.is_open() {
                return None;
            }
            for queued in ctx.rate_limiter.drain(Instant::now()) {
                let msg = ClientMessage::message(queued.channel, queued.text);
                match ctx.write(&msg) {
                    Ok(()) => pending.debug(format!("Sent queued message: {}", msg)),
                    Err(err) => pending.debug(format!("Dropped queued message: {}", err)),
                }
            }
            if ctx.rate_limiter.queue_len() > 0 {
                self.schedule_drain(ctx)
            } else {
                None
            }
        });
        if let Some((runtime, at)) = next {
            self.spawn_drain(runtime, at);
        }
    }
}

async fn write_loop(outbound: UnboundedReceiver<Message>, sink: WsSink) {
    if let Err(err) = outbound.map(Ok::<_, WsError>).forward(sink).await {
        warn!("Websocket write failed: {}", err);
    }
}

async fn read_loop(client: TwitchIrcClient, mut stream: WsStream, connection_id: u64) {
    while let Some(received) = stream.next().await {
        if !client.is_current(connection_id) {
            break;
        }
        match received {
            Ok(Message::Text(frame)) => client.handle_frame(&frame),
            Ok(Message::Binary(data)) => debug!("< Binary<{} bytes>", data.len()),
            Ok(Message::Close(frame)) => {
                info!("Connection closed by the server: {:?}", frame);
                break;
            }
            Ok(_) => {}
            Err(err) => {
                client.transport_error(connection_id, err);
                break;
            }
        }
    }
    client.transport_closed(connection_id);
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::transport::{mock_connection, MockConnector, MockServer};
    use super::*;
    use crate::rate_limits::RateLimiterConfig;

    const CAP_REQ: &str = "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership";

    fn config() -> ClientConfigBuilder {
        let mut builder = ClientConfigBuilder::default();
        builder.nick("TestUser").token("secret");
        builder
    }

    fn client(config: ClientConfig) -> (TwitchIrcClient, MockServer) {
        let (connector, server) = mock_connection();
        (
            TwitchIrcClient::with_connector(config, Arc::new(connector)),
            server,
        )
    }

    async fn connected(config: ClientConfig) -> (TwitchIrcClient, MockServer) {
        let (client, mut server) = client(config);
        client.connect().await.unwrap();
        assert_eq!(server.next_sent().await, CAP_REQ);
        assert_eq!(server.next_sent().await, "PASS oauth:secret");
        assert_eq!(server.next_sent().await, "NICK testuser");
        (client, server)
    }

    fn record(client: &TwitchIrcClient, kinds: &[EventKind]) -> Arc<Mutex<Vec<Event>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for kind in kinds {
            let log = log.clone();
            client.on(*kind, move |event: &Event| {
                log.lock().push(event.clone());
                Ok(())
            });
        }
        log
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_connect_registers() {
        let (client, mut server) = client(config().build().unwrap());
        let log = record(&client, &[EventKind::Open]);
        assert_eq!(client.state(), ConnectedState::Disconnected);

        client.connect().await.unwrap();
        assert_eq!(client.state(), ConnectedState::Open);
        assert_eq!(client.nick(), "testuser");
        assert!(client.inspect().capabilities_requested);
        assert!(matches!(log.lock().as_slice(), [Event::Open]));

        assert_eq!(server.next_sent().await, CAP_REQ);
        assert_eq!(server.next_sent().await, "PASS oauth:secret");
        assert_eq!(server.next_sent().await, "NICK testuser");
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let client = TwitchIrcClient::with_connector(
            config().build().unwrap(),
            Arc::new(MockConnector::failing()),
        );
        let log = record(&client, &[EventKind::Error]);

        let result = client.connect().await;
        assert!(matches!(result, Err(Error::ConnectFailed(_))));
        assert_eq!(client.state(), ConnectedState::Closed);
        assert!(matches!(log.lock().as_slice(), [Event::Error(_)]));
    }

    #[tokio::test]
    async fn test_connect_failure_without_error_listener() {
        let client = TwitchIrcClient::with_connector(
            config().build().unwrap(),
            Arc::new(MockConnector::failing()),
        );
        assert!(client.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (client, mut server) = connected(config().build().unwrap()).await;
        let log = record(&client, &[EventKind::Ping]);

        server.send_frame("PING :tmi.twitch.tv\r\n");
        assert_eq!(server.next_sent().await, "PONG :tmi.twitch.tv");
        match log.lock().as_slice() {
            [Event::Ping(token)] => assert_eq!(token, "tmi.twitch.tv"),
            other => panic!("unexpected events {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_bad_line_does_not_drop_frame() {
        let (client, server) = connected(config().build().unwrap()).await;
        let log = record(&client, &[EventKind::Message, EventKind::UserJoined]);

        server.send_frame(concat!(
            "@badge-info=;color=#FF0000 :ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #foo :hi\r\n",
            "@broken\r\n",
            "PRIVMSG #foo\r\n",
            ":tmi.twitch.tv USERNOTICE #foo\r\n",
            ":bob!bob@bob.tmi.twitch.tv JOIN #foo\r\n",
        ));
        settle().await;

        match log.lock().as_slice() {
            [Event::Message(msg), Event::UserJoined(presence)] => {
                assert_eq!(msg.message, "hi");
                assert_eq!(msg.tags.get("badge-info"), None);
                assert_eq!(presence.user.as_deref(), Some("bob"));
            }
            other => panic!("unexpected events {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_send_requires_membership() {
        let (client, mut server) = connected(config().build().unwrap()).await;
        assert!(matches!(
            client.send_message("#never-joined", "x"),
            Err(Error::NotJoined(ref channel)) if channel == "#never-joined"
        ));
        assert!(matches!(
            client.send_message("never-joined", "x"),
            Err(Error::InvalidChannel(_))
        ));
        settle().await;
        assert!(server.try_sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_before_connect_fails_membership_first() {
        let (client, _server) = client(config().build().unwrap());
        assert!(matches!(
            client.send_message("#foo", "x"),
            Err(Error::NotJoined(_))
        ));
    }

    #[tokio::test]
    async fn test_join_and_send() {
        let (client, mut server) = connected(config().build().unwrap()).await;
        let log = record(&client, &[EventKind::Joined]);

        client.join(["#Foo", "#bar"]).await.unwrap();
        assert_eq!(server.next_sent().await, "JOIN #foo,#bar");
        let joined: Vec<_> = log
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Joined(channel) => Some(channel.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(joined, vec!["#foo", "#bar"]);
        assert_eq!(client.joined_channels(), vec!["#foo", "#bar"]);

        client.send_message("#FOO", "hello world").unwrap();
        assert_eq!(server.next_sent().await, "PRIVMSG #foo :hello world");

        client.join(Vec::<String>::new()).await.unwrap();
        assert!(matches!(
            client.join("foo").await,
            Err(Error::InvalidChannel(_))
        ));
        settle().await;
        assert!(server.try_sent().is_empty());
    }

    #[tokio::test]
    async fn test_join_connects_first() {
        let (client, mut server) = client(config().build().unwrap());
        client.join("#foo").await.unwrap();
        assert_eq!(server.next_sent().await, CAP_REQ);
        assert_eq!(server.next_sent().await, "PASS oauth:secret");
        assert_eq!(server.next_sent().await, "NICK testuser");
        assert_eq!(server.next_sent().await, "JOIN #foo");
    }

    #[tokio::test]
    async fn test_join_connect_failure() {
        let client = TwitchIrcClient::with_connector(
            config().build().unwrap(),
            Arc::new(MockConnector::failing()),
        );
        assert!(matches!(
            client.join("#foo").await,
            Err(Error::JoinConnectFailed(_))
        ));
        assert!(client.joined_channels().is_empty());
    }

    #[tokio::test]
    async fn test_leave() {
        let (client, mut server) = connected(config().build().unwrap()).await;
        client.join(["#a", "#b", "#c"]).await.unwrap();
        assert_eq!(server.next_sent().await, "JOIN #a,#b,#c");
        let log = record(&client, &[EventKind::Left]);

        client.leave("#B").unwrap();
        assert_eq!(server.next_sent().await, "PART #b");
        client.leave_all().unwrap();
        assert_eq!(server.next_sent().await, "PART #a,#c");

        let left: Vec<_> = log
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Left(channel) => Some(channel.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(left, vec!["#b", "#a", "#c"]);
        assert!(client.joined_channels().is_empty());
        assert!(matches!(
            client.send_message("#a", "x"),
            Err(Error::NotJoined(_))
        ));
    }

    #[tokio::test]
    async fn test_leave_when_not_connected() {
        let (client, mut server) = client(config().build().unwrap());
        client.leave("#a").unwrap();
        client.leave_all().unwrap();
        settle().await;
        assert!(server.try_sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_messages_sent_after_window() {
        let mut builder = config();
        builder.rate_limiter(RateLimiterConfig {
            limit: 2,
            window: Duration::from_millis(1000),
        });
        let (client, mut server) = connected(builder.build().unwrap()).await;
        client.join("#foo").await.unwrap();
        assert_eq!(server.next_sent().await, "JOIN #foo");

        let start = Instant::now();
        for text in &["one", "two", "three"] {
            client.send_message("#foo", text).unwrap();
        }
        assert_eq!(client.inspect().queued.len(), 1);

        assert_eq!(server.next_sent().await, "PRIVMSG #foo :one");
        assert_eq!(server.next_sent().await, "PRIVMSG #foo :two");
        assert_eq!(server.next_sent().await, "PRIVMSG #foo :three");
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(client.inspect().queued.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_kept_without_drain() {
        let mut builder = config();
        builder
            .rate_limiter(RateLimiterConfig {
                limit: 2,
                window: Duration::from_millis(1000),
            })
            .drain_queue(false);
        let (client, mut server) = connected(builder.build().unwrap()).await;
        client.join("#foo").await.unwrap();
        assert_eq!(server.next_sent().await, "JOIN #foo");

        for text in &["one", "two", "three"] {
            client.send_message("#foo", text).unwrap();
        }
        assert_eq!(server.next_sent().await, "PRIVMSG #foo :one");
        assert_eq!(server.next_sent().await, "PRIVMSG #foo :two");

        tokio::time::advance(Duration::from_millis(1001)).await;
        client.send_message("#foo", "four").unwrap();
        assert_eq!(server.next_sent().await, "PRIVMSG #foo :four");

        let snapshot = client.inspect();
        assert_eq!(snapshot.sent_in_window, 1);
        assert_eq!(
            snapshot.queued,
            vec![QueuedMessage {
                channel: "#foo".into(),
                text: "three".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_global_user_state() {
        let (client, server) = connected(config().build().unwrap()).await;
        let log = record(
            &client,
            &[EventKind::GlobalUserStateTags, EventKind::GlobalUserState],
        );

        server.send_frame(
            "@badge-info=;color=#FF0000;emote-sets=300,301,;user-id=1 :tmi.twitch.tv GLOBALUSERSTATE\r\n",
        );
        settle().await;

        match log.lock().as_slice() {
            [Event::GlobalUserStateTags(raw), Event::GlobalUserState(state)] => {
                assert_eq!(raw.tags.color(), Some("#FF0000"));
                assert_eq!(state.emote_sets, vec!["300", "301"]);
            }
            other => panic!("unexpected events {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_welcome_rerequests_capabilities() {
        let (_client, mut server) = connected(config().build().unwrap()).await;
        server.send_frame(":tmi.twitch.tv 001 testuser :Welcome, GLHF!\r\n");
        assert_eq!(server.next_sent().await, CAP_REQ);
    }

    #[tokio::test]
    async fn test_welcome_without_rerequest() {
        let mut builder = config();
        builder.rerequest_caps_on_welcome(false);
        let (_client, mut server) = connected(builder.build().unwrap()).await;
        server.send_frame(":tmi.twitch.tv 001 testuser :Welcome, GLHF!\r\n");
        settle().await;
        assert!(server.try_sent().is_empty());
    }

    #[tokio::test]
    async fn test_nickname_error() {
        let (client, server) = connected(config().build().unwrap()).await;
        let log = record(&client, &[EventKind::Error]);
        server.send_frame(":tmi.twitch.tv 433 * testuser :Nickname is already in use\r\n");
        settle().await;
        match log.lock().as_slice() {
            [Event::Error(err)] => assert_eq!(
                err.message,
                "Nickname error: * testuser Nickname is already in use"
            ),
            other => panic!("unexpected events {:?}", other),
        };
    }

    #[tokio::test]
    async fn test_listener_can_reply() {
        let (client, mut server) = connected(config().build().unwrap()).await;
        let replier = client.clone();
        client.on(EventKind::Message, move |event: &Event| {
            if let Event::Message(msg) = event {
                if msg.message == "!hello" {
                    replier.send_message(&msg.channel, "Hello!")?;
                }
            }
            Ok(())
        });
        client.join("#foo").await.unwrap();
        assert_eq!(server.next_sent().await, "JOIN #foo");

        server.send_frame(":ronni!ronni@ronni.tmi.twitch.tv PRIVMSG #foo :!hello\r\n");
        assert_eq!(server.next_sent().await, "PRIVMSG #foo :Hello!");
    }

    #[tokio::test]
    async fn test_close() {
        let (client, server) = connected(config().build().unwrap()).await;
        client.join("#foo").await.unwrap();
        let log = record(&client, &[EventKind::Close]);

        client.close();
        assert_eq!(client.state(), ConnectedState::Closed);
        assert!(client.joined_channels().is_empty());
        server.close();
        settle().await;
        assert_eq!(log.lock().len(), 1);
        client.leave_all().unwrap();
    }

    #[tokio::test]
    async fn test_server_close() {
        let (client, server) = connected(config().build().unwrap()).await;
        let log = record(&client, &[EventKind::Close]);
        server.close();
        settle().await;
        assert!(matches!(log.lock().as_slice(), [Event::Close]));
        assert_eq!(client.state(), ConnectedState::Closed);
    }

    #[tokio::test]
    async fn test_transport_error_closes() {
        let (client, mut server) = connected(config().build().unwrap()).await;
        client.join("#foo").await.unwrap();
        assert_eq!(server.next_sent().await, "JOIN #foo");
        let log = record(&client, &[EventKind::Error, EventKind::Close]);

        server.fail(WsError::ConnectionClosed);
        settle().await;
        match log.lock().as_slice() {
            [Event::Error(err), Event::Close] => {
                assert_eq!(err.message, "Connection error");
                assert!(matches!(
                    *err.error,
                    Error::WebsocketError(WsError::ConnectionClosed)
                ));
            }
            other => panic!("unexpected events {:?}", other),
        };
        assert_eq!(client.state(), ConnectedState::Closed);
        assert!(client.joined_channels().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_resets_membership() {
        let (connector, mut first) = mock_connection();
        let connector = Arc::new(connector);
        let mut second = connector.add_connection();
        let client = TwitchIrcClient::with_connector(config().build().unwrap(), connector.clone());
        client.join("#foo").await.unwrap();
        assert_eq!(first.next_sent().await, CAP_REQ);
        assert_eq!(first.next_sent().await, "PASS oauth:secret");
        assert_eq!(first.next_sent().await, "NICK testuser");
        assert_eq!(first.next_sent().await, "JOIN #foo");
        let log = record(&client, &[EventKind::Close, EventKind::Open]);

        client.connect().await.unwrap();
        assert!(matches!(log.lock().as_slice(), [Event::Close, Event::Open]));
        assert_eq!(client.state(), ConnectedState::Open);
        assert!(client.joined_channels().is_empty());
        assert!(matches!(
            client.send_message("#foo", "hi"),
            Err(Error::NotJoined(_))
        ));

        assert_eq!(second.next_sent().await, CAP_REQ);
        assert_eq!(second.next_sent().await, "PASS oauth:secret");
        assert_eq!(second.next_sent().await, "NICK testuser");
        settle().await;
        assert!(second.try_sent().is_empty());
    }

    #[tokio::test]
    async fn test_debug_events_mask_token() {
        let (client, _server) = client(config().build().unwrap());
        let log = record(&client, &[EventKind::Debug]);
        client.connect().await.unwrap();
        let messages: Vec<_> = log
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Debug(message) => Some(message.clone()),
                _ => None,
            })
            .collect();
        assert!(messages.iter().any(|m| m == "Sent: PASS oauth:****"));
        assert!(messages.iter().all(|m| !m.contains("secret")));
    }

    #[tokio::test]
    async fn test_debug_events_disabled() {
        let mut builder = config();
        builder.debug_events(false);
        let (client, _server) = client(builder.build().unwrap());
        let log = record(&client, &[EventKind::Debug]);
        client.connect().await.unwrap();
        assert!(log.lock().is_empty());
    }
}
