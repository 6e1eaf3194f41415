//! Websocket transport behind a trait, so the client can run against an in-memory connection

use std::pin::Pin;

use futures_core::Stream;
use futures_sink::Sink;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

use crate::Error;

/// Write half of a connection
pub type WsSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
/// Read half of a connection
pub type WsStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Opens connections to the chat server
pub trait Connector: Send + Sync {
    /// Resolves once the connection is open
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<(WsSink, WsStream), Error>>;
}

/// Websocket connection using the `irc` subprotocol
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<(WsSink, WsStream), Error>> {
        let url = url.clone();
        Box::pin(async move {
            let mut request = url.as_str().into_client_request()?;
            request
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("irc"));
            let (socket, response) = connect_async(request).await?;
            debug!("Websocket handshake done, status {}", response.status());
            let (sink, stream) = socket.split();
            Ok((Box::pin(sink) as WsSink, Box::pin(stream) as WsStream))
        })
    }
}

#[cfg(test)]
pub(crate) use mock::*;
