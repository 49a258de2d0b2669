//! Synchronous command/response exchange with the bus backend.
//!
//! Runs on its own connection and always carries a timeout, so a stalled
//! round trip can never hold up the ingestion schedule.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{CommandError, FeedError};
use crate::model::{CommandRequest, CommandResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct CommandClient {
    url: Url,
    timeout: Duration,
    socket: Option<WsStream>,
}

impl CommandClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, FeedError> {
        Ok(Self {
            url: Url::parse(url)?,
            timeout,
            socket: None,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Connects the command socket, bounded by the client timeout.
    pub async fn connect(&mut self) -> Result<(), CommandError> {
        self.socket = None;
        let (socket, _) = tokio::time::timeout(self.timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| CommandError::Timeout(self.timeout))??;
        info!("Connected to backend command socket {}", self.url);
        self.socket = Some(socket);
        Ok(())
    }

    /// Send one request and wait for its response.
    ///
    /// A backend reply with `status = "error"` is returned as-is; only the
    /// exchange itself can fail. After a timeout or transport failure the
    /// socket is dropped and the client must `connect` again, since a late
    /// reply would otherwise be paired with the next request.
    pub async fn send(
        &mut self,
        command: &str,
        args: Option<Value>,
    ) -> Result<CommandResponse, CommandError> {
        let request = CommandRequest::new(command, args);
        let payload = serde_json::to_string(&request)?;
        let timeout = self.timeout;

        let socket = self.socket.as_mut().ok_or(CommandError::NotConnected)?;
        debug!("Sending command '{}'", command);

        match tokio::time::timeout(timeout, exchange(socket, payload)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                error!("Error sending command '{}': {}", command, e);
                self.socket = None;
                Err(e)
            }
            Err(_) => {
                warn!("Command '{}' timed out after {:?}", command, timeout);
                self.socket = None;
                Err(CommandError::Timeout(timeout))
            }
        }
    }

    /// Like [`send`](Self::send) but maps an error status to `Rejected`.
    pub async fn expect_success(
        &mut self,
        command: &str,
        args: Option<Value>,
    ) -> Result<CommandResponse, CommandError> {
        let response = self.send(command, args).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(CommandError::Rejected(response.message))
        }
    }

    pub async fn load_dbc(&mut self, file_path: &str) -> Result<CommandResponse, CommandError> {
        self.expect_success("load_dbc", Some(json!({ "file_path": file_path })))
            .await
    }

    pub async fn connect_can(
        &mut self,
        interface: &str,
        channel: &str,
        bitrate: u32,
    ) -> Result<CommandResponse, CommandError> {
        self.expect_success(
            "connect_can",
            Some(json!({
                "interface": interface,
                "channel": channel,
                "bitrate": bitrate,
            })),
        )
        .await
    }

    /// Ask the backend to encode and transmit a message.
    ///
    /// `signal_data` must be a JSON object of signal name to value.
    pub async fn send_can_message(
        &mut self,
        message_name: &str,
        signal_data: Value,
    ) -> Result<CommandResponse, CommandError> {
        if !signal_data.is_object() {
            return Err(CommandError::Rejected(
                "Signal data must be a JSON object".to_string(),
            ));
        }
        self.expect_success(
            "send_can_message",
            Some(json!({
                "message_name": message_name,
                "signal_data": signal_data,
            })),
        )
        .await
    }

    pub fn close(&mut self) {
        self.socket = None;
    }
}

async fn exchange(socket: &mut WsStream, payload: String) -> Result<CommandResponse, CommandError> {
    socket.send(Message::Text(payload.into())).await?;
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                return Ok(serde_json::from_str::<CommandResponse>(&text)?);
            }
            Some(Ok(Message::Close(_))) | None => return Err(CommandError::NotConnected),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(CommandError::Transport(e)),
        }
    }
}
