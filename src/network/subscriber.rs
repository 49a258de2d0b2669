//! Non-blocking access to the envelope feed.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::connection::{self, Frame};
use crate::error::{RecvError, TransportError};
use crate::model::Envelope;

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    Connected,
    /// Terminal after a transport failure. Only `reconnect` leaves it.
    Disconnected,
    /// Closed on request.
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A best-effort subscription that never blocks past the caller's timeout.
pub trait Subscriber: Send {
    fn connect(&mut self, endpoint: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait up to `timeout` for an envelope to become available.
    /// A zero timeout only checks.
    fn poll_ready(&mut self, timeout: Duration) -> impl Future<Output = bool> + Send;

    fn receive_non_blocking(&mut self) -> Result<Envelope, RecvError>;

    /// Leave the terminal disconnected state by connecting again.
    fn reconnect(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn close(&mut self);

    fn state(&self) -> ConnectionState;
}

/// Default bound on the feed handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Subscriber backed by a bounded frame channel.
///
/// With [`FeedSubscriber::connect`] the channel is filled by a WebSocket
/// reader task; with [`FeedSubscriber::from_channel`] any in-process
/// producer can feed it.
pub struct FeedSubscriber {
    endpoint: Option<Url>,
    capacity: usize,
    connect_timeout: Duration,
    frames: Option<mpsc::Receiver<Frame>>,
    /// Frame pulled by `poll_ready` but not yet consumed.
    lookahead: Option<Frame>,
    reader: Option<JoinHandle<()>>,
    state: ConnectionState,
}

impl FeedSubscriber {
    pub fn new(capacity: usize) -> Self {
        Self {
            endpoint: None,
            capacity,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            frames: None,
            lookahead: None,
            reader: None,
            state: ConnectionState::Idle,
        }
    }

    /// Bound `connect` and `reconnect` by `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// An already-connected subscriber fed through the returned sender.
    pub fn from_channel(capacity: usize) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut subscriber = Self::new(capacity);
        subscriber.frames = Some(rx);
        subscriber.state = ConnectionState::Connected;
        (tx, subscriber)
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    fn teardown(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.frames = None;
        self.lookahead = None;
    }

    fn mark_disconnected(&mut self) {
        if self.state == ConnectionState::Connected {
            warn!("Feed subscriber disconnected");
        }
        self.teardown();
        self.state = ConnectionState::Disconnected;
    }

    fn unavailable(&self) -> TransportError {
        match self.state {
            ConnectionState::Closed => TransportError::Closed,
            _ => TransportError::Disconnected,
        }
    }

    fn next_frame(&mut self) -> Result<Frame, RecvError> {
        if let Some(frame) = self.lookahead.take() {
            return Ok(frame);
        }
        let Some(frames) = self.frames.as_mut() else {
            return Err(self.unavailable().into());
        };
        match frames.try_recv() {
            Ok(frame) => Ok(frame),
            Err(TryRecvError::Empty) => Err(RecvError::WouldBlock),
            Err(TryRecvError::Disconnected) => {
                self.mark_disconnected();
                Err(TransportError::Disconnected.into())
            }
        }
    }
}

impl Subscriber for FeedSubscriber {
    async fn connect(&mut self, endpoint: &str) -> Result<(), TransportError> {
        let url = Url::parse(endpoint).map_err(|e| TransportError::Connect(e.to_string()))?;
        self.teardown();

        match connection::open(&url, self.capacity, self.connect_timeout).await {
            Ok((frames, reader)) => {
                self.frames = Some(frames);
                self.reader = Some(reader);
                self.endpoint = Some(url);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.endpoint = Some(url);
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn poll_ready(&mut self, timeout: Duration) -> bool {
        if self.lookahead.is_some() {
            return true;
        }
        let Some(frames) = self.frames.as_mut() else {
            return false;
        };

        let received = if timeout.is_zero() {
            match frames.try_recv() {
                Ok(frame) => Some(frame),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => None,
            }
        } else {
            match tokio::time::timeout(timeout, frames.recv()).await {
                Ok(frame) => frame,
                Err(_) => return false,
            }
        };

        match received {
            Some(frame) => {
                self.lookahead = Some(frame);
                true
            }
            None => {
                self.mark_disconnected();
                false
            }
        }
    }

    fn receive_non_blocking(&mut self) -> Result<Envelope, RecvError> {
        match self.next_frame()? {
            Frame::Text(text) => Envelope::decode(&text).map_err(RecvError::from),
            Frame::Failed(e) => {
                self.mark_disconnected();
                Err(e.into())
            }
        }
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        let Some(endpoint) = self.endpoint.clone() else {
            return Err(TransportError::Connect(
                "no endpoint to reconnect to".to_string(),
            ));
        };
        info!("Reconnecting to {}", endpoint);
        self.connect(endpoint.as_str()).await
    }

    fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            debug!("Closing feed subscriber");
        }
        self.teardown();
        self.state = ConnectionState::Closed;
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

impl Drop for FeedSubscriber {
    fn drop(&mut self) {
        self.teardown();
    }
}
