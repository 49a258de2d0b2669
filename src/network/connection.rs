use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the socket reader hands to the subscriber.
#[derive(Debug)]
pub enum Frame {
    Text(String),
    /// The reader stopped; no further frames follow.
    Failed(TransportError),
}

/// Open the feed socket and spawn its reader task.
///
/// The TCP connect and WebSocket handshake together are bounded by
/// `connect_timeout`. The reader owns the socket. Aborting the returned
/// handle tears the socket down immediately and drops the frame sender,
/// which any pending receive on the other side observes as a disconnect.
pub(crate) async fn open(
    url: &Url,
    capacity: usize,
    connect_timeout: Duration,
) -> Result<(mpsc::Receiver<Frame>, JoinHandle<()>), TransportError> {
    info!("Connecting to {}...", url);

    let (ws_stream, _) = tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| {
            TransportError::Connect(format!(
                "no handshake from {} within {:?}",
                url, connect_timeout
            ))
        })??;
    info!("Connected to feed {}", url);

    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(read_loop(ws_stream, tx));
    Ok((rx, handle))
}

async fn read_loop(ws_stream: WsStream, frames: mpsc::Sender<Frame>) {
    // The feed is receive-only; the write half is never used.
    let (_write, mut read) = ws_stream.split();

    loop {
        let frame = match read.next().await {
            Some(Ok(Message::Text(text))) => Frame::Text(text.to_string()),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Frame::Text(text),
                Err(_) => {
                    debug!("Skipping non UTF-8 binary frame");
                    continue;
                }
            },
            Some(Ok(Message::Close(_))) => {
                warn!("Feed closed by publisher");
                Frame::Failed(TransportError::Disconnected)
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                error!("WebSocket error: {}", e);
                Frame::Failed(TransportError::Socket(e))
            }
            None => {
                warn!("Stream ended unexpectedly");
                Frame::Failed(TransportError::Disconnected)
            }
        };

        let terminal = matches!(frame, Frame::Failed(_));
        if frames.send(frame).await.is_err() {
            debug!("Subscriber dropped, stopping reader");
            return;
        }
        if terminal {
            return;
        }
    }
}
