use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, SessionError};

/// What the socket task reports back to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    /// One binary message, tag byte included.
    Frame(Bytes),
    Closed { reason: Option<String> },
    Failed(String),
}

/// Session side of a socket: outbound text frames in, socket events out.
///
/// Dropping the connection closes the socket.
#[derive(Debug)]
pub struct Connection {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<TransportEvent>,
}

/// Socket side of a [`Connection`].
#[derive(Debug)]
pub struct TransportPeer {
    pub events: mpsc::Sender<TransportEvent>,
    pub outbound: mpsc::Receiver<String>,
}

impl Connection {
    pub fn channel(capacity: usize) -> (Connection, TransportPeer) {
        let capacity = capacity.max(1);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (ev_tx, ev_rx) = mpsc::channel(capacity);
        (
            Connection {
                outbound: out_tx,
                inbound: ev_rx,
            },
            TransportPeer {
                events: ev_tx,
                outbound: out_rx,
            },
        )
    }

    /// Queue a text frame without waiting.
    pub fn send(&self, frame: String) -> Result<()> {
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::OutboundFull,
            TrySendError::Closed(_) => SessionError::SocketClosed,
        })
    }

    /// `None` once the socket task has gone away.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }
}

/// Opens the live-log socket for a task.
pub trait Connector: Send {
    fn connect(&self, task_id: &str) -> Connection;
}

/// Connects to `ws(s)://<server>/ws?id=<task>` with tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsConnector {
    server: Url,
    capacity: usize,
}

impl WsConnector {
    pub fn new(server: Url, capacity: usize) -> Self {
        Self { server, capacity }
    }
}

impl Connector for WsConnector {
    fn connect(&self, task_id: &str) -> Connection {
        let (connection, peer) = Connection::channel(self.capacity);
        match tq_protocol::socket_url(&self.server, task_id) {
            Ok(url) => {
                tokio::spawn(drive_socket(url, peer));
            }
            Err(e) => {
                let _ = peer.events.try_send(TransportEvent::Failed(e.to_string()));
            }
        }
        connection
    }
}

/// Pump one WebSocket until either side closes.
async fn drive_socket(url: Url, mut peer: TransportPeer) {
    debug!(%url, "connecting");
    let connected = tokio::select! {
        res = connect_async(url.as_str()) => res,
        _ = peer.events.closed() => return,
    };
    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!(%url, error = %e, "websocket connect failed");
            let _ = peer.events.send(TransportEvent::Failed(e.to_string())).await;
            return;
        }
    };
    info!(%url, "websocket open");
    if peer.events.send(TransportEvent::Opened).await.is_err() {
        return;
    }

    let (mut sink, mut stream) = stream.split();
    loop {
        tokio::select! {
            outbound = peer.outbound.recv() => match outbound {
                Some(text) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        warn!(error = %e, "websocket send failed");
                        let _ = peer.events.send(TransportEvent::Failed(e.to_string())).await;
                        break;
                    }
                }
                None => {
                    debug!("session dropped connection, closing socket");
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Binary(data))) => {
                    if peer.events.send(TransportEvent::Frame(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    debug!(len = text.len(), "ignoring text message");
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty());
                    info!(?reason, "websocket closed by server");
                    let _ = peer.events.send(TransportEvent::Closed { reason }).await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket error");
                    let _ = peer.events.send(TransportEvent::Failed(e.to_string())).await;
                    break;
                }
                None => {
                    let _ = peer.events.send(TransportEvent::Closed { reason: None }).await;
                    break;
                }
            },
        }
    }
}
