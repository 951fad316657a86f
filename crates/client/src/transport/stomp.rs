//! STOMP-over-WebSocket transport using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use ledgersync_shared::{StompCommand, StompFrame, TransportError};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
};

use super::{SubscriptionId, Transport, TransportEvent, TransportFactory};

/// Creates a [`StompTransport`] per connect attempt.
#[derive(Debug, Clone)]
pub struct StompConnector {
    url: String,
}

impl StompConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl TransportFactory for StompConnector {
    type Transport = StompTransport;

    fn create(&self) -> StompTransport {
        StompTransport::new(self.url.clone())
    }
}

/// A single STOMP session with the node.
///
/// Once connected, a writer task drains outgoing frames and a reader task
/// turns MESSAGE frames into [`TransportEvent`]s, ending with `Closed`.
pub struct StompTransport {
    url: String,
    outgoing: Option<mpsc::UnboundedSender<Message>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    next_subscription: u64,
}

impl StompTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            outgoing: None,
            events: None,
            next_subscription: 0,
        }
    }

    fn send_frame(&self, frame: StompFrame) -> Result<(), TransportError> {
        let outgoing = self.outgoing.as_ref().ok_or(TransportError::NotConnected)?;
        outgoing
            .send(Message::text(frame.encode()))
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }
}

#[async_trait]
impl Transport for StompTransport {
    async fn connect(&mut self, headers: &[(String, String)]) -> Result<(), TransportError> {
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let connect_frame = StompFrame::connect(&self.host(), headers);
        write
            .send(Message::text(connect_frame.encode()))
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        await_connected(&mut read).await?;
        tracing::info!(url = %self.url, "STOMP session established");

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<TransportEvent>();

        // Write task
        let url_for_write = self.url.clone();
        tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                if let Err(e) = write.send(message).await {
                    tracing::error!(url = %url_for_write, error = %e, "STOMP send failed");
                    break;
                }
            }
            let _ = write.close().await;
        });

        // Read task
        tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => match StompFrame::decode(&text) {
                        Ok(Some(frame)) => match frame.command {
                            StompCommand::Message => {
                                let Some(subscription) = frame.get("subscription") else {
                                    tracing::warn!("MESSAGE frame without subscription header");
                                    continue;
                                };
                                let event = TransportEvent::Message {
                                    subscription: SubscriptionId::new(subscription),
                                    body: frame.body.clone(),
                                };
                                if events_tx.send(event).is_err() {
                                    break "event receiver dropped".to_string();
                                }
                            }
                            StompCommand::Error => {
                                break format!(
                                    "node sent ERROR: {}",
                                    frame.get("message").unwrap_or(frame.body.as_str())
                                );
                            }
                            other => {
                                tracing::debug!(command = other.as_str(), "ignoring STOMP frame")
                            }
                        },
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error = %e, "dropping undecodable frame"),
                    },
                    Some(Ok(Message::Close(_))) => break "close frame received".to_string(),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break format!("read error: {}", e),
                    None => break "stream ended".to_string(),
                }
            };
            let _ = events_tx.send(TransportEvent::Closed { reason });
        });

        self.outgoing = Some(outgoing_tx);
        self.events = Some(events_rx);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<SubscriptionId, TransportError> {
        let id = format!("sub-{}", self.next_subscription);
        self.send_frame(StompFrame::subscribe(&id, topic))?;
        self.next_subscription += 1;
        Ok(SubscriptionId(id))
    }

    async fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), TransportError> {
        self.send_frame(StompFrame::unsubscribe(id.as_str()))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let result = self.send_frame(StompFrame::disconnect());
        // Dropping the sender ends the write task, which closes the socket.
        self.outgoing = None;
        self.events = None;
        result
    }

    async fn next_event(&mut self) -> TransportEvent {
        let Some(events) = self.events.as_mut() else {
            return TransportEvent::Closed {
                reason: "not connected".to_string(),
            };
        };
        events.recv().await.unwrap_or_else(|| TransportEvent::Closed {
            reason: "reader task ended".to_string(),
        })
    }
}

/// Read frames until the node answers CONNECT with CONNECTED or ERROR.
async fn await_connected<S>(read: &mut S) -> Result<(), TransportError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = read.next().await {
        match message.map_err(|e| TransportError::Connect(e.to_string()))? {
            Message::Text(text) => match StompFrame::decode(&text)? {
                Some(frame) if frame.command == StompCommand::Connected => return Ok(()),
                Some(frame) if frame.command == StompCommand::Error => {
                    let reason = frame
                        .get("message")
                        .map(str::to_string)
                        .unwrap_or_else(|| frame.body.clone());
                    return Err(TransportError::Connect(reason));
                }
                Some(frame) => {
                    tracing::debug!(command = frame.command.as_str(), "frame before CONNECTED")
                }
                None => {}
            },
            Message::Close(_) => {
                return Err(TransportError::Closed(
                    "socket closed during handshake".to_string(),
                ))
            }
            _ => {}
        }
    }
    Err(TransportError::Closed(
        "stream ended during handshake".to_string(),
    ))
}
