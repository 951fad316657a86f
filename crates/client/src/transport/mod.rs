//! Topic based publish/subscribe transport used by the sync core.
//!
//! A [`Transport`] is one session with the node. Pushes and connection loss
//! are both surfaced through [`Transport::next_event`]; the sync core routes
//! a push back to its subscription by [`SubscriptionId`].

mod stomp;

pub use stomp::{StompConnector, StompTransport};

use std::fmt;

use async_trait::async_trait;
use ledgersync_shared::TransportError;

/// Opaque handle the transport returns for one topic subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something that happened on an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A push on one of our subscriptions.
    Message {
        subscription: SubscriptionId,
        body: String,
    },
    /// The session is gone; no further events will follow.
    Closed { reason: String },
}

/// One session with the node's pub/sub endpoint.
#[async_trait]
pub trait Transport: Send {
    /// Open the session. Resolves once the node acknowledged the handshake.
    async fn connect(&mut self, headers: &[(String, String)]) -> Result<(), TransportError>;

    async fn subscribe(&mut self, topic: &str) -> Result<SubscriptionId, TransportError>;

    async fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Wait for the next push or for connection loss.
    async fn next_event(&mut self) -> TransportEvent;
}

/// Builds a fresh, unconnected transport for every (re)connect attempt.
pub trait TransportFactory: Send + Sync {
    type Transport: Transport;

    fn create(&self) -> Self::Transport;
}
