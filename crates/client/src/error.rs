//! Error taxonomy of the synchronization core.

use std::time::Duration;

use ledgersync_shared::{ApiError, TransportError};
use thiserror::Error;

/// Errors surfaced by the synchronization core.
///
/// Only `ConnectionTimeout` and `ReconnectExhausted` ever leave the client;
/// the push-handling variants are logged at the dispatch boundary and the
/// offending message is dropped.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no handshake completed within {0:?}")]
    ConnectionTimeout(Duration),
    #[error("reconnection abandoned after {attempts} failed attempts")]
    ReconnectExhausted { attempts: u32 },
    #[error("balance push for unknown address {0}")]
    AddressNotFound(String),
    #[error("propagation push for {received} on the topic of {expected}")]
    PropagationMismatch { expected: String, received: String },
    #[error("malformed push on {topic}: {reason}")]
    MalformedPush { topic: String, reason: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SyncError {
    pub(crate) fn malformed(topic: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::MalformedPush {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by a [`Wallet`](crate::wallet::Wallet) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("failed to derive address {index}: {reason}")]
    Derivation { index: u32, reason: String },
    #[error("address {0} has no derivation index")]
    Unindexed(String),
}
