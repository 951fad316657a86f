//! Synchronization core: keeps a wallet in step with a node over pub/sub.
//!
//! This module provides:
//! - Connection management with bounded reconnect
//! - Subscription bookkeeping per topic family
//! - Address discovery through a lookahead window of propagation topics
//! - Application of balance and transaction pushes to the wallet
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    SyncClient                       │
//! │   (owns transport, registry and connection state)   │
//! └─────────────────────────────────────────────────────┘
//!          │                             ▲
//!          │ subscribe/unsubscribe       │ TransportEvent
//!          ▼                             │
//!   ┌──────────────────────────────────────────┐
//!   │        Transport (STOMP over WS)         │
//!   └──────────────────────────────────────────┘
//!                         │ dispatch by SubscriptionId
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │Propagation │ │  Balance   │ │Transaction │
//!   │ (frontier) │ │   push     │ │   push     │
//!   └────────────┘ └────────────┘ └────────────┘
//!          │              │              │
//!          └──────────────┼──────────────┘
//!                         ▼
//!              ┌─────────────────────┐
//!              │       Wallet        │
//!              │ (mutators + events) │
//!              └─────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut client = SyncClient::new(config, StompConnector::new(url), wallet, api)
//!     .with_on_reconnect_failed(|e| tracing::error!(error = %e, "sync stopped"));
//! client.connect().await?;
//! client.run().await?;
//! ```

mod balance;
mod client;
mod connection;
mod discovery;
mod registry;

pub use client::{ShutdownHandle, SyncClient};
pub use connection::{ConnectionState, ReconnectConfig};
pub use discovery::{frontier_end, frontier_start, next_frontier_index};
pub use registry::{Route, Subscription, SubscriptionRegistry};
