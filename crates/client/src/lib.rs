//! Ledgersync Client - wallet synchronization over a node's pub/sub API
//!
//! This crate keeps a wallet's addresses, balances and transactions in step
//! with a node: it discovers used addresses through propagation topics,
//! follows balance and transaction pushes, and reconnects within a bounded
//! retry budget.

pub mod api_client;
pub mod config;
pub mod error;
pub mod logging;
pub mod sync;
pub mod transport;
pub mod wallet;

pub use api_client::{BalanceChecker, NodeApiClient};
pub use config::SyncConfig;
pub use error::{SyncError, WalletError};
pub use logging::init_logging;
pub use sync::{ConnectionState, ReconnectConfig, ShutdownHandle, SyncClient};
pub use transport::{StompConnector, StompTransport, Transport, TransportFactory};
pub use wallet::{Address, BalanceState, InMemoryWallet, Sha256Deriver, Wallet, WalletEvent};
