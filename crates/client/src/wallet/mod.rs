//! The wallet contract consumed by the sync core.
//!
//! The wallet owns addresses, balances and transaction records. The sync core
//! never mutates that state directly: every change goes through the mutators
//! of [`Wallet`], which are also responsible for emitting [`WalletEvent`]s.

mod events;
mod memory;

pub use events::{EventBus, WalletEvent};
pub use memory::{AddressDeriver, InMemoryWallet, Sha256Deriver};

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgersync_shared::{instant_from_wire, RawTransaction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// An address handle. Equality is by value: the hex string plus its
/// derivation index, if the address came from the HD sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub address_hex: String,
    pub index: Option<u32>,
}

impl Address {
    pub fn indexed(address_hex: impl Into<String>, index: u32) -> Self {
        Self {
            address_hex: address_hex.into(),
            index: Some(index),
        }
    }

    pub fn imported(address_hex: impl Into<String>) -> Self {
        Self {
            address_hex: address_hex.into(),
            index: None,
        }
    }
}

/// Confirmed and provisional balance of one address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceState {
    pub balance: Decimal,
    /// Includes transactions not yet final under consensus.
    pub pre_balance: Decimal,
}

impl BalanceState {
    pub fn new(balance: Decimal, pre_balance: Decimal) -> Self {
        Self {
            balance,
            pre_balance,
        }
    }

    /// Build from wire values, reading `null` as zero.
    pub fn from_wire(balance: Option<Decimal>, pre_balance: Option<Decimal>) -> Self {
        Self {
            balance: balance.unwrap_or(Decimal::ZERO),
            pre_balance: pre_balance.unwrap_or(Decimal::ZERO),
        }
    }
}

/// A transaction as the wallet stores it, keyed by `hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub amount: Decimal,
    pub transaction_type: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub attachment_time: Option<DateTime<Utc>>,
    pub transaction_consensus_update_time: Option<DateTime<Utc>>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TransactionRecord {
    /// Convert the node's wire form, turning epoch-second instants into
    /// timestamps. Fails on an instant that is not representable.
    pub fn from_wire(raw: RawTransaction) -> Result<Self, String> {
        fn instant(field: &str, value: Option<f64>) -> Result<Option<DateTime<Utc>>, String> {
            value
                .map(|seconds| {
                    instant_from_wire(seconds)
                        .ok_or_else(|| format!("{} {} is not a valid instant", field, seconds))
                })
                .transpose()
        }

        Ok(Self {
            create_time: instant("createTime", raw.create_time)?,
            attachment_time: instant("attachmentTime", raw.attachment_time)?,
            transaction_consensus_update_time: instant(
                "transactionConsensusUpdateTime",
                raw.transaction_consensus_update_time,
            )?,
            hash: raw.hash,
            amount: raw.amount.unwrap_or(Decimal::ZERO),
            transaction_type: raw.transaction_type,
            extra: raw.extra,
        })
    }

    /// Same hash and same consensus-update time: merging `other` changes nothing.
    pub fn is_same_update(&self, other: &TransactionRecord) -> bool {
        self.hash == other.hash
            && self.transaction_consensus_update_time == other.transaction_consensus_update_time
    }
}

/// Wallet operations the sync core relies on.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Hex strings of every address the wallet knows.
    fn address_hexes(&self) -> Vec<String>;

    fn address_map(&self) -> HashMap<String, Address>;

    fn address(&self, address_hex: &str) -> Option<Address> {
        self.address_map().remove(address_hex)
    }

    /// Derive (without storing) the address at `index`. May suspend, e.g. on
    /// a hardware signer.
    async fn generate_address_by_index(&self, index: u32) -> Result<Address, WalletError>;

    /// Upper bound on derivable addresses, if the wallet has one.
    fn max_address_count(&self) -> Option<u32>;

    /// Current balance of a known address.
    fn balance(&self, address_hex: &str) -> Option<BalanceState>;

    /// Store balances unconditionally and emit `BalanceChanged`.
    fn set_address_with_balance(&self, address: &Address, balance: Decimal, pre_balance: Decimal);

    /// Snapshot path: store and notify only when the values differ from what
    /// is held. Returns whether anything changed.
    fn reconcile_balance(&self, address: &Address, snapshot: BalanceState) -> bool {
        if self.balance(&address.address_hex) == Some(snapshot) {
            return false;
        }
        self.set_address_with_balance(address, snapshot.balance, snapshot.pre_balance);
        true
    }

    /// Merge a transaction. A record with the same hash and consensus-update
    /// time as the stored one is a no-op; anything else replaces it and emits
    /// `TransactionReceived`.
    fn set_transaction(&self, record: TransactionRecord);

    /// A watched address saw its first activity and now belongs to the wallet.
    fn on_address_generated(&self, address: Address);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw(hash: &str, consensus: Option<f64>) -> RawTransaction {
        RawTransaction {
            hash: hash.to_string(),
            amount: Some(dec!(4.2)),
            transaction_type: Some("Transfer".to_string()),
            create_time: Some(1_600_000_000.0),
            attachment_time: None,
            transaction_consensus_update_time: consensus,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn null_balances_read_as_zero() {
        let state = BalanceState::from_wire(None, Some(dec!(1.5)));
        assert_eq!(state, BalanceState::new(Decimal::ZERO, dec!(1.5)));
    }

    #[test]
    fn wire_transaction_timestamps_are_normalized() {
        let record = TransactionRecord::from_wire(raw("tx", Some(1_600_000_100.5))).unwrap();
        assert_eq!(record.create_time.unwrap().timestamp(), 1_600_000_000);
        assert_eq!(
            record
                .transaction_consensus_update_time
                .unwrap()
                .timestamp_subsec_millis(),
            500
        );
        assert_eq!(record.attachment_time, None);
        assert_eq!(record.amount, dec!(4.2));
    }

    #[test]
    fn unrepresentable_instant_is_rejected() {
        assert!(TransactionRecord::from_wire(raw("tx", Some(f64::INFINITY))).is_err());
    }

    #[test]
    fn same_update_requires_matching_consensus_time() {
        let a = TransactionRecord::from_wire(raw("tx", Some(10.0))).unwrap();
        let b = TransactionRecord::from_wire(raw("tx", Some(10.0))).unwrap();
        let c = TransactionRecord::from_wire(raw("tx", Some(11.0))).unwrap();
        let d = TransactionRecord::from_wire(raw("other", Some(10.0))).unwrap();
        assert!(a.is_same_update(&b));
        assert!(!a.is_same_update(&c));
        assert!(!a.is_same_update(&d));
    }
}
