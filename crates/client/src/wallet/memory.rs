//! In-memory watch-only wallet.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use super::{Address, BalanceState, EventBus, TransactionRecord, Wallet, WalletEvent};
use crate::error::WalletError;

/// Maps a derivation index to an address hex string.
#[async_trait]
pub trait AddressDeriver: Send + Sync {
    async fn derive(&self, index: u32) -> Result<String, WalletError>;
}

/// Deterministic watch-only deriver: `hex(sha256(seed || index_be))`.
///
/// Stands in for real key derivation, which lives outside this crate.
#[derive(Clone)]
pub struct Sha256Deriver {
    seed: Vec<u8>,
}

impl Sha256Deriver {
    pub fn new(seed: impl Into<Vec<u8>>) -> Self {
        Self { seed: seed.into() }
    }
}

impl std::fmt::Debug for Sha256Deriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sha256Deriver").finish_non_exhaustive()
    }
}

#[async_trait]
impl AddressDeriver for Sha256Deriver {
    async fn derive(&self, index: u32) -> Result<String, WalletError> {
        let mut hasher = Sha256::new();
        hasher.update(&self.seed);
        hasher.update(index.to_be_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

#[derive(Debug, Clone)]
struct StoredAddress {
    address: Address,
    balance: BalanceState,
}

#[derive(Debug, Default)]
struct WalletState {
    addresses: HashMap<String, StoredAddress>,
    transactions: HashMap<String, TransactionRecord>,
}

/// Wallet keeping addresses, balances and transactions in memory, with
/// observer-style event delivery.
#[derive(Debug)]
pub struct InMemoryWallet<D = Sha256Deriver> {
    deriver: D,
    max_address_count: Option<u32>,
    state: RwLock<WalletState>,
    events: EventBus,
}

impl<D: AddressDeriver> InMemoryWallet<D> {
    pub fn new(deriver: D) -> Self {
        Self {
            deriver,
            max_address_count: None,
            state: RwLock::new(WalletState::default()),
            events: EventBus::new(),
        }
    }

    pub fn with_max_address_count(mut self, max: u32) -> Self {
        self.max_address_count = Some(max);
        self
    }

    /// Register a listener for every wallet event.
    pub fn on_event(&self, listener: impl Fn(&WalletEvent) + Send + Sync + 'static) {
        self.events.subscribe(listener);
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Restore a previously known address without emitting anything.
    /// Returns false if the address was already present.
    pub fn add_address(&self, address: Address) -> bool {
        let mut state = self.write();
        if state.addresses.contains_key(&address.address_hex) {
            return false;
        }
        state.addresses.insert(
            address.address_hex.clone(),
            StoredAddress {
                address,
                balance: BalanceState::default(),
            },
        );
        true
    }

    pub fn transaction(&self, hash: &str) -> Option<TransactionRecord> {
        self.read().transactions.get(hash).cloned()
    }

    pub fn transaction_count(&self) -> usize {
        self.read().transactions.len()
    }

    /// Sum of balances over all addresses.
    pub fn total_balance(&self) -> BalanceState {
        self.read()
            .addresses
            .values()
            .fold(BalanceState::default(), |acc, stored| BalanceState {
                balance: acc.balance + stored.balance.balance,
                pre_balance: acc.pre_balance + stored.balance.pre_balance,
            })
    }

    fn read(&self) -> RwLockReadGuard<'_, WalletState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, WalletState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<D: AddressDeriver> Wallet for InMemoryWallet<D> {
    fn address_hexes(&self) -> Vec<String> {
        self.read().addresses.keys().cloned().collect()
    }

    fn address_map(&self) -> HashMap<String, Address> {
        self.read()
            .addresses
            .iter()
            .map(|(hex, stored)| (hex.clone(), stored.address.clone()))
            .collect()
    }

    fn address(&self, address_hex: &str) -> Option<Address> {
        self.read()
            .addresses
            .get(address_hex)
            .map(|stored| stored.address.clone())
    }

    async fn generate_address_by_index(&self, index: u32) -> Result<Address, WalletError> {
        if let Some(max) = self.max_address_count {
            if index >= max {
                return Err(WalletError::Derivation {
                    index,
                    reason: format!("wallet is limited to {} addresses", max),
                });
            }
        }
        let address_hex = self.deriver.derive(index).await?;
        Ok(Address::indexed(address_hex, index))
    }

    fn max_address_count(&self) -> Option<u32> {
        self.max_address_count
    }

    fn balance(&self, address_hex: &str) -> Option<BalanceState> {
        self.read()
            .addresses
            .get(address_hex)
            .map(|stored| stored.balance)
    }

    fn set_address_with_balance(&self, address: &Address, balance: Decimal, pre_balance: Decimal) {
        let balance = BalanceState::new(balance, pre_balance);
        {
            let mut state = self.write();
            state
                .addresses
                .entry(address.address_hex.clone())
                .and_modify(|stored| stored.balance = balance)
                .or_insert_with(|| StoredAddress {
                    address: address.clone(),
                    balance,
                });
        }
        self.events.emit(&WalletEvent::BalanceChanged {
            address: address.clone(),
            balance,
        });
    }

    fn set_transaction(&self, record: TransactionRecord) {
        {
            let mut state = self.write();
            if let Some(stored) = state.transactions.get(&record.hash) {
                if stored.is_same_update(&record) {
                    return;
                }
            }
            state.transactions.insert(record.hash.clone(), record.clone());
        }
        self.events.emit(&WalletEvent::TransactionReceived(record));
    }

    fn on_address_generated(&self, address: Address) {
        if !self.add_address(address.clone()) {
            return;
        }
        self.events.emit(&WalletEvent::AddressGenerated(address));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};

    fn wallet() -> InMemoryWallet {
        InMemoryWallet::new(Sha256Deriver::new(b"unit-seed".to_vec()))
    }

    fn record(hash: &str, consensus_secs: Option<i64>) -> TransactionRecord {
        TransactionRecord {
            hash: hash.to_string(),
            amount: dec!(1),
            transaction_type: None,
            create_time: None,
            attachment_time: None,
            transaction_consensus_update_time: consensus_secs
                .and_then(|s| chrono::DateTime::from_timestamp(s, 0)),
            extra: serde_json::Map::new(),
        }
    }

    fn recorded_events(wallet: &InMemoryWallet) -> Arc<Mutex<Vec<WalletEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        wallet.on_event(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[tokio::test]
    async fn derivation_is_deterministic_and_bounded() {
        let wallet = wallet().with_max_address_count(2);
        let a = wallet.generate_address_by_index(1).await.unwrap();
        let b = wallet.generate_address_by_index(1).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.index, Some(1));
        assert_eq!(a.address_hex.len(), 64);
        assert!(wallet.generate_address_by_index(2).await.is_err());
    }

    #[test]
    fn identical_transaction_update_is_a_noop() {
        let wallet = wallet();
        let events = recorded_events(&wallet);

        wallet.set_transaction(record("tx1", Some(100)));
        wallet.set_transaction(record("tx1", Some(100)));

        assert_eq!(wallet.transaction_count(), 1);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn newer_transaction_update_replaces_record() {
        let wallet = wallet();
        let events = recorded_events(&wallet);

        wallet.set_transaction(record("tx1", None));
        wallet.set_transaction(record("tx1", Some(200)));

        let stored = wallet.transaction("tx1").unwrap();
        assert_eq!(
            stored.transaction_consensus_update_time.map(|t| t.timestamp()),
            Some(200)
        );
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn balance_pushes_always_notify() {
        let wallet = wallet();
        let address = Address::indexed("aa", 0);
        wallet.add_address(address.clone());
        let events = recorded_events(&wallet);

        wallet.set_address_with_balance(&address, dec!(5), dec!(5));
        wallet.set_address_with_balance(&address, dec!(5), dec!(5));

        assert_eq!(events.lock().unwrap().len(), 2);
        assert_eq!(wallet.balance("aa"), Some(BalanceState::new(dec!(5), dec!(5))));
    }

    #[test]
    fn reconciliation_only_writes_differences() {
        let wallet = wallet();
        let address = Address::indexed("aa", 0);
        wallet.add_address(address.clone());
        let events = recorded_events(&wallet);

        assert!(!wallet.reconcile_balance(&address, BalanceState::default()));
        assert!(wallet.reconcile_balance(&address, BalanceState::new(dec!(1), dec!(2))));
        assert!(!wallet.reconcile_balance(&address, BalanceState::new(dec!(1), dec!(2))));

        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn generated_address_is_announced_once() {
        let wallet = wallet();
        let events = recorded_events(&wallet);
        let address = Address::indexed("bb", 4);

        wallet.on_address_generated(address.clone());
        wallet.on_address_generated(address.clone());

        assert_eq!(wallet.address("bb"), Some(address.clone()));
        assert_eq!(
            *events.lock().unwrap(),
            vec![WalletEvent::AddressGenerated(address)]
        );
    }

    #[test]
    fn total_balance_sums_all_addresses() {
        let wallet = wallet();
        wallet.set_address_with_balance(&Address::indexed("a", 0), dec!(1.5), dec!(2));
        wallet.set_address_with_balance(&Address::indexed("b", 1), dec!(0.5), dec!(0));
        assert_eq!(wallet.total_balance(), BalanceState::new(dec!(2), dec!(2)));
    }
}
