//! Scripted in-memory node and balance checker shared by the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ledgersync_client::api_client::BalanceChecker;
use ledgersync_client::transport::{SubscriptionId, Transport, TransportEvent, TransportFactory};
use ledgersync_client::wallet::{
    AddressDeriver, BalanceState, InMemoryWallet, Sha256Deriver, Wallet, WalletEvent,
};
use ledgersync_client::WalletError;
use ledgersync_client::{SyncClient, SyncConfig};
use ledgersync_shared::{ApiError, TopicKind, TransportError};
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct MockState {
    pub connect_attempts: u32,
    /// Number of upcoming connect attempts that are refused.
    pub fail_connects: u32,
    pub hang_connects: bool,
    /// Every topic ever subscribed, in order.
    pub subscribed: Vec<String>,
    /// Live subscriptions, id to topic.
    pub active: BTreeMap<String, String>,
    pub unsubscribed: Vec<String>,
    pub failing_unsubscribes: bool,
    /// Number of upcoming subscribes rejected as if the socket dropped.
    pub fail_subscribes: u32,
    pub disconnects: u32,
    next_id: u64,
    events: VecDeque<TransportEvent>,
}

/// A fake node. Every transport it creates shares the same state, so tests
/// can inspect subscriptions across reconnects.
#[derive(Debug, Clone, Default)]
pub struct MockNode {
    state: Arc<Mutex<MockState>>,
    wake: Arc<Notify>,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn fail_next_connects(&self, n: u32) {
        self.with_state(|s| s.fail_connects = n);
    }

    pub fn refuse_all_connects(&self) {
        self.fail_next_connects(u32::MAX);
    }

    pub fn hang_connects(&self) {
        self.with_state(|s| s.hang_connects = true);
    }

    pub fn fail_unsubscribes(&self) {
        self.with_state(|s| s.failing_unsubscribes = true);
    }

    pub fn fail_next_subscribes(&self, n: u32) {
        self.with_state(|s| s.fail_subscribes = n);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.with_state(|s| s.connect_attempts)
    }

    pub fn disconnects(&self) -> u32 {
        self.with_state(|s| s.disconnects)
    }

    pub fn active_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.with_state(|s| s.active.values().cloned().collect());
        topics.sort();
        topics
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.with_state(|s| s.subscribed.clone())
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.with_state(|s| s.unsubscribed.clone())
    }

    /// Id of the live subscription on `topic`.
    pub fn subscription_id(&self, topic: &str) -> Option<SubscriptionId> {
        self.with_state(|s| {
            s.active
                .iter()
                .find(|(_, t)| t.as_str() == topic)
                .map(|(id, _)| SubscriptionId::new(id.clone()))
        })
    }

    /// Queue a push on the live subscription of `topic`.
    pub fn push(&self, topic: &str, body: &str) {
        let subscription = self
            .subscription_id(topic)
            .unwrap_or_else(|| panic!("no live subscription on {}", topic));
        self.enqueue(TransportEvent::Message {
            subscription,
            body: body.to_string(),
        });
    }

    pub fn close(&self, reason: &str) {
        self.enqueue(TransportEvent::Closed {
            reason: reason.to_string(),
        });
    }

    fn enqueue(&self, event: TransportEvent) {
        self.with_state(|s| s.events.push_back(event));
        self.wake.notify_one();
    }
}

impl TransportFactory for MockNode {
    type Transport = MockTransport;

    fn create(&self) -> MockTransport {
        MockTransport {
            node: self.clone(),
            connected: false,
        }
    }
}

pub struct MockTransport {
    node: MockNode,
    connected: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, _headers: &[(String, String)]) -> Result<(), TransportError> {
        let (hang, refuse) = self.node.with_state(|s| {
            s.connect_attempts += 1;
            let refuse = s.fail_connects > 0;
            if refuse {
                s.fail_connects -= 1;
            }
            (s.hang_connects, refuse)
        });
        if hang {
            std::future::pending::<()>().await;
        }
        if refuse {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<SubscriptionId, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.node.with_state(|s| {
            if s.fail_subscribes > 0 {
                s.fail_subscribes -= 1;
                return Err(TransportError::Closed("socket reset".to_string()));
            }
            let id = format!("mock-{}", s.next_id);
            s.next_id += 1;
            s.subscribed.push(topic.to_string());
            s.active.insert(id.clone(), topic.to_string());
            Ok(SubscriptionId::new(id))
        })
    }

    async fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), TransportError> {
        self.node.with_state(|s| {
            if let Some(topic) = s.active.remove(id.as_str()) {
                s.unsubscribed.push(topic);
            }
            if s.failing_unsubscribes {
                Err(TransportError::Send("unsubscribe rejected".to_string()))
            } else {
                Ok(())
            }
        })
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        self.node.with_state(|s| s.disconnects += 1);
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        loop {
            if let Some(event) = self.node.with_state(|s| s.events.pop_front()) {
                return event;
            }
            self.node.wake.notified().await;
        }
    }
}

/// Balance checker answering from a fixed table and recording requests.
#[derive(Debug, Default)]
pub struct RecordingChecker {
    pub requests: Mutex<Vec<Vec<String>>>,
    balances: Mutex<HashMap<String, BalanceState>>,
    failing: AtomicBool,
}

impl RecordingChecker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_balance(&self, address_hex: &str, state: BalanceState) {
        self.balances
            .lock()
            .unwrap()
            .insert(address_hex.to_string(), state);
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BalanceChecker for RecordingChecker {
    async fn check_balances(
        &self,
        address_hexes: &[String],
    ) -> Result<HashMap<String, BalanceState>, ApiError> {
        self.requests.lock().unwrap().push(address_hexes.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApiError::Network("node unreachable".to_string()));
        }
        let balances = self.balances.lock().unwrap();
        Ok(address_hexes
            .iter()
            .filter_map(|hex| balances.get(hex).map(|state| (hex.clone(), *state)))
            .collect())
    }
}

pub fn wallet() -> InMemoryWallet {
    InMemoryWallet::new(Sha256Deriver::new(b"test-seed".to_vec()))
}

/// Derives like [`Sha256Deriver`] but rejects the next `failures` requests
/// for indices at or past `fail_from`.
#[derive(Debug)]
pub struct FlakyDeriver {
    inner: Sha256Deriver,
    fail_from: u32,
    remaining_failures: AtomicU32,
}

impl FlakyDeriver {
    pub fn new(fail_from: u32, failures: u32) -> Self {
        Self {
            inner: Sha256Deriver::new(b"test-seed".to_vec()),
            fail_from,
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl AddressDeriver for FlakyDeriver {
    async fn derive(&self, index: u32) -> Result<String, WalletError> {
        if index >= self.fail_from {
            let failed = self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(WalletError::Derivation {
                    index,
                    reason: "keystore unavailable".to_string(),
                });
            }
        }
        self.inner.derive(index).await
    }
}

pub fn flaky_wallet(fail_from: u32, failures: u32) -> InMemoryWallet<FlakyDeriver> {
    InMemoryWallet::new(FlakyDeriver::new(fail_from, failures))
}

/// Record every event the wallet emits.
pub fn record_events<D: AddressDeriver>(wallet: &InMemoryWallet<D>) -> Arc<Mutex<Vec<WalletEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    wallet.on_event(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

pub async fn hex_at<D: AddressDeriver>(wallet: &InMemoryWallet<D>, index: u32) -> String {
    wallet
        .generate_address_by_index(index)
        .await
        .unwrap()
        .address_hex
}

pub fn topic(kind: TopicKind, address_hex: &str) -> String {
    kind.topic(address_hex)
}

pub fn client<D: AddressDeriver + 'static>(
    node: &MockNode,
    wallet: &Arc<InMemoryWallet<D>>,
    checker: &Arc<RecordingChecker>,
) -> SyncClient<MockNode> {
    client_with_config(SyncConfig::default(), node, wallet, checker)
}

pub fn client_with_config<D: AddressDeriver + 'static>(
    config: SyncConfig,
    node: &MockNode,
    wallet: &Arc<InMemoryWallet<D>>,
    checker: &Arc<RecordingChecker>,
) -> SyncClient<MockNode> {
    SyncClient::new(config, node.clone(), wallet.clone(), checker.clone())
}

pub fn propagation_body(address_hex: &str) -> String {
    format!(r#"{{"addressHash":"{}"}}"#, address_hex)
}
