//! The sync client: session lifecycle, bounded reconnect and push dispatch.

use std::sync::Arc;

use ledgersync_shared::{TopicKind, TransportError};
use tokio::sync::Notify;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::connection::ConnectionState;
use super::registry::{Route, SubscriptionRegistry};
use crate::api_client::BalanceChecker;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::transport::{SubscriptionId, Transport, TransportEvent, TransportFactory};
use crate::wallet::{Address, Wallet};

enum Step {
    Event(TransportEvent),
    Reconcile,
    Shutdown,
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

type ConnectedCallback = Box<dyn Fn() + Send + Sync>;
type FailureCallback = Box<dyn Fn(&SyncError) + Send + Sync>;

/// Asks a running [`SyncClient::run`] loop to tear down and return.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<Notify>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.notify_one();
    }
}

/// Keeps a wallet synchronized with a node over a pub/sub session.
///
/// All state (transport, subscription maps, frontier) is owned by this value
/// and mutated from a single task; there is no internal locking.
pub struct SyncClient<F: TransportFactory> {
    pub(super) config: SyncConfig,
    factory: F,
    pub(super) transport: Option<F::Transport>,
    pub(super) wallet: Arc<dyn Wallet>,
    pub(super) balances: Arc<dyn BalanceChecker>,
    pub(super) registry: SubscriptionRegistry,
    state: ConnectionState,
    retry_count: u32,
    connected_callback: Option<ConnectedCallback>,
    failure_callback: Option<FailureCallback>,
    shutdown: Arc<Notify>,
}

impl<F: TransportFactory> SyncClient<F> {
    pub fn new(
        config: SyncConfig,
        factory: F,
        wallet: Arc<dyn Wallet>,
        balances: Arc<dyn BalanceChecker>,
    ) -> Self {
        Self {
            config,
            factory,
            transport: None,
            wallet,
            balances,
            registry: SubscriptionRegistry::new(),
            state: ConnectionState::Disconnected,
            retry_count: 0,
            connected_callback: None,
            failure_callback: None,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Called after every successful (re)connect, once the initial
    /// synchronization pass is done.
    pub fn with_on_connected(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.connected_callback = Some(Box::new(callback));
        self
    }

    /// Called once when reconnection is abandoned.
    pub fn with_on_reconnect_failed(
        mut self,
        callback: impl Fn(&SyncError) + Send + Sync + 'static,
    ) -> Self {
        self.failure_callback = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Consecutive failed connect attempts since the last success.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Establish a session and run the initial synchronization pass.
    ///
    /// Failed attempts are retried under the reconnect policy. Fails with
    /// `ConnectionTimeout` if nothing succeeds within the connect deadline.
    pub async fn connect(&mut self) -> Result<(), SyncError> {
        let deadline = self.config.connect_timeout;
        self.retry_count = 0;
        let outcome = tokio::time::timeout(deadline, self.establish()).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(?deadline, "no handshake completed before the deadline");
                self.teardown().await;
                self.state = ConnectionState::Failed {
                    reason: "connect timeout".to_string(),
                };
                Err(SyncError::ConnectionTimeout(deadline))
            }
        }
    }

    /// Process pushes until shutdown or until reconnection is abandoned.
    ///
    /// With `reconcile_interval` set, balances are also reconciled against a
    /// snapshot on that period.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        let shutdown = self.shutdown.clone();
        let mut reconcile = self.config.reconcile_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let Some(transport) = self.transport.as_mut() else {
                return Err(SyncError::Transport(TransportError::NotConnected));
            };
            // Pending events are drained before a shutdown request is honored.
            let step = tokio::select! {
                biased;
                event = transport.next_event() => Step::Event(event),
                _ = shutdown.notified() => Step::Shutdown,
                _ = next_tick(&mut reconcile) => Step::Reconcile,
            };

            match step {
                Step::Event(TransportEvent::Message { subscription, body }) => {
                    self.dispatch(&subscription, &body).await;
                    if !self.state.is_connected() {
                        self.reconnect().await?;
                    }
                }
                Step::Event(TransportEvent::Closed { reason }) => {
                    tracing::warn!(%reason, "connection to node lost");
                    self.state = ConnectionState::Disconnected;
                    self.reconnect().await?;
                }
                Step::Reconcile => {
                    if let Err(e) = self.reconcile_balances().await {
                        tracing::warn!(error = %e, "periodic reconciliation failed");
                    }
                }
                Step::Shutdown => {
                    tracing::info!("shutdown requested");
                    self.shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    /// Route one push to its handler. Errors are logged and the push dropped;
    /// a push on a released subscription is discarded silently. If handling
    /// the push lost the session, the state drops to `Disconnected` and
    /// [`SyncClient::run`] reconnects.
    pub async fn dispatch(&mut self, subscription: &SubscriptionId, body: &str) {
        let Some(route) = self.registry.route(subscription).cloned() else {
            tracing::debug!(%subscription, "push on a released subscription, discarding");
            return;
        };
        let Some((topic, address_hex)) = self
            .registry
            .get(&route)
            .map(|s| (s.topic.clone(), s.address.address_hex.clone()))
        else {
            return;
        };

        let result = match route {
            Route::Propagation(index) => self.handle_propagation_push(index, &topic, body).await,
            Route::Balance(_) => self.handle_balance_push(&topic, body),
            Route::Transaction(_) => self.handle_transaction_push(&topic, body),
        };
        match result {
            Ok(()) => {}
            Err(SyncError::Transport(e)) if e.is_connection_loss() => {
                tracing::warn!(address = %address_hex, %topic, error = %e, "session lost while handling push");
                self.state = ConnectionState::Disconnected;
            }
            Err(e) => {
                tracing::warn!(address = %address_hex, %topic, error = %e, "dropping push");
            }
        }
    }

    /// Tear down all subscriptions and close the session.
    pub async fn shutdown(&mut self) {
        self.teardown().await;
        self.state = ConnectionState::Disconnected;
    }

    async fn establish(&mut self) -> Result<(), SyncError> {
        self.state = ConnectionState::Connecting;
        match self.open_session().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.retry_count += 1;
                tracing::warn!(error = %e, "initial connect failed");
                self.reconnect().await
            }
        }
    }

    /// Retry until a session opens or the attempt budget is spent. Iterative
    /// so that rapid failures do not grow the stack.
    async fn reconnect(&mut self) -> Result<(), SyncError> {
        loop {
            self.teardown().await;

            if self.config.reconnect.is_exhausted(self.retry_count) {
                let error = SyncError::ReconnectExhausted {
                    attempts: self.retry_count,
                };
                tracing::error!(attempts = self.retry_count, "giving up on reconnection");
                self.state = ConnectionState::Failed {
                    reason: error.to_string(),
                };
                if let Some(callback) = &self.failure_callback {
                    callback(&error);
                }
                return Err(error);
            }

            let attempt = self.retry_count + 1;
            self.state = ConnectionState::Reconnecting { attempt };
            let delay = self.config.reconnect.backoff(self.retry_count);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            tracing::info!(attempt, "reconnecting to node");

            match self.open_session().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    self.retry_count += 1;
                    tracing::warn!(attempt, error = %e, "reconnect attempt failed");
                }
            }
        }
    }

    async fn open_session(&mut self) -> Result<(), SyncError> {
        let mut transport = self.factory.create();
        transport.connect(&self.config.connect_headers).await?;
        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
        tracing::info!("connected to node");

        self.synchronize_session().await?;
        self.retry_count = 0;

        if let Some(callback) = &self.connected_callback {
            callback();
        }
        Ok(())
    }

    /// Balance and transaction subscriptions for every known address, then
    /// the propagation lookahead window.
    async fn synchronize_session(&mut self) -> Result<(), SyncError> {
        let mut known: Vec<Address> = self.wallet.address_map().into_values().collect();
        known.sort_by(|a, b| {
            a.index
                .cmp(&b.index)
                .then_with(|| a.address_hex.cmp(&b.address_hex))
        });

        for address in &known {
            self.subscribe(TopicKind::Balance, address).await?;
            self.subscribe(TopicKind::Transaction, address).await?;
        }
        self.seed_frontier(&known).await?;

        tracing::info!(
            known = known.len(),
            frontier = self.registry.len(TopicKind::Propagation),
            "initial synchronization done"
        );
        Ok(())
    }

    pub(super) async fn subscribe(
        &mut self,
        kind: TopicKind,
        address: &Address,
    ) -> Result<bool, SyncError> {
        let transport = self.transport.as_mut().ok_or(TransportError::NotConnected)?;
        self.registry.subscribe(transport, kind, address).await
    }

    async fn teardown(&mut self) {
        let failures = self.registry.unsubscribe_all(self.transport.as_mut()).await;
        if failures > 0 {
            tracing::debug!(failures, "teardown finished with unsubscribe failures");
        }
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.disconnect().await {
                tracing::debug!(error = %e, "disconnect during teardown failed");
            }
        }
    }
}
