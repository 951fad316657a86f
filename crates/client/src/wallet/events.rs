//! Named wallet event channels with synchronous, in-order delivery.

use std::sync::{Arc, RwLock};

use super::{Address, BalanceState, TransactionRecord};

/// Events a wallet emits when its state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletEvent {
    BalanceChanged {
        address: Address,
        balance: BalanceState,
    },
    AddressGenerated(Address),
    TransactionReceived(TransactionRecord),
}

type Listener = Arc<dyn Fn(&WalletEvent) + Send + Sync>;

/// Listener registry. Listeners run on the emitting task, in registration
/// order, before `emit` returns.
#[derive(Default, Clone)]
pub struct EventBus {
    listeners: Arc<RwLock<Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&WalletEvent) + Send + Sync + 'static) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.push(Arc::new(listener));
    }

    pub fn emit(&self, event: &WalletEvent) {
        // Snapshot so a listener may register another listener without deadlocking.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
