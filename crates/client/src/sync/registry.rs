//! Bookkeeping of open subscriptions per topic family and address.
//!
//! Propagation subscriptions are keyed by derivation index, balance and
//! transaction subscriptions by address hex. At most one subscription exists
//! per (family, key).

use std::collections::{BTreeMap, HashMap};

use ledgersync_shared::TopicKind;

use crate::error::{SyncError, WalletError};
use crate::transport::{SubscriptionId, Transport};
use crate::wallet::Address;

/// Registry key of a subscription, also used to route pushes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Propagation(u32),
    Balance(String),
    Transaction(String),
}

impl Route {
    pub fn for_address(kind: TopicKind, address: &Address) -> Result<Self, WalletError> {
        Ok(match kind {
            TopicKind::Propagation => Route::Propagation(
                address
                    .index
                    .ok_or_else(|| WalletError::Unindexed(address.address_hex.clone()))?,
            ),
            TopicKind::Balance => Route::Balance(address.address_hex.clone()),
            TopicKind::Transaction => Route::Transaction(address.address_hex.clone()),
        })
    }

    pub fn kind(&self) -> TopicKind {
        match self {
            Route::Propagation(_) => TopicKind::Propagation,
            Route::Balance(_) => TopicKind::Balance,
            Route::Transaction(_) => TopicKind::Transaction,
        }
    }
}

/// An open subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub address: Address,
    pub topic: String,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    propagation: BTreeMap<u32, Subscription>,
    balance: HashMap<String, Subscription>,
    transaction: HashMap<String, Subscription>,
    routes: HashMap<SubscriptionId, Route>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, route: &Route) -> Option<&Subscription> {
        match route {
            Route::Propagation(index) => self.propagation.get(index),
            Route::Balance(hex) => self.balance.get(hex),
            Route::Transaction(hex) => self.transaction.get(hex),
        }
    }

    pub fn contains(&self, route: &Route) -> bool {
        self.get(route).is_some()
    }

    /// Route of a live subscription id; `None` once it was released.
    pub fn route(&self, id: &SubscriptionId) -> Option<&Route> {
        self.routes.get(id)
    }

    /// Indices currently under propagation watch, ascending.
    pub fn propagation_indices(&self) -> Vec<u32> {
        self.propagation.keys().copied().collect()
    }

    pub fn highest_pending_index(&self) -> Option<u32> {
        self.propagation.keys().next_back().copied()
    }

    /// Address hexes with an open subscription of `kind`, sorted.
    pub fn addresses(&self, kind: TopicKind) -> Vec<String> {
        let mut hexes: Vec<String> = match kind {
            TopicKind::Propagation => self
                .propagation
                .values()
                .map(|s| s.address.address_hex.clone())
                .collect(),
            TopicKind::Balance => self.balance.keys().cloned().collect(),
            TopicKind::Transaction => self.transaction.keys().cloned().collect(),
        };
        hexes.sort();
        hexes
    }

    pub fn len(&self, kind: TopicKind) -> usize {
        match kind {
            TopicKind::Propagation => self.propagation.len(),
            TopicKind::Balance => self.balance.len(),
            TopicKind::Transaction => self.transaction.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.propagation.is_empty()
            && self.balance.is_empty()
            && self.transaction.is_empty()
            && self.routes.is_empty()
    }

    /// Open a subscription of `kind` for `address`.
    ///
    /// Returns `Ok(false)` without touching the transport if one is already open.
    pub async fn subscribe<T: Transport>(
        &mut self,
        transport: &mut T,
        kind: TopicKind,
        address: &Address,
    ) -> Result<bool, SyncError> {
        let route = Route::for_address(kind, address)?;
        if self.contains(&route) {
            tracing::debug!(
                %kind,
                address = %address.address_hex,
                "already subscribed, skipping"
            );
            return Ok(false);
        }

        let topic = kind.topic(&address.address_hex);
        let id = transport.subscribe(&topic).await?;
        tracing::debug!(%topic, subscription = %id, "subscribed");
        self.insert(
            route,
            Subscription {
                id,
                address: address.clone(),
                topic,
            },
        );
        Ok(true)
    }

    /// Release one subscription. The entry is removed even if the transport
    /// call fails; the failure is only logged.
    pub async fn unsubscribe<T: Transport>(
        &mut self,
        transport: Option<&mut T>,
        route: &Route,
    ) -> Option<Subscription> {
        let subscription = self.remove(route)?;
        if let Some(transport) = transport {
            if let Err(e) = transport.unsubscribe(&subscription.id).await {
                tracing::warn!(topic = %subscription.topic, error = %e, "unsubscribe failed");
            }
        }
        Some(subscription)
    }

    /// Release every subscription of every family. Per-handle failures are
    /// logged and counted; the registry is empty afterwards regardless.
    pub async fn unsubscribe_all<T: Transport>(&mut self, transport: Option<&mut T>) -> usize {
        let drained: Vec<Subscription> = std::mem::take(&mut self.propagation)
            .into_values()
            .chain(std::mem::take(&mut self.balance).into_values())
            .chain(std::mem::take(&mut self.transaction).into_values())
            .collect();
        self.routes.clear();

        let mut failures = 0;
        if let Some(transport) = transport {
            for subscription in &drained {
                if let Err(e) = transport.unsubscribe(&subscription.id).await {
                    failures += 1;
                    tracing::warn!(
                        topic = %subscription.topic,
                        error = %e,
                        "unsubscribe failed during teardown"
                    );
                }
            }
        }
        tracing::debug!(released = drained.len(), failures, "subscriptions torn down");
        failures
    }

    fn insert(&mut self, route: Route, subscription: Subscription) {
        self.routes.insert(subscription.id.clone(), route.clone());
        match route {
            Route::Propagation(index) => {
                self.propagation.insert(index, subscription);
            }
            Route::Balance(hex) => {
                self.balance.insert(hex, subscription);
            }
            Route::Transaction(hex) => {
                self.transaction.insert(hex, subscription);
            }
        }
    }

    fn remove(&mut self, route: &Route) -> Option<Subscription> {
        let removed = match route {
            Route::Propagation(index) => self.propagation.remove(index),
            Route::Balance(hex) => self.balance.remove(hex),
            Route::Transaction(hex) => self.transaction.remove(hex),
        };
        if let Some(subscription) = &removed {
            self.routes.remove(&subscription.id);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagation_routes_need_an_index() {
        let imported = Address::imported("ab");
        assert_eq!(
            Route::for_address(TopicKind::Propagation, &imported),
            Err(WalletError::Unindexed("ab".to_string()))
        );
        assert_eq!(
            Route::for_address(TopicKind::Balance, &imported),
            Ok(Route::Balance("ab".to_string()))
        );
        assert_eq!(
            Route::for_address(TopicKind::Propagation, &Address::indexed("ab", 3))
                .map(|r| r.kind()),
            Ok(TopicKind::Propagation)
        );
    }

    #[test]
    fn insert_and_remove_keep_routes_in_step() {
        let mut registry = SubscriptionRegistry::new();
        let subscription = Subscription {
            id: SubscriptionId::new("sub-0"),
            address: Address::indexed("ab", 2),
            topic: TopicKind::Propagation.topic("ab"),
        };
        registry.insert(Route::Propagation(2), subscription.clone());

        assert_eq!(
            registry.route(&SubscriptionId::new("sub-0")),
            Some(&Route::Propagation(2))
        );
        assert_eq!(registry.highest_pending_index(), Some(2));

        assert_eq!(registry.remove(&Route::Propagation(2)), Some(subscription));
        assert_eq!(registry.route(&SubscriptionId::new("sub-0")), None);
        assert!(registry.is_empty());
    }
}
