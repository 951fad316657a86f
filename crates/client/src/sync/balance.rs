//! Applying balance and transaction pushes, and snapshot reconciliation.

use ledgersync_shared::{BalancePush, TransactionPush, BALANCE_UPDATED};

use super::client::SyncClient;
use crate::error::SyncError;
use crate::transport::TransportFactory;
use crate::wallet::{Address, BalanceState, TransactionRecord};

impl<F: TransportFactory> SyncClient<F> {
    /// Apply a pushed balance. Pushes are trusted: the wallet mutator is
    /// called unconditionally, with `null` values read as zero.
    pub(super) fn handle_balance_push(&self, topic: &str, body: &str) -> Result<(), SyncError> {
        let push: BalancePush =
            serde_json::from_str(body).map_err(|e| SyncError::malformed(topic, e))?;
        let address = self
            .wallet
            .address(&push.address_hash)
            .ok_or_else(|| SyncError::AddressNotFound(push.address_hash.clone()))?;
        if let Some(message) = push.message.as_deref().filter(|m| *m != BALANCE_UPDATED) {
            tracing::debug!(
                address = %address.address_hex,
                push_message = message,
                "unusual balance push message"
            );
        }

        let state = BalanceState::from_wire(push.balance, push.pre_balance);
        tracing::debug!(
            address = %address.address_hex,
            balance = %state.balance,
            pre_balance = %state.pre_balance,
            "balance push"
        );
        self.wallet
            .set_address_with_balance(&address, state.balance, state.pre_balance);
        Ok(())
    }

    /// Merge a pushed transaction into the wallet.
    pub(super) fn handle_transaction_push(&self, topic: &str, body: &str) -> Result<(), SyncError> {
        let push: TransactionPush =
            serde_json::from_str(body).map_err(|e| SyncError::malformed(topic, e))?;
        let record = TransactionRecord::from_wire(push.transaction_data)
            .map_err(|reason| SyncError::malformed(topic, reason))?;
        tracing::debug!(hash = %record.hash, "transaction push");
        self.wallet.set_transaction(record);
        Ok(())
    }

    /// Fetch an authoritative balance for `address` and store it. A failed
    /// fetch is logged; tracking continues on pushes alone.
    pub(super) async fn apply_snapshot(&self, address: &Address) {
        let hexes = [address.address_hex.clone()];
        match self.balances.check_balances(&hexes).await {
            Ok(mut snapshot) => {
                let state = snapshot.remove(&address.address_hex).unwrap_or_default();
                self.wallet
                    .set_address_with_balance(address, state.balance, state.pre_balance);
            }
            Err(e) => {
                tracing::warn!(address = %address.address_hex, error = %e, "balance snapshot failed")
            }
        }
    }

    /// Compare every known address against a fresh snapshot and store only
    /// the balances that differ. Returns how many changed.
    pub async fn reconcile_balances(&self) -> Result<usize, SyncError> {
        let mut hexes = self.wallet.address_hexes();
        hexes.sort();
        if hexes.is_empty() {
            return Ok(0);
        }
        let snapshot = self.balances.check_balances(&hexes).await?;

        let mut changed = 0;
        for (hex, state) in snapshot {
            let Some(address) = self.wallet.address(&hex) else {
                tracing::debug!(address = %hex, "snapshot entry for unknown address");
                continue;
            };
            if self.wallet.reconcile_balance(&address, state) {
                changed += 1;
            }
        }
        tracing::info!(checked = hexes.len(), changed, "balances reconciled");
        Ok(changed)
    }
}
