//! Address discovery over propagation topics.
//!
//! A lookahead window of derived-but-unused addresses is kept under
//! propagation watch. The first push on one of them confirms the address:
//! its propagation topic is released, the window advances by one, and the
//! address moves to balance/transaction tracking.

use ledgersync_shared::{PropagationPush, TopicKind};

use super::client::SyncClient;
use super::registry::Route;
use crate::error::SyncError;
use crate::transport::TransportFactory;
use crate::wallet::Address;

/// First index past every indexed address the wallet already knows.
pub fn frontier_start<'a>(known: impl IntoIterator<Item = &'a Address>) -> u32 {
    known
        .into_iter()
        .filter_map(|address| address.index)
        .max()
        .map_or(0, |highest| highest.saturating_add(1))
}

/// Exclusive end of the initial window, capped by the wallet maximum.
pub fn frontier_end(start: u32, window: u32, max_address_count: Option<u32>) -> u32 {
    let end = start.saturating_add(window);
    match max_address_count {
        Some(max) => end.min(max).max(start),
        None => end,
    }
}

/// Index to open after `consumed` was confirmed, or `None` if the maximum
/// address count is reached.
///
/// Counts from the highest index still pending, or from `consumed` when that
/// was the highest, so a released index is never reopened.
pub fn next_frontier_index(
    highest_pending: u32,
    consumed: u32,
    max_address_count: Option<u32>,
) -> Option<u32> {
    let next = highest_pending.max(consumed).checked_add(1)?;
    match max_address_count {
        Some(max) if next >= max => None,
        _ => Some(next),
    }
}

impl<F: TransportFactory> SyncClient<F> {
    /// Open propagation subscriptions for the lookahead window past `known`.
    pub(super) async fn seed_frontier(&mut self, known: &[Address]) -> Result<(), SyncError> {
        let start = frontier_start(known);
        let end = frontier_end(
            start,
            self.config.lookahead_window,
            self.wallet.max_address_count(),
        );
        for index in start..end {
            let address = self.wallet.generate_address_by_index(index).await?;
            self.subscribe(TopicKind::Propagation, &address).await?;
        }
        tracing::debug!(start, end, "frontier seeded");
        Ok(())
    }

    /// Handle first-activity on the propagation topic of `index`.
    pub(super) async fn handle_propagation_push(
        &mut self,
        index: u32,
        topic: &str,
        body: &str,
    ) -> Result<(), SyncError> {
        let route = Route::Propagation(index);
        let Some(expected) = self
            .registry
            .get(&route)
            .map(|subscription| subscription.address.clone())
        else {
            tracing::debug!(index, "propagation push after release, ignoring");
            return Ok(());
        };

        let push: PropagationPush =
            serde_json::from_str(body).map_err(|e| SyncError::malformed(topic, e))?;
        if push.address_hash != expected.address_hex {
            return Err(SyncError::PropagationMismatch {
                expected: expected.address_hex,
                received: push.address_hash,
            });
        }

        self.registry.unsubscribe(self.transport.as_mut(), &route).await;
        tracing::info!(index, address = %expected.address_hex, "address confirmed in use");
        self.wallet.on_address_generated(expected.clone());

        match self.advance_frontier(index).await {
            Ok(()) => {}
            Err(SyncError::Transport(e)) if e.is_connection_loss() => return Err(e.into()),
            Err(e) => tracing::warn!(index, error = %e, "could not extend the lookahead window"),
        }
        self.track_confirmed_address(&expected).await
    }

    /// Open one propagation subscription past the window after `consumed`
    /// left it. Skipped when nothing is pending any more.
    async fn advance_frontier(&mut self, consumed: u32) -> Result<(), SyncError> {
        let Some(highest_pending) = self.registry.highest_pending_index() else {
            tracing::debug!(consumed, "frontier exhausted, not advancing");
            return Ok(());
        };
        let Some(next) =
            next_frontier_index(highest_pending, consumed, self.wallet.max_address_count())
        else {
            tracing::debug!(consumed, "maximum address count reached, frontier shrinks");
            return Ok(());
        };

        let address = self.wallet.generate_address_by_index(next).await?;
        self.subscribe(TopicKind::Propagation, &address).await?;
        tracing::debug!(consumed, next, "frontier advanced");
        Ok(())
    }

    /// Snapshot the balance of a newly confirmed address, then follow it.
    async fn track_confirmed_address(&mut self, address: &Address) -> Result<(), SyncError> {
        self.apply_snapshot(address).await;
        self.subscribe(TopicKind::Balance, address).await?;
        self.subscribe(TopicKind::Transaction, address).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_starts_past_highest_known_index() {
        assert_eq!(frontier_start(&Vec::<Address>::new()), 0);
        let known = [
            Address::indexed("a", 0),
            Address::imported("x"),
            Address::indexed("c", 4),
        ];
        assert_eq!(frontier_start(&known), 5);
        assert_eq!(frontier_start(&[Address::imported("x")]), 0);
    }

    #[test]
    fn window_end_respects_maximum() {
        assert_eq!(frontier_end(0, 10, None), 10);
        assert_eq!(frontier_end(1, 10, None), 11);
        assert_eq!(frontier_end(0, 10, Some(4)), 4);
        assert_eq!(frontier_end(6, 10, Some(4)), 6);
    }

    #[test]
    fn next_index_follows_highest_pending() {
        assert_eq!(next_frontier_index(9, 3, None), Some(10));
        assert_eq!(next_frontier_index(10, 4, None), Some(11));
        assert_eq!(next_frontier_index(5, 8, None), Some(9));
        assert_eq!(next_frontier_index(9, 3, Some(10)), None);
        assert_eq!(next_frontier_index(8, 3, Some(10)), Some(9));
        assert_eq!(next_frontier_index(u32::MAX, 0, None), None);
    }
}
