//! Ledgersync - keeps a watch-only wallet in sync with a node
//!
//! Connects to the node's STOMP endpoint, discovers used addresses and logs
//! every balance, address and transaction change until interrupted.

use std::sync::Arc;

use anyhow::Context;
use ledgersync_client::{
    init_logging, InMemoryWallet, NodeApiClient, Sha256Deriver, StompConnector, SyncClient,
    SyncConfig, WalletEvent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = SyncConfig::from_env();

    let seed = match std::env::var("LEDGERSYNC_SEED") {
        Ok(value) => hex::decode(value.trim()).context("LEDGERSYNC_SEED must be hex")?,
        Err(_) => {
            tracing::warn!("LEDGERSYNC_SEED not set, deriving from an empty seed");
            Vec::new()
        }
    };

    let mut wallet = InMemoryWallet::new(Sha256Deriver::new(seed));
    if let Ok(raw) = std::env::var("LEDGERSYNC_MAX_ADDRESSES") {
        let max: u32 = raw
            .trim()
            .parse()
            .context("LEDGERSYNC_MAX_ADDRESSES must be a number")?;
        wallet = wallet.with_max_address_count(max);
    }
    wallet.on_event(log_wallet_event);
    let wallet = Arc::new(wallet);

    let api = Arc::new(NodeApiClient::new().with_base_url(config.node_api_url.clone()));
    let connector = StompConnector::new(config.node_ws_url.clone());
    tracing::info!(
        ws = %config.node_ws_url,
        api = %config.node_api_url,
        lookahead = config.lookahead_window,
        "starting ledgersync"
    );

    let mut client = SyncClient::new(config, connector, wallet.clone(), api)
        .with_on_connected(|| tracing::info!("wallet synchronized with node"))
        .with_on_reconnect_failed(|e| tracing::error!(error = %e, "node unreachable, giving up"));

    let shutdown = client.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.trigger();
        }
    });

    client.connect().await.context("connecting to node")?;
    client.run().await.context("sync loop stopped")?;

    let total = wallet.total_balance();
    tracing::info!(
        balance = %total.balance,
        pre_balance = %total.pre_balance,
        "stopped"
    );
    Ok(())
}

fn log_wallet_event(event: &WalletEvent) {
    match event {
        WalletEvent::BalanceChanged { address, balance } => tracing::info!(
            address = %address.address_hex,
            balance = %balance.balance,
            pre_balance = %balance.pre_balance,
            "balance changed"
        ),
        WalletEvent::AddressGenerated(address) => tracing::info!(
            address = %address.address_hex,
            index = ?address.index,
            "address in use"
        ),
        WalletEvent::TransactionReceived(record) => tracing::info!(
            hash = %record.hash,
            amount = %record.amount,
            kind = ?record.transaction_type,
            "transaction"
        ),
    }
}
