//! HTTP client for the node's REST API (balance snapshots).

use std::collections::HashMap;

use async_trait::async_trait;
use ledgersync_shared::{
    try_error_message, ApiError, BalanceSnapshotRequest, BalanceSnapshotResponse,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::wallet::BalanceState;

/// Request/response balance lookup used for authoritative snapshots.
#[async_trait]
pub trait BalanceChecker: Send + Sync {
    /// Balances for the given addresses, keyed by hex. Addresses the node
    /// does not know may be missing from the result.
    async fn check_balances(
        &self,
        address_hexes: &[String],
    ) -> Result<HashMap<String, BalanceState>, ApiError>;
}

/// HTTP client for a node's REST API.
#[derive(Debug, Clone)]
pub struct NodeApiClient {
    client: Client,
    base_url: String,
}

impl Default for NodeApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeApiClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let url = self.url(path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            let body = try_error_message(&text).unwrap_or(text);
            return Err(ApiError::Http { status, body });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }
}

#[async_trait]
impl BalanceChecker for NodeApiClient {
    async fn check_balances(
        &self,
        address_hexes: &[String],
    ) -> Result<HashMap<String, BalanceState>, ApiError> {
        let request = BalanceSnapshotRequest {
            addresses: address_hexes.to_vec(),
        };
        let response: BalanceSnapshotResponse = self.post_json("/balance", &request).await?;
        tracing::debug!(
            requested = address_hexes.len(),
            returned = response.addresses_balance.len(),
            "balance snapshot fetched"
        );

        Ok(response
            .addresses_balance
            .into_iter()
            .map(|(hex, entry)| {
                (
                    hex,
                    BalanceState::from_wire(entry.address_balance, entry.address_pre_balance),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let api = NodeApiClient::new().with_base_url("http://node:7070/");
        assert_eq!(api.url("/balance"), "http://node:7070/balance");
        assert_eq!(api.url("balance"), "http://node:7070/balance");
        assert_eq!(api.url("https://other/balance"), "https://other/balance");
        assert_eq!(NodeApiClient::new().url("balance"), "/balance");
    }

    #[tokio::test]
    async fn unreachable_node_is_a_network_error() {
        let api = NodeApiClient::new().with_base_url("http://127.0.0.1:1");
        let result = api.check_balances(&["ab".to_string()]).await;
        assert!(matches!(result, Err(ApiError::Network(_))));
    }
}
