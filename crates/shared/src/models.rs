//! Push payloads published by the node, and the REST balance snapshot shapes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `message` value the node attaches to balance pushes.
pub const BALANCE_UPDATED: &str = "Balance Updated!";

/// Body of a push on `/topic/{addressHex}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub address_hash: String,
    /// `null` on the wire means zero.
    #[serde(default)]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub pre_balance: Option<Decimal>,
}

/// Body of a push on `/topic/addressTransactions/{addressHex}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPush {
    pub transaction_data: RawTransaction,
}

/// Body of a push on `/topic/address/{addressHex}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationPush {
    pub address_hash: String,
}

/// Transaction as the node serializes it.
///
/// Instants are epoch seconds with a fractional nanosecond part. Fields the
/// sync core does not interpret are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(rename = "type", default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub create_time: Option<f64>,
    #[serde(default)]
    pub attachment_time: Option<f64>,
    #[serde(default)]
    pub transaction_consensus_update_time: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Convert a wire instant (epoch seconds, fractional) to a UTC timestamp.
///
/// Returns `None` for non-finite or out-of-range values.
pub fn instant_from_wire(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0).round() as i64;
    let (whole, nanos) = if nanos >= 1_000_000_000 {
        (whole as i64 + 1, 0)
    } else {
        (whole as i64, nanos)
    };
    DateTime::from_timestamp(whole, nanos as u32)
}

/// Request body of `POST /balance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshotRequest {
    pub addresses: Vec<String>,
}

/// Response body of `POST /balance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshotResponse {
    #[serde(default)]
    pub addresses_balance: HashMap<String, AddressBalance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBalance {
    #[serde(default)]
    pub address_balance: Option<Decimal>,
    #[serde(default)]
    pub address_pre_balance: Option<Decimal>,
}
