use bitcoin::Txid;
use serde::{Deserialize, Serialize};

/// Result of [`crate::Account::balance`].
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Balance {
    pub confirmed: u64,
}

/// Options accepted by [`crate::Account::quote_send`] and [`crate::Account::send_transaction`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SendOptions {
    pub to: String,
    pub value: u64,
    /// Fee rate in sat/vB. When omitted, the account queries the gateway for the current
    /// next-block estimate.
    pub fee_rate: Option<u64>,
}

/// What a payment of [`SendOptions`] would cost without broadcasting it.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct QuoteResult {
    pub fee: u64,
}

/// What a broadcast payment actually cost, and the id it can be tracked by.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct SendResult {
    pub txid: Txid,
    pub fee: u64,
}
