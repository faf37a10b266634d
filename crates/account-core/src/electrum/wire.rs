use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of the Electrum JSON-RPC request framing (`{...}\n`).
#[derive(Debug, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Vec<Value>) -> Self {
        Request {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// One line of the Electrum JSON-RPC response framing. `id` is absent on server-pushed
/// notifications, which this client has no subscriptions active for and discards.
#[derive(Debug, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseError {
    pub message: String,
}

/// `blockchain.scripthash.listunspent` entry.
#[derive(Clone, Debug, Deserialize)]
pub struct UtxoRef {
    #[serde(rename = "tx_hash")]
    pub prev_txid: String,
    #[serde(rename = "tx_pos")]
    pub prev_vout: u32,
    pub value: u64,
    #[serde(default)]
    pub height: u32,
}

/// `blockchain.scripthash.get_balance` result.
#[derive(Debug, Deserialize)]
pub struct BalanceResult {
    pub confirmed: u64,
}

/// `blockchain.scripthash.get_history` entry.
#[derive(Clone, Debug, Deserialize)]
pub struct HistoryEntry {
    pub tx_hash: String,
    pub height: u32,
}
