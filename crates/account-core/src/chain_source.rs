use async_trait::async_trait;
use bitcoin::Transaction;

use crate::electrum::{BalanceResult, ElectrumError, ElectrumGateway, HistoryEntry, UtxoRef};

/// The chain-data operations an [`crate::utxo_planner::UtxoPlanner`],
/// [`crate::history_resolver::HistoryResolver`], or [`crate::tx_builder::TxBuilder`]'s caller
/// needs, abstracted away from the concrete Electrum transport so tests can substitute a mock
/// implementation.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn estimate_fee_per_vbyte(&self) -> Result<u64, ElectrumError>;
    async fn script_balance(&self, script_hash_hex: &str) -> Result<BalanceResult, ElectrumError>;
    async fn unspent(&self, script_hash_hex: &str) -> Result<Vec<UtxoRef>, ElectrumError>;
    async fn history(&self, script_hash_hex: &str) -> Result<Vec<HistoryEntry>, ElectrumError>;
    async fn get_transaction(&self, txid_hex: &str) -> Result<Transaction, ElectrumError>;
    async fn broadcast(&self, raw_hex: &str) -> Result<String, ElectrumError>;
}

#[async_trait]
impl ChainSource for ElectrumGateway {
    async fn estimate_fee_per_vbyte(&self) -> Result<u64, ElectrumError> {
        ElectrumGateway::estimate_fee_per_vbyte(self).await
    }

    async fn script_balance(&self, script_hash_hex: &str) -> Result<BalanceResult, ElectrumError> {
        ElectrumGateway::script_balance(self, script_hash_hex).await
    }

    async fn unspent(&self, script_hash_hex: &str) -> Result<Vec<UtxoRef>, ElectrumError> {
        ElectrumGateway::unspent(self, script_hash_hex).await
    }

    async fn history(&self, script_hash_hex: &str) -> Result<Vec<HistoryEntry>, ElectrumError> {
        ElectrumGateway::history(self, script_hash_hex).await
    }

    async fn get_transaction(&self, txid_hex: &str) -> Result<Transaction, ElectrumError> {
        ElectrumGateway::get_transaction(self, txid_hex).await
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, ElectrumError> {
        ElectrumGateway::broadcast(self, raw_hex).await
    }
}
