use bitcoin::{OutPoint, ScriptBuf};
use thiserror::Error;
use tracing::trace;

use crate::chain_source::ChainSource;
use crate::electrum::{ElectrumError, script_hash_hex};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("no unspent outputs available")]
    NoUnspent,

    #[error(transparent)]
    Electrum(#[from] ElectrumError),
}

/// A UTXO selected by [`UtxoPlanner`], carrying the exact previous output bytes a PSBT input
/// needs (`witness_utxo`), not just the value the Electrum server reported.
#[derive(Clone, Debug)]
pub struct PlannedUtxo {
    pub outpoint: OutPoint,
    pub value: u64,
    pub script_pubkey: ScriptBuf,
}

/// Selects unspent outputs at `address` to cover a target amount, first-fit in server order.
pub struct UtxoPlanner<'a> {
    gateway: &'a dyn ChainSource,
}

impl<'a> UtxoPlanner<'a> {
    pub fn new(gateway: &'a dyn ChainSource) -> Self {
        UtxoPlanner { gateway }
    }

    /// Walks the unspent list in server order, accumulating UTXOs until their total value covers
    /// `target`. Fetches each chosen UTXO's previous transaction to copy its output script
    /// verbatim, since PSBT signing needs the exact bytes, not a re-derived script.
    pub async fn select(
        &self,
        script_pubkey: &ScriptBuf,
        target: u64,
    ) -> Result<Vec<PlannedUtxo>, PlannerError> {
        let script_hash = script_hash_hex(script_pubkey);
        let unspent = self.gateway.unspent(&script_hash).await?;
        if unspent.is_empty() {
            return Err(PlannerError::NoUnspent);
        }

        let mut chosen = Vec::new();
        let mut accumulated: u64 = 0;
        for utxo_ref in unspent {
            if accumulated >= target {
                break;
            }
            let prev_tx = self.gateway.get_transaction(&utxo_ref.prev_txid).await?;
            let Some(prev_output) = prev_tx.output.get(utxo_ref.prev_vout as usize) else {
                trace!(
                    txid = %utxo_ref.prev_txid,
                    vout = utxo_ref.prev_vout,
                    "unspent entry referenced an out-of-range output, skipping"
                );
                continue;
            };

            let txid: bitcoin::Txid = utxo_ref
                .prev_txid
                .parse()
                .map_err(|_| ElectrumError::InvalidTransaction(utxo_ref.prev_txid.clone()))?;

            accumulated += prev_output.value.to_sat();
            chosen.push(PlannedUtxo {
                outpoint: OutPoint::new(txid, utxo_ref.prev_vout),
                value: prev_output.value.to_sat(),
                script_pubkey: prev_output.script_pubkey.clone(),
            });
        }

        Ok(chosen)
    }
}
