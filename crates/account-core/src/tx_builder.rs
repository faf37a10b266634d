use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::key::{Keypair, XOnlyPublicKey};
use bitcoin::psbt::{Input as PsbtInput, Psbt};
use bitcoin::secp256k1::{Message, Secp256k1, All};
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use thiserror::Error;
use tracing::trace;

use crate::constants::{DUST_LIMIT, MIN_FEE_FLOOR};
use crate::taproot::{self, TaprootError};
use crate::utxo_planner::PlannedUtxo;

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("send amount {0} sats is at or below the dust limit")]
    AmountBelowDust(u64),

    #[error("insufficient balance to cover amount and fee")]
    InsufficientBalance,

    #[error("failed to assemble PSBT: {0}")]
    Psbt(String),

    #[error(transparent)]
    Taproot(#[from] TaprootError),

    #[error("failed to extract final transaction: {0}")]
    Extract(String),
}

/// Output of a successful build: the signed, serialized transaction and what it cost.
#[derive(Clone, Debug)]
pub struct BuiltTransaction {
    pub txid: bitcoin::Txid,
    pub raw_hex: String,
    pub fee: u64,
}

/// Assembles, fee-estimates, signs and serializes a single-recipient Taproot key-path payment.
///
/// All signing uses the BIP-341 key-path sighash over a [`bitcoin::psbt::Psbt`] assembled purely
/// as a construction convenience (`witness_utxo` + `tap_internal_key` per input); the signature is
/// computed directly against the tweaked private key and written to `final_script_witness`, with
/// no dependency on PSBT-level signer traits.
pub struct TxBuilder {
    secp: Secp256k1<All>,
}

impl Default for TxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TxBuilder {
    pub fn new() -> Self {
        TxBuilder {
            secp: Secp256k1::new(),
        }
    }

    /// Builds, fee-estimates in two passes, and signs a payment of `amount` sats to `recipient`
    /// from `utxos`, returning change (if any) to `change_address`. `tweaked_signer` is the
    /// BIP-341 tweaked keypair from [`crate::key_material::KeyMaterial::tweaked_signer`].
    pub fn build(
        &self,
        utxos: &[PlannedUtxo],
        amount: u64,
        recipient: &Address,
        change_address: &Address,
        internal_key: XOnlyPublicKey,
        fee_rate: u64,
        tweaked_signer: &Keypair,
    ) -> Result<BuiltTransaction, BuilderError> {
        if amount <= DUST_LIMIT {
            return Err(BuilderError::AmountBelowDust(amount));
        }

        let total_input: u64 = utxos.iter().map(|u| u.value).sum();

        // Pass 1: fee=0, placeholder 64-byte witnesses, just to measure vsize.
        let trial = self.assemble(utxos, amount, recipient, change_address, total_input, 0)?;
        let mut placeholder = trial.clone();
        for input in &mut placeholder.input {
            input.witness = Witness::from_slice(&[[0u8; 64]]);
        }
        let vsize = placeholder.vsize() as u64;
        let fee_trial = (fee_rate.saturating_mul(vsize)).max(MIN_FEE_FLOOR);
        trace!(vsize, fee_trial, "tx builder fee discovery pass complete");

        // Pass 2: rebuild with the discovered fee, then sign for real.
        let unsigned_tx = self.assemble(
            utxos,
            amount,
            recipient,
            change_address,
            total_input,
            fee_trial,
        )?;

        let reported_fee = total_input
            - unsigned_tx.output.iter().map(|o| o.value.to_sat()).sum::<u64>();

        let mut psbt =
            Psbt::from_unsigned_tx(unsigned_tx).map_err(|e| BuilderError::Psbt(e.to_string()))?;
        for (i, utxo) in utxos.iter().enumerate() {
            psbt.inputs[i] = PsbtInput {
                witness_utxo: Some(TxOut {
                    value: Amount::from_sat(utxo.value),
                    script_pubkey: utxo.script_pubkey.clone(),
                }),
                tap_internal_key: Some(internal_key),
                ..Default::default()
            };
        }

        let prevouts: Vec<TxOut> = utxos
            .iter()
            .map(|u| TxOut {
                value: Amount::from_sat(u.value),
                script_pubkey: u.script_pubkey.clone(),
            })
            .collect();

        for i in 0..utxos.len() {
            let sighash = taproot::key_spend_sighash(&psbt.unsigned_tx, i, &prevouts)?;
            let message = Message::from_digest(sighash.to_byte_array());
            let signature = self.secp.sign_schnorr(&message, tweaked_signer);

            let mut witness = Witness::new();
            witness.push(signature.as_ref());
            psbt.inputs[i].final_script_witness = Some(witness);
        }

        let signed_tx = psbt
            .extract_tx()
            .map_err(|e| BuilderError::Extract(e.to_string()))?;
        let txid = signed_tx.compute_txid();
        let raw_hex = hex::encode(bitcoin::consensus::serialize(&signed_tx));

        Ok(BuiltTransaction {
            txid,
            raw_hex,
            fee: reported_fee,
        })
    }

    /// Builds the unsigned transaction skeleton for a given trial fee, applying the change/dust
    /// policy from the fee policy (§4.4 step 4). Returns `InsufficientBalance` if the fee and
    /// amount together exceed the input total.
    fn assemble(
        &self,
        utxos: &[PlannedUtxo],
        amount: u64,
        recipient: &Address,
        change_address: &Address,
        total_input: u64,
        fee_trial: u64,
    ) -> Result<Transaction, BuilderError> {
        let committed = amount
            .checked_add(fee_trial)
            .ok_or(BuilderError::InsufficientBalance)?;
        if total_input < committed {
            return Err(BuilderError::InsufficientBalance);
        }
        let change = total_input - committed;

        let input = utxos
            .iter()
            .map(|utxo| TxIn {
                previous_output: utxo.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect::<Vec<_>>();

        let mut output = vec![TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: recipient.script_pubkey(),
        }];
        if change > DUST_LIMIT {
            output.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: change_address.script_pubkey(),
            });
        }
        // `0 <= change <= DUST_LIMIT` is dropped silently; the leftover becomes additional fee.

        Ok(Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::Network;
    use bitcoin::secp256k1::SecretKey;

    fn test_signer() -> (Keypair, XOnlyPublicKey) {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[11u8; 32]).unwrap();
        let keypair = Keypair::from_secret_key(&secp, &secret);
        let (internal, _) = keypair.x_only_public_key();
        let tweak = bitcoin::taproot::TapTweakHash::from_key_and_tweak(internal, None).to_scalar();
        let tweaked = keypair.add_xonly_tweak(&secp, &tweak).unwrap();
        (tweaked, internal)
    }

    #[test]
    fn single_utxo_payment_pays_min_fee_floor() {
        let secp = Secp256k1::new();
        let (tweaked, internal) = test_signer();
        let change_address = Address::p2tr(&secp, internal, None, Network::Regtest);
        let recipient = Address::p2tr(&secp, internal, None, Network::Signet);

        let utxo = PlannedUtxo {
            outpoint: "11".repeat(32).parse::<bitcoin::Txid>().map(|txid| bitcoin::OutPoint::new(txid, 0)).unwrap(),
            value: 1_000_000,
            script_pubkey: change_address.script_pubkey(),
        };

        let builder = TxBuilder::new();
        let built = builder
            .build(
                &[utxo],
                1_000,
                &recipient,
                &change_address,
                internal,
                1,
                &tweaked,
            )
            .unwrap();

        assert_eq!(built.fee, MIN_FEE_FLOOR);

        let decoded: Transaction =
            bitcoin::consensus::deserialize(&hex::decode(&built.raw_hex).unwrap()).unwrap();
        assert_eq!(decoded.input.len(), 1);
        assert_eq!(decoded.output.len(), 2);
        assert_eq!(decoded.output[0].value.to_sat(), 1_000);
        assert_eq!(decoded.compute_txid(), built.txid);
    }

    #[test]
    fn amount_at_or_below_dust_is_rejected() {
        let secp = Secp256k1::new();
        let (tweaked, internal) = test_signer();
        let address = Address::p2tr(&secp, internal, None, Network::Regtest);
        let utxo = PlannedUtxo {
            outpoint: "22".repeat(32).parse::<bitcoin::Txid>().map(|txid| bitcoin::OutPoint::new(txid, 0)).unwrap(),
            value: 1_000_000,
            script_pubkey: address.script_pubkey(),
        };

        let builder = TxBuilder::new();
        let err = builder
            .build(&[utxo], 500, &address, &address, internal, 1, &tweaked)
            .unwrap_err();
        assert!(matches!(err, BuilderError::AmountBelowDust(500)));
    }

    #[test]
    fn amount_exceeding_balance_is_rejected() {
        let secp = Secp256k1::new();
        let (tweaked, internal) = test_signer();
        let address = Address::p2tr(&secp, internal, None, Network::Regtest);
        let utxo = PlannedUtxo {
            outpoint: "33".repeat(32).parse::<bitcoin::Txid>().map(|txid| bitcoin::OutPoint::new(txid, 0)).unwrap(),
            value: 1_000_000,
            script_pubkey: address.script_pubkey(),
        };

        let builder = TxBuilder::new();
        let err = builder
            .build(
                &[utxo],
                1_000_000_000_000,
                &address,
                &address,
                internal,
                1,
                &tweaked,
            )
            .unwrap_err();
        assert!(matches!(err, BuilderError::InsufficientBalance));
    }
}
