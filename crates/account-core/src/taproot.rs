use bitcoin::key::XOnlyPublicKey;
use bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use bitcoin::{Address, Network, ScriptBuf, TapSighash, Transaction, TxOut};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaprootError {
    #[error("sighash computation failed: {0}")]
    Sighash(#[from] bitcoin::sighash::TaprootError),
}

/// Builds the P2TR output script (`OP_1 <32-byte output key>`) for an internal key with no
/// script-path commitment.
pub fn p2tr_script(internal_key: XOnlyPublicKey) -> ScriptBuf {
    let secp = bitcoin::secp256k1::Secp256k1::verification_only();
    Address::p2tr(&secp, internal_key, None, Network::Bitcoin).script_pubkey()
}

/// Decodes a script as a P2TR address on `network`, returning `None` if it is not one.
pub fn decode_p2tr_address(script_pubkey: &ScriptBuf, network: Network) -> Option<Address> {
    let params: bitcoin::params::Params = network.into();
    let address = Address::from_script(script_pubkey, &params).ok()?;
    script_pubkey.is_p2tr().then_some(address)
}

/// Computes the BIP-341 key-path sighash (`SIGHASH_DEFAULT`) for `input_index`, given the
/// previous output spent by every input in the same order as `tx.input`.
pub fn key_spend_sighash(
    tx: &Transaction,
    input_index: usize,
    prevouts: &[TxOut],
) -> Result<TapSighash, TaprootError> {
    let prevouts = Prevouts::All(prevouts);
    Ok(
        SighashCache::new(tx).taproot_key_spend_signature_hash(
            input_index,
            &prevouts,
            TapSighashType::Default,
        )?,
    )
}
