mod path;

pub use path::RelativePath;

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::hashes::{Hash, sha256};
use bitcoin::key::{Keypair, XOnlyPublicKey};
use bitcoin::secp256k1::{self, Message, PublicKey, Secp256k1, SecretKey, ecdsa};
use bitcoin::taproot::TapTweakHash;
use bitcoin::Address;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::BIP86_PURPOSE;
use crate::network::Network;

#[derive(Debug, Error)]
pub enum KeyMaterialError {
    #[error("invalid seed phrase: {0}")]
    InvalidSeedPhrase(String),

    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("tap tweak produced an invalid key")]
    InvalidTweak,

    #[error("key material has been disposed")]
    Disposed,

    #[error("secp256k1 error: {0}")]
    Secp(#[from] secp256k1::Error),
}

/// Private key bytes and chain code zeroized on drop. Never cloned, never logged.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SecretBytes {
    private_key: [u8; 32],
    chain_code: [u8; 32],
}

struct ActiveKeyMaterial {
    secret: SecretBytes,
    network: Network,
    internal_pubkey: XOnlyPublicKey,
    compressed_pubkey: [u8; 33],
    address: Address,
}

enum State {
    Active(Box<ActiveKeyMaterial>),
    Disposed,
}

/// A single BIP-86 Taproot key derived from a BIP-39 seed along a fixed relative path.
///
/// Holds the derived private key, its chain code, the cached internal public key, and the
/// account's Taproot address. Private key material is zeroized when [`KeyMaterial::dispose`] is
/// called (or the value is dropped); every operation that requires the secret key fails with
/// [`KeyMaterialError::Disposed`] afterwards.
pub struct KeyMaterial {
    state: State,
    secp: Secp256k1<secp256k1::All>,
}

impl KeyMaterial {
    /// Validates `mnemonic`, derives the BIP-39 seed (with an empty passphrase), and builds the
    /// account key at `m/86'/coin(network)'/suffix`.
    pub fn from_mnemonic(
        mnemonic: &str,
        suffix: &str,
        network: Network,
    ) -> Result<Self, KeyMaterialError> {
        let mnemonic = bip39::Mnemonic::parse_in_normalized(bip39::Language::English, mnemonic)
            .map_err(|e| KeyMaterialError::InvalidSeedPhrase(e.to_string()))?;
        let seed = mnemonic.to_seed("");
        Self::from_seed(&seed, suffix, network)
    }

    /// Builds the account key directly from a 64-byte BIP-39 seed, skipping mnemonic validation.
    pub fn from_seed(seed: &[u8], suffix: &str, network: Network) -> Result<Self, KeyMaterialError> {
        let relative = RelativePath::parse(suffix)?;
        let secp = Secp256k1::new();

        let master = Xpriv::new_master(bitcoin::Network::from(network), seed)
            .map_err(|e| KeyMaterialError::InvalidSeedPhrase(e.to_string()))?;

        let path = DerivationPath::from(vec![
            ChildNumber::from_hardened_idx(BIP86_PURPOSE)
                .map_err(|e| KeyMaterialError::InvalidPath(e.to_string()))?,
            ChildNumber::from_hardened_idx(network.coin_type())
                .map_err(|e| KeyMaterialError::InvalidPath(e.to_string()))?,
            relative.account,
            relative.change,
            relative.index,
        ]);

        let child = master
            .derive_priv(&secp, &path)
            .map_err(|e| KeyMaterialError::InvalidPath(e.to_string()))?;

        let private_key = child.private_key;
        let public_key = PublicKey::from_secret_key(&secp, &private_key);
        let (internal_pubkey, _parity) = public_key.x_only_public_key();
        let address = Address::p2tr(&secp, internal_pubkey, None, bitcoin::Network::from(network));

        let secret = SecretBytes {
            private_key: private_key.secret_bytes(),
            chain_code: child.chain_code.to_bytes(),
        };

        Ok(KeyMaterial {
            state: State::Active(Box::new(ActiveKeyMaterial {
                secret,
                network,
                internal_pubkey,
                compressed_pubkey: public_key.serialize(),
                address,
            })),
            secp,
        })
    }

    fn active(&self) -> Result<&ActiveKeyMaterial, KeyMaterialError> {
        match &self.state {
            State::Active(inner) => Ok(inner),
            State::Disposed => Err(KeyMaterialError::Disposed),
        }
    }

    /// The account's cached Taproot (P2TR) address.
    pub fn address(&self) -> Result<Address, KeyMaterialError> {
        Ok(self.active()?.address.clone())
    }

    /// The account's network.
    pub fn network(&self) -> Result<Network, KeyMaterialError> {
        Ok(self.active()?.network)
    }

    /// The 32-byte x-only internal public key, used to build the P2TR output script.
    pub fn internal_public_key(&self) -> Result<XOnlyPublicKey, KeyMaterialError> {
        Ok(self.active()?.internal_pubkey)
    }

    /// The 33-byte compressed public key of the child key (prefix + x-coordinate).
    pub fn compressed_public_key(&self) -> Result<[u8; 33], KeyMaterialError> {
        Ok(self.active()?.compressed_pubkey)
    }

    fn secret_key(&self) -> Result<SecretKey, KeyMaterialError> {
        let active = self.active()?;
        SecretKey::from_slice(&active.secret.private_key).map_err(KeyMaterialError::Secp)
    }

    /// Signs `SHA256(message)` under the (untweaked) child key with ECDSA and returns the DER
    /// signature as hex.
    pub fn sign_message(&self, message: &[u8]) -> Result<String, KeyMaterialError> {
        let secret_key = self.secret_key()?;
        let digest = sha256::Hash::hash(message);
        let msg = Message::from_digest(digest.to_byte_array());
        let sig = self.secp.sign_ecdsa(&msg, &secret_key);
        Ok(hex::encode(sig.serialize_der()))
    }

    /// Verifies a hex-encoded DER ECDSA signature over `SHA256(message)` produced by
    /// [`Self::sign_message`]. Returns `Ok(false)` on a mismatched signature and
    /// [`KeyMaterialError::MalformedSignature`] if `signature_hex` does not parse.
    pub fn verify_message(&self, message: &[u8], signature_hex: &str) -> Result<bool, KeyMaterialError> {
        let active = self.active()?;
        let bytes = hex::decode(signature_hex)
            .map_err(|e| KeyMaterialError::MalformedSignature(e.to_string()))?;
        let sig = ecdsa::Signature::from_der(&bytes)
            .map_err(|e| KeyMaterialError::MalformedSignature(e.to_string()))?;
        let public_key = PublicKey::from_slice(&active.compressed_pubkey)
            .map_err(|e| KeyMaterialError::MalformedSignature(e.to_string()))?;
        let digest = sha256::Hash::hash(message);
        let msg = Message::from_digest(digest.to_byte_array());
        Ok(self.secp.verify_ecdsa(&msg, &sig, &public_key).is_ok())
    }

    /// Computes the BIP-341 tweaked signing keypair (`priv + H_TapTweak(internal || 0x00×32) mod
    /// n`, with the parity correction BIP-340 x-only keys require). The tweaked secret is never
    /// cached; callers should use it and let it drop.
    pub fn tweaked_signer(&self) -> Result<Keypair, KeyMaterialError> {
        let secret_key = self.secret_key()?;
        let keypair = Keypair::from_secret_key(&self.secp, &secret_key);
        let (internal, _parity) = XOnlyPublicKey::from_keypair(&keypair);
        let tweak = TapTweakHash::from_key_and_tweak(internal, None).to_scalar();
        keypair
            .add_xonly_tweak(&self.secp, &tweak)
            .map_err(|_| KeyMaterialError::InvalidTweak)
    }

    /// Zeroizes the private key and chain code. Every subsequent operation that needs the secret
    /// key fails with [`KeyMaterialError::Disposed`].
    pub fn dispose(&mut self) {
        self.state = State::Disposed;
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.state, State::Disposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "cook voyage document eight skate token alien guide drink uncle term abuse";

    #[test]
    fn derives_expected_regtest_address_prefix() {
        let key = KeyMaterial::from_mnemonic(TEST_MNEMONIC, "0'/0/0", Network::Regtest).unwrap();
        let address = key.address().unwrap();
        assert!(address.to_string().starts_with("bcrt1p"));
        assert_eq!(key.compressed_public_key().unwrap().len(), 33);
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = KeyMaterial::from_mnemonic(TEST_MNEMONIC, "0'/0/0", Network::Regtest).unwrap();
        let b = KeyMaterial::from_mnemonic(TEST_MNEMONIC, "0'/0/0", Network::Regtest).unwrap();
        assert_eq!(a.address().unwrap(), b.address().unwrap());
        assert_eq!(
            a.compressed_public_key().unwrap(),
            b.compressed_public_key().unwrap()
        );
    }

    #[test]
    fn different_index_yields_different_address() {
        let a = KeyMaterial::from_mnemonic(TEST_MNEMONIC, "0'/0/0", Network::Regtest).unwrap();
        let b = KeyMaterial::from_mnemonic(TEST_MNEMONIC, "0'/0/1", Network::Regtest).unwrap();
        assert_ne!(a.address().unwrap(), b.address().unwrap());
    }

    #[test]
    fn invalid_mnemonic_is_rejected() {
        let err = KeyMaterial::from_mnemonic("not a real mnemonic", "0'/0/0", Network::Regtest)
            .unwrap_err();
        assert!(matches!(err, KeyMaterialError::InvalidSeedPhrase(_)));
    }

    #[test]
    fn invalid_path_is_rejected() {
        let err = KeyMaterial::from_mnemonic(TEST_MNEMONIC, "0/0/0", Network::Regtest).unwrap_err();
        assert!(matches!(err, KeyMaterialError::InvalidPath(_)));
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let key = KeyMaterial::from_mnemonic(TEST_MNEMONIC, "0'/0/0", Network::Regtest).unwrap();
        let sig = key.sign_message(b"hello world").unwrap();
        assert!(key.verify_message(b"hello world", &sig).unwrap());
        assert!(!key.verify_message(b"goodbye world", &sig).unwrap());
    }

    #[test]
    fn verify_rejects_malformed_signature() {
        let key = KeyMaterial::from_mnemonic(TEST_MNEMONIC, "0'/0/0", Network::Regtest).unwrap();
        let err = key.verify_message(b"hello world", "not-hex").unwrap_err();
        assert!(matches!(err, KeyMaterialError::MalformedSignature(_)));
    }

    #[test]
    fn tweaked_signer_differs_from_internal_key() {
        let key = KeyMaterial::from_mnemonic(TEST_MNEMONIC, "0'/0/0", Network::Regtest).unwrap();
        let tweaked = key.tweaked_signer().unwrap();
        let (tweaked_xonly, _) = tweaked.x_only_public_key();
        assert_ne!(tweaked_xonly, key.internal_public_key().unwrap());
    }

    #[test]
    fn dispose_fails_subsequent_signing() {
        let mut key = KeyMaterial::from_mnemonic(TEST_MNEMONIC, "0'/0/0", Network::Regtest).unwrap();
        key.dispose();
        assert!(key.is_disposed());
        assert!(matches!(
            key.sign_message(b"hi"),
            Err(KeyMaterialError::Disposed)
        ));
        assert!(matches!(
            key.tweaked_signer(),
            Err(KeyMaterialError::Disposed)
        ));
        assert!(matches!(key.address(), Err(KeyMaterialError::Disposed)));
    }
}
