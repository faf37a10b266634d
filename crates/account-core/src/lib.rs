//! Deterministic key material, chain I/O, and transaction construction for a single-key
//! Taproot (BIP-86) Bitcoin account.
//!
//! This crate has no notion of "an account" as a stateful object — that lifecycle lives in the
//! `account` façade crate. It provides the pieces that façade composes: [`key_material`],
//! [`electrum`], [`chain_source`], [`utxo_planner`], [`tx_builder`], and [`history_resolver`].

pub mod chain_source;
pub mod constants;
pub mod electrum;
pub mod history_resolver;
pub mod key_material;
pub mod network;
pub mod taproot;
pub mod tx_builder;
pub mod utxo_planner;

pub use chain_source::ChainSource;
pub use network::Network;
