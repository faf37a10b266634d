//! The public single-key Taproot account façade.
//!
//! Binds [`account_core`]'s key material, Electrum gateway, UTXO planner, transaction builder, and
//! history resolver into one stateful [`Account`], the only type most callers need.

mod account;
mod config;
mod error;
mod model;

pub use account::Account;
pub use account_core::Network;
pub use account_core::history_resolver::{DirectionFilter, TransferDirection, TransferRecord, TransfersOptions};
pub use config::{AccountConfig, SeedSource};
pub use error::AccountError;
pub use model::{Balance, QuoteResult, SendOptions, SendResult};
