use account_core::Network;
use account_core::electrum::ElectrumConfig;
use serde::{Deserialize, Serialize};

/// Serializable configuration for an [`crate::Account`]: everything except the secret seed
/// material, which callers hand to [`crate::Account::new`] separately via [`SeedSource`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccountConfig {
    pub network: Network,
    /// The relative `account'/change/index` suffix appended to `m/86'/coin'`, e.g. `"0'/0/0"`.
    pub path: String,
    pub electrum: ElectrumConfig,
}

/// The secret material an [`crate::Account`] is derived from. Not `Serialize` — this never leaves
/// the process as configuration the way [`AccountConfig`] does.
pub enum SeedSource {
    Mnemonic(String),
    Seed([u8; 64]),
}

impl std::fmt::Debug for SeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedSource::Mnemonic(_) => f.write_str("SeedSource::Mnemonic(..)"),
            SeedSource::Seed(_) => f.write_str("SeedSource::Seed(..)"),
        }
    }
}
