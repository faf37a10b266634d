/// Minimum economically relayable output value, in satoshis.
pub const DUST_LIMIT: u64 = 546;

/// Floor applied to the fee-rate-derived fee so a transaction never ships under-priced.
pub const MIN_FEE_FLOOR: u64 = 141;

/// Default timeout for establishing the Electrum connection.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Capacity of the previous-transaction LRU used by history resolution.
pub const PREV_TX_CACHE_CAPACITY: usize = 256;

/// BIP-86 purpose component of the derivation path.
pub const BIP86_PURPOSE: u32 = 86;

/// Default page size for [`crate::history_resolver::TransfersOptions`] when the caller doesn't
/// specify one.
pub const DEFAULT_TRANSFERS_LIMIT: usize = 100;
