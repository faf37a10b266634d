use account_core::electrum::ElectrumError;
use account_core::history_resolver::HistoryError;
use account_core::key_material::KeyMaterialError;
use account_core::tx_builder::BuilderError;
use account_core::utxo_planner::PlannerError;
use thiserror::Error;

/// The façade's composed error type. Every sub-component's error enum is folded in via `#[from]`.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    KeyMaterial(#[from] KeyMaterialError),

    #[error(transparent)]
    Electrum(#[from] ElectrumError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Builder(#[from] BuilderError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("{0} is not supported by this account")]
    Unsupported(&'static str),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl AccountError {
    /// `true` once the account has been disposed and every key-dependent operation will keep
    /// failing this way.
    pub fn is_disposed(&self) -> bool {
        matches!(self, AccountError::KeyMaterial(KeyMaterialError::Disposed))
    }
}
