use bitcoin::bip32::ChildNumber;

use super::KeyMaterialError;

/// The relative `account'/change/index` suffix appended to `m/86'/coin'` to form the full BIP-86
/// path. The first component (`account'`) must be hardened.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RelativePath {
    pub account: ChildNumber,
    pub change: ChildNumber,
    pub index: ChildNumber,
}

impl RelativePath {
    pub fn parse(suffix: &str) -> Result<Self, KeyMaterialError> {
        let components: Vec<&str> = suffix.split('/').collect();
        let [account, change, index] = components.as_slice() else {
            return Err(KeyMaterialError::InvalidPath(suffix.to_string()));
        };

        let account = parse_component(account, suffix)?;
        if !matches!(account, ChildNumber::Hardened { .. }) {
            return Err(KeyMaterialError::InvalidPath(suffix.to_string()));
        }
        let change = parse_component(change, suffix)?;
        let index = parse_component(index, suffix)?;

        Ok(RelativePath {
            account,
            change,
            index,
        })
    }
}

fn parse_component(raw: &str, full: &str) -> Result<ChildNumber, KeyMaterialError> {
    let invalid = || KeyMaterialError::InvalidPath(full.to_string());

    let (digits, hardened) = match raw.strip_suffix('\'') {
        Some(digits) => (digits, true),
        None => (raw, false),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let value: u32 = digits.parse().map_err(|_| invalid())?;

    if hardened {
        ChildNumber::from_hardened_idx(value).map_err(|_| invalid())
    } else {
        ChildNumber::from_normal_idx(value).map_err(|_| invalid())
    }
}
