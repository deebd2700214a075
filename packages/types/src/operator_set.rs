use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum OperatorSetKeyError {
    #[error("operator set id 0 is reserved for legacy AVSs and is not supported")]
    LegacyId,
    #[error("AVS address must not be the zero address")]
    ZeroAvs,
    #[error("malformed AVS address {0:?}")]
    MalformedAddress(String),
    #[error("malformed operator set id {0:?}")]
    MalformedId(String),
    #[error("expected an operator set in the form <avs>:<id>, got {0:?}")]
    Format(String),
}

/// Identifies one operator set: the AVS that registered it and its id within that AVS.
///
/// Equality, ordering and hashing are structural over both fields, so a key can be
/// used directly in maps. The address is stored as raw bytes, so differently-cased
/// hex input always normalizes to the same key.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperatorSetKey {
    pub avs: Address,
    pub id: u32,
}

impl OperatorSetKey {
    /// Builds a key without validation, e.g. when decoding what the ledger returned.
    /// Use [`OperatorSetKey::try_new`] for caller-supplied input.
    pub const fn new(avs: Address, id: u32) -> Self {
        Self { avs, id }
    }

    pub fn try_new(avs: Address, id: u32) -> Result<Self, OperatorSetKeyError> {
        let key = Self::new(avs, id);
        key.validate()?;
        Ok(key)
    }

    /// Pure check, no I/O. Legacy sets (id 0) have no representation in the
    /// allocation manager and the zero address is never a registered AVS.
    pub fn validate(&self) -> Result<(), OperatorSetKeyError> {
        if self.id == 0 {
            return Err(OperatorSetKeyError::LegacyId);
        }
        if self.avs.is_zero() {
            return Err(OperatorSetKeyError::ZeroAvs);
        }
        Ok(())
    }

    pub fn is_legacy(&self) -> bool {
        self.id == 0
    }
}

// `<checksummed avs>:<id>`
impl std::fmt::Display for OperatorSetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.avs, self.id)
    }
}

impl FromStr for OperatorSetKey {
    type Err = OperatorSetKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (avs, id) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| OperatorSetKeyError::Format(s.to_string()))?;

        let avs = Address::from_str(avs.trim())
            .map_err(|_| OperatorSetKeyError::MalformedAddress(avs.to_string()))?;
        let id = id
            .trim()
            .parse::<u32>()
            .map_err(|_| OperatorSetKeyError::MalformedId(id.to_string()))?;

        Self::try_new(avs, id)
    }
}

impl TryFrom<&str> for OperatorSetKey {
    type Error = OperatorSetKeyError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}
