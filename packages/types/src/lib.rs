mod allocation;
mod operator_set;
mod snapshot;
pub use allocation::*;
pub use operator_set::*;
pub use snapshot::*;

pub use alloy_primitives::Address;

/// Unsigned 256-bit on-chain stake value, never truncated
pub type StakeAmount = alloy_primitives::U256;

/// Block number at which ledger reads are evaluated
pub type BlockHeight = u64;
