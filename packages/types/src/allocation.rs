use serde::{Deserialize, Serialize};

use crate::OperatorSetKey;

/// An operator's magnitude allocation to one strategy within one operator set
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub current_magnitude: u64,
    /// Signed change that takes effect at `effect_block`
    pub pending_diff: i128,
    pub effect_block: u32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationInfo {
    pub operator_set: OperatorSetKey,
    pub allocation: Allocation,
}

/// Raw allocation delay as stored on chain, `delay` is meaningless unless `is_set`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationDelay {
    pub is_set: bool,
    pub delay: u32,
}
