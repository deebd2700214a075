use std::time::Duration;

use async_trait::async_trait;
use elreader_types::{Address, Allocation, AllocationDelay, BlockHeight, OperatorSetKey, StakeAmount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Read-only access to the AllocationManager.
///
/// Every read takes the height it is evaluated at, `None` meaning the latest block.
/// Implementations never substitute a default for a failed read.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn block_number(&self) -> Result<BlockHeight, GatewayError>;

    async fn get_members(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<Vec<Address>, GatewayError>;

    async fn get_member_count(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<u64, GatewayError>;

    async fn get_strategies(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<Vec<Address>, GatewayError>;

    /// Rows are indexed `[operator][strategy]`, in the order given.
    /// `height` is both the block the call is evaluated at and the `futureBlock` argument.
    async fn get_minimum_slashable_stake(
        &self,
        key: OperatorSetKey,
        operators: &[Address],
        strategies: &[Address],
        height: BlockHeight,
    ) -> Result<Vec<Vec<StakeAmount>>, GatewayError>;

    async fn get_allocated_sets(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<Vec<OperatorSetKey>, GatewayError>;

    async fn get_registered_sets(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<Vec<OperatorSetKey>, GatewayError>;

    /// Two arrays as the ledger returns them, they are paired by position by the caller
    async fn get_strategy_allocations(
        &self,
        operator: Address,
        strategy: Address,
        at: Option<BlockHeight>,
    ) -> Result<(Vec<OperatorSetKey>, Vec<Allocation>), GatewayError>;

    async fn get_allocation_delay(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<AllocationDelay, GatewayError>;
}

/// The `futureBlock` argument of the stake query is a uint32
pub fn future_block(height: BlockHeight) -> Option<u32> {
    u32::try_from(height).ok()
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayError {
    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport: {0}")]
    Transport(String),

    #[error("call reverted: {reason}")]
    Revert { reason: String },

    #[error("unable to decode ledger response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// Timeouts and transport failures may succeed on a later attempt; reverts and
    /// undecodable responses will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Timeout(_) | GatewayError::Transport(_))
    }
}
