use std::sync::Arc;

use async_trait::async_trait;
use elreader_types::{Address, Allocation, AllocationDelay, BlockHeight, OperatorSetKey, StakeAmount};
use tokio::sync::{Semaphore, SemaphorePermit};
use utils::telemetry::AggregationMetrics;

use crate::apis::gateway::{GatewayError, LedgerGateway};

/// Bounds the number of ledger calls in flight across everything sharing this gateway.
/// Each call holds one permit for exactly its own duration.
pub struct LimitedGateway<G> {
    inner: Arc<G>,
    permits: Semaphore,
    max_in_flight: usize,
    metrics: Option<AggregationMetrics>,
}

impl<G: LedgerGateway> LimitedGateway<G> {
    pub fn new(inner: Arc<G>, max_in_flight: usize) -> Self {
        // zero permits would never make progress
        let max_in_flight = max_in_flight.max(1);

        Self {
            inner,
            permits: Semaphore::new(max_in_flight),
            max_in_flight,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: AggregationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn inner(&self) -> &Arc<G> {
        &self.inner
    }

    async fn permit(&self, function: &'static str) -> Result<SemaphorePermit<'_>, GatewayError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GatewayError::Other("gateway permits closed".to_string()))?;

        if let Some(metrics) = &self.metrics {
            metrics.increment_ledger_calls(function);
        }

        Ok(permit)
    }
}

#[async_trait]
impl<G: LedgerGateway> LedgerGateway for LimitedGateway<G> {
    async fn block_number(&self) -> Result<BlockHeight, GatewayError> {
        let _permit = self.permit("blockNumber").await?;
        self.inner.block_number().await
    }

    async fn get_members(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<Vec<Address>, GatewayError> {
        let _permit = self.permit("getMembers").await?;
        self.inner.get_members(key, at).await
    }

    async fn get_member_count(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<u64, GatewayError> {
        let _permit = self.permit("getMemberCount").await?;
        self.inner.get_member_count(key, at).await
    }

    async fn get_strategies(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<Vec<Address>, GatewayError> {
        let _permit = self.permit("getStrategiesInOperatorSet").await?;
        self.inner.get_strategies(key, at).await
    }

    async fn get_minimum_slashable_stake(
        &self,
        key: OperatorSetKey,
        operators: &[Address],
        strategies: &[Address],
        height: BlockHeight,
    ) -> Result<Vec<Vec<StakeAmount>>, GatewayError> {
        let _permit = self.permit("getMinimumSlashableStake").await?;
        self.inner
            .get_minimum_slashable_stake(key, operators, strategies, height)
            .await
    }

    async fn get_allocated_sets(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<Vec<OperatorSetKey>, GatewayError> {
        let _permit = self.permit("getAllocatedSets").await?;
        self.inner.get_allocated_sets(operator, at).await
    }

    async fn get_registered_sets(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<Vec<OperatorSetKey>, GatewayError> {
        let _permit = self.permit("getRegisteredSets").await?;
        self.inner.get_registered_sets(operator, at).await
    }

    async fn get_strategy_allocations(
        &self,
        operator: Address,
        strategy: Address,
        at: Option<BlockHeight>,
    ) -> Result<(Vec<OperatorSetKey>, Vec<Allocation>), GatewayError> {
        let _permit = self.permit("getStrategyAllocations").await?;
        self.inner
            .get_strategy_allocations(operator, strategy, at)
            .await
    }

    async fn get_allocation_delay(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<AllocationDelay, GatewayError> {
        let _permit = self.permit("getAllocationDelay").await?;
        self.inner.get_allocation_delay(operator, at).await
    }
}
