use std::{collections::BTreeMap, future::Future, sync::Arc};

use elreader_types::{
    AggregationResult, Address, AllocationInfo, BlockHeight, OperatorSetKey, StakeAmount,
};
use tracing::{debug, instrument};
use utils::telemetry::AggregationMetrics;

use crate::{
    aggregator::{AggregatorConfig, SlashableStakeAggregator},
    apis::gateway::{future_block, LedgerGateway},
    error::{AggregationError, ReaderError},
    fetcher::stake_matrix,
};

/// Operator-set reads over one gateway: the slashable stake aggregation plus the
/// per-operator lookups that go with it.
pub struct OperatorSetReader<G> {
    gateway: Arc<G>,
    aggregator: SlashableStakeAggregator<G>,
}

impl<G: LedgerGateway> OperatorSetReader<G> {
    pub fn new(gateway: Arc<G>, config: AggregatorConfig) -> Self {
        Self {
            aggregator: SlashableStakeAggregator::new(gateway.clone(), config),
            gateway,
        }
    }

    pub fn with_metrics(self, metrics: AggregationMetrics) -> Self {
        Self {
            aggregator: self.aggregator.with_metrics(metrics),
            gateway: self.gateway,
        }
    }

    pub fn aggregator(&self) -> &SlashableStakeAggregator<G> {
        &self.aggregator
    }

    /// Aggregates at the current block, read once up front
    pub async fn aggregate_latest(
        &self,
        keys: &[OperatorSetKey],
    ) -> Result<AggregationResult, AggregationError> {
        self.aggregate_latest_with_cancel(keys, std::future::pending())
            .await
    }

    #[instrument(skip(self, keys, cancel), fields(subsys = "Reader", sets = keys.len()))]
    pub async fn aggregate_latest_with_cancel(
        &self,
        keys: &[OperatorSetKey],
        cancel: impl Future<Output = ()>,
    ) -> Result<AggregationResult, AggregationError> {
        // bad input fails without even reading the height
        crate::aggregator::validate(keys, 0)?;

        let mut cancel = std::pin::pin!(cancel);

        let height = tokio::select! {
            biased;
            _ = &mut cancel => {
                debug!("cancelled while reading the block number");
                return Err(AggregationError::Cancelled);
            }
            res = self.gateway.block_number() => {
                res.map_err(|cause| AggregationError::BlockNumber { cause })?
            }
        };
        debug!(height, "aggregating at latest block");

        // the same cancel keeps running through the aggregation itself
        self.aggregator
            .aggregate_with_cancel(keys, height, cancel)
            .await
    }

    /// Minimum slashable stake of one operator in one set, strategy -> stake
    #[instrument(level = "debug", skip(self, strategies), fields(subsys = "Reader", key = %key))]
    pub async fn slashable_stake_for_operator(
        &self,
        operator: Address,
        key: OperatorSetKey,
        strategies: &[Address],
        height: BlockHeight,
    ) -> Result<BTreeMap<Address, StakeAmount>, ReaderError> {
        validate_key(&key)?;
        if future_block(height).is_none() {
            return Err(ReaderError::HeightOutOfRange { height });
        }
        if strategies.is_empty() {
            return Ok(BTreeMap::new());
        }

        let rows = self
            .gateway
            .get_minimum_slashable_stake(key, &[operator], strategies, height)
            .await
            .map_err(ReaderError::gateway("getMinimumSlashableStake"))?;

        let mut matrix = stake_matrix(&[operator], strategies, rows).map_err(|got| {
            ReaderError::ShapeMismatch {
                operator,
                key,
                expected_strategies: strategies.len(),
                got,
            }
        })?;

        Ok(strategies
            .iter()
            .filter_map(|strategy| {
                let stake = matrix.get_mut(strategy)?.remove(&operator)?;
                Some((*strategy, stake))
            })
            .collect())
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "Reader", key = %key))]
    pub async fn member_count(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<u64, ReaderError> {
        validate_key(&key)?;

        self.gateway
            .get_member_count(key, at)
            .await
            .map_err(ReaderError::gateway("getMemberCount"))
    }

    /// Operator sets the operator has allocated magnitude to
    #[instrument(level = "debug", skip(self), fields(subsys = "Reader"))]
    pub async fn allocated_sets(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<Vec<OperatorSetKey>, ReaderError> {
        self.gateway
            .get_allocated_sets(operator, at)
            .await
            .map_err(ReaderError::gateway("getAllocatedSets"))
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "Reader"))]
    pub async fn registered_sets(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<Vec<OperatorSetKey>, ReaderError> {
        self.gateway
            .get_registered_sets(operator, at)
            .await
            .map_err(ReaderError::gateway("getRegisteredSets"))
    }

    /// Legacy sets (id 0) are tracked by the AVS directory, not here, and are rejected
    #[instrument(level = "debug", skip(self), fields(subsys = "Reader", key = %key))]
    pub async fn is_registered_with_operator_set(
        &self,
        operator: Address,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<bool, ReaderError> {
        validate_key(&key)?;

        let registered = self.registered_sets(operator, at).await?;
        Ok(registered.contains(&key))
    }

    /// Pairs each operator set with its allocation of `strategy`, by position
    #[instrument(level = "debug", skip(self), fields(subsys = "Reader"))]
    pub async fn allocation_info(
        &self,
        operator: Address,
        strategy: Address,
        at: Option<BlockHeight>,
    ) -> Result<Vec<AllocationInfo>, ReaderError> {
        let (operator_sets, allocations) = self
            .gateway
            .get_strategy_allocations(operator, strategy, at)
            .await
            .map_err(ReaderError::gateway("getStrategyAllocations"))?;

        if operator_sets.len() != allocations.len() {
            return Err(ReaderError::AllocationLengthMismatch {
                operator,
                strategy,
                operator_sets: operator_sets.len(),
                allocations: allocations.len(),
            });
        }

        Ok(operator_sets
            .into_iter()
            .zip(allocations)
            .map(|(operator_set, allocation)| AllocationInfo {
                operator_set,
                allocation,
            })
            .collect())
    }

    /// The delay in blocks before a new allocation takes effect
    #[instrument(level = "debug", skip(self), fields(subsys = "Reader"))]
    pub async fn allocation_delay(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<u32, ReaderError> {
        let delay = self
            .gateway
            .get_allocation_delay(operator, at)
            .await
            .map_err(ReaderError::gateway("getAllocationDelay"))?;

        if !delay.is_set {
            return Err(ReaderError::AllocationDelayNotSet { operator });
        }

        Ok(delay.delay)
    }
}

fn validate_key(key: &OperatorSetKey) -> Result<(), ReaderError> {
    key.validate()
        .map_err(|reason| ReaderError::InvalidOperatorSet { key: *key, reason })
}
