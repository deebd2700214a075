use std::{future::Future, sync::Arc, time::Duration};

use elreader_types::{AggregationResult, BlockHeight, OperatorSetKey, OperatorSetSnapshot};
use futures::{stream::FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use utils::telemetry::AggregationMetrics;

use crate::{
    apis::gateway::{future_block, LedgerGateway},
    error::AggregationError,
    fetcher::SlashableStakeFetcher,
    gateway::LimitedGateway,
    resolver::OperatorSetResolver,
};

pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Ledger calls allowed in flight at once, across all operator sets
    pub max_in_flight: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Builds a snapshot of every requested operator set at one height.
///
/// Pipelines for all sets run concurrently on the calling task, while the shared
/// [`LimitedGateway`] caps how many ledger calls are outstanding. The first failure
/// aborts the whole aggregation and no partial result is returned.
pub struct SlashableStakeAggregator<G> {
    gateway: Arc<G>,
    config: AggregatorConfig,
    resolver: OperatorSetResolver<LimitedGateway<G>>,
    fetcher: SlashableStakeFetcher<LimitedGateway<G>>,
    metrics: Option<AggregationMetrics>,
}

impl<G: LedgerGateway> SlashableStakeAggregator<G> {
    pub fn new(gateway: Arc<G>, config: AggregatorConfig) -> Self {
        let limited = Arc::new(LimitedGateway::new(gateway.clone(), config.max_in_flight));

        Self {
            gateway,
            config,
            resolver: OperatorSetResolver::new(limited.clone()),
            fetcher: SlashableStakeFetcher::new(limited),
            metrics: None,
        }
    }

    pub fn with_metrics(self, metrics: AggregationMetrics) -> Self {
        let limited = Arc::new(
            LimitedGateway::new(self.gateway.clone(), self.config.max_in_flight)
                .with_metrics(metrics.clone()),
        );

        Self {
            resolver: OperatorSetResolver::new(limited.clone()),
            fetcher: SlashableStakeFetcher::new(limited),
            metrics: Some(metrics),
            ..self
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// One snapshot per key, in input order, every read evaluated at `height`
    pub async fn aggregate(
        &self,
        keys: &[OperatorSetKey],
        height: BlockHeight,
    ) -> Result<AggregationResult, AggregationError> {
        self.aggregate_with_cancel(keys, height, std::future::pending())
            .await
    }

    /// Same as [`Self::aggregate`], returning `Cancelled` if `deadline` passes first
    pub async fn aggregate_with_deadline(
        &self,
        keys: &[OperatorSetKey],
        height: BlockHeight,
        deadline: Duration,
    ) -> Result<AggregationResult, AggregationError> {
        self.aggregate_with_cancel(keys, height, tokio::time::sleep(deadline))
            .await
    }

    /// Same as [`Self::aggregate`], returning `Cancelled` as soon as `cancel` resolves.
    /// Outstanding ledger calls are dropped, not awaited.
    #[instrument(skip(self, keys, cancel), fields(subsys = "Aggregator", sets = keys.len()))]
    pub async fn aggregate_with_cancel(
        &self,
        keys: &[OperatorSetKey],
        height: BlockHeight,
        cancel: impl Future<Output = ()>,
    ) -> Result<AggregationResult, AggregationError> {
        let started = Instant::now();

        let res = self.run(keys, height, cancel).await;

        match &res {
            Ok(result) => {
                info!(sets = result.len(), "aggregated slashable stake");
                if let Some(metrics) = &self.metrics {
                    metrics.record_success(result.len(), started.elapsed());
                }
            }
            Err(err) => {
                warn!(key = ?err.key(), stage = err.label(), "aggregation failed: {err}");
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure(err.label(), started.elapsed());
                }
            }
        }

        res
    }

    async fn run(
        &self,
        keys: &[OperatorSetKey],
        height: BlockHeight,
        cancel: impl Future<Output = ()>,
    ) -> Result<AggregationResult, AggregationError> {
        validate(keys, height)?;

        if keys.is_empty() {
            return Ok(AggregationResult::empty(height));
        }

        let mut pipelines = keys
            .iter()
            .enumerate()
            .map(|(index, key)| async move {
                self.snapshot(*key, height)
                    .await
                    .map(|snapshot| (index, snapshot))
            })
            .collect::<FuturesUnordered<_>>();

        let mut completed = Vec::with_capacity(keys.len());

        let collect = async {
            while let Some(res) = pipelines.next().await {
                // dropping the remaining pipelines cancels their outstanding calls
                completed.push(res?);
            }
            Ok::<_, AggregationError>(())
        };

        tokio::select! {
            biased;
            _ = cancel => {
                debug!("aggregation cancelled");
                return Err(AggregationError::Cancelled);
            }
            res = collect => res?,
        }

        completed.sort_unstable_by_key(|(index, _)| *index);

        Ok(AggregationResult {
            height,
            snapshots: completed.into_iter().map(|(_, snapshot)| snapshot).collect(),
        })
    }

    async fn snapshot(
        &self,
        key: OperatorSetKey,
        height: BlockHeight,
    ) -> Result<OperatorSetSnapshot, AggregationError> {
        let (operators, strategies) = self.resolver.resolve(&key, height).await?;

        let stakes = self
            .fetcher
            .fetch_stakes(&key, &operators, &strategies, height)
            .await?;

        debug!(
            key = %key,
            operators = operators.len(),
            strategies = strategies.len(),
            "operator set resolved"
        );

        Ok(OperatorSetSnapshot {
            key,
            operators,
            strategies,
            stakes,
        })
    }
}

/// Pure input checks, run before any ledger call
pub fn validate(keys: &[OperatorSetKey], height: BlockHeight) -> Result<(), AggregationError> {
    for key in keys {
        key.validate()
            .map_err(|reason| AggregationError::InvalidOperatorSet { key: *key, reason })?;
    }

    if !keys.is_empty() && future_block(height).is_none() {
        return Err(AggregationError::HeightOutOfRange { height });
    }

    Ok(())
}
