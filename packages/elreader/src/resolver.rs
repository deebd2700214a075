use std::sync::Arc;

use elreader_types::{Address, BlockHeight, OperatorSetKey};
use tracing::instrument;

use crate::{
    apis::gateway::LedgerGateway,
    error::{AggregationError, PipelineStage},
};

/// Looks up who is in an operator set and what it is exposed to, as of one height.
/// Each lookup is a single read; empty answers are valid and failures are not retried.
pub struct OperatorSetResolver<G> {
    gateway: Arc<G>,
}

impl<G: LedgerGateway> OperatorSetResolver<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "Resolver", key = %key))]
    pub async fn resolve_operators(
        &self,
        key: &OperatorSetKey,
        height: BlockHeight,
    ) -> Result<Vec<Address>, AggregationError> {
        self.gateway
            .get_members(*key, Some(height))
            .await
            .map_err(|cause| AggregationError::ResolutionFailed {
                key: *key,
                stage: PipelineStage::Operators,
                cause,
            })
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "Resolver", key = %key))]
    pub async fn resolve_strategies(
        &self,
        key: &OperatorSetKey,
        height: BlockHeight,
    ) -> Result<Vec<Address>, AggregationError> {
        self.gateway
            .get_strategies(*key, Some(height))
            .await
            .map_err(|cause| AggregationError::ResolutionFailed {
                key: *key,
                stage: PipelineStage::Strategies,
                cause,
            })
    }

    /// Both lookups concurrently, as (operators, strategies).
    /// The first failure wins and the other lookup is dropped.
    pub async fn resolve(
        &self,
        key: &OperatorSetKey,
        height: BlockHeight,
    ) -> Result<(Vec<Address>, Vec<Address>), AggregationError> {
        futures::try_join!(
            self.resolve_operators(key, height),
            self.resolve_strategies(key, height)
        )
    }
}
