use std::{collections::BTreeMap, sync::Arc};

use elreader_types::{Address, BlockHeight, OperatorSetKey, StakeAmount, StakeMatrix};
use tracing::instrument;

use crate::{apis::gateway::LedgerGateway, error::AggregationError};

/// Fetches the minimum slashable stake of an operator set in one batched read
pub struct SlashableStakeFetcher<G> {
    gateway: Arc<G>,
}

impl<G: LedgerGateway> SlashableStakeFetcher<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Returns strategy -> operator -> stake. An empty operator or strategy list
    /// yields an empty matrix without touching the ledger.
    #[instrument(level = "debug", skip(self, operators, strategies), fields(subsys = "Fetcher", key = %key, operators = operators.len(), strategies = strategies.len()))]
    pub async fn fetch_stakes(
        &self,
        key: &OperatorSetKey,
        operators: &[Address],
        strategies: &[Address],
        height: BlockHeight,
    ) -> Result<StakeMatrix, AggregationError> {
        if operators.is_empty() || strategies.is_empty() {
            return Ok(StakeMatrix::new());
        }

        let rows = self
            .gateway
            .get_minimum_slashable_stake(*key, operators, strategies, height)
            .await
            .map_err(|cause| AggregationError::StakeFetchFailed { key: *key, cause })?;

        stake_matrix(operators, strategies, rows).map_err(|got| AggregationError::ShapeMismatch {
            key: *key,
            expected_operators: operators.len(),
            expected_strategies: strategies.len(),
            got,
        })
    }
}

/// Transposes `[operator][strategy]` rows into strategy -> operator -> stake.
///
/// The rows must match the requested lists exactly, and the map must keep every
/// entry; a repeated address that would collapse two entries is rejected too.
/// The error describes what was received.
pub fn stake_matrix(
    operators: &[Address],
    strategies: &[Address],
    rows: Vec<Vec<StakeAmount>>,
) -> Result<StakeMatrix, String> {
    if rows.len() != operators.len() {
        return Err(format!("{} rows", rows.len()));
    }
    if let Some((index, row)) = rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != strategies.len())
    {
        return Err(format!("{} entries in row {index}", row.len()));
    }

    let mut matrix = StakeMatrix::new();
    for (operator, row) in operators.iter().zip(rows) {
        for (strategy, stake) in strategies.iter().zip(row) {
            matrix
                .entry(*strategy)
                .or_insert_with(BTreeMap::new)
                .insert(*operator, stake);
        }
    }

    if matrix.len() != strategies.len()
        || matrix.values().any(|by_operator| by_operator.len() != operators.len())
    {
        return Err(format!(
            "{} distinct strategies with {} distinct operators",
            matrix.len(),
            matrix.values().map(BTreeMap::len).max().unwrap_or_default()
        ));
    }

    Ok(matrix)
}
