use elreader_types::{Address, BlockHeight, OperatorSetKey, OperatorSetKeyError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::apis::gateway::GatewayError;

/// The read that failed within one operator set's pipeline
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Operators,
    Strategies,
    Stakes,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Operators => "operators",
            PipelineStage::Strategies => "strategies",
            PipelineStage::Stakes => "stakes",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("invalid operator set {key}: {reason}")]
    InvalidOperatorSet {
        key: OperatorSetKey,
        reason: OperatorSetKeyError,
    },

    #[error("height {height} does not fit the uint32 future block of the stake query")]
    HeightOutOfRange { height: BlockHeight },

    #[error("resolving {stage} of operator set {key}: {cause}")]
    ResolutionFailed {
        key: OperatorSetKey,
        stage: PipelineStage,
        cause: GatewayError,
    },

    #[error("fetching slashable stake of operator set {key}: {cause}")]
    StakeFetchFailed {
        key: OperatorSetKey,
        cause: GatewayError,
    },

    #[error("slashable stake of operator set {key} should be {expected_operators} operators x {expected_strategies} strategies, got {got}")]
    ShapeMismatch {
        key: OperatorSetKey,
        expected_operators: usize,
        expected_strategies: usize,
        got: String,
    },

    #[error("reading the current block number: {cause}")]
    BlockNumber { cause: GatewayError },

    #[error("aggregation cancelled")]
    Cancelled,
}

impl AggregationError {
    pub fn key(&self) -> Option<&OperatorSetKey> {
        match self {
            AggregationError::InvalidOperatorSet { key, .. }
            | AggregationError::ResolutionFailed { key, .. }
            | AggregationError::StakeFetchFailed { key, .. }
            | AggregationError::ShapeMismatch { key, .. } => Some(key),
            AggregationError::HeightOutOfRange { .. }
            | AggregationError::BlockNumber { .. }
            | AggregationError::Cancelled => None,
        }
    }

    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            AggregationError::ResolutionFailed { stage, .. } => Some(*stage),
            AggregationError::StakeFetchFailed { .. } | AggregationError::ShapeMismatch { .. } => {
                Some(PipelineStage::Stakes)
            }
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed. Input errors, reverts and
    /// malformed responses never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            AggregationError::ResolutionFailed { cause, .. }
            | AggregationError::StakeFetchFailed { cause, .. }
            | AggregationError::BlockNumber { cause } => cause.is_transient(),
            _ => false,
        }
    }

    /// Metric label for where the aggregation stopped
    pub fn label(&self) -> &'static str {
        match self {
            AggregationError::InvalidOperatorSet { .. }
            | AggregationError::HeightOutOfRange { .. } => "validation",
            AggregationError::ResolutionFailed { stage, .. } => stage.as_str(),
            AggregationError::StakeFetchFailed { .. } | AggregationError::ShapeMismatch { .. } => {
                PipelineStage::Stakes.as_str()
            }
            AggregationError::BlockNumber { .. } => "block_number",
            AggregationError::Cancelled => "cancelled",
        }
    }
}

/// Failures of the single-purpose reads on [`crate::reader::OperatorSetReader`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    #[error("invalid operator set {key}: {reason}")]
    InvalidOperatorSet {
        key: OperatorSetKey,
        reason: OperatorSetKeyError,
    },

    #[error("height {height} does not fit the uint32 future block of the stake query")]
    HeightOutOfRange { height: BlockHeight },

    #[error("{function}: {cause}")]
    Gateway {
        function: &'static str,
        cause: GatewayError,
    },

    #[error("slashable stake of operator {operator} in {key} should cover {expected_strategies} strategies, got {got}")]
    ShapeMismatch {
        operator: Address,
        key: OperatorSetKey,
        expected_strategies: usize,
        got: String,
    },

    #[error("operator {operator} has {operator_sets} operator sets but {allocations} allocations for strategy {strategy}")]
    AllocationLengthMismatch {
        operator: Address,
        strategy: Address,
        operator_sets: usize,
        allocations: usize,
    },

    #[error("allocation delay of operator {operator} is not set")]
    AllocationDelayNotSet { operator: Address },
}

impl ReaderError {
    pub fn gateway(function: &'static str) -> impl FnOnce(GatewayError) -> Self {
        move |cause| ReaderError::Gateway { function, cause }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ReaderError::Gateway { cause, .. } => cause.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    fn key() -> OperatorSetKey {
        OperatorSetKey::new(Address::repeat_byte(0xaa), 1)
    }

    #[test]
    fn retryable_follows_cause() {
        let transient = AggregationError::ResolutionFailed {
            key: key(),
            stage: PipelineStage::Strategies,
            cause: GatewayError::Timeout(Duration::from_secs(10)),
        };
        assert!(transient.is_retryable());
        assert_eq!(transient.key(), Some(&key()));
        assert_eq!(transient.stage(), Some(PipelineStage::Strategies));
        assert_eq!(transient.label(), "strategies");

        let revert = AggregationError::StakeFetchFailed {
            key: key(),
            cause: GatewayError::Revert {
                reason: "InvalidOperatorSet()".to_string(),
            },
        };
        assert!(!revert.is_retryable());
        assert_eq!(revert.stage(), Some(PipelineStage::Stakes));

        assert!(!AggregationError::Cancelled.is_retryable());
        assert_eq!(AggregationError::Cancelled.key(), None);
        assert!(!AggregationError::ShapeMismatch {
            key: key(),
            expected_operators: 2,
            expected_strategies: 1,
            got: "1 rows".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn messages_name_the_key() {
        let err = AggregationError::InvalidOperatorSet {
            key: OperatorSetKey::new(Address::repeat_byte(0xaa), 0),
            reason: OperatorSetKeyError::LegacyId,
        };
        let message = err.to_string();
        assert!(message.contains(":0"), "{message}");
        assert!(message.contains("legacy"), "{message}");
    }
}
