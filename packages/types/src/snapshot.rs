use std::collections::BTreeMap;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{BlockHeight, OperatorSetKey, StakeAmount};

/// strategy -> operator -> minimum slashable stake
pub type StakeMatrix = BTreeMap<Address, BTreeMap<Address, StakeAmount>>;

/// Point-in-time view of one operator set
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OperatorSetSnapshot {
    pub key: OperatorSetKey,
    pub operators: Vec<Address>,
    pub strategies: Vec<Address>,
    pub stakes: StakeMatrix,
}

impl OperatorSetSnapshot {
    pub fn new(key: OperatorSetKey) -> Self {
        Self {
            key,
            operators: Vec::new(),
            strategies: Vec::new(),
            stakes: StakeMatrix::new(),
        }
    }

    pub fn stake(&self, strategy: &Address, operator: &Address) -> Option<&StakeAmount> {
        self.stakes
            .get(strategy)
            .and_then(|operators| operators.get(operator))
    }

    /// An empty member or strategy list means an empty stake map; otherwise every
    /// strategy has exactly one entry per operator.
    pub fn has_consistent_shape(&self) -> bool {
        if self.operators.is_empty() || self.strategies.is_empty() {
            return self.stakes.is_empty();
        }

        self.stakes.len() == self.strategies.len()
            && self.strategies.iter().all(|strategy| {
                self.stakes.get(strategy).is_some_and(|by_operator| {
                    by_operator.len() == self.operators.len()
                        && self
                            .operators
                            .iter()
                            .all(|operator| by_operator.contains_key(operator))
                })
            })
    }
}

/// Snapshots for every requested operator set, in request order, all read at `height`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AggregationResult {
    pub height: BlockHeight,
    pub snapshots: Vec<OperatorSetSnapshot>,
}

impl AggregationResult {
    pub fn empty(height: BlockHeight) -> Self {
        Self {
            height,
            snapshots: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, key: &OperatorSetKey) -> Option<&OperatorSetSnapshot> {
        self.snapshots.iter().find(|snapshot| snapshot.key == *key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &OperatorSetKey> {
        self.snapshots.iter().map(|snapshot| &snapshot.key)
    }
}

impl IntoIterator for AggregationResult {
    type Item = OperatorSetSnapshot;
    type IntoIter = std::vec::IntoIter<OperatorSetSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.into_iter()
    }
}
