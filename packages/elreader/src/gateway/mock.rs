use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, RwLock,
    },
    time::Duration,
};

use async_trait::async_trait;
use elreader_types::{Address, Allocation, AllocationDelay, BlockHeight, OperatorSetKey, StakeAmount};
use tracing::instrument;

use crate::apis::gateway::{GatewayError, LedgerGateway};

/// Every call the mock has served, with the arguments it was given
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    BlockNumber,
    Members {
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    },
    MemberCount {
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    },
    Strategies {
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    },
    MinimumSlashableStake {
        key: OperatorSetKey,
        operators: Vec<Address>,
        strategies: Vec<Address>,
        height: BlockHeight,
    },
    AllocatedSets {
        operator: Address,
        at: Option<BlockHeight>,
    },
    RegisteredSets {
        operator: Address,
        at: Option<BlockHeight>,
    },
    StrategyAllocations {
        operator: Address,
        strategy: Address,
        at: Option<BlockHeight>,
    },
    AllocationDelay {
        operator: Address,
        at: Option<BlockHeight>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockCallKind {
    BlockNumber,
    Members,
    MemberCount,
    Strategies,
    MinimumSlashableStake,
    AllocatedSets,
    RegisteredSets,
    StrategyAllocations,
    AllocationDelay,
}

impl MockCall {
    pub fn kind(&self) -> MockCallKind {
        match self {
            MockCall::BlockNumber => MockCallKind::BlockNumber,
            MockCall::Members { .. } => MockCallKind::Members,
            MockCall::MemberCount { .. } => MockCallKind::MemberCount,
            MockCall::Strategies { .. } => MockCallKind::Strategies,
            MockCall::MinimumSlashableStake { .. } => MockCallKind::MinimumSlashableStake,
            MockCall::AllocatedSets { .. } => MockCallKind::AllocatedSets,
            MockCall::RegisteredSets { .. } => MockCallKind::RegisteredSets,
            MockCall::StrategyAllocations { .. } => MockCallKind::StrategyAllocations,
            MockCall::AllocationDelay { .. } => MockCallKind::AllocationDelay,
        }
    }

    pub fn key(&self) -> Option<OperatorSetKey> {
        match self {
            MockCall::Members { key, .. }
            | MockCall::MemberCount { key, .. }
            | MockCall::Strategies { key, .. }
            | MockCall::MinimumSlashableStake { key, .. } => Some(*key),
            _ => None,
        }
    }

    /// The height the call was evaluated at, `None` for latest
    pub fn height(&self) -> Option<BlockHeight> {
        match self {
            MockCall::BlockNumber => None,
            MockCall::MinimumSlashableStake { height, .. } => Some(*height),
            MockCall::Members { at, .. }
            | MockCall::MemberCount { at, .. }
            | MockCall::Strategies { at, .. }
            | MockCall::AllocatedSets { at, .. }
            | MockCall::RegisteredSets { at, .. }
            | MockCall::StrategyAllocations { at, .. }
            | MockCall::AllocationDelay { at, .. } => *at,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockOperatorSet {
    pub members: Vec<Address>,
    pub strategies: Vec<Address>,
}

#[derive(Default)]
struct MockState {
    block_number: BlockHeight,
    sets: HashMap<OperatorSetKey, MockOperatorSet>,
    // (set, operator, strategy)
    stakes: HashMap<(OperatorSetKey, Address, Address), StakeAmount>,
    stake_responses: HashMap<OperatorSetKey, Vec<Vec<StakeAmount>>>,
    allocated_sets: HashMap<Address, Vec<OperatorSetKey>>,
    registered_sets: HashMap<Address, Vec<OperatorSetKey>>,
    strategy_allocations: HashMap<(Address, Address), (Vec<OperatorSetKey>, Vec<Allocation>)>,
    allocation_delays: HashMap<Address, AllocationDelay>,
    failures: HashMap<MockCallKind, GatewayError>,
    key_failures: HashMap<(OperatorSetKey, MockCallKind), GatewayError>,
    key_delays: HashMap<OperatorSetKey, Duration>,
    call_delay: Duration,
}

/// In-memory ledger. Records every call, and can be told to fail, stall, or
/// return malformed stake rows for specific operator sets.
///
/// Unknown operator sets behave like the ledger does: no members, no strategies.
#[derive(Clone, Default)]
pub struct MockLedgerGateway {
    state: Arc<RwLock<MockState>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight_seen: Arc<AtomicUsize>,
}

impl MockLedgerGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_block_number(&self, height: BlockHeight) {
        self.state.write().unwrap().block_number = height;
    }

    pub fn add_operator_set(
        &self,
        key: OperatorSetKey,
        members: Vec<Address>,
        strategies: Vec<Address>,
    ) {
        self.state
            .write()
            .unwrap()
            .sets
            .insert(key, MockOperatorSet { members, strategies });
    }

    /// Unset pairs read as zero
    pub fn set_stake(
        &self,
        key: OperatorSetKey,
        operator: Address,
        strategy: Address,
        amount: StakeAmount,
    ) {
        self.state
            .write()
            .unwrap()
            .stakes
            .insert((key, operator, strategy), amount);
    }

    /// Returned verbatim for every stake query of `key`, whatever its shape
    pub fn set_stake_response(&self, key: OperatorSetKey, rows: Vec<Vec<StakeAmount>>) {
        self.state
            .write()
            .unwrap()
            .stake_responses
            .insert(key, rows);
    }

    pub fn set_allocated_sets(&self, operator: Address, sets: Vec<OperatorSetKey>) {
        self.state
            .write()
            .unwrap()
            .allocated_sets
            .insert(operator, sets);
    }

    pub fn set_registered_sets(&self, operator: Address, sets: Vec<OperatorSetKey>) {
        self.state
            .write()
            .unwrap()
            .registered_sets
            .insert(operator, sets);
    }

    pub fn set_strategy_allocations(
        &self,
        operator: Address,
        strategy: Address,
        sets: Vec<OperatorSetKey>,
        allocations: Vec<Allocation>,
    ) {
        self.state
            .write()
            .unwrap()
            .strategy_allocations
            .insert((operator, strategy), (sets, allocations));
    }

    pub fn set_allocation_delay(&self, operator: Address, delay: AllocationDelay) {
        self.state
            .write()
            .unwrap()
            .allocation_delays
            .insert(operator, delay);
    }

    /// Every call of `kind` fails with `err`
    pub fn fail(&self, kind: MockCallKind, err: GatewayError) {
        self.state.write().unwrap().failures.insert(kind, err);
    }

    /// Calls of `kind` for this one operator set fail with `err`
    pub fn fail_for_key(&self, key: OperatorSetKey, kind: MockCallKind, err: GatewayError) {
        self.state
            .write()
            .unwrap()
            .key_failures
            .insert((key, kind), err);
    }

    /// Every call for this operator set waits `delay` before answering
    pub fn set_key_delay(&self, key: OperatorSetKey, delay: Duration) {
        self.state.write().unwrap().key_delays.insert(key, delay);
    }

    /// Every call waits `delay` before answering
    pub fn set_call_delay(&self, delay: Duration) {
        self.state.write().unwrap().call_delay = delay;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: MockCallKind) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Highest number of calls that were being served at the same time
    pub fn max_in_flight_seen(&self) -> usize {
        self.max_in_flight_seen.load(Ordering::SeqCst)
    }

    async fn serve(&self, call: MockCall) -> Result<InFlight, GatewayError> {
        let kind = call.kind();
        let key = call.key();
        self.calls.lock().unwrap().push(call);

        let in_flight = InFlight::enter(self.in_flight.clone(), &self.max_in_flight_seen);

        let (delay, failure) = {
            let state = self.state.read().unwrap();
            let delay = key
                .and_then(|key| state.key_delays.get(&key).copied())
                .unwrap_or(state.call_delay);
            let failure = key
                .and_then(|key| state.key_failures.get(&(key, kind)).cloned())
                .or_else(|| state.failures.get(&kind).cloned());
            (delay, failure)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(in_flight),
        }
    }
}

// counts a call as in flight until it answers or is dropped
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: Arc<AtomicUsize>, max_seen: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max_seen.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerGateway for MockLedgerGateway {
    #[instrument(level = "debug", skip(self), fields(subsys = "MockGateway"))]
    async fn block_number(&self) -> Result<BlockHeight, GatewayError> {
        let _in_flight = self.serve(MockCall::BlockNumber).await?;
        Ok(self.state.read().unwrap().block_number)
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "MockGateway"))]
    async fn get_members(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<Vec<Address>, GatewayError> {
        let _in_flight = self.serve(MockCall::Members { key, at }).await?;
        Ok(self
            .state
            .read()
            .unwrap()
            .sets
            .get(&key)
            .map(|set| set.members.clone())
            .unwrap_or_default())
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "MockGateway"))]
    async fn get_member_count(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<u64, GatewayError> {
        let _in_flight = self.serve(MockCall::MemberCount { key, at }).await?;
        Ok(self
            .state
            .read()
            .unwrap()
            .sets
            .get(&key)
            .map(|set| set.members.len() as u64)
            .unwrap_or_default())
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "MockGateway"))]
    async fn get_strategies(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<Vec<Address>, GatewayError> {
        let _in_flight = self.serve(MockCall::Strategies { key, at }).await?;
        Ok(self
            .state
            .read()
            .unwrap()
            .sets
            .get(&key)
            .map(|set| set.strategies.clone())
            .unwrap_or_default())
    }

    #[instrument(level = "debug", skip(self, operators, strategies), fields(subsys = "MockGateway"))]
    async fn get_minimum_slashable_stake(
        &self,
        key: OperatorSetKey,
        operators: &[Address],
        strategies: &[Address],
        height: BlockHeight,
    ) -> Result<Vec<Vec<StakeAmount>>, GatewayError> {
        let _in_flight = self
            .serve(MockCall::MinimumSlashableStake {
                key,
                operators: operators.to_vec(),
                strategies: strategies.to_vec(),
                height,
            })
            .await?;

        let state = self.state.read().unwrap();
        if let Some(rows) = state.stake_responses.get(&key) {
            return Ok(rows.clone());
        }

        Ok(operators
            .iter()
            .map(|operator| {
                strategies
                    .iter()
                    .map(|strategy| {
                        state
                            .stakes
                            .get(&(key, *operator, *strategy))
                            .copied()
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect())
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "MockGateway"))]
    async fn get_allocated_sets(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<Vec<OperatorSetKey>, GatewayError> {
        let _in_flight = self.serve(MockCall::AllocatedSets { operator, at }).await?;
        Ok(self
            .state
            .read()
            .unwrap()
            .allocated_sets
            .get(&operator)
            .cloned()
            .unwrap_or_default())
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "MockGateway"))]
    async fn get_registered_sets(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<Vec<OperatorSetKey>, GatewayError> {
        let _in_flight = self.serve(MockCall::RegisteredSets { operator, at }).await?;
        Ok(self
            .state
            .read()
            .unwrap()
            .registered_sets
            .get(&operator)
            .cloned()
            .unwrap_or_default())
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "MockGateway"))]
    async fn get_strategy_allocations(
        &self,
        operator: Address,
        strategy: Address,
        at: Option<BlockHeight>,
    ) -> Result<(Vec<OperatorSetKey>, Vec<Allocation>), GatewayError> {
        let _in_flight = self
            .serve(MockCall::StrategyAllocations {
                operator,
                strategy,
                at,
            })
            .await?;
        Ok(self
            .state
            .read()
            .unwrap()
            .strategy_allocations
            .get(&(operator, strategy))
            .cloned()
            .unwrap_or_default())
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "MockGateway"))]
    async fn get_allocation_delay(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<AllocationDelay, GatewayError> {
        let _in_flight = self.serve(MockCall::AllocationDelay { operator, at }).await?;
        Ok(self
            .state
            .read()
            .unwrap()
            .allocation_delays
            .get(&operator)
            .copied()
            .unwrap_or(AllocationDelay {
                is_set: false,
                delay: 0,
            }))
    }
}
