use std::{future::IntoFuture, time::Duration};

use alloy_provider::Provider;
use alloy_rpc_types_eth::BlockId;
use async_trait::async_trait;
use elreader_types::{Address, Allocation, AllocationDelay, BlockHeight, OperatorSetKey, StakeAmount};
use tracing::instrument;
use utils::evm_client::EvmQueryClient;

use crate::{
    apis::gateway::{future_block, GatewayError, LedgerGateway},
    bindings::{decode_allocation_manager_error, AllocationManagerError, IAllocationManager, IAllocationManagerQueryT},
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads the AllocationManager through an alloy provider, one eth_call per read
#[derive(Clone)]
pub struct EvmLedgerGateway {
    pub client: EvmQueryClient,
    contract: IAllocationManagerQueryT,
    request_timeout: Duration,
}

impl EvmLedgerGateway {
    pub fn new(client: EvmQueryClient, allocation_manager: Address, request_timeout: Duration) -> Self {
        let contract = IAllocationManager::new(allocation_manager, client.provider.clone());

        Self {
            client,
            contract,
            request_timeout,
        }
    }

    pub fn allocation_manager(&self) -> Address {
        *self.contract.address()
    }

    async fn timed<T, E>(
        &self,
        fut: impl IntoFuture<Output = Result<T, E>>,
    ) -> Result<T, GatewayError>
    where
        GatewayError: From<E>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(res) => res.map_err(GatewayError::from),
            Err(_) => Err(GatewayError::Timeout(self.request_timeout)),
        }
    }
}

fn block_id(at: Option<BlockHeight>) -> BlockId {
    match at {
        Some(height) => BlockId::number(height),
        None => BlockId::latest(),
    }
}

#[async_trait]
impl LedgerGateway for EvmLedgerGateway {
    #[instrument(level = "debug", skip(self), fields(subsys = "Gateway"))]
    async fn block_number(&self) -> Result<BlockHeight, GatewayError> {
        self.timed(self.client.provider.get_block_number()).await
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "Gateway", key = %key))]
    async fn get_members(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<Vec<Address>, GatewayError> {
        self.timed(
            self.contract
                .getMembers(key.into())
                .block(block_id(at))
                .call(),
        )
        .await
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "Gateway", key = %key))]
    async fn get_member_count(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<u64, GatewayError> {
        let count = self
            .timed(
                self.contract
                    .getMemberCount(key.into())
                    .block(block_id(at))
                    .call(),
            )
            .await?;

        u64::try_from(count)
            .map_err(|_| GatewayError::Decode(format!("member count {count} does not fit u64")))
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "Gateway", key = %key))]
    async fn get_strategies(
        &self,
        key: OperatorSetKey,
        at: Option<BlockHeight>,
    ) -> Result<Vec<Address>, GatewayError> {
        self.timed(
            self.contract
                .getStrategiesInOperatorSet(key.into())
                .block(block_id(at))
                .call(),
        )
        .await
    }

    #[instrument(level = "debug", skip(self, operators, strategies), fields(subsys = "Gateway", key = %key, operators = operators.len(), strategies = strategies.len()))]
    async fn get_minimum_slashable_stake(
        &self,
        key: OperatorSetKey,
        operators: &[Address],
        strategies: &[Address],
        height: BlockHeight,
    ) -> Result<Vec<Vec<StakeAmount>>, GatewayError> {
        let future_block = future_block(height).ok_or_else(|| {
            GatewayError::Other(format!("height {height} does not fit the uint32 futureBlock"))
        })?;

        self.timed(
            self.contract
                .getMinimumSlashableStake(
                    key.into(),
                    operators.to_vec(),
                    strategies.to_vec(),
                    future_block,
                )
                .block(BlockId::number(height))
                .call(),
        )
        .await
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "Gateway"))]
    async fn get_allocated_sets(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<Vec<OperatorSetKey>, GatewayError> {
        let sets = self
            .timed(
                self.contract
                    .getAllocatedSets(operator)
                    .block(block_id(at))
                    .call(),
            )
            .await?;

        Ok(sets.into_iter().map(OperatorSetKey::from).collect())
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "Gateway"))]
    async fn get_registered_sets(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<Vec<OperatorSetKey>, GatewayError> {
        let sets = self
            .timed(
                self.contract
                    .getRegisteredSets(operator)
                    .block(block_id(at))
                    .call(),
            )
            .await?;

        Ok(sets.into_iter().map(OperatorSetKey::from).collect())
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "Gateway"))]
    async fn get_strategy_allocations(
        &self,
        operator: Address,
        strategy: Address,
        at: Option<BlockHeight>,
    ) -> Result<(Vec<OperatorSetKey>, Vec<Allocation>), GatewayError> {
        let allocations = self
            .timed(
                self.contract
                    .getStrategyAllocations(operator, strategy)
                    .block(block_id(at))
                    .call(),
            )
            .await?;

        Ok((
            allocations._0.into_iter().map(OperatorSetKey::from).collect(),
            allocations._1.into_iter().map(Allocation::from).collect(),
        ))
    }

    #[instrument(level = "debug", skip(self), fields(subsys = "Gateway"))]
    async fn get_allocation_delay(
        &self,
        operator: Address,
        at: Option<BlockHeight>,
    ) -> Result<AllocationDelay, GatewayError> {
        let delay = self
            .timed(
                self.contract
                    .getAllocationDelay(operator)
                    .block(block_id(at))
                    .call(),
            )
            .await?;

        Ok(AllocationDelay {
            is_set: delay.isSet,
            delay: delay.delay,
        })
    }
}

impl std::fmt::Debug for EvmLedgerGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmLedgerGateway")
            .field("client", &self.client)
            .field("allocation_manager", self.contract.address())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl From<alloy_contract::Error> for GatewayError {
    fn from(err: alloy_contract::Error) -> Self {
        // revert data arrives wrapped in a transport error, so it is checked first
        if let Some(known) = decode_allocation_manager_error(&err) {
            let reason = match known {
                AllocationManagerError::InvalidOperatorSet(_) => "InvalidOperatorSet()",
                AllocationManagerError::InvalidOperator(_) => "InvalidOperator()",
                AllocationManagerError::OperatorNotSlashable(_) => "OperatorNotSlashable()",
            };
            return GatewayError::Revert {
                reason: reason.to_string(),
            };
        }

        if let Some(raw) = err.as_revert_data() {
            return GatewayError::Revert {
                reason: alloy_sol_types::decode_revert_reason(&raw)
                    .unwrap_or_else(|| raw.to_string()),
            };
        }

        match err {
            alloy_contract::Error::TransportError(err) => GatewayError::from(err),
            alloy_contract::Error::AbiError(err) => GatewayError::Decode(err.to_string()),
            alloy_contract::Error::ZeroData(function, err) => {
                GatewayError::Decode(format!("{function} returned no data: {err}"))
            }
            err => GatewayError::Other(err.to_string()),
        }
    }
}

impl From<alloy_transport::TransportError> for GatewayError {
    fn from(err: alloy_transport::TransportError) -> Self {
        GatewayError::Transport(err.to_string())
    }
}
