use alloy_provider::DynProvider;
use elreader_types::{Allocation, OperatorSetKey};

mod allocation_manager {
    alloy_sol_macro::sol!(
        #[allow(missing_docs)]
        #[sol(rpc)]
        #[derive(Debug, PartialEq, Eq)]
        interface IAllocationManager {
            struct OperatorSet {
                address avs;
                uint32 id;
            }

            struct Allocation {
                uint64 currentMagnitude;
                int128 pendingDiff;
                uint32 effectBlock;
            }

            error InvalidOperatorSet();
            error InvalidOperator();
            error OperatorNotSlashable();

            function getMembers(OperatorSet memory operatorSet) external view returns (address[] memory operators);

            function getMemberCount(OperatorSet memory operatorSet) external view returns (uint256);

            function getStrategiesInOperatorSet(OperatorSet memory operatorSet) external view returns (address[] memory strategies);

            function getMinimumSlashableStake(
                OperatorSet memory operatorSet,
                address[] memory operators,
                address[] memory strategies,
                uint32 futureBlock
            ) external view returns (uint256[][] memory slashableStake);

            function getAllocatedSets(address operator) external view returns (OperatorSet[] memory);

            function getRegisteredSets(address operator) external view returns (OperatorSet[] memory operatorSets);

            function getStrategyAllocations(address operator, address strategy) external view returns (OperatorSet[] memory, Allocation[] memory);

            function getAllocationDelay(address operator) external view returns (bool isSet, uint32 delay);
        }
    );
}

pub use allocation_manager::IAllocationManager;

pub type IAllocationManagerQueryT = IAllocationManager::IAllocationManagerInstance<DynProvider>;

pub type AllocationManagerError = IAllocationManager::IAllocationManagerErrors;

pub fn decode_allocation_manager_error(err: &alloy_contract::Error) -> Option<AllocationManagerError> {
    err.as_decoded_interface_error::<AllocationManagerError>()
}

impl From<OperatorSetKey> for IAllocationManager::OperatorSet {
    fn from(key: OperatorSetKey) -> Self {
        Self {
            avs: key.avs,
            id: key.id,
        }
    }
}

impl From<IAllocationManager::OperatorSet> for OperatorSetKey {
    fn from(set: IAllocationManager::OperatorSet) -> Self {
        OperatorSetKey::new(set.avs, set.id)
    }
}

impl From<IAllocationManager::Allocation> for Allocation {
    fn from(allocation: IAllocationManager::Allocation) -> Self {
        Self {
            current_magnitude: allocation.currentMagnitude,
            pending_diff: allocation.pendingDiff,
            effect_block: allocation.effectBlock,
        }
    }
}
