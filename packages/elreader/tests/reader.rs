use std::{collections::BTreeMap, sync::Arc};

use elreader::{
    gateway::mock::{MockCall, MockCallKind, MockLedgerGateway},
    AggregationError, AggregatorConfig, GatewayError, OperatorSetReader, ReaderError,
};
use elreader_types::{
    Allocation, AllocationDelay, AllocationInfo, OperatorSetKey, OperatorSetKeyError, StakeAmount,
};
use utils::{
    init_tracing_tests,
    test_utils::address::{rand_address_evm, rand_addresses_evm},
};

fn reader(mock: &Arc<MockLedgerGateway>) -> OperatorSetReader<MockLedgerGateway> {
    OperatorSetReader::new(mock.clone(), AggregatorConfig::default())
}

#[tokio::test]
async fn aggregate_latest_reads_the_height_once() {
    init_tracing_tests();

    let mock = Arc::new(MockLedgerGateway::new());
    mock.set_block_number(1_234);

    let key = OperatorSetKey::new(rand_address_evm(), 7);
    let operators = rand_addresses_evm(2);
    let strategies = rand_addresses_evm(2);
    mock.add_operator_set(key, operators.clone(), strategies.clone());

    let result = reader(&mock).aggregate_latest(&[key]).await.unwrap();

    assert_eq!(result.height, 1_234);
    assert_eq!(result.snapshots[0].operators, operators);
    assert_eq!(mock.calls_of(MockCallKind::BlockNumber).len(), 1);
    assert!(mock
        .calls()
        .iter()
        .filter(|call| call.kind() != MockCallKind::BlockNumber)
        .all(|call| call.height() == Some(1_234)));
}

#[tokio::test]
async fn aggregate_latest_errors() {
    let mock = Arc::new(MockLedgerGateway::new());
    let key = OperatorSetKey::new(rand_address_evm(), 1);

    // invalid input never reaches the ledger
    let err = reader(&mock)
        .aggregate_latest(&[OperatorSetKey::new(key.avs, 0)])
        .await
        .unwrap_err();
    assert!(matches!(err, AggregationError::InvalidOperatorSet { .. }));
    assert_eq!(mock.call_count(), 0);

    mock.fail(
        MockCallKind::BlockNumber,
        GatewayError::Transport("unreachable".to_string()),
    );
    let err = reader(&mock).aggregate_latest(&[key]).await.unwrap_err();
    assert_eq!(
        err,
        AggregationError::BlockNumber {
            cause: GatewayError::Transport("unreachable".to_string())
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn aggregate_latest_cancels_during_block_number() {
    let mock = Arc::new(MockLedgerGateway::new());
    mock.set_call_delay(std::time::Duration::from_secs(3));

    let key = OperatorSetKey::new(rand_address_evm(), 1);
    mock.add_operator_set(key, rand_addresses_evm(1), rand_addresses_evm(1));

    let started = std::time::Instant::now();
    let err = reader(&mock)
        .aggregate_latest_with_cancel(
            &[key],
            tokio::time::sleep(std::time::Duration::from_millis(20)),
        )
        .await
        .unwrap_err();

    assert_eq!(err, AggregationError::Cancelled);
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
    assert_eq!(mock.calls_of(MockCallKind::BlockNumber).len(), 1);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn slashable_stake_for_one_operator() {
    let mock = Arc::new(MockLedgerGateway::new());
    let key = OperatorSetKey::new(rand_address_evm(), 2);
    let operator = rand_address_evm();
    let strategies = rand_addresses_evm(3);

    mock.set_stake(key, operator, strategies[0], StakeAmount::from(10));
    mock.set_stake(key, operator, strategies[2], StakeAmount::MAX);

    let stakes = reader(&mock)
        .slashable_stake_for_operator(operator, key, &strategies, 500)
        .await
        .unwrap();

    assert_eq!(
        stakes,
        BTreeMap::from([
            (strategies[0], StakeAmount::from(10)),
            (strategies[1], StakeAmount::ZERO),
            (strategies[2], StakeAmount::MAX),
        ])
    );
    assert_eq!(
        mock.calls(),
        vec![MockCall::MinimumSlashableStake {
            key,
            operators: vec![operator],
            strategies: strategies.clone(),
            height: 500,
        }]
    );

    // no strategies, nothing to read
    mock.clear_calls();
    assert!(reader(&mock)
        .slashable_stake_for_operator(operator, key, &[], 500)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(mock.call_count(), 0);

    mock.set_stake_response(key, vec![vec![StakeAmount::from(1)]]);
    let err = reader(&mock)
        .slashable_stake_for_operator(operator, key, &strategies, 500)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReaderError::ShapeMismatch {
            expected_strategies: 3,
            ..
        }
    ));

    let err = reader(&mock)
        .slashable_stake_for_operator(operator, key, &strategies, u64::MAX)
        .await
        .unwrap_err();
    assert_eq!(err, ReaderError::HeightOutOfRange { height: u64::MAX });
}

#[tokio::test]
async fn member_count() {
    let mock = Arc::new(MockLedgerGateway::new());
    let key = OperatorSetKey::new(rand_address_evm(), 3);
    mock.add_operator_set(key, rand_addresses_evm(4), vec![]);

    assert_eq!(reader(&mock).member_count(key, Some(9)).await.unwrap(), 4);
    assert_eq!(
        mock.calls(),
        vec![MockCall::MemberCount { key, at: Some(9) }]
    );

    let err = reader(&mock)
        .member_count(OperatorSetKey::new(key.avs, 0), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ReaderError::InvalidOperatorSet {
            key: OperatorSetKey::new(key.avs, 0),
            reason: OperatorSetKeyError::LegacyId,
        }
    );
}

#[tokio::test]
async fn operator_sets_of_an_operator() {
    let mock = Arc::new(MockLedgerGateway::new());
    let operator = rand_address_evm();
    let avs = rand_address_evm();
    let allocated = vec![OperatorSetKey::new(avs, 1), OperatorSetKey::new(avs, 2)];
    let registered = vec![OperatorSetKey::new(avs, 2)];

    mock.set_allocated_sets(operator, allocated.clone());
    mock.set_registered_sets(operator, registered.clone());

    let reader = reader(&mock);
    assert_eq!(reader.allocated_sets(operator, None).await.unwrap(), allocated);
    assert_eq!(
        reader.registered_sets(operator, Some(3)).await.unwrap(),
        registered
    );

    assert!(reader
        .is_registered_with_operator_set(operator, OperatorSetKey::new(avs, 2), None)
        .await
        .unwrap());
    assert!(!reader
        .is_registered_with_operator_set(operator, OperatorSetKey::new(avs, 1), None)
        .await
        .unwrap());
    assert!(!reader
        .is_registered_with_operator_set(
            rand_address_evm(),
            OperatorSetKey::new(avs, 2),
            None
        )
        .await
        .unwrap());

    // legacy sets live in the AVS directory
    let err = reader
        .is_registered_with_operator_set(operator, OperatorSetKey::new(avs, 0), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReaderError::InvalidOperatorSet { .. }));
}

#[tokio::test]
async fn allocation_info_pairs_by_position() {
    let mock = Arc::new(MockLedgerGateway::new());
    let operator = rand_address_evm();
    let strategy = rand_address_evm();
    let avs = rand_address_evm();

    let sets = vec![OperatorSetKey::new(avs, 1), OperatorSetKey::new(avs, 4)];
    let allocations = vec![
        Allocation {
            current_magnitude: 1_000,
            pending_diff: 0,
            effect_block: 0,
        },
        Allocation {
            current_magnitude: 250,
            pending_diff: -50,
            effect_block: 88,
        },
    ];
    mock.set_strategy_allocations(operator, strategy, sets.clone(), allocations.clone());

    let info = reader(&mock)
        .allocation_info(operator, strategy, None)
        .await
        .unwrap();
    assert_eq!(
        info,
        vec![
            AllocationInfo {
                operator_set: sets[0],
                allocation: allocations[0],
            },
            AllocationInfo {
                operator_set: sets[1],
                allocation: allocations[1],
            },
        ]
    );

    mock.set_strategy_allocations(operator, strategy, sets, allocations[..1].to_vec());
    let err = reader(&mock)
        .allocation_info(operator, strategy, None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ReaderError::AllocationLengthMismatch {
            operator,
            strategy,
            operator_sets: 2,
            allocations: 1,
        }
    );
}

#[tokio::test]
async fn allocation_delay_must_be_set() {
    let mock = Arc::new(MockLedgerGateway::new());
    let operator = rand_address_evm();

    let err = reader(&mock)
        .allocation_delay(operator, None)
        .await
        .unwrap_err();
    assert_eq!(err, ReaderError::AllocationDelayNotSet { operator });

    mock.set_allocation_delay(
        operator,
        AllocationDelay {
            is_set: true,
            delay: 17_500,
        },
    );
    assert_eq!(
        reader(&mock).allocation_delay(operator, None).await.unwrap(),
        17_500
    );

    mock.fail(
        MockCallKind::AllocationDelay,
        GatewayError::Timeout(std::time::Duration::from_secs(10)),
    );
    let err = reader(&mock)
        .allocation_delay(operator, None)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        err,
        ReaderError::Gateway {
            function: "getAllocationDelay",
            ..
        }
    ));
}
