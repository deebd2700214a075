use std::{collections::BTreeMap, sync::Arc, time::Duration};

use elreader::{
    gateway::mock::{MockCallKind, MockLedgerGateway},
    AggregationError, AggregatorConfig, GatewayError, PipelineStage, SlashableStakeAggregator,
};
use elreader_types::{Address, OperatorSetKey, OperatorSetKeyError, StakeAmount};
use utils::{
    context::{AnyRuntime, AppContext},
    init_tracing_tests,
    telemetry::AggregationMetrics,
    test_utils::address::{rand_address_evm, rand_addresses_evm},
};

const HEIGHT: u64 = 19_000_000;

fn aggregator(mock: &Arc<MockLedgerGateway>) -> SlashableStakeAggregator<MockLedgerGateway> {
    SlashableStakeAggregator::new(mock.clone(), AggregatorConfig::default())
}

/// Registers `count` operator sets under one AVS, each with its own members and strategies
fn seed_sets(mock: &MockLedgerGateway, count: u32) -> Vec<OperatorSetKey> {
    let avs = rand_address_evm();

    (1..=count)
        .map(|id| {
            let key = OperatorSetKey::new(avs, id);
            let operators = rand_addresses_evm(2);
            let strategies = rand_addresses_evm(id as usize % 3 + 1);

            for (i, operator) in operators.iter().enumerate() {
                for (j, strategy) in strategies.iter().enumerate() {
                    mock.set_stake(
                        key,
                        *operator,
                        *strategy,
                        StakeAmount::from(id as u64 * 1000 + i as u64 * 10 + j as u64),
                    );
                }
            }
            mock.add_operator_set(key, operators, strategies);
            key
        })
        .collect()
}

#[tokio::test]
async fn single_set_verbatim() {
    init_tracing_tests();

    let mock = Arc::new(MockLedgerGateway::new());
    let key = OperatorSetKey::new(rand_address_evm(), 1);
    let op1 = rand_address_evm();
    let op2 = rand_address_evm();
    let st1 = rand_address_evm();

    mock.add_operator_set(key, vec![op1, op2], vec![st1]);
    mock.set_stake(key, op1, st1, StakeAmount::from(1000));
    mock.set_stake(key, op2, st1, StakeAmount::ZERO);

    let result = aggregator(&mock).aggregate(&[key], HEIGHT).await.unwrap();

    assert_eq!(result.height, HEIGHT);
    assert_eq!(result.len(), 1);

    let snapshot = &result.snapshots[0];
    assert_eq!(snapshot.key, key);
    assert_eq!(snapshot.operators, vec![op1, op2]);
    assert_eq!(snapshot.strategies, vec![st1]);
    assert_eq!(
        snapshot.stakes,
        BTreeMap::from([(
            st1,
            BTreeMap::from([(op1, StakeAmount::from(1000)), (op2, StakeAmount::ZERO)])
        )])
    );

    // members, strategies, then one batched stake read
    assert_eq!(mock.call_count(), 3);
    assert_eq!(mock.calls_of(MockCallKind::MinimumSlashableStake).len(), 1);
}

#[tokio::test]
async fn order_and_length_follow_input() {
    init_tracing_tests();

    let mock = Arc::new(MockLedgerGateway::new());
    let mut keys = seed_sets(&mock, 6);
    keys.reverse();

    // the first requested set answers last
    mock.set_key_delay(keys[0], Duration::from_millis(50));

    let result = aggregator(&mock).aggregate(&keys, HEIGHT).await.unwrap();

    assert_eq!(result.len(), keys.len());
    assert_eq!(result.keys().copied().collect::<Vec<_>>(), keys);
    for snapshot in &result.snapshots {
        assert!(snapshot.has_consistent_shape());
        assert_eq!(snapshot.stakes.len(), snapshot.strategies.len());
        assert!(snapshot
            .stakes
            .values()
            .all(|by_operator| by_operator.len() == snapshot.operators.len()));
    }
}

#[tokio::test]
async fn every_read_uses_the_caller_height() {
    let mock = Arc::new(MockLedgerGateway::new());
    let keys = seed_sets(&mock, 4);

    aggregator(&mock).aggregate(&keys, HEIGHT).await.unwrap();

    let calls = mock.calls();
    assert_eq!(calls.len(), keys.len() * 3);
    assert!(calls.iter().all(|call| call.height() == Some(HEIGHT)));
}

#[tokio::test]
async fn repeated_aggregation_is_identical() {
    let mock = Arc::new(MockLedgerGateway::new());
    let keys = seed_sets(&mock, 5);
    let aggregator = aggregator(&mock);

    let first = aggregator.aggregate(&keys, HEIGHT).await.unwrap();
    let second = aggregator.aggregate(&keys, HEIGHT).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[tokio::test]
async fn invalid_keys_make_no_calls() {
    let mock = Arc::new(MockLedgerGateway::new());
    let mut keys = seed_sets(&mock, 3);
    let legacy = OperatorSetKey::new(keys[0].avs, 0);
    keys.insert(1, legacy);

    let err = aggregator(&mock).aggregate(&keys, HEIGHT).await.unwrap_err();
    assert_eq!(
        err,
        AggregationError::InvalidOperatorSet {
            key: legacy,
            reason: OperatorSetKeyError::LegacyId,
        }
    );
    assert!(!err.is_retryable());

    let zero_avs = OperatorSetKey::new(Address::ZERO, 1);
    let err = aggregator(&mock)
        .aggregate(&[zero_avs], HEIGHT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AggregationError::InvalidOperatorSet {
            reason: OperatorSetKeyError::ZeroAvs,
            ..
        }
    ));

    let err = aggregator(&mock)
        .aggregate(&keys[2..], u32::MAX as u64 + 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AggregationError::HeightOutOfRange { .. }));

    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn empty_input() {
    let mock = Arc::new(MockLedgerGateway::new());

    let result = aggregator(&mock).aggregate(&[], HEIGHT).await.unwrap();

    assert!(result.is_empty());
    assert_eq!(result.height, HEIGHT);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn zero_members_or_strategies() {
    let mock = Arc::new(MockLedgerGateway::new());
    let avs = rand_address_evm();

    let no_members = OperatorSetKey::new(avs, 1);
    mock.add_operator_set(no_members, vec![], rand_addresses_evm(2));

    let no_strategies = OperatorSetKey::new(avs, 2);
    mock.add_operator_set(no_strategies, rand_addresses_evm(3), vec![]);

    // never registered: the ledger reports it empty
    let unknown = OperatorSetKey::new(avs, 3);

    let result = aggregator(&mock)
        .aggregate(&[no_members, no_strategies, unknown], HEIGHT)
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    assert!(result.snapshots.iter().all(|s| s.stakes.is_empty()));
    assert_eq!(result.snapshots[0].strategies.len(), 2);
    assert_eq!(result.snapshots[1].operators.len(), 3);

    // no stake read when there is nothing to read
    assert!(mock
        .calls_of(MockCallKind::MinimumSlashableStake)
        .is_empty());
}

#[tokio::test]
async fn short_stake_response_is_a_shape_mismatch() {
    let mock = Arc::new(MockLedgerGateway::new());
    let key = OperatorSetKey::new(rand_address_evm(), 1);
    mock.add_operator_set(key, rand_addresses_evm(2), vec![rand_address_evm()]);

    // one operator row for a two-operator set
    mock.set_stake_response(key, vec![vec![StakeAmount::from(1000)]]);

    let err = aggregator(&mock).aggregate(&[key], HEIGHT).await.unwrap_err();
    match err {
        AggregationError::ShapeMismatch {
            key: failed,
            expected_operators,
            expected_strategies,
            ..
        } => {
            assert_eq!(failed, key);
            assert_eq!(expected_operators, 2);
            assert_eq!(expected_strategies, 1);
        }
        err => panic!("unexpected error {err:?}"),
    }
}

#[tokio::test]
async fn second_set_failing_discards_the_first() {
    let mock = Arc::new(MockLedgerGateway::new());
    let keys = seed_sets(&mock, 2);

    mock.fail_for_key(
        keys[1],
        MockCallKind::Members,
        GatewayError::Transport("connection reset".to_string()),
    );

    let err = aggregator(&mock).aggregate(&keys, HEIGHT).await.unwrap_err();

    assert_eq!(
        err,
        AggregationError::ResolutionFailed {
            key: keys[1],
            stage: PipelineStage::Operators,
            cause: GatewayError::Transport("connection reset".to_string()),
        }
    );
    assert_eq!(err.key(), Some(&keys[1]));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn failure_drops_slow_sets() {
    let mock = Arc::new(MockLedgerGateway::new());
    let keys = seed_sets(&mock, 3);

    mock.set_key_delay(keys[0], Duration::from_secs(30));
    mock.fail_for_key(
        keys[2],
        MockCallKind::MinimumSlashableStake,
        GatewayError::Revert {
            reason: "InvalidOperatorSet()".to_string(),
        },
    );

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        aggregator(&mock).aggregate(&keys, HEIGHT),
    )
    .await
    .expect("fail-fast should not wait for the slow set")
    .unwrap_err();

    assert_eq!(
        err,
        AggregationError::StakeFetchFailed {
            key: keys[2],
            cause: GatewayError::Revert {
                reason: "InvalidOperatorSet()".to_string(),
            },
        }
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn deadline_cancels() {
    let mock = Arc::new(MockLedgerGateway::new());
    let keys = seed_sets(&mock, 3);
    mock.set_key_delay(keys[1], Duration::from_secs(30));

    let err = aggregator(&mock)
        .aggregate_with_deadline(&keys, HEIGHT, Duration::from_millis(50))
        .await
        .unwrap_err();

    assert_eq!(err, AggregationError::Cancelled);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn kill_signal_cancels() {
    init_tracing_tests();

    let mock = Arc::new(MockLedgerGateway::new());
    let keys = seed_sets(&mock, 2);
    mock.set_call_delay(Duration::from_secs(30));

    let ctx = AppContext::new_with_runtime(AnyRuntime::TokioHandle(
        tokio::runtime::Handle::current(),
    ));
    let aggregator = aggregator(&mock);

    let killer = {
        let ctx = ctx.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ctx.kill();
        }
    };

    let (res, _) = tokio::join!(
        aggregator.aggregate_with_cancel(&keys, HEIGHT, ctx.kill_signal()),
        killer
    );

    assert_eq!(res.unwrap_err(), AggregationError::Cancelled);

    // calls were started, none of them were waited for
    assert!(mock.call_count() > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_calls_are_bounded() {
    let mock = Arc::new(MockLedgerGateway::new());
    let keys = seed_sets(&mock, 8);
    mock.set_call_delay(Duration::from_millis(20));

    let bounded = SlashableStakeAggregator::new(mock.clone(), AggregatorConfig { max_in_flight: 2 });
    let result = bounded.aggregate(&keys, HEIGHT).await.unwrap();
    assert_eq!(result.len(), keys.len());
    assert!(mock.max_in_flight_seen() <= 2);

    // without a tight bound the sets really do overlap
    let mock = Arc::new(MockLedgerGateway::new());
    let keys = seed_sets(&mock, 8);
    mock.set_call_delay(Duration::from_millis(20));

    aggregator(&mock).aggregate(&keys, HEIGHT).await.unwrap();
    assert!(mock.max_in_flight_seen() > 2);
    assert!(mock.max_in_flight_seen() <= 16);
}

#[tokio::test]
async fn metrics_do_not_change_results() {
    let mock = Arc::new(MockLedgerGateway::new());
    let keys = seed_sets(&mock, 3);

    let plain = aggregator(&mock).aggregate(&keys, HEIGHT).await.unwrap();

    let metrics = AggregationMetrics::new(opentelemetry::global::meter("elreader-tests"));
    let measured = aggregator(&mock).with_metrics(metrics);
    assert_eq!(measured.config().max_in_flight, 16);
    assert_eq!(measured.aggregate(&keys, HEIGHT).await.unwrap(), plain);
}
