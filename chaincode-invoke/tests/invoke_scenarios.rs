//! End-to-end invocation scenarios against the in-process network

use chaincode_invoke::{
    network::memory::{EventBehavior, MemoryNetwork, PeerBehavior},
    types::{EventError, TxValidationCode},
    Config, Error, InvokeRequest, Invoker,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const PEERS: [&str; 3] = [
    "grpc://peer0.org1:7051",
    "grpc://peer1.org1:8051",
    "grpc://peer0.org2:9051",
];

fn invoker(network: &MemoryNetwork, wait_ms: u64) -> Invoker {
    let config = Config {
        event_wait_time_ms: wait_ms,
        ..Config::default()
    };
    let shared = Arc::new(network.clone());
    Invoker::new(shared.clone(), shared.clone(), shared, config).unwrap()
}

fn request() -> InvokeRequest {
    InvokeRequest::new(
        PEERS.iter().map(|p| p.to_string()).collect(),
        "mychannel",
        "assets",
        "move",
    )
    .with_args(["a", "b", "10"])
    .with_identity("admin", "org1")
}

#[tokio::test(start_paused = true)]
async fn test_all_endorse_and_commit_valid() {
    let network = MemoryNetwork::new();
    let invoker = invoker(&network, 1000);

    let tx_id = invoker.invoke_chaincode(&request()).await.unwrap();

    let stats = network.stats();
    assert_eq!(stats.proposals_built, 1);
    assert_eq!(stats.proposals_sent, 3);
    assert_eq!(stats.commits_sent, 1);
    assert_eq!(network.issued_tx_ids(), vec![tx_id.clone()]);

    let hub = network.event_hub("mychannel");
    assert_eq!(hub.registrations(), 1);
    assert_eq!(hub.unregistrations(), 1);
    assert!(!hub.is_registered(&tx_id));
}

#[tokio::test(start_paused = true)]
async fn test_one_peer_rejects() {
    let network = MemoryNetwork::new();
    network.set_peer(
        PEERS[1],
        PeerBehavior::Reject {
            status: 500,
            message: Some("chaincode error".to_string()),
        },
    );
    let invoker = invoker(&network, 1000);

    let result = invoker.invoke_chaincode(&request()).await;

    match result {
        Err(Error::ProposalRejected { reason }) => assert_eq!(reason, "chaincode error"),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(network.stats().commits_sent, 0);
    assert_eq!(network.event_hub("mychannel").registrations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_event_never_arrives() {
    let network = MemoryNetwork::new();
    network.script_event(EventBehavior::Drop);
    let invoker = invoker(&network, 1000);

    let started = Instant::now();
    let result = invoker.invoke_chaincode(&request()).await;
    let elapsed = started.elapsed();

    match result {
        Err(Error::CommitUnconfirmed { reason, .. }) => {
            assert_eq!(reason, "Timed out waiting for block event")
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_millis(1000));
    assert!(elapsed < Duration::from_millis(1100));

    // Not a conflict: no second attempt
    assert_eq!(network.stats().proposals_built, 1);
    let hub = network.event_hub("mychannel");
    assert_eq!(hub.unregistrations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_conflict_then_success() {
    let network = MemoryNetwork::new();
    network.script_event(EventBehavior::deliver(TxValidationCode::MvccReadConflict));
    let invoker = invoker(&network, 1000);

    let tx_id = invoker
        .invoke_chaincode(&request().with_retry_attempts(2))
        .await
        .unwrap();

    assert_eq!(network.stats().proposals_built, 2);
    let issued = network.issued_tx_ids();
    assert_eq!(issued.len(), 2);
    assert_ne!(issued[0], issued[1]);
    assert_eq!(issued[1], tx_id);
    assert_eq!(network.submitted_tx_ids(), issued);
    assert_eq!(invoker.metrics().retries_total.get(), 1);

    let hub = network.event_hub("mychannel");
    assert_eq!(hub.registrations(), 2);
    assert_eq!(hub.unregistrations(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_conflict_with_zero_budget() {
    let network = MemoryNetwork::new();
    network.script_event(EventBehavior::deliver(TxValidationCode::MvccReadConflict));
    let invoker = invoker(&network, 1000);

    let result = invoker
        .invoke_chaincode(&request().with_retry_attempts(0))
        .await;

    assert!(matches!(result, Err(Error::Conflict { .. })));
    assert_eq!(network.stats().proposals_built, 1);
}

#[tokio::test(start_paused = true)]
async fn test_conflict_reported_by_event_stream() {
    let network = MemoryNetwork::new();
    network.script_event(EventBehavior::StreamError(
        EventError::new("transaction invalidated").with_code(TxValidationCode::MvccReadConflict),
    ));
    let invoker = invoker(&network, 1000);

    let result = invoker.invoke_chaincode(&request()).await;

    assert!(result.is_ok());
    assert_eq!(network.stats().proposals_built, 2);
}

#[tokio::test(start_paused = true)]
async fn test_budget_exhausted_by_repeated_conflicts() {
    let network = MemoryNetwork::new();
    for _ in 0..5 {
        network.script_event(EventBehavior::deliver(TxValidationCode::MvccReadConflict));
    }
    let invoker = invoker(&network, 1000);

    let result = invoker
        .invoke_chaincode(&request().with_retry_attempts(2))
        .await;

    assert!(matches!(result, Err(Error::Conflict { .. })));
    // One initial attempt plus two retries
    assert_eq!(network.stats().proposals_built, 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_orderer_not_cancelled_by_timeout() {
    let network = MemoryNetwork::new();
    network.set_ordering_latency(Duration::from_secs(5));
    let invoker = invoker(&network, 1000);

    let result = invoker.invoke_chaincode(&request()).await;

    assert!(matches!(result, Err(Error::CommitUnconfirmed { .. })));
    assert_eq!(network.stats().commits_acknowledged, 0);

    // The submission keeps running after the invocation gave up
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(network.stats().commits_acknowledged, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_waits_for_in_flight_commit() {
    let network = MemoryNetwork::new();
    network.set_ordering_latency(Duration::from_secs(5));
    let invoker = invoker(&network, 10_000);

    // Conflict reported while the first commit is still with the orderer
    let injector = {
        let network = network.clone();
        tokio::spawn(async move {
            while network.submitted_tx_ids().is_empty() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            let first = network.submitted_tx_ids()[0].clone();
            network.event_hub("mychannel").fail(
                &first,
                EventError::new("transaction invalidated")
                    .with_code(TxValidationCode::MvccReadConflict),
            )
        })
    };

    // Orderer acknowledgments seen when the second attempt starts
    let watcher = {
        let network = network.clone();
        tokio::spawn(async move {
            while network.stats().proposals_built < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            network.stats().commits_acknowledged
        })
    };

    let started = Instant::now();
    let tx_id = invoker.invoke_chaincode(&request()).await.unwrap();

    assert!(injector.await.unwrap());
    assert!(watcher.await.unwrap() >= 1);
    assert!(started.elapsed() >= Duration::from_secs(10));

    let stats = network.stats();
    assert_eq!(stats.proposals_built, 2);
    assert_eq!(stats.commits_acknowledged, 2);
    assert_eq!(network.submitted_tx_ids()[1], tx_id);
}

#[tokio::test(start_paused = true)]
async fn test_event_arrives_late_but_within_wait() {
    let network = MemoryNetwork::new();
    network.script_event(EventBehavior::Deliver {
        code: TxValidationCode::Valid,
        delay: Duration::from_millis(800),
    });
    let invoker = invoker(&network, 1000);

    let started = Instant::now();
    invoker.invoke_chaincode(&request()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(800));
    assert!(started.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_failure() {
    let network = MemoryNetwork::new();
    network.fail_next_broadcast("failed to sign proposal");
    let invoker = invoker(&network, 1000);

    let result = invoker.invoke_chaincode(&request()).await;

    match result {
        Err(Error::Transport(message)) => assert_eq!(message, "failed to sign proposal"),
        other => panic!("expected transport error, got {:?}", other),
    }
    assert_eq!(network.stats().commits_sent, 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_target_peers() {
    let network = MemoryNetwork::new();
    let invoker = invoker(&network, 1000);

    let request = InvokeRequest::new(Vec::new(), "mychannel", "assets", "move")
        .with_identity("admin", "org1");
    let result = invoker.invoke_chaincode(&request).await;

    assert!(matches!(result, Err(Error::InvalidRequest(_))));
    assert_eq!(network.stats().proposals_built, 0);
}
