use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;
use std::time::Duration;

use dhcpsim::{Config, Error, PeerOutcome, PeerState, Simulation};

const A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const DEADLINE: Duration = Duration::from_secs(10);

fn fast_config(addresses: Vec<Ipv4Addr>, peer_count: usize) -> Config {
    Config {
        addresses,
        peer_count,
        delivery_delay_millis: 0,
        poll_interval_millis: 0,
        recv_timeout_millis: 10,
        discover_delay_min_millis: 0,
        discover_delay_max_millis: 0,
        max_discover_attempts: None,
    }
}

fn assert_monotone(outcome: &PeerOutcome) {
    let order = [
        PeerState::Init,
        PeerState::Offer,
        PeerState::Requesting,
        PeerState::Acknowledged,
        PeerState::End,
    ];
    let ranks: Vec<usize> = outcome
        .history
        .iter()
        .map(|state| order.iter().position(|s| s == state).unwrap())
        .collect();
    assert!(
        ranks.windows(2).all(|pair| pair[0] < pair[1]),
        "non-monotone history: {:?}",
        outcome.history
    );
    assert_eq!(outcome.history.last(), Some(&PeerState::End));
}

#[tokio::test]
async fn test_single_peer_single_address() {
    let simulation = Simulation::new(fast_config(vec![A], 1)).unwrap();

    let report = tokio::time::timeout(DEADLINE, simulation.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.peers.len(), 1);
    let outcome = &report.peers[0];
    assert_eq!(outcome.lease.address, A);
    assert_eq!(outcome.discover_attempts, 1);
    assert_eq!(
        outcome.history,
        vec![
            PeerState::Init,
            PeerState::Offer,
            PeerState::Requesting,
            PeerState::Acknowledged,
            PeerState::End,
        ]
    );
    assert_eq!(report.allocator.allocated.get(&outcome.lease.peer), Some(&A));
    assert!(report.allocator.reserved.is_empty());
    assert!(report.allocator.available.is_empty());
}

#[tokio::test]
async fn test_empty_pool_peer_stays_in_init() {
    let simulation = Simulation::new(fast_config(vec![], 1)).unwrap();
    let running = simulation.start().unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let peer = &running.peers[0];
    assert_eq!(peer.state(), PeerState::Init);
    assert!(!peer.is_finished());
    assert!(running.allocator.snapshot().allocated.is_empty());

    peer.abort();
    let snapshot = running.allocator.shutdown().await.unwrap();
    assert!(snapshot.allocated.is_empty());
    assert!(snapshot.reserved.is_empty());
}

#[tokio::test]
async fn test_empty_pool_with_retry_bound_fails() {
    let config = Config {
        max_discover_attempts: Some(3),
        ..fast_config(vec![], 1)
    };
    let simulation = Simulation::new(config).unwrap();

    let result = tokio::time::timeout(DEADLINE, simulation.run())
        .await
        .unwrap();

    assert!(matches!(
        result,
        Err(Error::DiscoverLimit { attempts: 3, .. })
    ));
}

#[tokio::test]
async fn test_two_peers_two_addresses() {
    let simulation = Simulation::new(fast_config(vec![A, B], 2)).unwrap();

    let report = tokio::time::timeout(DEADLINE, simulation.run())
        .await
        .unwrap()
        .unwrap();

    let addresses: BTreeSet<_> = report.peers.iter().map(|o| o.lease.address).collect();
    assert_eq!(addresses, [A, B].into_iter().collect());
    assert_eq!(report.allocator.allocated.len(), 2);
    for outcome in &report.peers {
        assert_monotone(outcome);
    }
}

#[tokio::test]
async fn test_many_peers_get_distinct_addresses() {
    let pool: Vec<Ipv4Addr> = (1..=12).map(|host| Ipv4Addr::new(192, 168, 0, host)).collect();
    let config = Config {
        delivery_delay_millis: 1,
        discover_delay_max_millis: 5,
        ..fast_config(pool.clone(), 10)
    };
    let simulation = Simulation::new(config).unwrap();

    let report = tokio::time::timeout(DEADLINE, simulation.run())
        .await
        .unwrap()
        .unwrap();

    let initial: BTreeSet<_> = pool.into_iter().collect();
    assert!(report.allocator.conserves(&initial));
    assert_eq!(report.allocator.available.len(), 2);

    let mut seen = HashSet::new();
    for outcome in &report.peers {
        assert!(seen.insert(outcome.lease.address), "double allocation");
        assert_eq!(
            report.allocator.allocated.get(&outcome.lease.peer),
            Some(&outcome.lease.address)
        );
        assert_monotone(outcome);
    }
}

#[tokio::test]
async fn test_contention_leaves_extra_peers_waiting() {
    let pool = vec![A, B];
    let simulation = Simulation::new(fast_config(pool.clone(), 4)).unwrap();
    let running = simulation.start().unwrap();
    let mut updates = running.allocator.subscribe();

    tokio::time::timeout(DEADLINE, async {
        while updates.borrow_and_update().allocated.len() < 2 {
            updates.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = running.allocator.snapshot();
    assert!(snapshot.conserves(&pool.into_iter().collect()));

    let mut finished = 0;
    let mut waiting = Vec::new();
    for peer in running.peers {
        if peer.is_finished() {
            let outcome = peer.join().await.unwrap();
            assert_eq!(
                snapshot.allocated.get(&outcome.lease.peer),
                Some(&outcome.lease.address)
            );
            finished += 1;
        } else {
            assert_eq!(peer.state(), PeerState::Init);
            waiting.push(peer);
        }
    }
    assert_eq!(finished, 2);
    assert_eq!(waiting.len(), 2);

    for peer in waiting {
        peer.abort();
    }
    running.allocator.shutdown().await.unwrap();
}

#[test]
fn test_invalid_config_rejected() {
    let result = Simulation::new(fast_config(vec![A, A], 1));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
