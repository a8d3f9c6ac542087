mod common;

use std::time::Duration;

use bully_election::common::config::ElectionConfig;
use bully_election::server::election::ElectionOutcome;
use bully_election::server::Role;
use bully_election::Message;
use common::Cluster;

async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[tokio::test(start_paused = true)]
async fn test_lowest_node_starts_highest_wins() {
    let cluster = Cluster::new(&["a", "b", "c"]);

    let outcome = cluster.node("a").elect("startup").await;
    assert_eq!(
        outcome,
        Some(ElectionOutcome::Yielded {
            to: vec!["b".to_string(), "c".to_string()]
        })
    );

    settle(Duration::from_secs(1)).await;

    assert_eq!(cluster.leaders(), vec!["c".to_string()]);
    for id in ["a", "b", "c"] {
        assert_eq!(cluster.leader_of(id).as_deref(), Some("c"), "node {}", id);
    }
    assert_eq!(cluster.node("a").snapshot().role, Role::Follower);
    assert_eq!(cluster.node("b").snapshot().role, Role::Follower);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failover_to_next_highest() {
    let cluster = Cluster::new(&["a", "b", "c"]);
    cluster.node("a").elect("startup").await;
    settle(Duration::from_secs(1)).await;
    assert_eq!(cluster.leaders(), vec!["c".to_string()]);

    cluster.kill("c");

    // One heartbeat interval plus an election round.
    settle(Duration::from_secs(15)).await;

    assert_eq!(cluster.node("b").snapshot().role, Role::Leader);
    assert_eq!(cluster.leader_of("b").as_deref(), Some("b"));
    assert_eq!(cluster.node("a").snapshot().role, Role::Follower);
    assert_eq!(cluster.leader_of("a").as_deref(), Some("b"));

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_repeated_failover() {
    let cluster = Cluster::new(&["node-01", "node-02", "node-03", "node-04"]);
    cluster.node("node-01").elect("startup").await;
    settle(Duration::from_secs(1)).await;
    assert_eq!(cluster.leaders(), vec!["node-04".to_string()]);

    cluster.kill("node-04");
    settle(Duration::from_secs(15)).await;
    assert_eq!(cluster.leaders(), vec!["node-03".to_string()]);

    cluster.kill("node-03");
    settle(Duration::from_secs(15)).await;
    assert_eq!(cluster.leaders(), vec!["node-02".to_string()]);
    assert_eq!(cluster.leader_of("node-01").as_deref(), Some("node-02"));

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_converges_from_concurrent_start() {
    let cluster = Cluster::new(&["node-01", "node-02", "node-03", "node-04"]);

    let mut handles = Vec::new();
    for node in cluster.nodes.values() {
        let node = node.clone();
        handles.push(tokio::spawn(async move { node.bootstrap().await }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    settle(Duration::from_secs(2)).await;

    assert_eq!(cluster.leaders(), vec!["node-04".to_string()]);
    for id in ["node-01", "node-02", "node-03", "node-04"] {
        assert_eq!(cluster.leader_of(id).as_deref(), Some("node-04"), "node {}", id);
    }

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_waits_for_missing_peer() {
    let cluster = Cluster::new(&["a", "b"]);
    cluster.network.set_down("b", true);

    let node = cluster.node("a").clone();
    let waiting = tokio::spawn(async move { node.wait_for_peers().await });

    settle(Duration::from_secs(30)).await;
    assert!(!waiting.is_finished());

    cluster.network.set_down("b", false);
    assert!(waiting.await.unwrap());

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_bootstrap() {
    let cluster = Cluster::new(&["a", "b"]);
    cluster.network.set_down("b", true);

    let node = cluster.node("a").clone();
    let waiting = tokio::spawn(async move { node.wait_for_peers().await });

    settle(Duration::from_secs(3)).await;
    cluster.node("a").shutdown();
    assert!(!waiting.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_winner_announces_once_per_peer() {
    let cluster = Cluster::new(&["a", "b", "c"]);

    let outcome = cluster.node("c").elect("startup").await;
    assert_eq!(outcome, Some(ElectionOutcome::Won { announced_to: 2 }));
    settle(Duration::from_secs(1)).await;

    let mut announcements: Vec<String> = cluster
        .network
        .sent()
        .into_iter()
        .filter(|(_, m)| matches!(m, Message::LeaderAnnouncement { .. }))
        .map(|(to, _)| to)
        .collect();
    announcements.sort();
    assert_eq!(announcements, vec!["a".to_string(), "b".to_string()]);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_repeated_announcement_is_idempotent() {
    let cluster = Cluster::new(&["a", "b", "c"]);
    cluster.node("c").elect("startup").await;
    settle(Duration::from_secs(1)).await;

    let before = cluster.node("a").snapshot();
    let announce = Message::LeaderAnnouncement {
        leader_id: "c".to_string(),
    };
    cluster.node("a").handle_message(announce.clone()).unwrap();
    cluster.node("a").handle_message(announce).unwrap();
    assert_eq!(cluster.node("a").snapshot(), before);

    // The restarted heartbeat keeps following the live leader.
    settle(Duration::from_secs(25)).await;
    assert_eq!(cluster.node("a").snapshot(), before);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_leader_only_receives_requests_and_pings() {
    let cluster = Cluster::new(&["a", "b", "c"]);
    cluster.node("a").elect("startup").await;
    settle(Duration::from_secs(25)).await;

    // "c" never loses, so it is never announced to.
    let to_c: Vec<Message> = cluster
        .network
        .sent()
        .into_iter()
        .filter(|(to, _)| to == "c")
        .map(|(_, m)| m)
        .collect();
    assert!(!to_c.is_empty());
    assert!(to_c
        .iter()
        .all(|m| matches!(m, Message::ElectionRequest | Message::Ping)));

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_dead_leader_is_not_counted() {
    let cluster = Cluster::new(&["a", "b", "c"]);
    cluster.node("c").elect("startup").await;
    settle(Duration::from_secs(1)).await;

    cluster.kill("c");
    assert_eq!(cluster.node("c").snapshot().role, Role::Leader);
    assert!(cluster.leaders().is_empty());

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_announcements_leave_one_watched_leader() {
    let config = ElectionConfig {
        heartbeat_interval_secs: 1,
        request_timeout_secs: 1,
        bootstrap_retry_millis: 100,
    };
    let cluster = Cluster::with_config(&["a", "b", "c"], config);
    let node = cluster.node("a").clone();

    let mut handles = Vec::new();
    for i in 0..64 {
        let node = node.clone();
        let leader_id = if i % 2 == 0 { "b" } else { "c" }.to_string();
        handles.push(tokio::spawn(async move {
            node.handle_message(Message::LeaderAnnouncement { leader_id })
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let followed = node.snapshot().leader_id.unwrap();
    let survivor = if followed == "b" { "c" } else { "b" };
    cluster.network.set_down(&followed, true);

    // The heartbeat must be watching the leader the snapshot names, or the loss goes
    // unnoticed and "a" keeps following a dead node.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while cluster.leader_of("a").as_deref() != Some(survivor) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "a never moved off dead leader {}: {:?}",
            followed,
            node.snapshot()
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(node.snapshot().role, Role::Follower);

    cluster.shutdown().await;
}
