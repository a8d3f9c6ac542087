//! # Server Middleware - Node Coordination
//!
//! Wires the election components of one node together and owns every background task
//! they spawn.
//!
//! ## Responsibilities
//!
//! ### 1. Inbound messages
//! Every inbound message is acknowledged right away. Work triggered by it (a forwarded
//! election, a new heartbeat epoch) runs as a background task so the acknowledgment is
//! never held up.
//!
//! ### 2. Bootstrap
//! Before the first election the node waits until every peer answers `Ping`, then waits
//! a short random delay so that nodes started together do not all elect at once.
//!
//! ### 3. Leader failure
//! When the heartbeat monitor loses the leader, the node drops back to `Unknown` and
//! starts an election.
//!
//! ### 4. Shutdown
//! All background tasks live in one [`TaskTracker`] under one root
//! [`CancellationToken`]. Shutdown cancels the token, stops the HTTP listener, and joins
//! every task.
//!
//! ## Message Flow
//!
//! ```text
//! Peer -> ElectionRequest    -> ack, then start_election("forwarded") in background
//! Peer -> LeaderAnnouncement -> ack, Follower(leader) and new heartbeat epoch in one step
//! Peer -> Ping               -> ack
//! ```

use log::{info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::common::config::ElectionConfig;
use crate::common::error::ProtocolError;
use crate::common::messages::{Ack, Message};
use crate::server::election::{ElectionCoordinator, ElectionOutcome};
use crate::server::heartbeat::{HeartbeatMonitor, WatchOutcome};
use crate::server::http;
use crate::server::messenger::{Messenger, Transport};
use crate::server::registry::PeerRegistry;
use crate::server::state::{EpochGuard, NodeState, Role, Snapshot};

/// Upper bound of the random pause before the first election (milliseconds).
const STARTUP_JITTER_MS: u64 = 500;

pub struct ServerMiddleware {
    registry: Arc<PeerRegistry>,
    config: ElectionConfig,
    state: Arc<NodeState>,
    messenger: Messenger,
    monitor: Arc<HeartbeatMonitor>,
    coordinator: Arc<ElectionCoordinator>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl ServerMiddleware {
    /// Create the node described by `registry.self_id()`.
    ///
    /// # Example
    /// ```ignore
    /// let registry = PeerRegistry::load("node-01", &config.peers)?;
    /// let node = ServerMiddleware::new(registry, config.election, Arc::new(HttpTransport::new()));
    /// ```
    pub fn new(
        registry: PeerRegistry,
        config: ElectionConfig,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let registry = Arc::new(registry);
        let shutdown = CancellationToken::new();
        let state = Arc::new(NodeState::with_shutdown(registry.self_id(), shutdown.clone()));
        let messenger = Messenger::new(transport, config.request_timeout());
        let monitor = Arc::new(HeartbeatMonitor::new(
            registry.clone(),
            state.clone(),
            messenger.clone(),
            config.heartbeat_interval(),
        ));
        let coordinator = Arc::new(ElectionCoordinator::new(
            registry.clone(),
            state.clone(),
            messenger.clone(),
        ));

        Arc::new(Self {
            registry,
            config,
            state,
            messenger,
            monitor,
            coordinator,
            tasks: TaskTracker::new(),
            shutdown,
        })
    }

    pub fn id(&self) -> &str {
        self.registry.self_id()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    // ========================================================================
    // INBOUND MESSAGES
    // ========================================================================

    /// Handle one inbound message and return its acknowledgment.
    ///
    /// Never waits on downstream work; anything slow is spawned.
    pub fn handle_message(self: &Arc<Self>, message: Message) -> Result<Ack, ProtocolError> {
        match message {
            Message::Ping => Ok(Ack),

            Message::ElectionRequest => {
                info!("🗳️  {} received ELECTION request", self.id());
                self.trigger_election("forwarded");
                Ok(Ack)
            }

            Message::LeaderAnnouncement { leader_id } => {
                self.accept_leader(leader_id)?;
                Ok(Ack)
            }
        }
    }

    fn accept_leader(self: &Arc<Self>, leader_id: String) -> Result<(), ProtocolError> {
        if !self.registry.contains(&leader_id) {
            warn!("⚠️  {} rejected announcement of unknown leader '{}'", self.id(), leader_id);
            return Err(ProtocolError::UnknownLeader(leader_id));
        }

        info!("👑 {} acknowledges {} as LEADER", self.id(), leader_id);

        let role = if leader_id == self.id() {
            Role::Leader
        } else {
            Role::Follower
        };
        // Role, leader and heartbeat epoch switch together; following yields a new epoch.
        if let Some(guard) = self.state.transition(role, Some(leader_id)) {
            self.watch_leader(guard);
        }
        Ok(())
    }

    // ========================================================================
    // BACKGROUND WORK
    // ========================================================================

    /// Start an election in the background. A no-op once shutdown has begun.
    pub fn trigger_election(self: &Arc<Self>, reason: &'static str) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let node = self.clone();
        self.tasks.spawn(async move {
            node.elect(reason).await;
        });
    }

    /// Run one election round on the calling task. Returns `None` if shutdown interrupted it.
    pub async fn elect(&self, reason: &str) -> Option<ElectionOutcome> {
        tokio::select! {
            _ = self.shutdown.cancelled() => None,
            outcome = self.coordinator.start_election(reason) => Some(outcome),
        }
    }

    /// Run the heartbeat loop of `guard`'s epoch in the background. When the leader is
    /// lost and the epoch is still current, fall back to `Unknown` and elect.
    fn watch_leader(self: &Arc<Self>, guard: EpochGuard) {
        if guard.is_cancelled() {
            return;
        }

        let node = self.clone();
        self.tasks.spawn(async move {
            if node.monitor.watch(&guard).await != WatchOutcome::LeaderLost {
                return;
            }
            // A newer announcement may have landed while the ping was failing.
            if !node.state.forget_leader(guard.epoch) {
                return;
            }

            warn!(
                "⚠️  LEADER {} appears to have failed! {} starting election...",
                guard.leader_id,
                node.id()
            );
            node.elect("leader-down").await;
        });
    }

    // ========================================================================
    // BOOTSTRAP
    // ========================================================================

    /// Block until every other peer answers `Ping`.
    ///
    /// Retries forever at the bootstrap interval. Returns `false` if shutdown came first.
    pub async fn wait_for_peers(&self) -> bool {
        let retry = self.config.bootstrap_retry();

        for peer in self.registry.others() {
            let mut attempts = 0u64;
            loop {
                let answer = tokio::select! {
                    _ = self.shutdown.cancelled() => return false,
                    result = self.messenger.send(&peer.address, Message::Ping) => result,
                };
                if answer.is_ok() {
                    info!("🤝 {} reached peer {}", self.id(), peer.id);
                    break;
                }

                attempts += 1;
                if attempts % 10 == 0 {
                    info!(
                        "⏳ {} still waiting for peer {} ({} attempts)",
                        self.id(),
                        peer.id,
                        attempts
                    );
                }

                tokio::select! {
                    _ = self.shutdown.cancelled() => return false,
                    _ = tokio::time::sleep(retry) => {}
                }
            }
        }

        true
    }

    /// Wait for every peer, pause a random moment, then run the first election.
    pub async fn bootstrap(&self) {
        if !self.wait_for_peers().await {
            return;
        }

        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..STARTUP_JITTER_MS));
        tokio::select! {
            _ = self.shutdown.cancelled() => return,
            _ = tokio::time::sleep(jitter) => {}
        }

        info!("⏰ {} sees every peer, starting initial election", self.id());
        self.elect("startup").await;
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Serve the peer endpoints on `listener` and run the node until [`shutdown`] is
    /// called. Returns once every background task has finished.
    ///
    /// [`shutdown`]: Self::shutdown
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        info!(
            "🚀 Node {} listening on {} ({} peers configured)",
            self.id(),
            listener.local_addr()?,
            self.registry.len()
        );

        let node = self.clone();
        self.tasks.spawn(async move { node.bootstrap().await });

        let stop = self.shutdown.clone();
        let served = axum::serve(listener, http::router(self.clone()))
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await;

        self.tasks.close();
        self.tasks.wait().await;
        info!("👋 Node {} stopped", self.id());

        served
    }

    /// Cancel every background task. [`run`](Self::run) returns once they are joined.
    pub fn shutdown(&self) {
        info!("🛑 Node {} shutting down", self.id());
        self.shutdown.cancel();
    }

    /// Cancel and join background tasks without a listener (used when the node is
    /// driven directly rather than through [`run`](Self::run)).
    pub async fn shutdown_and_join(&self) {
        self.shutdown();
        self.tasks.close();
        self.tasks.wait().await;
    }
}
