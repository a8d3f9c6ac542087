//! In-memory cluster used by the integration tests.
//!
//! Every node's address is its id. Delivery calls straight into the target node's
//! `handle_message`; nodes marked down refuse everything.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

use bully_election::common::config::{ElectionConfig, PeerInfo};
use bully_election::common::error::CommunicationError;
use bully_election::common::messages::{Ack, Message};
use bully_election::server::messenger::Transport;
use bully_election::server::{PeerRegistry, Role, ServerMiddleware};

#[derive(Default)]
pub struct MemoryNetwork {
    nodes: Mutex<HashMap<String, Weak<ServerMiddleware>>>,
    down: Mutex<HashSet<String>>,
    sent: Mutex<Vec<(String, Message)>>,
}

impl MemoryNetwork {
    pub fn attach(&self, node: &Arc<ServerMiddleware>) {
        self.nodes
            .lock()
            .unwrap()
            .insert(node.id().to_string(), Arc::downgrade(node));
    }

    pub fn set_down(&self, id: &str, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(id.to_string());
        } else {
            set.remove(id);
        }
    }

    pub fn is_down(&self, id: &str) -> bool {
        self.down.lock().unwrap().contains(id)
    }

    /// Every delivery attempt so far, as (recipient, message).
    pub fn sent(&self) -> Vec<(String, Message)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for MemoryNetwork {
    async fn deliver(&self, address: &str, message: &Message) -> Result<Ack, CommunicationError> {
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), message.clone()));

        // Let other tasks interleave, as a real network would.
        tokio::task::yield_now().await;

        let unreachable = || CommunicationError::Unreachable {
            address: address.to_string(),
            reason: "connection refused".to_string(),
        };

        if self.is_down(address) {
            return Err(unreachable());
        }

        let node = self
            .nodes
            .lock()
            .unwrap()
            .get(address)
            .and_then(Weak::upgrade)
            .ok_or_else(unreachable)?;

        node.handle_message(message.clone())
            .map_err(|_| CommunicationError::Rejected {
                address: address.to_string(),
                status: 400,
            })
    }
}

pub fn test_config() -> ElectionConfig {
    ElectionConfig {
        heartbeat_interval_secs: 10,
        request_timeout_secs: 5,
        bootstrap_retry_millis: 1000,
    }
}

pub struct Cluster {
    pub network: Arc<MemoryNetwork>,
    pub nodes: BTreeMap<String, Arc<ServerMiddleware>>,
}

impl Cluster {
    pub fn new(ids: &[&str]) -> Self {
        Self::with_config(ids, test_config())
    }

    pub fn with_config(ids: &[&str], config: ElectionConfig) -> Self {
        let table: Vec<PeerInfo> = ids.iter().map(|id| PeerInfo::new(*id, *id)).collect();
        let network = Arc::new(MemoryNetwork::default());

        let nodes = ids
            .iter()
            .map(|id| {
                let registry = PeerRegistry::load(id, &table).unwrap();
                let node = ServerMiddleware::new(registry, config.clone(), network.clone());
                network.attach(&node);
                (id.to_string(), node)
            })
            .collect();

        Self { network, nodes }
    }

    pub fn node(&self, id: &str) -> &Arc<ServerMiddleware> {
        &self.nodes[id]
    }

    /// Make `id` unreachable and stop its background work.
    pub fn kill(&self, id: &str) {
        self.network.set_down(id, true);
        self.node(id).shutdown();
    }

    /// Live nodes that consider themselves leader. A killed node keeps its last state,
    /// so it is left out.
    pub fn leaders(&self) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| !self.network.is_down(n.id()))
            .filter(|n| n.snapshot().role == Role::Leader)
            .map(|n| n.id().to_string())
            .collect()
    }

    pub fn leader_of(&self, id: &str) -> Option<String> {
        self.node(id).snapshot().leader_id
    }

    pub async fn shutdown(&self) {
        for node in self.nodes.values() {
            node.shutdown_and_join().await;
        }
    }
}
