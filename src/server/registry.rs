//! # Peer Registry
//!
//! Immutable table of every node in the cluster, this node included. Peers are kept
//! sorted by id, and the lexicographic order of ids is the election rank: a greater id
//! outranks a smaller one. Iteration order is therefore deterministic everywhere the
//! registry is walked (elections, broadcasts, bootstrap).

use std::collections::BTreeMap;

use crate::common::config::PeerInfo;
use crate::common::error::ConfigError;

/// A peer as seen by the election core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub id: String,
    pub address: String,
}

/// Static peer table plus the identity of the local node.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    self_id: String,
    peers: BTreeMap<String, Peer>,
}

impl PeerRegistry {
    /// Build the registry for the node `self_id`.
    ///
    /// Fails if the table is empty, contains a duplicate id, or does not contain
    /// `self_id`.
    pub fn load(self_id: &str, table: &[PeerInfo]) -> Result<Self, ConfigError> {
        if self_id.is_empty() {
            return Err(ConfigError::MissingNodeId);
        }
        if table.is_empty() {
            return Err(ConfigError::EmptyPeerTable);
        }

        let mut peers = BTreeMap::new();
        for info in table {
            let peer = Peer {
                id: info.id.clone(),
                address: info.address.clone(),
            };
            if peers.insert(info.id.clone(), peer).is_some() {
                return Err(ConfigError::DuplicatePeer(info.id.clone()));
            }
        }

        if !peers.contains_key(self_id) {
            return Err(ConfigError::UnknownNode(self_id.to_string()));
        }

        Ok(Self {
            self_id: self_id.to_string(),
            peers,
        })
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Every peer, lowest rank first.
    pub fn all(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    /// Every peer except this node, lowest rank first.
    pub fn others(&self) -> impl Iterator<Item = &Peer> {
        let self_id = self.self_id.as_str();
        self.peers.values().filter(move |p| p.id != self_id)
    }

    /// Peers ranked strictly above `id`, lowest of them first.
    pub fn higher_ranked(&self, id: &str) -> Vec<Peer> {
        use std::ops::Bound::{Excluded, Unbounded};

        self.peers
            .range::<str, _>((Excluded(id), Unbounded))
            .map(|(_, peer)| peer.clone())
            .collect()
    }

    pub fn resolve(&self, id: &str) -> Result<&Peer, ConfigError> {
        self.peers
            .get(id)
            .ok_or_else(|| ConfigError::UnknownNode(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
