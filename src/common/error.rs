//! # Error Taxonomy
//!
//! Three kinds of failure exist in the election protocol:
//! - [`ConfigError`]: the peer table or this node's identity is unusable. Fatal at startup.
//! - [`CommunicationError`]: a peer did not answer successfully. Recoverable; the caller
//!   reads it as "peer not viable for this round".
//! - [`ProtocolError`]: an inbound request was malformed. Answered with a client error,
//!   no state is touched.

use thiserror::Error;

/// Problems with the static cluster configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no node id given")]
    MissingNodeId,

    #[error("unknown node id '{0}'")]
    UnknownNode(String),

    #[error("duplicate peer id '{0}' in peer table")]
    DuplicatePeer(String),

    #[error("peer table is empty")]
    EmptyPeerTable,

    #[error("peer '{id}' has no usable port in address '{address}'")]
    MissingPort { id: String, address: String },

    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Any unsuccessful exchange with a peer.
///
/// Timeouts, refused connections and non-success responses all end up here, since the
/// protocol treats "unreachable" and "rejected" the same way.
#[derive(Debug, Error)]
pub enum CommunicationError {
    #[error("request to {address} timed out after {timeout_ms}ms")]
    Timeout { address: String, timeout_ms: u128 },

    #[error("could not reach {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("{address} answered with status {status}")]
    Rejected { address: String, status: u16 },
}

/// A malformed inbound request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("expected leaderID in request body")]
    MissingLeaderId,

    #[error("leaderID '{0}' is not a configured peer")]
    UnknownLeader(String),

    #[error("request body is not valid JSON: {0}")]
    InvalidBody(String),
}
