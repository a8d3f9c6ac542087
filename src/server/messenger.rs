//! # Messenger
//!
//! Outbound half of the protocol. A [`Messenger`] sends one [`Message`] to one peer and
//! reports either an [`Ack`] or a [`CommunicationError`]. Every call is bounded by a fixed
//! timeout and nothing is retried here; retry policy belongs to the caller.
//!
//! The actual delivery is done by a [`Transport`]. The production transport is
//! [`HttpTransport`] (JSON over HTTP via `reqwest`); tests plug in an in-memory one.

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

use crate::common::error::CommunicationError;
use crate::common::messages::{Ack, Message};

/// Delivers a message to a peer address and waits for its acknowledgment.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, address: &str, message: &Message) -> Result<Ack, CommunicationError>;
}

/// JSON-over-HTTP transport.
///
/// Posts `message.body()` to `{address}/{endpoint}`; any 2xx status is an acknowledgment.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, address: &str, message: &Message) -> Result<Ack, CommunicationError> {
        let response = self
            .client
            .post(message.url(address))
            .json(&message.body())
            .send()
            .await
            .map_err(|e| CommunicationError::Unreachable {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CommunicationError::Rejected {
                address: address.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(Ack)
    }
}

/// Sends messages to peers with a fixed per-call timeout.
#[derive(Clone)]
pub struct Messenger {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Messenger {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Send `message` to the peer at `address`.
    ///
    /// A call that does not complete within the timeout is abandoned and reported as
    /// [`CommunicationError::Timeout`].
    pub async fn send(&self, address: &str, message: Message) -> Result<Ack, CommunicationError> {
        let result =
            match tokio::time::timeout(self.timeout, self.transport.deliver(address, &message))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(CommunicationError::Timeout {
                    address: address.to_string(),
                    timeout_ms: self.timeout.as_millis(),
                }),
            };

        if let Err(e) = &result {
            debug!("📭 {} to {} failed: {}", message.endpoint(), address, e);
        }

        result
    }
}
