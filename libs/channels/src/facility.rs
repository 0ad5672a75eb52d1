use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use crate::error::ChannelError;

/// Opaque channel identifier assigned by a [`ChannelFacility`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One half of a duplex conduit.
#[derive(Debug)]
pub struct ChannelEndpoint {
    outbound: mpsc::UnboundedSender<Value>,
    inbound: mpsc::UnboundedReceiver<Value>,
}

impl ChannelEndpoint {
    /// Two connected halves: whatever one sends, the other receives.
    pub fn pair() -> (Self, Self) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: left_tx,
                inbound: right_rx,
            },
            Self {
                outbound: right_tx,
                inbound: left_rx,
            },
        )
    }

    /// Sends to the other half, handing the message back if it is gone.
    pub fn send(&self, message: Value) -> Result<(), Value> {
        self.outbound.send(message).map_err(|err| err.0)
    }

    pub async fn recv(&mut self) -> Option<Value> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Value> {
        self.inbound.try_recv().ok()
    }

    pub fn into_parts(self) -> (mpsc::UnboundedSender<Value>, mpsc::UnboundedReceiver<Value>) {
        (self.outbound, self.inbound)
    }
}

/// Result of a successful channel handshake.
#[derive(Debug)]
pub struct NewChannel {
    pub identifier: ChannelId,
    pub endpoint: ChannelEndpoint,
}

/// Creates duplex channels. Identifiers must never be reused by the same
/// facility.
#[async_trait]
pub trait ChannelFacility: Send + Sync {
    async fn create_channel(&self) -> Result<NewChannel, ChannelError>;

    /// Called once a channel is gone from the bus, so the facility can drop
    /// whatever it still holds for it.
    async fn release(&self, _chan_id: &ChannelId) {}
}

/// In-process facility. The local half goes to the caller, the remote half is
/// parked until someone claims it with [`LoopbackFacility::take_remote`] or the
/// channel is released.
pub struct LoopbackFacility {
    prefix: String,
    next: AtomicU64,
    remotes: Mutex<HashMap<ChannelId, ChannelEndpoint>>,
}

impl LoopbackFacility {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
            remotes: Mutex::new(HashMap::new()),
        }
    }

    pub async fn take_remote(&self, id: &ChannelId) -> Option<ChannelEndpoint> {
        self.remotes.lock().await.remove(id)
    }
}

impl Default for LoopbackFacility {
    fn default() -> Self {
        Self::new("c")
    }
}

#[async_trait]
impl ChannelFacility for LoopbackFacility {
    async fn create_channel(&self) -> Result<NewChannel, ChannelError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let identifier = ChannelId::new(format!("{}{}", self.prefix, n));
        let (local, remote) = ChannelEndpoint::pair();
        self.remotes.lock().await.insert(identifier.clone(), remote);
        Ok(NewChannel {
            identifier,
            endpoint: local,
        })
    }

    async fn release(&self, chan_id: &ChannelId) {
        self.remotes.lock().await.remove(chan_id);
    }
}
