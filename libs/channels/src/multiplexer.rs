use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::facility::{ChannelId, NewChannel};

/// Activity observed on an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// The remote side sent `message`.
    Message { chan_id: ChannelId, message: Value },
    /// The remote side went away; no further messages follow.
    Ended { chan_id: ChannelId },
}

struct OpenChannel {
    outbound: mpsc::UnboundedSender<Value>,
    forwarder: JoinHandle<()>,
}

/// Table of open channels keyed by id.
///
/// Each attached channel gets one forwarder task that moves its inbound
/// messages, in arrival order, onto the shared signal queue returned by
/// [`ChannelMultiplexer::new`].
pub struct ChannelMultiplexer {
    channels: HashMap<ChannelId, OpenChannel>,
    signals: mpsc::UnboundedSender<ChannelSignal>,
    max_channels: Option<usize>,
    pending_setups: usize,
}

impl ChannelMultiplexer {
    pub fn new(max_channels: Option<usize>) -> (Self, mpsc::UnboundedReceiver<ChannelSignal>) {
        let (signals, receiver) = mpsc::unbounded_channel();
        let mux = Self {
            channels: HashMap::new(),
            signals,
            max_channels,
            pending_setups: 0,
        };
        (mux, receiver)
    }

    /// Reserves room for a channel whose handshake is about to start.
    pub fn begin_setup(&mut self) -> Result<(), ChannelError> {
        if let Some(max) = self.max_channels
            && self.channels.len() + self.pending_setups >= max
        {
            return Err(ChannelError::LimitReached(max));
        }
        self.pending_setups += 1;
        Ok(())
    }

    /// Releases a reservation whose handshake failed.
    pub fn abandon_setup(&mut self) {
        self.pending_setups = self.pending_setups.saturating_sub(1);
    }

    /// Records a freshly created channel and starts relaying its inbound
    /// stream. Must be called from within a tokio runtime.
    pub fn attach(&mut self, channel: NewChannel) -> Result<ChannelId, ChannelError> {
        self.abandon_setup();
        let NewChannel {
            identifier,
            endpoint,
        } = channel;
        if self.channels.contains_key(&identifier) {
            return Err(ChannelError::Duplicate(identifier));
        }

        let (outbound, mut inbound) = endpoint.into_parts();
        let signals = self.signals.clone();
        let chan_id = identifier.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let signal = ChannelSignal::Message {
                    chan_id: chan_id.clone(),
                    message,
                };
                if signals.send(signal).is_err() {
                    return;
                }
            }
            let _ = signals.send(ChannelSignal::Ended { chan_id });
        });

        debug!(chan_id = %identifier, "channel attached");
        self.channels.insert(
            identifier.clone(),
            OpenChannel {
                outbound,
                forwarder,
            },
        );
        Ok(identifier)
    }

    /// Forwards `message` to the remote side of `chan_id`.
    pub fn send(&self, chan_id: &ChannelId, message: Value) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get(chan_id)
            .ok_or_else(|| ChannelError::UnknownChannel(chan_id.clone()))?;
        channel
            .outbound
            .send(message)
            .map_err(|_| ChannelError::Closed(chan_id.clone()))
    }

    /// Stops relaying `chan_id` and forgets it.
    pub fn close(&mut self, chan_id: &ChannelId) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .remove(chan_id)
            .ok_or_else(|| ChannelError::UnknownChannel(chan_id.clone()))?;
        channel.forwarder.abort();
        debug!(chan_id = %chan_id, "channel closed");
        Ok(())
    }

    /// Forgets a channel whose remote side ended. Returns whether it was
    /// still open.
    pub fn handle_ended(&mut self, chan_id: &ChannelId) -> bool {
        match self.channels.remove(chan_id) {
            Some(_) => {
                debug!(chan_id = %chan_id, "channel ended by remote side");
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self, chan_id: &ChannelId) -> bool {
        self.channels.contains_key(chan_id)
    }

    /// Open channel ids, sorted.
    pub fn ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.channels.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn close_all(&mut self) {
        if !self.channels.is_empty() {
            warn!(open = self.channels.len(), "closing all open channels");
        }
        for (_, channel) in self.channels.drain() {
            channel.forwarder.abort();
        }
    }
}

impl Drop for ChannelMultiplexer {
    fn drop(&mut self) {
        for channel in self.channels.values() {
            channel.forwarder.abort();
        }
    }
}
