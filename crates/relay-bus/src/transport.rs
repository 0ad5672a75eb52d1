use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::wire::BusEvent;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Emit(#[from] anyhow::Error),
    #[error("transport closed")]
    Closed,
}

/// Outbound half of the duplex primitive the bus is layered on.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn emit(&self, event: &BusEvent) -> Result<(), TransportError>;
}

/// Records every emitted event.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    emitted: Arc<Mutex<Vec<BusEvent>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn take_emitted(&self) -> Vec<BusEvent> {
        let mut guard = self.emitted.lock().await;
        std::mem::take(&mut *guard)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn emit(&self, event: &BusEvent) -> Result<(), TransportError> {
        let mut guard = self.emitted.lock().await;
        guard.push(event.clone());
        Ok(())
    }
}

/// Forwards emitted events to an in-process receiver.
#[derive(Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<BusEvent>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BusEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn emit(&self, event: &BusEvent) -> Result<(), TransportError> {
        self.sender
            .send(event.clone())
            .map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_channels::ChannelId;

    #[tokio::test]
    async fn in_memory_transport_drains_on_take() {
        let transport = InMemoryTransport::new();
        transport
            .emit(&BusEvent::InitChannel(ChannelId::new("c1")))
            .await
            .unwrap();

        let emitted = transport.take_emitted().await;
        assert_eq!(emitted, vec![BusEvent::InitChannel(ChannelId::new("c1"))]);
        assert!(transport.take_emitted().await.is_empty());
    }

    #[tokio::test]
    async fn channel_transport_reports_closed_receiver() {
        let (transport, receiver) = ChannelTransport::new();
        drop(receiver);
        let err = transport
            .emit(&BusEvent::ChannelClosed(ChannelId::new("c1")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
