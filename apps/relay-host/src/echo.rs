use async_trait::async_trait;
use relay_bus::channels::{ChannelError, ChannelFacility, ChannelId, LoopbackFacility, NewChannel};
use tracing::debug;

/// Loopback facility whose remote halves send every message straight back.
///
/// Gives stdio clients a live peer for each channel without a second process.
pub struct EchoFacility {
    loopback: LoopbackFacility,
}

impl EchoFacility {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            loopback: LoopbackFacility::new(prefix),
        }
    }
}

#[async_trait]
impl ChannelFacility for EchoFacility {
    async fn create_channel(&self) -> Result<NewChannel, ChannelError> {
        let channel = self.loopback.create_channel().await?;
        let mut remote = self
            .loopback
            .take_remote(&channel.identifier)
            .await
            .ok_or_else(|| {
                ChannelError::Setup(format!("remote half of `{}` missing", channel.identifier))
            })?;

        let chan_id = channel.identifier.clone();
        tokio::spawn(async move {
            while let Some(message) = remote.recv().await {
                if remote.send(message).is_err() {
                    break;
                }
            }
            debug!(chan_id = %chan_id, "echo peer finished");
        });
        Ok(channel)
    }

    async fn release(&self, chan_id: &ChannelId) {
        self.loopback.release(chan_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn messages_come_back() {
        let facility = EchoFacility::new("e");
        let channel = facility.create_channel().await.unwrap();
        assert_eq!(channel.identifier.as_str(), "e1");

        let mut local = channel.endpoint;
        local.send(json!("ping")).unwrap();
        local.send(json!({"n": 2})).unwrap();
        assert_eq!(local.recv().await, Some(json!("ping")));
        assert_eq!(local.recv().await, Some(json!({"n": 2})));
    }
}
