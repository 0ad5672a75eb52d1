use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, Stream, StreamExt};
use metrics::counter;
use relay_channels::{
    ChannelError, ChannelFacility, ChannelMultiplexer, ChannelSignal, LoopbackFacility, NewChannel,
};
use relay_registry::providers::core::{CoreProvider, PROVIDER_TYPE as CORE_TYPE};
use relay_registry::{ProviderCatalog, ProviderInstance, ProviderRegistry};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::BusConfig;
use crate::transport::{Transport, TransportError};
use crate::wire::{
    BusAction, BusEvent, CallRequest, ChannelRequest, CloseChannelRequest, CorrelationId,
    CreateRequest, Envelope, Failure, FailureKind, OutToChannelRequest,
};

/// Name the always-present core provider is stored under.
pub const CORE_PROVIDER_NAME: &str = "core";

#[derive(thiserror::Error, Debug)]
pub enum BusError {
    #[error("failed to emit `{tag}`: {source}")]
    Transport {
        tag: &'static str,
        #[source]
        source: TransportError,
    },
}

struct CallOutcome {
    provider: String,
    event: BusEvent,
}

struct ChannelSetup {
    request: Option<CorrelationId>,
    outcome: Result<NewChannel, ChannelError>,
}

/// Routes inbound actions to the provider registry or the channel
/// multiplexer and emits their outcomes on the transport.
///
/// All registry and channel-table mutations happen on the task driving the
/// bus. Provider methods and channel handshakes run as tasks owned by the
/// bus; dropping it aborts them and closes every channel.
pub struct Bus {
    id: Uuid,
    registry: ProviderRegistry,
    channels: ChannelMultiplexer,
    signals: mpsc::UnboundedReceiver<ChannelSignal>,
    facility: Arc<dyn ChannelFacility>,
    transport: Arc<dyn Transport>,
    calls: JoinSet<CallOutcome>,
    setups: JoinSet<ChannelSetup>,
}

impl Bus {
    pub fn new(
        config: &BusConfig,
        catalog: ProviderCatalog,
        facility: Arc<dyn ChannelFacility>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let mut registry = ProviderRegistry::new(catalog);
        if config.seed_core {
            registry.insert(
                CORE_PROVIDER_NAME,
                ProviderInstance::new(CORE_TYPE, Arc::new(CoreProvider::new(config.bus_id))),
            );
        }
        let (channels, signals) = ChannelMultiplexer::new(config.max_channels);
        Self {
            id: config.bus_id,
            registry,
            channels,
            signals,
            facility,
            transport,
            calls: JoinSet::new(),
            setups: JoinSet::new(),
        }
    }

    /// Builds a bus whose channels come from an in-process
    /// [`LoopbackFacility`], returned so the caller can claim remote halves.
    pub fn with_loopback(
        config: &BusConfig,
        catalog: ProviderCatalog,
        transport: Arc<dyn Transport>,
    ) -> (Self, Arc<LoopbackFacility>) {
        let facility = Arc::new(LoopbackFacility::new(config.channel_prefix.clone()));
        let bus = Self::new(config, catalog, facility.clone(), transport);
        (bus, facility)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn channels(&self) -> &ChannelMultiplexer {
        &self.channels
    }

    /// Calls and channel handshakes that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.calls.len() + self.setups.len()
    }

    /// Drives the bus until `inbound` ends, then waits for outstanding calls
    /// and channel handshakes before shutting down.
    pub async fn run<S>(mut self, mut inbound: S) -> Result<(), BusError>
    where
        S: Stream<Item = Envelope> + Unpin,
    {
        info!(bus_id = %self.id, "bus running");
        let mut inbound_open = true;
        loop {
            if !inbound_open && self.outstanding() == 0 {
                break;
            }
            tokio::select! {
                next = inbound.next(), if inbound_open => match next {
                    Some(envelope) => self.handle_envelope(envelope).await?,
                    None => {
                        debug!(outstanding = self.outstanding(), "inbound closed, draining");
                        inbound_open = false;
                    }
                },
                Some(joined) = self.calls.join_next() => self.finish_call(joined).await?,
                Some(joined) = self.setups.join_next() => self.finish_setup(joined).await?,
                Some(signal) = self.signals.recv() => self.relay_signal(signal).await?,
                else => break,
            }
        }
        for chan_id in self.channels.ids() {
            self.facility.release(&chan_id).await;
        }
        self.shutdown();
        info!(bus_id = %self.id, "bus stopped");
        Ok(())
    }

    /// Decodes and dispatches one envelope. Undecodable envelopes are
    /// answered with an `error` event.
    pub async fn handle_envelope(&mut self, envelope: Envelope) -> Result<(), BusError> {
        match BusAction::from_envelope(envelope) {
            Ok(action) => self.dispatch(action).await,
            Err(err) => {
                warn!(error = %err, "rejected inbound action");
                counter!("relay_invalid_actions_total").increment(1);
                self.emit(BusEvent::Error {
                    id: err.correlation_id().cloned(),
                    error: Failure::from(&err),
                })
                .await
            }
        }
    }

    pub async fn dispatch(&mut self, action: BusAction) -> Result<(), BusError> {
        debug!(tag = action.tag(), "dispatching action");
        match action {
            BusAction::Create(request) => self.create(request).await,
            BusAction::Call(request) => self.call(request).await,
            BusAction::CreateChannel(request) => self.create_channel(request).await,
            BusAction::OutToChannel(request) => self.out_to_channel(request).await,
            BusAction::CloseChannel(request) => self.close_channel(request).await,
        }
    }

    /// Waits for every outstanding call and channel handshake and emits
    /// their outcomes. Channel traffic is not relayed here.
    pub async fn drain(&mut self) -> Result<(), BusError> {
        while self.outstanding() > 0 {
            tokio::select! {
                Some(joined) = self.calls.join_next() => self.finish_call(joined).await?,
                Some(joined) = self.setups.join_next() => self.finish_setup(joined).await?,
                else => break,
            }
        }
        Ok(())
    }

    /// Aborts outstanding work, closes every channel and drops every
    /// provider instance.
    pub fn shutdown(&mut self) {
        self.calls.abort_all();
        self.setups.abort_all();
        self.channels.close_all();
        self.registry.clear();
    }

    async fn create(&mut self, request: CreateRequest) -> Result<(), BusError> {
        let CreateRequest {
            name,
            provider,
            options,
        } = request;
        match self.registry.create(&name, &provider, &options) {
            Ok(()) => {
                info!(name = %name, provider_type = %provider, "provider instance ready");
                Ok(())
            }
            Err(err) => {
                warn!(
                    name = %name,
                    provider_type = %provider,
                    error = %err,
                    "provider creation failed"
                );
                counter!("relay_create_failures_total", "provider_type" => provider).increment(1);
                self.emit(BusEvent::CreateFailed {
                    error: Failure::from(&err),
                    name,
                })
                .await
            }
        }
    }

    async fn call(&mut self, request: CallRequest) -> Result<(), BusError> {
        let CallRequest {
            id,
            provider,
            method,
            args,
        } = request;
        counter!("relay_calls_total", "provider" => provider.clone()).increment(1);

        let invocation = match self.registry.call(&provider, &method, args) {
            Ok(invocation) => invocation,
            Err(err) => {
                warn!(
                    id = %id,
                    provider = %provider,
                    method = %method,
                    error = %err,
                    "call rejected"
                );
                counter!("relay_call_failures_total", "provider" => provider).increment(1);
                return self
                    .emit(BusEvent::Failure {
                        id,
                        error: Failure::from(&err),
                    })
                    .await;
            }
        };

        let span = info_span!("provider_call", id = %id, provider = %provider, method = %method);
        self.calls.spawn(
            async move {
                let event = match AssertUnwindSafe(invocation).catch_unwind().await {
                    Ok(Ok(data)) => {
                        debug!("call resolved");
                        BusEvent::Return { id, data }
                    }
                    Ok(Err(err)) => {
                        warn!(error = %err, "call rejected by provider");
                        BusEvent::Failure {
                            id,
                            error: Failure::from(&err),
                        }
                    }
                    Err(_) => {
                        error!("provider method panicked");
                        BusEvent::Failure {
                            id,
                            error: Failure::new(
                                FailureKind::ProviderFailure,
                                format!("`{provider}.{method}` panicked"),
                            ),
                        }
                    }
                };
                CallOutcome { provider, event }
            }
            .instrument(span),
        );
        Ok(())
    }

    async fn finish_call(
        &mut self,
        joined: Result<CallOutcome, JoinError>,
    ) -> Result<(), BusError> {
        match joined {
            Ok(CallOutcome { provider, event }) => {
                if matches!(event, BusEvent::Failure { .. }) {
                    counter!("relay_call_failures_total", "provider" => provider).increment(1);
                }
                self.emit(event).await
            }
            Err(err) => {
                debug!(error = %err, "call task cancelled");
                Ok(())
            }
        }
    }

    async fn create_channel(&mut self, request: ChannelRequest) -> Result<(), BusError> {
        if let Err(err) = self.channels.begin_setup() {
            warn!(error = %err, "channel creation refused");
            return self
                .emit(BusEvent::ChannelFailure {
                    chan_id: None,
                    id: request.id,
                    error: Failure::from(&err),
                })
                .await;
        }

        let facility = Arc::clone(&self.facility);
        self.setups.spawn(async move {
            let outcome = match AssertUnwindSafe(facility.create_channel())
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ChannelError::Setup("channel facility panicked".into())),
            };
            ChannelSetup {
                request: request.id,
                outcome,
            }
        });
        Ok(())
    }

    async fn finish_setup(
        &mut self,
        joined: Result<ChannelSetup, JoinError>,
    ) -> Result<(), BusError> {
        let ChannelSetup { request, outcome } = match joined {
            Ok(setup) => setup,
            Err(err) => {
                debug!(error = %err, "channel setup cancelled");
                self.channels.abandon_setup();
                return Ok(());
            }
        };

        let attached = match outcome {
            Ok(channel) => self.channels.attach(channel),
            Err(err) => {
                self.channels.abandon_setup();
                Err(err)
            }
        };
        match attached {
            Ok(chan_id) => {
                info!(chan_id = %chan_id, "channel open");
                counter!("relay_channels_opened_total").increment(1);
                self.emit(BusEvent::InitChannel(chan_id)).await
            }
            Err(err) => {
                warn!(error = %err, "channel setup failed");
                self.emit(BusEvent::ChannelFailure {
                    chan_id: None,
                    id: request,
                    error: Failure::new(FailureKind::ChannelSetupFailure, err.to_string()),
                })
                .await
            }
        }
    }

    async fn out_to_channel(&mut self, request: OutToChannelRequest) -> Result<(), BusError> {
        let OutToChannelRequest {
            chan_id,
            message,
            id,
        } = request;
        match self.channels.send(&chan_id, message) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(chan_id = %chan_id, error = %err, "outbound channel message rejected");
                self.emit(BusEvent::ChannelFailure {
                    error: Failure::from(&err),
                    chan_id: Some(chan_id),
                    id,
                })
                .await
            }
        }
    }

    async fn close_channel(&mut self, request: CloseChannelRequest) -> Result<(), BusError> {
        let CloseChannelRequest { chan_id, id } = request;
        match self.channels.close(&chan_id) {
            Ok(()) => {
                self.facility.release(&chan_id).await;
                self.emit(BusEvent::ChannelClosed(chan_id)).await
            }
            Err(err) => {
                warn!(chan_id = %chan_id, error = %err, "close rejected");
                self.emit(BusEvent::ChannelFailure {
                    error: Failure::from(&err),
                    chan_id: Some(chan_id),
                    id,
                })
                .await
            }
        }
    }

    async fn relay_signal(&mut self, signal: ChannelSignal) -> Result<(), BusError> {
        match signal {
            ChannelSignal::Message { chan_id, message } => {
                if !self.channels.is_open(&chan_id) {
                    debug!(chan_id = %chan_id, "dropping message for closed channel");
                    return Ok(());
                }
                self.emit(BusEvent::InFromChannel { chan_id, message })
                    .await
            }
            ChannelSignal::Ended { chan_id } => {
                if self.channels.handle_ended(&chan_id) {
                    self.facility.release(&chan_id).await;
                    self.emit(BusEvent::ChannelClosed(chan_id)).await
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn emit(&self, event: BusEvent) -> Result<(), BusError> {
        let tag = event.tag();
        debug!(tag, correlation = ?event.correlation_id(), "emitting event");
        self.transport
            .emit(&event)
            .await
            .map_err(|source| BusError::Transport { tag, source })
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        self.shutdown();
    }
}
