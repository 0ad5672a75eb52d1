//! Provider-channel message bus.
//!
//! The bus sits on top of an injected [`Transport`]. Inbound [`Envelope`]s
//! carry tagged actions (`create`, `call`, `createChannel`, `outToChannel`,
//! `closeChannel`); the [`Bus`] routes them to its provider registry or its
//! channel multiplexer and emits correlated [`BusEvent`]s back out.

mod bus;
pub mod config;
pub mod transport;
pub mod wire;

pub use bus::{Bus, BusError, CORE_PROVIDER_NAME};
pub use config::BusConfig;
pub use transport::{ChannelTransport, InMemoryTransport, Transport, TransportError};
pub use wire::{
    BusAction, BusEvent, CorrelationId, DecodeError, Envelope, Failure, FailureKind,
};

pub use relay_channels as channels;
pub use relay_registry as registry;
