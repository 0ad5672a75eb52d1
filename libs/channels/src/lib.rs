//! Duplex channels addressed by opaque identifiers.
//!
//! A [`ChannelFacility`] hands out new conduits; the [`ChannelMultiplexer`]
//! keeps the local half of each one, forwards its inbound messages as
//! [`ChannelSignal`]s and relays outbound messages by id.

pub mod error;
pub mod facility;
pub mod multiplexer;

pub use error::ChannelError;
pub use facility::{ChannelEndpoint, ChannelFacility, ChannelId, LoopbackFacility, NewChannel};
pub use multiplexer::{ChannelMultiplexer, ChannelSignal};
