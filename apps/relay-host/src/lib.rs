//! Stdio host for the relay bus.

pub mod config;
pub mod echo;
pub mod stdio;

pub use config::HostArgs;
pub use echo::EchoFacility;
pub use stdio::{LineTransport, StdoutTransport, parse_line, read_envelopes};
