//! Provider catalog and live instance registry for the relay bus.
//!
//! A [`ProviderCatalog`] maps provider *types* to constructors. A
//! [`ProviderRegistry`] owns the instances created from it, keyed by
//! caller-chosen *names*, and dispatches method calls through each
//! instance's [`MethodTable`].

pub mod errors;
#[cfg(feature = "builtin")]
pub mod providers;
pub mod registry;
pub mod traits;

pub use errors::{ProviderError, RegistryError};
pub use registry::{ProviderCatalog, ProviderInstance, ProviderRegistry};
pub use traits::{MethodFuture, MethodTable, Provider};
