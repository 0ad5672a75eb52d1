//! Providers shipped with the bus.

pub mod core;
pub mod localstorage;

use uuid::Uuid;

use crate::errors::RegistryError;
use crate::registry::ProviderCatalog;

/// Registers every built-in provider type with `catalog`.
pub fn register_all(catalog: &mut ProviderCatalog, bus_id: Uuid) -> Result<(), RegistryError> {
    self::core::register(catalog, bus_id)?;
    localstorage::register(catalog)?;
    Ok(())
}

/// Reads the string argument at `index`.
pub(crate) fn string_arg(
    args: &[serde_json::Value],
    index: usize,
    method: &str,
) -> Result<String, crate::ProviderError> {
    args.get(index)
        .and_then(|value| value.as_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            crate::ProviderError::bad_arguments(format!(
                "`{method}` expects a string at position {index}"
            ))
        })
}
