use std::sync::Arc;

use serde_json::{Value, json};
use uuid::Uuid;

use crate::errors::{ProviderError, RegistryError};
use crate::registry::ProviderCatalog;
use crate::traits::{MethodTable, Provider};

pub const PROVIDER_TYPE: &str = "core";

pub fn register(catalog: &mut ProviderCatalog, bus_id: Uuid) -> Result<(), RegistryError> {
    catalog.register(PROVIDER_TYPE, move |_options| {
        Ok(Arc::new(CoreProvider::new(bus_id)) as Arc<dyn Provider>)
    })
}

/// Always-present provider exposing bus-level helpers.
pub struct CoreProvider {
    bus_id: Uuid,
}

impl CoreProvider {
    pub fn new(bus_id: Uuid) -> Self {
        Self { bus_id }
    }
}

impl Provider for CoreProvider {
    fn methods(self: Arc<Self>) -> MethodTable {
        MethodTable::new()
            .with_method("echo", |args: Vec<Value>| async move {
                Ok(args.into_iter().next().unwrap_or(Value::Null))
            })
            .with_method("getId", move |_args| {
                let id = self.bus_id;
                async move { Ok::<_, ProviderError>(json!(id.to_string())) }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_first_argument() {
        let methods = Arc::new(CoreProvider::new(Uuid::new_v4())).methods();
        let out = methods
            .invoke("echo", vec![json!({"a": 1}), json!("ignored")])
            .unwrap()
            .await
            .unwrap();
        assert_eq!(out, json!({"a": 1}));

        let empty = methods.invoke("echo", Vec::new()).unwrap().await.unwrap();
        assert_eq!(empty, Value::Null);
    }

    #[tokio::test]
    async fn get_id_reports_bus_id() {
        let id = Uuid::new_v4();
        let methods = Arc::new(CoreProvider::new(id)).methods();
        let out = methods.invoke("getId", Vec::new()).unwrap().await.unwrap();
        assert_eq!(out, json!(id.to_string()));
    }
}
