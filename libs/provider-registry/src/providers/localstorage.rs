use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::{ProviderError, RegistryError};
use crate::providers::string_arg;
use crate::registry::ProviderCatalog;
use crate::traits::{MethodTable, Provider};

pub const PROVIDER_TYPE: &str = "localstorage";

pub fn register(catalog: &mut ProviderCatalog) -> Result<(), RegistryError> {
    catalog.register(PROVIDER_TYPE, |options| {
        LocalStorage::from_options(options).map(|store| Arc::new(store) as Arc<dyn Provider>)
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocalStorageOptions {
    #[serde(default)]
    seed: Map<String, Value>,
}

/// Key/value store private to one provider instance.
#[derive(Default)]
pub struct LocalStorage {
    entries: DashMap<String, Value>,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `null` or `{"seed": {key: value, ...}}`.
    fn from_options(options: &Value) -> Result<Self, ProviderError> {
        let options = if options.is_null() {
            LocalStorageOptions::default()
        } else {
            serde_json::from_value::<LocalStorageOptions>(options.clone())?
        };
        let store = Self::new();
        for (key, value) in options.seed {
            store.entries.insert(key, value);
        }
        Ok(store)
    }

    fn get(&self, key: &str) -> Value {
        self.entries
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or(Value::Null)
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

impl Provider for LocalStorage {
    fn methods(self: Arc<Self>) -> MethodTable {
        let get = Arc::clone(&self);
        let set = Arc::clone(&self);
        let remove = Arc::clone(&self);
        let keys = Arc::clone(&self);
        let clear = self;

        MethodTable::new()
            .with_method("get", move |args: Vec<Value>| {
                let result = string_arg(&args, 0, "get").map(|key| get.get(&key));
                async move { result }
            })
            .with_method("set", move |args: Vec<Value>| {
                let result = string_arg(&args, 0, "set").map(|key| {
                    let value = args.get(1).cloned().unwrap_or(Value::Null);
                    set.entries.insert(key, value);
                    Value::Null
                });
                async move { result }
            })
            .with_method("remove", move |args: Vec<Value>| {
                let result = string_arg(&args, 0, "remove").map(|key| {
                    remove.entries.remove(&key);
                    Value::Null
                });
                async move { result }
            })
            .with_method("keys", move |_args| {
                let listed = keys.keys();
                async move { Ok(Value::from(listed)) }
            })
            .with_method("clear", move |_args| {
                clear.entries.clear();
                async { Ok(Value::Null) }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn call(
        methods: &MethodTable,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, ProviderError> {
        methods.invoke(method, args).expect("method present").await
    }

    #[tokio::test]
    async fn missing_key_reads_null() {
        let methods = Arc::new(LocalStorage::new()).methods();
        let value = call(&methods, "get", vec![json!("stats")]).await.unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn set_get_remove() {
        let methods = Arc::new(LocalStorage::new()).methods();
        call(&methods, "set", vec![json!("stats"), json!("{\"win\":2}")])
            .await
            .unwrap();
        assert_eq!(
            call(&methods, "get", vec![json!("stats")]).await.unwrap(),
            json!("{\"win\":2}")
        );
        assert_eq!(call(&methods, "keys", vec![]).await.unwrap(), json!(["stats"]));

        call(&methods, "remove", vec![json!("stats")]).await.unwrap();
        assert_eq!(
            call(&methods, "get", vec![json!("stats")]).await.unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let store = LocalStorage::from_options(&json!({"seed": {"a": 1, "b": 2}})).unwrap();
        let methods = Arc::new(store).methods();
        assert_eq!(call(&methods, "keys", vec![]).await.unwrap(), json!(["a", "b"]));
        call(&methods, "clear", vec![]).await.unwrap();
        assert_eq!(call(&methods, "keys", vec![]).await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn non_string_key_is_rejected() {
        let methods = Arc::new(LocalStorage::new()).methods();
        let err = call(&methods, "get", vec![json!(7)]).await.unwrap_err();
        assert_eq!(err.code(), "bad_arguments");
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = LocalStorage::from_options(&json!({"bogus": true})).err().unwrap();
        assert_eq!(err.code(), "bad_arguments");
    }
}
