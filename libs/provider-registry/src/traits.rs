use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::errors::ProviderError;

/// Deferred result of a provider method invocation.
pub type MethodFuture = BoxFuture<'static, Result<Value, ProviderError>>;

type Method = Arc<dyn Fn(Vec<Value>) -> MethodFuture + Send + Sync>;

/// A service the bus can host.
///
/// Implementations declare their callable surface once, when the instance is
/// built; the registry never looks methods up any other way.
pub trait Provider: Send + Sync + 'static {
    fn methods(self: Arc<Self>) -> MethodTable;
}

/// Method name to bound invocation.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, Method>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method<F, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ProviderError>> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Arc::new(move |args| method(args).boxed()));
        self
    }

    /// Starts the named method, or `None` when it is not exposed.
    pub fn invoke(&self, method: &str, args: Vec<Value>) -> Option<MethodFuture> {
        self.methods.get(method).map(|bound| bound(args))
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Sorted method names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn invokes_registered_method() {
        let table = MethodTable::new().with_method("len", |args: Vec<Value>| async move {
            Ok(json!(args.len()))
        });

        let out = table
            .invoke("len", vec![json!(1), json!("two")])
            .expect("method present")
            .await
            .unwrap();
        assert_eq!(out, json!(2));
    }

    #[test]
    fn missing_method_is_none() {
        let table = MethodTable::new();
        assert!(table.invoke("nope", Vec::new()).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn names_are_sorted() {
        let table = MethodTable::new()
            .with_method("set", |_| async { Ok(Value::Null) })
            .with_method("get", |_| async { Ok(Value::Null) });
        assert_eq!(table.names(), vec!["get", "set"]);
        assert!(table.contains("set"));
        assert_eq!(format!("{table:?}"), r#"MethodTable { methods: ["get", "set"] }"#);
    }
}
