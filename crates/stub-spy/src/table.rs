//! Replaceable method tables exposed by the application under test.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use trellis_core_types::{EngineError, EngineResult};

/// Function value passed as an argument, e.g. a success callback.
pub type Callback = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Implementation bound to a method name.
pub type Method = Arc<dyn Fn(&[Arg]) -> EngineResult<Value> + Send + Sync>;

#[derive(Clone)]
pub enum Arg {
    Value(Value),
    Callback(Callback),
}

impl Arg {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Arg::Callback(Arc::new(f))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(value) => Some(value),
            Arg::Callback(_) => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Arg::Callback(callback) => Some(callback),
            Arg::Value(_) => None,
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(value) => write!(f, "{value}"),
            Arg::Callback(_) => f.write_str("<callback>"),
        }
    }
}

/// Named object whose methods can be looked up and replaced at runtime.
///
/// Tables are shared by `Arc`: the application invokes through the same
/// table a stub rewrites, so replacements take effect on the next call.
pub struct MethodTable {
    name: String,
    methods: RwLock<BTreeMap<String, Method>>,
}

impl MethodTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: RwLock::new(BTreeMap::new()),
        }
    }

    /// Builder-style [`define`](Self::define).
    pub fn with_method<F>(self, method: &str, f: F) -> Self
    where
        F: Fn(&[Arg]) -> EngineResult<Value> + Send + Sync + 'static,
    {
        self.define(method, f);
        self
    }

    pub fn define<F>(&self, method: &str, f: F)
    where
        F: Fn(&[Arg]) -> EngineResult<Value> + Send + Sync + 'static,
    {
        self.methods.write().insert(method.to_string(), Arc::new(f));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has(&self, method: &str) -> bool {
        self.methods.read().contains_key(method)
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods.read().keys().cloned().collect()
    }

    pub fn get(&self, method: &str) -> Option<Method> {
        self.methods.read().get(method).cloned()
    }

    /// Call `method`. The lock is released before the implementation runs,
    /// so implementations may re-enter the table.
    pub fn invoke(&self, method: &str, args: &[Arg]) -> EngineResult<Value> {
        let implementation = self.get(method).ok_or_else(|| {
            EngineError::Application(format!("{}.{method} is not a function", self.name))
        })?;
        implementation(args)
    }

    /// Swap the implementation, returning the previous one.
    pub(crate) fn replace(&self, method: &str, implementation: Method) -> Option<Method> {
        self.methods
            .write()
            .insert(method.to_string(), implementation)
    }

    /// Swap the implementation only while `current` is still the one bound.
    pub(crate) fn replace_if_bound(&self, method: &str, current: &Method, next: Method) -> bool {
        let mut methods = self.methods.write();
        match methods.get_mut(method) {
            Some(bound) if same_method(bound, current) => {
                *bound = next;
                true
            }
            _ => false,
        }
    }
}

/// Identity of an implementation, ignoring vtable metadata.
pub(crate) fn same_method(a: &Method, b: &Method) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invoke_passes_callbacks_through() {
        let table = MethodTable::new("navigator.geolocation").with_method(
            "getCurrentPosition",
            |args| {
                let Some(callback) = args.first().and_then(Arg::as_callback) else {
                    return Err(EngineError::Application("missing callback".into()));
                };
                Ok(callback(&[json!({ "coords": { "latitude": 1.0 } })]))
            },
        );

        let result = table
            .invoke(
                "getCurrentPosition",
                &[Arg::callback(|args| args[0]["coords"]["latitude"].clone())],
            )
            .unwrap();
        assert_eq!(result, json!(1.0));
    }

    #[test]
    fn conditional_replace_checks_identity() {
        let table = MethodTable::new("clock").with_method("now", |_| Ok(json!(1)));
        let bound = table.get("now").unwrap();
        let stale: Method = Arc::new(|_| Ok(json!(2)));
        assert!(!table.replace_if_bound("now", &stale, stale.clone()));
        assert!(table.replace_if_bound("now", &bound, stale.clone()));
        assert_eq!(table.invoke("now", &[]).unwrap(), json!(2));
    }

    #[test]
    fn unknown_method_is_an_application_error() {
        let table = MethodTable::new("window");
        assert!(matches!(
            table.invoke("alert", &[]),
            Err(EngineError::Application(_))
        ));
        assert!(!table.has("alert"));
    }
}
