//! Behavior lookup and the seam for compiling behavior source text.

use crate::error::BehaviorError;
use crate::value::Value;
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

/// Keyword arguments passed to a behavior, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<(String, Value)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Like [`get`](Self::get), but a missing argument is an arity error for `function`.
    pub fn require(&self, function: &str, name: &str) -> Result<&Value, BehaviorError> {
        self.get(name).ok_or_else(|| BehaviorError::Arity {
            function: function.to_string(),
            message: format!("missing required argument '{}'", name),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Arguments {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A callable node behavior.
pub trait Behavior: Send + Sync {
    fn call(&self, args: &Arguments) -> Result<Value, BehaviorError>;
}

impl<F> Behavior for F
where
    F: Fn(&Arguments) -> Result<Value, BehaviorError> + Send + Sync,
{
    fn call(&self, args: &Arguments) -> Result<Value, BehaviorError> {
        self(args)
    }
}

/// Turns behavior source text into a callable.
///
/// `name` is the function to extract from `source`; the interpreter passes the
/// node's name.
pub trait BehaviorCompiler: Send + Sync {
    fn compile(&self, name: &str, source: &str) -> Result<Arc<dyn Behavior>, BehaviorError>;
}

/// Static behaviors keyed by node id, and external behaviors keyed by
/// `module.name`.
#[derive(Clone, Default)]
pub struct Registry {
    entries: AHashMap<String, Arc<dyn Behavior>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure under `key`.
    pub fn register<F>(&mut self, key: impl Into<String>, behavior: F)
    where
        F: Fn(&Arguments) -> Result<Value, BehaviorError> + Send + Sync + 'static,
    {
        self.entries.insert(key.into(), Arc::new(behavior));
    }

    pub fn register_behavior(&mut self, key: impl Into<String>, behavior: Arc<dyn Behavior>) {
        self.entries.insert(key.into(), behavior);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, key: impl Into<String>, behavior: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Value, BehaviorError> + Send + Sync + 'static,
    {
        self.register(key, behavior);
        self
    }

    /// Registers a behavior reachable as `module.name` from external-module nodes.
    pub fn register_qualified<F>(&mut self, module: &str, name: &str, behavior: F)
    where
        F: Fn(&Arguments) -> Result<Value, BehaviorError> + Send + Sync + 'static,
    {
        self.register(qualified_name(module, name), behavior);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Behavior>> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("Registry").field("keys", &keys).finish()
    }
}

pub fn qualified_name(module: &str, name: &str) -> String {
    format!("{}.{}", module, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_behaviors() {
        let registry = Registry::new().with("A", |_: &Arguments| {
            Ok(Value::Map([("x".to_string(), Value::Int(5))].into_iter().collect()))
        });
        let behavior = registry.get("A").expect("registered");
        let result = behavior.call(&Arguments::new()).unwrap();
        assert_eq!(result.as_map().unwrap()["x"], Value::Int(5));
        assert!(registry.get("B").is_none());
    }

    #[test]
    fn qualified_keys_and_required_arguments() {
        let mut registry = Registry::new();
        registry.register_qualified("nodes.math", "inc", |args: &Arguments| {
            match args.require("inc", "v")? {
                Value::Int(i) => Ok(Value::Int(i + 1)),
                other => Ok(other.clone()),
            }
        });
        assert!(registry.contains("nodes.math.inc"));

        let args: Arguments = [("v", Value::Int(1))].into_iter().collect();
        let inc = registry.get("nodes.math.inc").unwrap();
        assert_eq!(inc.call(&args).unwrap(), Value::Int(2));

        let err = inc.call(&Arguments::new()).unwrap_err();
        assert!(err.to_string().contains("missing required argument 'v'"));
    }
}
