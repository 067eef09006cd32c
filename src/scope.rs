use indexmap::{IndexMap, IndexSet};

use crate::value::Value;

/// The flat variable namespace of one render.
///
/// Loops and conditionals do not open nested scopes: a binding made anywhere
/// stays visible for the rest of the render.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: IndexMap<String, Value>,
    defaulted: IndexSet<String>,
    builtins: IndexSet<String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        self.defaulted.shift_remove(&name);
        self.builtins.shift_remove(&name);
        self.vars.insert(name, value.into());
    }

    /// Bind a name from the builtin namespace. Unlike other bindings it does
    /// not count as present for `default`.
    pub(crate) fn set_builtin(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.vars.insert(name.clone(), value);
        self.builtins.insert(name);
    }

    /// Copy every binding of `other` into this scope, keeping builtin marks.
    pub(crate) fn merge(&mut self, other: &Scope) {
        for (name, value) in other.iter() {
            if other.builtins.contains(name) {
                self.set_builtin(name, value.clone());
            } else {
                self.set(name, value.clone());
            }
        }
    }

    /// Bound by the caller, the template or a directive, not only as a builtin.
    fn is_bound(&self, name: &str) -> bool {
        self.contains(name) && !self.builtins.contains(name)
    }

    fn bind_default(&mut self, name: &str, value: Value) {
        self.builtins.shift_remove(name);
        self.vars.insert(name.to_string(), value);
        self.defaulted.insert(name.to_string());
    }

    /// Bind `name` only if it is absent. Returns whether a binding was made.
    pub fn define_default(&mut self, name: &str, value: impl FnOnce() -> Value) -> bool {
        if self.is_bound(name) {
            return false;
        }
        self.bind_default(name, value());
        true
    }

    /// Fallible variant of [`define_default`](Self::define_default); the
    /// value is only computed when the name is absent.
    pub fn try_define_default<E>(
        &mut self,
        name: &str,
        value: impl FnOnce(&Scope) -> Result<Value, E>,
    ) -> Result<bool, E> {
        if self.is_bound(name) {
            return Ok(false);
        }
        let value = value(self)?;
        self.bind_default(name, value);
        Ok(true)
    }

    /// Whether the current binding of `name` came from a `default` directive.
    pub fn is_defaulted(&self, name: &str) -> bool {
        self.defaulted.contains(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Scope {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut scope = Scope::new();
        scope.extend(iter);
        scope
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Scope {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Scope {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<serde_json::Value> for Scope {
    /// Top-level keys of a JSON object become bindings; anything else yields
    /// an empty scope.
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => Scope::new(),
        }
    }
}
