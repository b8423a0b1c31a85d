//! Variable scopes for template evaluation.

use kombi_common::{Value, VarMap};
use std::collections::BTreeMap;

/// Variables and pre-bound tokens visible to a template.
///
/// Scopes compose by layering: [`Scope::layered`] returns a new scope where
/// the given variables override the current ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    vars: VarMap,
    tokens: BTreeMap<String, String>,
}

impl Scope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope holding the given variables.
    pub fn with_vars(vars: VarMap) -> Self {
        Self {
            vars,
            tokens: BTreeMap::new(),
        }
    }

    /// A copy of this scope with `vars` layered on top.
    pub fn layered(&self, vars: &VarMap) -> Self {
        let mut scope = self.clone();
        scope.extend(vars);
        scope
    }

    /// Layer `vars` on top of this scope in place.
    pub fn extend(&mut self, vars: &VarMap) {
        for (name, value) in vars {
            self.vars.insert(name.clone(), value.clone());
        }
    }

    /// Set a variable.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Look up a variable.
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// All variables.
    pub fn vars(&self) -> &VarMap {
        &self.vars
    }

    /// Bind a token ahead of evaluation.
    pub fn set_token(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.tokens.insert(name.into(), value.into());
    }

    /// Look up a token.
    pub fn token(&self, name: &str) -> Option<&str> {
        self.tokens.get(name).map(String::as_str)
    }

    pub(crate) fn tokens(&self) -> &BTreeMap<String, String> {
        &self.tokens
    }
}

impl From<VarMap> for Scope {
    fn from(vars: VarMap) -> Self {
        Self::with_vars(vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layering_overrides() {
        let mut base = Scope::new();
        base.set_var("a", 1);
        base.set_var("b", "x");

        let mut top = VarMap::new();
        top.insert("a".into(), Value::from(2));
        let layered = base.layered(&top);

        assert_eq!(layered.var("a"), Some(&Value::from(2)));
        assert_eq!(layered.var("b"), Some(&Value::from("x")));
        assert_eq!(base.var("a"), Some(&Value::from(1)));
    }
}
