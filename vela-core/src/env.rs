//! Lexical scope chain.
//!
//! This replaces the pointer-linked
//! parent chain with an index into a scope vector, which avoids
//! recursive `Rc<RefCell<Environment>>` chains and makes teardown a
//! plain `Vec::truncate`. Scope 0 is always the global scope.

use std::collections::HashMap;

use crate::error::RuntimeError;
use crate::value::Value;

struct Scope<'a> {
    values: HashMap<String, Value<'a>>,
    parent: Option<usize>,
    depth: usize,
}

pub struct Environment<'a> {
    scopes: Vec<Scope<'a>>,
    current: usize,
}

impl<'a> Environment<'a> {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                values: HashMap::new(),
                parent: None,
                depth: 0,
            }],
            current: 0,
        }
    }

    /// Pushes a fresh child scope and makes it current. Returns the
    /// index of the scope being left, for `pop_to` to restore later —
    /// this is what lets a function call or block unwind back to the
    /// right frame even through a non-local transfer.
    pub fn push_scope(&mut self) -> usize {
        let previous = self.current;
        let depth = self.scopes[previous].depth + 1;
        self.scopes.push(Scope {
            values: HashMap::new(),
            parent: Some(previous),
            depth,
        });
        self.current = self.scopes.len() - 1;
        previous
    }

    /// Restores `current` to a scope index captured by `push_scope`,
    /// discarding every scope pushed since. Used on every exit path
    /// (normal, break/continue/return, error) so every pushed scope
    /// between source and handler is popped and freed, not merely
    /// unreferenced — a block/loop-iteration/function-call scope must
    /// not survive its caller.
    pub fn pop_to(&mut self, previous: usize) {
        self.scopes.truncate(previous + 1);
        self.current = previous;
    }

    pub fn depth(&self) -> usize {
        self.scopes[self.current].depth
    }

    /// Defines `name` in the *current* scope. Returns `false` (does
    /// not overwrite) if `name` is already bound locally — the caller
    /// turns that into a fatal `RedefinitionError`.
    pub fn define(&mut self, name: &str, value: Value<'a>) -> bool {
        let scope = &mut self.scopes[self.current];
        if scope.values.contains_key(name) {
            return false;
        }
        scope.values.insert(name.to_string(), value);
        true
    }

    /// Defines `name` in the global scope (scope 0) regardless of the
    /// current scope — used for function and native registration, which
    /// always binds globally even when declared mid-call.
    pub fn define_global(&mut self, name: &str, value: Value<'a>) -> bool {
        let scope = &mut self.scopes[0];
        if scope.values.contains_key(name) {
            return false;
        }
        scope.values.insert(name.to_string(), value);
        true
    }

    fn find_scope(&self, name: &str) -> Option<usize> {
        let mut idx = Some(self.current);
        while let Some(i) = idx {
            if self.scopes[i].values.contains_key(name) {
                return Some(i);
            }
            idx = self.scopes[i].parent;
        }
        None
    }

    /// Walks child-to-root; `None` on a miss.
    pub fn get(&self, name: &str) -> Option<Value<'a>> {
        let idx = self.find_scope(name)?;
        self.scopes[idx].values.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_scope(name).is_some()
    }

    /// Replaces the reference in the scope that owns `name`, no
    /// type-kind checking. Used for increment/decrement and for-each
    /// loop-variable rebinding, which always overwrite wholesale.
    pub fn set(&mut self, name: &str, value: Value<'a>) -> bool {
        match self.find_scope(name) {
            Some(idx) => {
                self.scopes[idx].values.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Type-aware in-place update for `Assign`: Number→Number
    /// and String→String mutate; a Nil slot accepts any kind; a
    /// cross-kind Number↔String assignment is a fatal `TypeError`.
    pub fn assign(&mut self, name: &str, value: Value<'a>, line: usize) -> Result<Value<'a>, RuntimeError> {
        let idx = self
            .find_scope(name)
            .ok_or_else(|| RuntimeError::Name { name: name.to_string(), line })?;
        let existing = self.scopes[idx].values.get(name).expect("scope owns name");
        match (existing, &value) {
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                return Err(RuntimeError::Type {
                    message: format!("cannot assign {} to {}", value.type_name(), existing.type_name()),
                    line,
                });
            }
            _ => {}
        }
        self.scopes[idx].values.insert(name.to_string(), value.clone());
        Ok(value)
    }
}

impl<'a> Default for Environment<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_scoping_hides_inner_declarations() {
        let mut env = Environment::new();
        env.define("x", Value::Number(1.0));
        let saved = env.push_scope();
        env.define("y", Value::Number(2.0));
        assert!(env.contains("x"));
        assert!(env.contains("y"));
        env.pop_to(saved);
        assert!(env.contains("x"));
        assert!(!env.contains("y"));
    }

    #[test]
    fn redefinition_in_same_scope_is_rejected() {
        let mut env = Environment::new();
        assert!(env.define("x", Value::Number(1.0)));
        assert!(!env.define("x", Value::Number(2.0)));
    }

    #[test]
    fn cross_kind_assign_errors() {
        let mut env = Environment::new();
        env.define("x", Value::Number(1.0));
        let err = env.assign("x", Value::String("a".into()), 1).unwrap_err();
        assert!(matches!(err, RuntimeError::Type { .. }));
    }

    #[test]
    fn assign_to_nil_slot_replaces_it() {
        let mut env = Environment::new();
        env.define("x", Value::Nil);
        let result = env.assign("x", Value::String("a".into()), 1).unwrap();
        assert!(matches!(result, Value::String(_)));
    }

    #[test]
    fn pop_to_actually_frees_scopes_instead_of_just_hiding_them() {
        let mut env = Environment::new();
        for _ in 0..1000 {
            let saved = env.push_scope();
            env.define("loop_local", Value::Number(1.0));
            env.pop_to(saved);
        }
        assert_eq!(env.scopes.len(), 1, "every pushed scope should be truncated away, not merely unreferenced");
    }
}
