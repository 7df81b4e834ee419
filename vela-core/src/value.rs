//! Runtime value variants and their invariants.
//!
//! Aggregates (`Array`, `Map`, `Struct`) are `Rc<RefCell<_>>` rather than
//! arena references: two variables bound to "the same array" need to
//! observe each other's in-place mutations (`a.push(v)` etc.), which is
//! the classic case for shared interior mutability in Rust rather than
//! arena pointers — see DESIGN.md for the full rationale. Numbers,
//! strings and nil are plain owned values, cloned by value.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Stmt;
use crate::native::NativeFn;

/// A map key: only Number or String keys are permitted.
#[derive(Debug, Clone)]
pub enum MapKey {
    Number(f64),
    String(String),
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MapKey::Number(a), MapKey::Number(b)) => a.to_bits() == b.to_bits(),
            (MapKey::String(a), MapKey::String(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for MapKey {}

impl std::hash::Hash for MapKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            MapKey::Number(n) => n.to_bits().hash(state),
            MapKey::String(s) => s.hash(state),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Number(n) => write!(f, "{}", format_number(*n)),
            MapKey::String(s) => write!(f, "{s}"),
        }
    }
}

pub struct ArrayData<'a> {
    pub name: String,
    pub elements: Vec<Value<'a>>,
}

pub struct MapData<'a> {
    pub name: String,
    pub entries: IndexMap<MapKey, Value<'a>>,
}

pub struct StructData<'a> {
    pub type_name: String,
    /// Ordered field_name -> value, ordering follows declaration order.
    pub fields: IndexMap<String, Value<'a>>,
}

#[derive(Clone)]
pub struct FunctionData<'a> {
    pub name: String,
    pub params: Vec<String>,
    pub body: &'a Stmt<'a>,
}

#[derive(Clone)]
pub enum Value<'a> {
    Nil,
    Number(f64),
    String(String),
    Function(Rc<FunctionData<'a>>),
    Native(Rc<NativeFn>),
    Struct(Rc<RefCell<StructData<'a>>>),
    Array(Rc<RefCell<ArrayData<'a>>>),
    Map(Rc<RefCell<MapData<'a>>>),
}

impl<'a> Value<'a> {
    /// Truthiness: Nil is truthy (a documented oddity kept
    /// faithfully — see DESIGN.md open-question resolution), Number is
    /// truthy when non-zero, String when non-empty, aggregates always.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Function(_) | Value::Native(_) | Value::Struct(_) | Value::Array(_) | Value::Map(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Native(_) => "native",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Kind-preserving clone used for multi-name declarations and
    /// struct field writes: aggregates are cloned by
    /// reference count, not deep-copied, matching their general
    /// reference semantics in the source language.
    pub fn clone_kind_preserving(&self) -> Self {
        self.clone()
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n.is_nan() {
        return "nan".to_string();
    }
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

impl<'a> fmt::Display for Value<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{s}"),
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Native(_) => write!(f, "<native function>"),
            Value::Struct(s) => {
                let s = s.borrow();
                write!(f, "{} {{ ", s.type_name)?;
                for (i, (k, v)) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, " }}")
            }
            Value::Array(a) => {
                let a = a.borrow();
                write!(f, "[")?;
                for (i, v) in a.elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                let m = m.borrow();
                write!(f, "{{")?;
                for (i, (k, v)) in m.entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_truthy() {
        assert!(Value::Nil.is_truthy());
    }

    #[test]
    fn number_truthiness_is_nonzero() {
        assert!(Value::Number(1.0).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
    }

    #[test]
    fn string_truthiness_is_nonempty() {
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
    }

    #[test]
    fn integral_numbers_format_without_decimal() {
        assert_eq!(format_number(14.0), "14");
        assert_eq!(format_number(2.5), "2.5");
    }
}
