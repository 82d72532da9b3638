//! Resolved static types
//!
//! The type checker annotates every expression with one of these. Arrays are
//! one-dimensional; their element type is one of the primitives or a class.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ty {
    Int,
    Float,
    Boolean,
    Void,
    /// The type of the `null` literal, a subtype of every reference type.
    Null,
    Class(String),
    Array(Box<Ty>),
}

impl Ty {
    pub fn object() -> Self {
        Ty::Class(crate::OBJECT_CLASS.to_string())
    }

    /// Source-level spelling of the type, e.g. `int[]` or `Shape`.
    pub fn name(&self) -> String {
        match self {
            Ty::Int => "int".to_string(),
            Ty::Float => "float".to_string(),
            Ty::Boolean => "boolean".to_string(),
            Ty::Void => "void".to_string(),
            Ty::Null => "<null>".to_string(),
            Ty::Class(name) => name.clone(),
            Ty::Array(elem) => format!("{}[]", elem.name()),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Ty::Null | Ty::Class(_) | Ty::Array(_))
    }

    /// The type name used to form dispatch-table labels: a class maps to its
    /// own name, an array to `<elem>_Array`. Non-reference types have no
    /// dispatch table.
    pub fn vtable_type_name(&self) -> Option<String> {
        match self {
            Ty::Class(name) => Some(name.clone()),
            Ty::Array(elem) => Some(format!("{}_Array", elem.name())),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
