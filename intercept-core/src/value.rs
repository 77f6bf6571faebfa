//! Dynamic argument and return values.

use crate::{object::ObjectRef, types::TypeHandle};
use std::{any::Any, fmt, sync::Arc};

/// The kind of a [`Value`], as declared by a [`Signature`](crate::Signature).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// No value.
    Void,
    /// A boolean.
    Bool,
    /// A signed 64-bit integer.
    Int,
    /// A 64-bit float.
    Float,
    /// An immutable string.
    Str,
    /// A reference to a runtime object.
    Object,
    /// A runtime type.
    Class,
    /// An opaque host value.
    Opaque,
    /// Wildcard: matches every kind.
    Any,
}

impl ValueKind {
    /// Whether a value of kind `found` may be passed where `self` is declared.
    ///
    /// `Void` doubles as nil for reference kinds.
    pub fn accepts(self, found: ValueKind) -> bool {
        self == ValueKind::Any
            || self == found
            || (found == ValueKind::Void && self.is_reference())
    }

    /// Whether values of this kind are references that may be nil.
    pub fn is_reference(self) -> bool {
        matches!(self, ValueKind::Object | ValueKind::Class | ValueKind::Opaque)
    }

    /// Compatibility between two declared kinds.
    pub fn is_compatible(self, other: ValueKind) -> bool {
        self == other || self == ValueKind::Any || other == ValueKind::Any
    }

    /// Single-character type encoding.
    pub fn encoding(self) -> char {
        match self {
            ValueKind::Void => 'v',
            ValueKind::Bool => 'B',
            ValueKind::Int => 'q',
            ValueKind::Float => 'd',
            ValueKind::Str => '*',
            ValueKind::Object => '@',
            ValueKind::Class => '#',
            ValueKind::Opaque => '^',
            ValueKind::Any => '?',
        }
    }

    /// Parse a single-character type encoding.
    pub fn from_encoding(c: char) -> Option<Self> {
        Some(match c {
            'v' => ValueKind::Void,
            'B' => ValueKind::Bool,
            'q' => ValueKind::Int,
            'd' => ValueKind::Float,
            '*' => ValueKind::Str,
            '@' => ValueKind::Object,
            '#' => ValueKind::Class,
            '^' => ValueKind::Opaque,
            '?' => ValueKind::Any,
            _ => return None,
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Void => "Void",
            ValueKind::Bool => "Bool",
            ValueKind::Int => "Int",
            ValueKind::Float => "Float",
            ValueKind::Str => "Str",
            ValueKind::Object => "Object",
            ValueKind::Class => "Class",
            ValueKind::Opaque => "Opaque",
            ValueKind::Any => "Any",
        };
        f.write_str(name)
    }
}

/// A dynamically typed argument or return value.
#[derive(Clone, Default)]
pub enum Value {
    /// No value.
    #[default]
    Void,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string.
    Str(Arc<str>),
    /// A runtime object.
    Object(ObjectRef),
    /// A runtime type.
    Class(TypeHandle),
    /// An opaque host value, compared by identity.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wrap a host value.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Opaque(Arc::new(value))
    }

    /// The zero value returned by no-op targets for a declared kind.
    pub fn default_for(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Int => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Str => Value::Str(Arc::from("")),
            _ => Value::Void,
        }
    }

    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Void => ValueKind::Void,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Object(_) => ValueKind::Object,
            Value::Class(_) => ValueKind::Class,
            Value::Opaque(_) => ValueKind::Opaque,
        }
    }

    /// Whether this is [`Value::Void`].
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// The boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The float payload, if any.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// The string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The object payload, if any.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The type payload, if any.
    pub fn as_class(&self) -> Option<TypeHandle> {
        match self {
            Value::Class(c) => Some(*c),
            _ => None,
        }
    }

    /// Downcast an opaque payload.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Opaque(any) => any.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("Void"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(o) => write!(f, "Object(#{})", o.id()),
            Value::Class(c) => write!(f, "Class({c:?})"),
            Value::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Void
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl From<TypeHandle> for Value {
    fn from(c: TypeHandle) -> Self {
        Value::Class(c)
    }
}
