//! Calling-convention descriptors.

use crate::{
    error::InvokeError,
    selector::Selector,
    value::{Value, ValueKind},
};
use std::fmt;
use thiserror::Error;

/// Error parsing a compact type encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The encoding string was empty.
    #[error("empty type encoding")]
    Empty,
    /// A character does not name a kind.
    #[error("unknown type code `{0}` at position {1}")]
    UnknownCode(char, usize),
    /// `Void` appeared as a parameter.
    #[error("void is not a valid parameter kind (position {0})")]
    VoidParameter(usize),
}

/// Ordered parameter kinds plus a return kind.
///
/// The receiver is implicit and not part of the parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    params: Vec<ValueKind>,
    ret: ValueKind,
}

impl Signature {
    /// Create a signature.
    pub fn new(params: impl Into<Vec<ValueKind>>, ret: ValueKind) -> Self {
        Self {
            params: params.into(),
            ret,
        }
    }

    /// `() -> Void`.
    pub fn void() -> Self {
        Self::new(Vec::new(), ValueKind::Void)
    }

    /// `() -> ret`.
    pub fn returning(ret: ValueKind) -> Self {
        Self::new(Vec::new(), ret)
    }

    /// Parse a compact encoding: return code first, then one code per parameter.
    ///
    /// `"qq"` is `(Int) -> Int`, `"v"` is `() -> Void`.
    pub fn parse(encoding: &str) -> Result<Self, EncodingError> {
        let mut codes = encoding.chars().enumerate();
        let (_, first) = codes.next().ok_or(EncodingError::Empty)?;
        let ret = ValueKind::from_encoding(first).ok_or(EncodingError::UnknownCode(first, 0))?;
        let mut params = Vec::new();
        for (pos, c) in codes {
            let kind = ValueKind::from_encoding(c).ok_or(EncodingError::UnknownCode(c, pos))?;
            if kind == ValueKind::Void {
                return Err(EncodingError::VoidParameter(pos));
            }
            params.push(kind);
        }
        Ok(Self { params, ret })
    }

    /// Compact encoding, the inverse of [`Signature::parse`].
    pub fn encoding(&self) -> String {
        std::iter::once(self.ret)
            .chain(self.params.iter().copied())
            .map(ValueKind::encoding)
            .collect()
    }

    /// Parameter kinds in order.
    pub fn params(&self) -> &[ValueKind] {
        &self.params
    }

    /// Return kind.
    pub fn return_kind(&self) -> ValueKind {
        self.ret
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether the method returns nothing.
    pub fn is_void_return(&self) -> bool {
        self.ret == ValueKind::Void
    }

    /// Human-readable parameter type names.
    pub fn argument_types(&self) -> Vec<String> {
        self.params.iter().map(ToString::to_string).collect()
    }

    /// Whether two descriptors can stand in for one another.
    pub fn is_compatible(&self, other: &Signature) -> bool {
        self.params.len() == other.params.len()
            && self.ret.is_compatible(other.ret)
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.is_compatible(*b))
    }

    /// Whether a parameter list fits this signature.
    pub fn params_compatible(&self, params: &[ValueKind]) -> bool {
        self.params.len() == params.len()
            && self
                .params
                .iter()
                .zip(params)
                .all(|(a, b)| a.is_compatible(*b))
    }

    /// Validate arguments supplied for `selector`.
    pub fn check_args(&self, selector: Selector, args: &[Value]) -> Result<(), InvokeError> {
        if args.len() != self.params.len() {
            return Err(InvokeError::ArgumentCount {
                selector,
                expected: self.params.len(),
                found: args.len(),
            });
        }
        for (index, (declared, arg)) in self.params.iter().zip(args).enumerate() {
            if !declared.accepts(arg.kind()) {
                return Err(InvokeError::ArgumentType {
                    selector,
                    index,
                    expected: *declared,
                    found: arg.kind(),
                });
            }
        }
        Ok(())
    }

    /// Validate a returned value for `selector`.
    pub fn check_return(&self, selector: Selector, value: &Value) -> Result<(), InvokeError> {
        if self.ret.accepts(value.kind()) {
            Ok(())
        } else {
            Err(InvokeError::ReturnType {
                selector,
                expected: self.ret,
                found: value.kind(),
            })
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let sig = Signature::parse("q*q").unwrap();
        assert_eq!(sig.params(), &[ValueKind::Str, ValueKind::Int]);
        assert_eq!(sig.return_kind(), ValueKind::Int);
        assert_eq!(sig.to_string(), "(Str, Int) -> Int");
        assert_eq!(sig.encoding(), "q*q");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Signature::parse(""), Err(EncodingError::Empty));
        assert_eq!(Signature::parse("qx"), Err(EncodingError::UnknownCode('x', 1)));
        assert_eq!(Signature::parse("qv"), Err(EncodingError::VoidParameter(1)));
    }

    #[test]
    fn test_check_args() {
        let sig = Signature::new([ValueKind::Int], ValueKind::Void);
        let sel = Selector::new("add");
        assert!(sig.check_args(sel, &[Value::Int(1)]).is_ok());
        assert!(matches!(
            sig.check_args(sel, &[]),
            Err(InvokeError::ArgumentCount { expected: 1, found: 0, .. })
        ));
        assert!(matches!(
            sig.check_args(sel, &[Value::from("1")]),
            Err(InvokeError::ArgumentType { index: 0, .. })
        ));
    }

    #[test]
    fn test_any_is_compatible() {
        let declared = Signature::new([ValueKind::Any], ValueKind::Int);
        let closure = Signature::new([ValueKind::Str], ValueKind::Any);
        assert!(declared.is_compatible(&closure));
        assert!(!declared.is_compatible(&Signature::returning(ValueKind::Int)));
    }
}
