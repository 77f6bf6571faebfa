//! User closures attached to methods.
//!
//! A [`ClosureHandle`] pairs a callable with a declared shape so it can be
//! checked against a method signature before it is attached:
//!
//! | Constructor                         | Usable as         |
//! |-------------------------------------|-------------------|
//! | [`ClosureHandle::observer`]         | before, after     |
//! | [`ClosureHandle::observer_with`]    | before, after     |
//! | [`ClosureHandle::replacement`]      | instead           |
//! | [`ClosureHandle::implementation`]   | instead, added    |
//!
//! Handles compare by identity. Attaching the same handle twice to one
//! method in one mode is rejected; two handles wrapping equal closures are
//! distinct.

use crate::{
    dispatch::Receiver,
    error::{HookError, InvokeError},
    selector::Selector,
    signature::Signature,
    value::{Value, ValueKind},
};
use std::{fmt, sync::Arc};

/// When a closure runs relative to the original implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookMode {
    /// Before the original, with the call's arguments.
    Before,
    /// After the original, with the call's arguments.
    After,
    /// In place of the original, with access to it.
    Instead,
}

impl HookMode {
    /// Every mode.
    pub const ALL: [HookMode; 3] = [HookMode::Before, HookMode::After, HookMode::Instead];
}

impl fmt::Display for HookMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookMode::Before => "before",
            HookMode::After => "after",
            HookMode::Instead => "instead",
        })
    }
}

/// Access to the next-older implementation from inside an instead closure.
pub struct Original<'a> {
    next: &'a (dyn Fn(&[Value]) -> Result<Value, InvokeError> + 'a),
}

impl<'a> Original<'a> {
    /// Wrap the continuation.
    pub fn new(next: &'a (dyn Fn(&[Value]) -> Result<Value, InvokeError> + 'a)) -> Self {
        Self { next }
    }

    /// Call the next-older implementation with `args`.
    pub fn call(&self, args: &[Value]) -> Result<Value, InvokeError> {
        (self.next)(args)
    }
}

impl fmt::Debug for Original<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Original")
    }
}

/// Declared shape of a closure.
#[derive(Debug, Clone, PartialEq)]
pub enum ClosureShape {
    /// Takes the receiver and the raw arguments of any method.
    Observer,
    /// Takes the receiver and arguments of the listed kinds.
    ObserverWith(Vec<ValueKind>),
    /// Takes the original, the receiver and arguments; returns the result.
    Replacement(Signature),
    /// Takes the receiver and arguments; returns the result.
    Implementation(Signature),
}

type ObserverFn = dyn Fn(&Receiver<'_>, &[Value]) -> Result<(), InvokeError> + Send + Sync;
type ReplacementFn = dyn Fn(&Original<'_>, &Receiver<'_>, &[Value]) -> Result<Value, InvokeError> + Send + Sync;
type ImplementationFn = dyn Fn(&Receiver<'_>, &[Value]) -> Result<Value, InvokeError> + Send + Sync;

enum Body {
    Observe(Box<ObserverFn>),
    Replace(Box<ReplacementFn>),
    Implement(Box<ImplementationFn>),
}

struct ClosureInner {
    shape: ClosureShape,
    body: Body,
}

/// A user closure with a declared shape.
#[derive(Clone)]
pub struct ClosureHandle(Arc<ClosureInner>);

impl ClosureHandle {
    fn from_parts(shape: ClosureShape, body: Body) -> Self {
        Self(Arc::new(ClosureInner { shape, body }))
    }

    /// A before/after closure that accepts any method's arguments.
    pub fn observer<F>(f: F) -> Self
    where
        F: Fn(&Receiver<'_>, &[Value]) -> Result<(), InvokeError> + Send + Sync + 'static,
    {
        Self::from_parts(ClosureShape::Observer, Body::Observe(Box::new(f)))
    }

    /// A before/after closure that expects arguments of the given kinds.
    pub fn observer_with<F>(params: impl Into<Vec<ValueKind>>, f: F) -> Self
    where
        F: Fn(&Receiver<'_>, &[Value]) -> Result<(), InvokeError> + Send + Sync + 'static,
    {
        Self::from_parts(ClosureShape::ObserverWith(params.into()), Body::Observe(Box::new(f)))
    }

    /// An instead closure that may call through to the original.
    pub fn replacement<F>(signature: Signature, f: F) -> Self
    where
        F: Fn(&Original<'_>, &Receiver<'_>, &[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        Self::from_parts(ClosureShape::Replacement(signature), Body::Replace(Box::new(f)))
    }

    /// A standalone implementation: the body of an added method, or an
    /// instead closure that never calls the original.
    pub fn implementation<F>(signature: Signature, f: F) -> Self
    where
        F: Fn(&Receiver<'_>, &[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        Self::from_parts(ClosureShape::Implementation(signature), Body::Implement(Box::new(f)))
    }

    /// The declared shape.
    pub fn shape(&self) -> &ClosureShape {
        &self.0.shape
    }

    /// Identity comparison.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Stable identity for logging and bookkeeping.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Check that the closure can be attached in `mode` to a method with
    /// `signature`.
    pub fn check(&self, mode: HookMode, signature: &Signature, selector: Selector) -> Result<(), HookError> {
        let mismatch = |reason: String| HookError::SignatureMismatch {
            selector,
            expected: signature.clone(),
            reason,
        };
        match (mode, &self.0.shape) {
            (HookMode::Before | HookMode::After, ClosureShape::Observer) => Ok(()),
            (HookMode::Before | HookMode::After, ClosureShape::ObserverWith(params)) => {
                if signature.params_compatible(params) {
                    Ok(())
                } else {
                    Err(mismatch(format!("closure takes {params:?}")))
                }
            }
            (HookMode::Instead, ClosureShape::Replacement(declared) | ClosureShape::Implementation(declared)) => {
                if signature.is_compatible(declared) {
                    Ok(())
                } else {
                    Err(mismatch(format!("closure is {declared}")))
                }
            }
            (mode, shape) => Err(mismatch(format!("a {} closure cannot run {mode}", shape_name(shape)))),
        }
    }

    /// Check that the closure can implement an added method with `signature`.
    pub fn check_implementation(&self, signature: &Signature, selector: Selector) -> Result<(), HookError> {
        match &self.0.shape {
            ClosureShape::Implementation(declared) if signature.is_compatible(declared) => Ok(()),
            ClosureShape::Implementation(declared) => Err(HookError::SignatureMismatch {
                selector,
                expected: signature.clone(),
                reason: format!("closure is {declared}"),
            }),
            shape => Err(HookError::SignatureMismatch {
                selector,
                expected: signature.clone(),
                reason: format!("a {} closure cannot implement a method", shape_name(shape)),
            }),
        }
    }

    /// Run as a before/after closure. Fails for closures that produce a
    /// value, since they cannot be attached in those modes.
    pub fn observe(&self, receiver: &Receiver<'_>, args: &[Value]) -> Result<(), InvokeError> {
        match &self.0.body {
            Body::Observe(f) => f(receiver, args),
            Body::Replace(_) | Body::Implement(_) => Err(InvokeError::custom(format!(
                "a {} closure cannot run as an observer",
                shape_name(&self.0.shape)
            ))),
        }
    }

    /// Run as an instead closure.
    pub fn replace(&self, original: &Original<'_>, receiver: &Receiver<'_>, args: &[Value]) -> Result<Value, InvokeError> {
        match &self.0.body {
            Body::Replace(f) => f(original, receiver, args),
            Body::Implement(f) => f(receiver, args),
            Body::Observe(f) => {
                f(receiver, args)?;
                original.call(args)
            }
        }
    }

    /// Run as the body of an added method.
    pub fn implement(&self, receiver: &Receiver<'_>, args: &[Value]) -> Result<Value, InvokeError> {
        match &self.0.body {
            Body::Implement(f) => f(receiver, args),
            Body::Observe(f) => f(receiver, args).map(|()| Value::Void),
            Body::Replace(_) => Err(InvokeError::custom("replacement closure has no original to call")),
        }
    }
}

fn shape_name(shape: &ClosureShape) -> &'static str {
    match shape {
        ClosureShape::Observer | ClosureShape::ObserverWith(_) => "observer",
        ClosureShape::Replacement(_) => "replacement",
        ClosureShape::Implementation(_) => "implementation",
    }
}

impl fmt::Debug for ClosureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureHandle")
            .field("id", &format_args!("{:#x}", self.id()))
            .field("shape", &self.0.shape)
            .finish()
    }
}
