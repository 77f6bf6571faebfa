//! Error types for Intercept.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`InterceptError`] - Top-level error type for all Intercept operations
//! - [`HookError`] - Errors from attaching, applying or reverting hooks
//! - [`RuntimeError`] - Errors from defining classes, protocols and subtypes
//! - [`InvokeError`] - Errors during message dispatch

use crate::{
    closure::HookMode,
    selector::Selector,
    signature::Signature,
    types::TypeHandle,
    value::ValueKind,
};
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all Intercept operations.
#[derive(Error, Debug)]
pub enum InterceptError {
    /// An error occurred while attaching or reverting a hook.
    #[error("hook error: {0}")]
    Hook(#[from] HookError),

    /// An error occurred in the object model.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// An error occurred while dispatching a message.
    #[error("invoke error: {0}")]
    Invoke(#[from] InvokeError),

    /// A custom error occurred.
    #[error(transparent)]
    Custom(BoxError),
}

/// Errors surfaced by the interception engine.
///
/// All of these are programmer-contract violations; none is transient.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HookError {
    /// The selector resolves to nothing in the type's hierarchy and no
    /// conformed protocol declares it.
    #[error("method `{selector}` not found on `{type_name}`")]
    MethodNotFound {
        /// Name of the type that was searched.
        type_name: String,
        /// The missing selector.
        selector: Selector,
    },

    /// No conformed protocol declares the selector an added method targets.
    #[error("no protocol conformed to by `{type_name}` declares `{selector}`")]
    NoMatchingProtocolMethod {
        /// Name of the type that was searched.
        type_name: String,
        /// The selector to add.
        selector: Selector,
    },

    /// The closure's declared shape does not fit the method's signature.
    #[error("closure for `{selector}` does not match {expected}: {reason}")]
    SignatureMismatch {
        /// The hooked selector.
        selector: Selector,
        /// The method's calling-convention descriptor.
        expected: Signature,
        /// What did not match.
        reason: String,
    },

    /// The same closure is already attached to this method in this mode.
    #[error("closure already attached to `{selector}` as {mode}")]
    DuplicateClosure {
        /// The hooked selector.
        selector: Selector,
        /// The mode the closure is attached in.
        mode: HookMode,
    },

    /// The private subtype for an object could not be created.
    #[error("subclass creation failed: {0}")]
    SubclassCreationFailed(String),

    /// `apply()` was called on a token that is already active.
    #[error("hook token is already active")]
    AlreadyActive,

    /// The method is already implemented, so it cannot be added.
    #[error("method `{selector}` is already implemented by `{type_name}`")]
    MethodAlreadyImplemented {
        /// Name of the type that implements it.
        type_name: String,
        /// The selector.
        selector: Selector,
    },

    /// The target cannot be hooked at the requested scope.
    #[error("unsupported hook target: {0}")]
    UnsupportedTarget(String),

    /// The hooked object no longer exists.
    #[error("hook target has been deallocated")]
    TargetDeallocated,

    /// Bookkeeping disagrees with the dispatch tables. Should be unreachable.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

/// Errors from the object model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A class with this name is already registered.
    #[error("class `{0}` already exists")]
    ClassExists(String),

    /// A protocol with this name is already registered.
    #[error("protocol `{0}` already exists")]
    ProtocolExists(String),

    /// The handle does not name a live type.
    #[error("unknown type {0:?}")]
    UnknownType(TypeHandle),

    /// The handle does not name a protocol.
    #[error("unknown protocol #{0}")]
    UnknownProtocol(u32),

    /// A class does not implement a required protocol method.
    #[error("class `{class}` does not implement required method `{selector}` of `{protocol}`")]
    MissingRequiredMethod {
        /// The class being registered.
        class: String,
        /// The protocol declaring the method.
        protocol: String,
        /// The missing selector.
        selector: Selector,
    },

    /// Metaclasses and specialized subtypes cannot be instantiated directly.
    #[error("type `{0}` cannot be instantiated")]
    NotInstantiable(String),

    /// The type-creation primitive could not produce a new subtype.
    #[error("subclass creation failed: {0}")]
    SubclassCreationFailed(String),
}

/// Errors that can occur while dispatching a message.
#[derive(Error, Debug, Clone)]
pub enum InvokeError {
    /// No implementation and no forwarding target for the selector.
    #[error("`{type_name}` does not recognize selector `{selector}`")]
    UnrecognizedSelector {
        /// Name of the receiver's type.
        type_name: String,
        /// The selector sent.
        selector: Selector,
    },

    /// Wrong number of arguments.
    #[error("`{selector}` expects {expected} arguments, got {found}")]
    ArgumentCount {
        /// The selector sent.
        selector: Selector,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        found: usize,
    },

    /// An argument has the wrong kind.
    #[error("argument {index} of `{selector}` expects {expected}, got {found}")]
    ArgumentType {
        /// The selector sent.
        selector: Selector,
        /// Zero-based argument position.
        index: usize,
        /// Declared kind.
        expected: ValueKind,
        /// Supplied kind.
        found: ValueKind,
    },

    /// An implementation returned a value of the wrong kind.
    #[error("`{selector}` must return {expected}, returned {found}")]
    ReturnType {
        /// The selector sent.
        selector: Selector,
        /// Declared kind.
        expected: ValueKind,
        /// Returned kind.
        found: ValueKind,
    },

    /// The receiver was destroyed before the message could be delivered.
    #[error("receiver has been deallocated")]
    Deallocated,

    /// A custom error raised by an implementation or closure.
    #[error("{0}")]
    Custom(String),
}

impl InvokeError {
    /// Create a custom invocation error from any displayable message.
    pub fn custom(message: impl std::fmt::Display) -> Self {
        InvokeError::Custom(message.to_string())
    }
}

// Convenience conversions
impl From<BoxError> for InterceptError {
    fn from(err: BoxError) -> Self {
        InterceptError::Custom(err)
    }
}

impl From<RuntimeError> for HookError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::SubclassCreationFailed(reason) => HookError::SubclassCreationFailed(reason),
            other => HookError::InternalInconsistency(other.to_string()),
        }
    }
}
