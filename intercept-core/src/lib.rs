//! # intercept-core
//!
//! The dynamic object model the Intercept engine operates on.
//!
//! This crate has minimal dependencies and is what collaborators (key-value
//! observation, proxies, the interception engine itself) build against.
//!
//! # Object Model
//!
//! ## Types ([`Runtime`], [`TypeHandle`])
//!
//! Classes form a single-inheritance tree rooted at one root class. Each class
//! has a metaclass holding its class methods. Every type owns a dispatch table
//! mapping [`Selector`]s to [`Method`]s; lookup walks the superclass chain.
//!
//! ## Objects ([`Object`])
//!
//! An object's runtime type pointer (`isa`) starts at its declared class and
//! may move to a private per-object subtype (see below). Destruction is
//! observable: `deinit` is dispatched, then destroy observers fire.
//!
//! ## Messaging ([`Runtime::dispatch`], [`Invocation`])
//!
//! Messages are dispatched through the receiver's current dispatch table.
//! Arguments and results are dynamically typed [`Value`]s checked against the
//! method's [`Signature`]. Unimplemented selectors are forwarded to
//! `forwardInvocation` when the receiver implements it.
//!
//! ## Specialization ([`Runtime::specialize`])
//!
//! Per-object behaviour is obtained by moving one object onto a private
//! subtype of its class. The subtype is shared by every [`ConsumerTag`] that
//! needs it and disposed once the last consumer releases it.
//!
//! ## Closures ([`ClosureHandle`])
//!
//! User closures with a declared shape, checked against method signatures
//! before they are attached.
//!
//! # Error Types
//!
//! - [`InterceptError`] - Top-level error type
//! - [`HookError`] - Attaching, applying and reverting hooks
//! - [`RuntimeError`] - Classes, protocols and subtypes
//! - [`InvokeError`] - Message dispatch

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod class;
mod closure;
mod dispatch;
mod error;
mod invocation;
mod object;
mod protocol;
mod runtime;
mod selector;
mod signature;
mod specialize;
mod types;
mod value;

// Re-exports
pub use class::ClassBuilder;
pub use closure::{ClosureHandle, ClosureShape, HookMode, Original};
pub use dispatch::{DispatchTarget, Method, MethodOrigin, Receiver, TargetFn};
pub use error::{BoxError, HookError, InterceptError, InvokeError, RuntimeError};
pub use invocation::{ForwardedMessage, Invocation};
pub use object::{AssociationKey, DestroyObserverId, Object, ObjectId, ObjectRef};
pub use protocol::{MethodDescription, ProtocolBuilder, ProtocolHandle};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
pub use selector::Selector;
pub use signature::{EncodingError, Signature};
pub use specialize::{ConsumerTag, SpecializationInfo};
pub use types::{TypeHandle, TypeKind};
pub use value::{Value, ValueKind};
