//! # intercept - Dynamic Method Interception
//!
//! `intercept` attaches closures to methods of live objects and classes at
//! runtime: before the original, after it, or in its place. Hooks compose,
//! can be reverted individually or in bulk, and never leak into objects they
//! were not attached to.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use intercept::prelude::*;
//!
//! let runtime = Runtime::new();
//! let counter = runtime.define_class("Counter")
//!     .method("increment", Signature::returning(ValueKind::Int), |_, _| Ok(Value::Int(1)))
//!     .register()?;
//! let object = runtime.instantiate(counter)?;
//!
//! let doubled = object.hooks().instead(
//!     "increment",
//!     ClosureHandle::replacement(Signature::returning(ValueKind::Int), |original, _, args| {
//!         Ok(Value::Int(original.call(args)?.as_int().unwrap_or_default() * 2))
//!     }),
//! )?;
//! assert_eq!(object.send("increment", &[])?, Value::Int(2));
//! doubled.revert();
//! ```
//!
//! ## Scopes
//!
//! | Façade | Modifies | Reached through |
//! |--------|----------|-----------------|
//! | [`ObjectHooks`] | one object | [`Hookable::hooks`] |
//! | [`ClassHooks`] | a class's own methods | [`RuntimeHooks::class_hooks`] |
//! | [`InstanceHooks`] | every instance of a class | [`RuntimeHooks::instance_hooks`] |
//!
//! Object hooks live on a private subtype of the object's class. The subtype
//! is shared with key-value observation and disposed once neither uses it.
//!
//! ## Composition
//!
//! Before closures run oldest first, then the newest instead closure (which
//! may call through to older ones and finally the original), then after
//! closures oldest first.
//!
//! ## Lifetime
//!
//! A [`HookToken`] stays attached until it is reverted, a bulk revert
//! matches it, or its object is destroyed. Dropping the token changes
//! nothing.

#![deny(clippy::pub_use, clippy::wildcard_imports)]
#![warn(missing_docs)]

mod context;
mod facade;
mod modes;
mod registry;
mod resolver;
mod scope;
mod token;

pub use intercept_core::{
    // Errors
    BoxError,
    // Object model
    ClassBuilder,
    // Closures
    ClosureHandle,
    ClosureShape,
    ConsumerTag,
    DispatchTarget,
    ForwardedMessage,
    HookError,
    HookMode,
    InterceptError,
    Invocation,
    InvokeError,
    Method,
    MethodDescription,
    MethodOrigin,
    Object,
    ObjectId,
    ObjectRef,
    Original,
    ProtocolBuilder,
    ProtocolHandle,
    Receiver,
    Runtime,
    RuntimeBuilder,
    RuntimeConfig,
    RuntimeError,
    Selector,
    Signature,
    SpecializationInfo,
    TypeHandle,
    TypeKind,
    Value,
    ValueKind,
};

// Engine
pub use facade::{
    ClassHooks, Hookable, InstanceHooks, ObjectHooks, RuntimeHooks, active_hook_count, add_method,
    context_count, hook, hooked_selectors, is_hooked, revert, revert_all, revert_all_for,
};
pub use modes::HookModes;
pub use resolver::find_protocol_method;
pub use scope::{HookScope, HookTarget};
pub use token::HookToken;

/// Key-value observation.
pub mod observation {
    #![allow(clippy::wildcard_imports)]
    pub use intercept_std::observation::*;
}

/// Safe key-value coding.
pub mod kvc {
    #![allow(clippy::wildcard_imports)]
    pub use intercept_std::kvc::*;
}

/// Forwarding proxies.
pub mod proxy {
    #![allow(clippy::wildcard_imports)]
    pub use intercept_std::proxy::*;
}

/// Standard hook closures.
pub mod hooks {
    #![allow(clippy::wildcard_imports)]
    pub use intercept_std::hooks::*;
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use intercept_std::testing::*;
}

/// Prelude module - common imports for Intercept.
///
/// # Usage
///
/// ```rust,ignore
/// use intercept::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ClosureHandle, HookError, HookMode, HookModes, HookScope, HookTarget, HookToken, Hookable,
        Object, ObjectRef, Original, Receiver, Runtime, RuntimeHooks, Selector, Signature, TypeHandle,
        Value, ValueKind,
    };
    pub use intercept_std::kvc::KeyValueCoding;
}
