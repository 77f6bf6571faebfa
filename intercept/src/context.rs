//! Hook contexts.
//!
//! A [`HookContext`] is the shared state of every closure attached to one
//! (type, selector, scope) triple. It captures the superseded implementation
//! once, installs one composed dispatch target, and keeps the closures in
//! three insertion-ordered sets.
//!
//! # Composition
//!
//! At call time the composed target runs
//!
//! 1. every `before` closure, oldest first,
//! 2. the newest `instead` closure, whose [`Original`] reaches the next older
//!    one and finally the captured original (the original itself when no
//!    `instead` closure is attached),
//! 3. every `after` closure, oldest first.
//!
//! The composed target reads a snapshot of the sets on each call, so
//! attaching or detaching never reinstalls it and calls already in flight
//! finish with the sets they started with.

use crate::{modes::HookModes, scope::HookScope};
use intercept_core::{
    ClosureHandle, ConsumerTag, DispatchTarget, HookError, HookMode, InvokeError, Method, Original,
    Receiver, Runtime, Selector, Signature, TypeHandle, Value, ValueKind,
};
use parking_lot::RwLock;
use std::{fmt, sync::Arc};

/// Identity of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ContextKey {
    pub(crate) ty: TypeHandle,
    pub(crate) selector: Selector,
    pub(crate) scope: HookScope,
}

/// What a composed target falls through to.
#[derive(Clone)]
pub(crate) enum OriginalTarget {
    /// The entry the hooked type itself held.
    Own(Method),
    /// Nothing on the hooked type; the implementation is looked up from
    /// `parent` at call time. `parent` is captured up front so a call still
    /// running after a private subtype is disposed keeps its way up.
    Inherited { parent: TypeHandle },
    /// Declared by a protocol but implemented nowhere.
    NoOp(ValueKind),
}

impl fmt::Debug for OriginalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginalTarget::Own(method) => write!(f, "Own({:?})", method.target),
            OriginalTarget::Inherited { parent } => write!(f, "Inherited({parent:?})"),
            OriginalTarget::NoOp(kind) => write!(f, "NoOp({kind})"),
        }
    }
}

#[derive(Default)]
struct ClosureSets {
    before: Vec<ClosureHandle>,
    after: Vec<ClosureHandle>,
    instead: Vec<ClosureHandle>,
}

impl ClosureSets {
    fn set(&self, mode: HookMode) -> &Vec<ClosureHandle> {
        match mode {
            HookMode::Before => &self.before,
            HookMode::After => &self.after,
            HookMode::Instead => &self.instead,
        }
    }

    fn set_mut(&mut self, mode: HookMode) -> &mut Vec<ClosureHandle> {
        match mode {
            HookMode::Before => &mut self.before,
            HookMode::After => &mut self.after,
            HookMode::Instead => &mut self.instead,
        }
    }

    fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty() && self.instead.is_empty()
    }

    fn copy(&self) -> Self {
        Self {
            before: self.before.clone(),
            after: self.after.clone(),
            instead: self.instead.clone(),
        }
    }
}

/// State shared between a context and its composed target.
struct ContextShared {
    selector: Selector,
    signature: Signature,
    original: OriginalTarget,
    sets: RwLock<Arc<ClosureSets>>,
}

impl ContextShared {
    fn snapshot(&self) -> Arc<ClosureSets> {
        self.sets.read().clone()
    }

    fn call(&self, receiver: &Receiver<'_>, args: &[Value]) -> Result<Value, InvokeError> {
        let sets = self.snapshot();
        for closure in &sets.before {
            closure.observe(receiver, args)?;
        }
        let value = self.call_instead(&sets.instead, receiver, args)?;
        for closure in &sets.after {
            closure.observe(receiver, args)?;
        }
        Ok(value)
    }

    fn call_instead(
        &self,
        chain: &[ClosureHandle],
        receiver: &Receiver<'_>,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        match chain.split_last() {
            Some((newest, older)) => {
                let next = |args: &[Value]| -> Result<Value, InvokeError> {
                    self.signature.check_args(self.selector, args)?;
                    self.call_instead(older, receiver, args)
                };
                newest.replace(&Original::new(&next), receiver, args)
            }
            None => self.call_original(receiver, args),
        }
    }

    fn call_original(&self, receiver: &Receiver<'_>, args: &[Value]) -> Result<Value, InvokeError> {
        match &self.original {
            OriginalTarget::Own(method) => method.target.invoke(receiver, args),
            OriginalTarget::Inherited { parent } => {
                receiver.runtime().send_from(receiver, *parent, self.selector, args)
            }
            OriginalTarget::NoOp(ret) => Ok(Value::default_for(*ret)),
        }
    }
}

/// Shared state of all closures attached to one (type, selector, scope).
pub(crate) struct HookContext {
    key: ContextKey,
    shared: Arc<ContextShared>,
    installed: DispatchTarget,
}

/// Values a context gives up when it changes. Dropped by the caller once no
/// engine lock is held, since closures may own objects.
#[must_use]
pub(crate) struct Released {
    _sets: Option<Arc<ClosureSets>>,
    _method: Option<Method>,
}

impl Released {
    pub(crate) fn nothing() -> Self {
        Self {
            _sets: None,
            _method: None,
        }
    }
}

impl HookContext {
    /// Create the context and install its composed target on `key.ty`.
    pub(crate) fn install(
        runtime: &Runtime,
        key: ContextKey,
        signature: Signature,
        original: OriginalTarget,
    ) -> Result<Arc<HookContext>, HookError> {
        let shared = Arc::new(ContextShared {
            selector: key.selector,
            signature: signature.clone(),
            original,
            sets: RwLock::new(Arc::new(ClosureSets::default())),
        });
        let body = shared.clone();
        let installed = DispatchTarget::new(move |receiver, args| body.call(receiver, args));
        let method = Method::synthesized(key.selector, signature, installed.clone(), ConsumerTag::INTERCEPTION);
        let _superseded = runtime.install_method(key.ty, method)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            ty = ?key.ty,
            selector = %key.selector,
            scope = %key.scope,
            original = ?shared.original,
            "created hook context"
        );
        Ok(Arc::new(HookContext {
            key,
            shared,
            installed,
        }))
    }

    /// Add `closure` to the set for `mode`.
    pub(crate) fn attach(&self, closure: &ClosureHandle, mode: HookMode) -> Result<Released, HookError> {
        closure.check(mode, &self.shared.signature, self.key.selector)?;
        let mut sets = self.shared.sets.write();
        if sets.set(mode).iter().any(|c| ClosureHandle::ptr_eq(c, closure)) {
            return Err(HookError::DuplicateClosure {
                selector: self.key.selector,
                mode,
            });
        }
        let mut next = sets.copy();
        next.set_mut(mode).push(closure.clone());
        let previous = std::mem::replace(&mut *sets, Arc::new(next));
        #[cfg(feature = "tracing")]
        tracing::debug!(selector = %self.key.selector, %mode, closure = closure.id(), "attached closure");
        Ok(Released {
            _sets: Some(previous),
            _method: None,
        })
    }

    /// Remove `closure` from the set for `mode`. Reports whether it was there.
    pub(crate) fn detach(&self, closure: &ClosureHandle, mode: HookMode) -> (bool, Released) {
        let mut sets = self.shared.sets.write();
        let Some(index) = sets.set(mode).iter().position(|c| ClosureHandle::ptr_eq(c, closure)) else {
            return (false, Released::nothing());
        };
        let mut next = sets.copy();
        next.set_mut(mode).remove(index);
        let previous = std::mem::replace(&mut *sets, Arc::new(next));
        #[cfg(feature = "tracing")]
        tracing::debug!(selector = %self.key.selector, %mode, closure = closure.id(), "detached closure");
        (
            true,
            Released {
                _sets: Some(previous),
                _method: None,
            },
        )
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.shared.sets.read().is_empty()
    }

    /// Modes with at least one attached closure.
    pub(crate) fn modes(&self) -> HookModes {
        let sets = self.shared.snapshot();
        HookMode::ALL
            .into_iter()
            .filter(|mode| !sets.set(*mode).is_empty())
            .fold(HookModes::empty(), |acc, mode| acc | HookModes::from(mode))
    }

    /// Undo the installation.
    ///
    /// If the composed target is still the installed entry the superseded
    /// entry is put back, or the entry is removed when there was none (or
    /// when `discard_original` says the captured entry is an added method
    /// that has since been reverted). If another consumer has wrapped the
    /// composed target it stays in place and, with no closures left, simply
    /// forwards to the original.
    pub(crate) fn teardown(
        &self,
        runtime: &Runtime,
        discard_original: impl FnOnce(&DispatchTarget) -> bool,
    ) -> Released {
        let key = self.key;
        if !runtime.is_installed(key.ty, key.selector, &self.installed) {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                ty = ?key.ty,
                selector = %key.selector,
                "composed target wrapped by another consumer; leaving it as pass-through"
            );
            return Released::nothing();
        }
        let restored = match &self.shared.original {
            OriginalTarget::Own(method) if !discard_original(&method.target) => {
                runtime.install_method(key.ty, method.clone())
            }
            _ => runtime.remove_method(key.ty, key.selector),
        };
        match restored {
            Ok(superseded) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(ty = ?key.ty, selector = %key.selector, scope = %key.scope, "tore down hook context");
                Released {
                    _sets: None,
                    _method: superseded,
                }
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(ty = ?key.ty, selector = %key.selector, error = %_err, "could not restore original");
                Released::nothing()
            }
        }
    }
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("key", &self.key)
            .field("original", &self.shared.original)
            .field("modes", &self.modes())
            .finish()
    }
}
