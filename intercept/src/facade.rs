//! Scope façades.
//!
//! Three entry points share one engine:
//!
//! - [`ObjectHooks`] hooks a single object through its private subtype,
//! - [`ClassHooks`] hooks a class's own methods through its metaclass,
//! - [`InstanceHooks`] hooks every instance of a class.
//!
//! The free functions at the bottom work on any [`HookTarget`].
//!
//! # Example
//!
//! ```rust,ignore
//! use intercept::prelude::*;
//!
//! let token = counter.hooks().before(
//!     "increment",
//!     ClosureHandle::observer(|_, _| Ok(())),
//! )?;
//! assert!(counter.hooks().is_hooked("increment", HookModes::BEFORE));
//! token.revert();
//! ```

use crate::{
    modes::HookModes,
    registry::{AttachmentKind, HookRegistry},
    scope::HookTarget,
    token::HookToken,
};
use intercept_core::{ClosureHandle, HookError, HookMode, ObjectRef, Runtime, Selector, TypeHandle};

// ============================================================================
// Free functions
// ============================================================================

/// Attach `closure` to `selector` of `target` in `mode`.
pub fn hook(
    target: &HookTarget,
    selector: impl Into<Selector>,
    mode: HookMode,
    closure: ClosureHandle,
) -> Result<HookToken, HookError> {
    attach(target, selector.into(), AttachmentKind::Hook(mode), closure)
}

/// Implement a protocol method `target` declares but does not implement.
pub fn add_method(target: &HookTarget, selector: impl Into<Selector>, closure: ClosureHandle) -> Result<HookToken, HookError> {
    attach(target, selector.into(), AttachmentKind::Added, closure)
}

fn attach(target: &HookTarget, selector: Selector, kind: AttachmentKind, closure: ClosureHandle) -> Result<HookToken, HookError> {
    let token = HookToken::new(target, selector, kind, closure);
    token.apply()?;
    Ok(token)
}

/// Revert one token. Same as [`HookToken::revert`].
pub fn revert(token: &HookToken) {
    token.revert();
}

/// Revert every hook and added method on `target`. Returns how many were
/// reverted.
pub fn revert_all(target: &HookTarget) -> usize {
    HookRegistry::of(target.runtime()).revert_matching(target, None, HookModes::ALL)
}

/// Revert the hooks on `selector` of `target` whose mode is in `modes`.
pub fn revert_all_for(target: &HookTarget, selector: impl Into<Selector>, modes: HookModes) -> usize {
    HookRegistry::of(target.runtime()).revert_matching(target, Some(selector.into()), modes)
}

/// Whether `selector` of `target` has an active hook in any of `modes`.
pub fn is_hooked(target: &HookTarget, selector: impl Into<Selector>, modes: HookModes) -> bool {
    HookRegistry::of(target.runtime()).is_hooked(target, selector.into(), modes)
}

/// Selectors of `target` with at least one active hook or added method,
/// sorted by name.
pub fn hooked_selectors(target: &HookTarget) -> Vec<Selector> {
    HookRegistry::of(target.runtime()).hooked_selectors(target)
}

/// Number of live hook contexts in `runtime`.
pub fn context_count(runtime: &Runtime) -> usize {
    HookRegistry::of(runtime).context_count()
}

/// Number of active hooks and added methods in `runtime`.
pub fn active_hook_count(runtime: &Runtime) -> usize {
    HookRegistry::of(runtime).attachment_count()
}

// ============================================================================
// Façades
// ============================================================================

macro_rules! scope_operations {
    () => {
        /// Run `closure` before `selector`.
        pub fn before(&self, selector: impl Into<Selector>, closure: ClosureHandle) -> Result<HookToken, HookError> {
            hook(&self.target, selector, HookMode::Before, closure)
        }

        /// Run `closure` after `selector`.
        pub fn after(&self, selector: impl Into<Selector>, closure: ClosureHandle) -> Result<HookToken, HookError> {
            hook(&self.target, selector, HookMode::After, closure)
        }

        /// Run `closure` in place of `selector`.
        pub fn instead(&self, selector: impl Into<Selector>, closure: ClosureHandle) -> Result<HookToken, HookError> {
            hook(&self.target, selector, HookMode::Instead, closure)
        }

        /// Implement the protocol method `selector`.
        pub fn add_method(&self, selector: impl Into<Selector>, closure: ClosureHandle) -> Result<HookToken, HookError> {
            add_method(&self.target, selector, closure)
        }

        /// Whether `selector` has an active hook in any of `modes`.
        pub fn is_hooked(&self, selector: impl Into<Selector>, modes: HookModes) -> bool {
            is_hooked(&self.target, selector, modes)
        }

        /// Selectors with an active hook or added method.
        pub fn hooked_selectors(&self) -> Vec<Selector> {
            hooked_selectors(&self.target)
        }

        /// Revert everything attached through this scope.
        pub fn revert_all(&self) -> usize {
            revert_all(&self.target)
        }

        /// Revert the hooks on `selector` whose mode is in `modes`.
        pub fn revert_all_for(&self, selector: impl Into<Selector>, modes: HookModes) -> usize {
            revert_all_for(&self.target, selector, modes)
        }

        /// The underlying target.
        pub fn target(&self) -> &HookTarget {
            &self.target
        }
    };
}

/// Hooks on a single object.
#[derive(Debug, Clone)]
pub struct ObjectHooks {
    target: HookTarget,
}

impl ObjectHooks {
    /// Hooks on `object`.
    pub fn new(object: &ObjectRef) -> Self {
        Self {
            target: HookTarget::object(object),
        }
    }

    scope_operations!();

    /// Run `closure` when the object is destroyed, before its `deinit`.
    pub fn before_deinit(&self, closure: ClosureHandle) -> Result<HookToken, HookError> {
        self.before(Selector::deinit(), closure)
    }

    /// Run `closure` when the object is destroyed, after its `deinit`.
    pub fn after_deinit(&self, closure: ClosureHandle) -> Result<HookToken, HookError> {
        self.after(Selector::deinit(), closure)
    }

    /// Run `closure` in place of the object's `deinit`.
    pub fn instead_of_deinit(&self, closure: ClosureHandle) -> Result<HookToken, HookError> {
        self.instead(Selector::deinit(), closure)
    }
}

/// Hooks on the own (class-side) methods of a class.
#[derive(Debug, Clone)]
pub struct ClassHooks {
    target: HookTarget,
}

impl ClassHooks {
    /// Hooks on the class methods of `class`.
    pub fn new(runtime: &Runtime, class: TypeHandle) -> Result<Self, HookError> {
        Ok(Self {
            target: HookTarget::class(runtime, class)?,
        })
    }

    scope_operations!();
}

/// Hooks on every instance of a class.
#[derive(Debug, Clone)]
pub struct InstanceHooks {
    target: HookTarget,
}

impl InstanceHooks {
    /// Hooks on the instance methods of `class`.
    pub fn new(runtime: &Runtime, class: TypeHandle) -> Result<Self, HookError> {
        Ok(Self {
            target: HookTarget::instances(runtime, class)?,
        })
    }

    scope_operations!();
}

// ============================================================================
// Extension traits
// ============================================================================

/// Object-scope hooks from an object reference.
pub trait Hookable {
    /// Hooks on this object only.
    fn hooks(&self) -> ObjectHooks;
}

impl Hookable for ObjectRef {
    fn hooks(&self) -> ObjectHooks {
        ObjectHooks::new(self)
    }
}

/// Class and all-instances hooks from a runtime.
pub trait RuntimeHooks {
    /// Hooks on the class methods of `class`.
    fn class_hooks(&self, class: TypeHandle) -> Result<ClassHooks, HookError>;

    /// Hooks on every instance of `class`.
    fn instance_hooks(&self, class: TypeHandle) -> Result<InstanceHooks, HookError>;
}

impl RuntimeHooks for Runtime {
    fn class_hooks(&self, class: TypeHandle) -> Result<ClassHooks, HookError> {
        ClassHooks::new(self, class)
    }

    fn instance_hooks(&self, class: TypeHandle) -> Result<InstanceHooks, HookError> {
        InstanceHooks::new(self, class)
    }
}
