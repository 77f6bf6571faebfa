//! Hook scopes and targets.

use intercept_core::{HookError, Object, ObjectId, ObjectRef, Runtime, TypeHandle, TypeKind};
use std::{fmt, sync::Weak};

/// Which dispatch table a hook modifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookScope {
    /// One object, through its private subtype.
    Object,
    /// A class's own (static) methods, through its metaclass.
    Class,
    /// Every instance of a class, through the class itself.
    Instances,
}

impl fmt::Display for HookScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookScope::Object => "object",
            HookScope::Class => "class",
            HookScope::Instances => "instances",
        })
    }
}

/// Something hooks can be attached to.
#[derive(Debug, Clone)]
pub enum HookTarget {
    /// A single object.
    Object(ObjectRef),
    /// A class's own methods.
    Class {
        /// The runtime the class belongs to.
        runtime: Runtime,
        /// A shared class.
        class: TypeHandle,
    },
    /// All instances of a class.
    Instances {
        /// The runtime the class belongs to.
        runtime: Runtime,
        /// A shared class.
        class: TypeHandle,
    },
}

impl HookTarget {
    /// Target a single object.
    pub fn object(object: &ObjectRef) -> Self {
        HookTarget::Object(object.clone())
    }

    /// Target the own methods of `class`.
    pub fn class(runtime: &Runtime, class: TypeHandle) -> Result<Self, HookError> {
        ensure_shared(runtime, class)?;
        Ok(HookTarget::Class {
            runtime: runtime.clone(),
            class,
        })
    }

    /// Target every instance of `class`.
    pub fn instances(runtime: &Runtime, class: TypeHandle) -> Result<Self, HookError> {
        ensure_shared(runtime, class)?;
        Ok(HookTarget::Instances {
            runtime: runtime.clone(),
            class,
        })
    }

    /// The runtime of the target.
    pub fn runtime(&self) -> &Runtime {
        match self {
            HookTarget::Object(object) => object.runtime(),
            HookTarget::Class { runtime, .. } | HookTarget::Instances { runtime, .. } => runtime,
        }
    }

    /// The target's scope.
    pub fn scope(&self) -> HookScope {
        match self {
            HookTarget::Object(_) => HookScope::Object,
            HookTarget::Class { .. } => HookScope::Class,
            HookTarget::Instances { .. } => HookScope::Instances,
        }
    }

    /// The shared class whose protocols describe the target's methods.
    pub fn declared_class(&self) -> TypeHandle {
        match self {
            HookTarget::Object(object) => object.class(),
            HookTarget::Class { class, .. } | HookTarget::Instances { class, .. } => *class,
        }
    }

    /// The type hooks of this target currently live on, without creating
    /// anything. An object without a private subtype has none.
    pub(crate) fn current_type(&self) -> Option<TypeHandle> {
        match self {
            HookTarget::Object(object) => object
                .runtime()
                .specialization_of(object.id())
                .map(|info| info.subtype),
            HookTarget::Class { runtime, class } => runtime.metaclass(*class),
            HookTarget::Instances { class, .. } => Some(*class),
        }
    }

    pub(crate) fn downgrade(&self) -> TokenTarget {
        match self {
            HookTarget::Object(object) => TokenTarget::Object {
                id: object.id(),
                object: object.downgrade(),
            },
            HookTarget::Class { class, .. } => TokenTarget::Class(*class),
            HookTarget::Instances { class, .. } => TokenTarget::Instances(*class),
        }
    }
}

/// What a token remembers about its target. Never keeps an object alive.
#[derive(Debug, Clone)]
pub(crate) enum TokenTarget {
    Object { id: ObjectId, object: Weak<Object> },
    Class(TypeHandle),
    Instances(TypeHandle),
}

impl TokenTarget {
    pub(crate) fn scope(&self) -> HookScope {
        match self {
            TokenTarget::Object { .. } => HookScope::Object,
            TokenTarget::Class(_) => HookScope::Class,
            TokenTarget::Instances(_) => HookScope::Instances,
        }
    }

    pub(crate) fn upgrade(&self, runtime: &Runtime) -> Result<HookTarget, HookError> {
        match self {
            TokenTarget::Object { object, .. } => object
                .upgrade()
                .map(HookTarget::Object)
                .ok_or(HookError::TargetDeallocated),
            TokenTarget::Class(class) => HookTarget::class(runtime, *class),
            TokenTarget::Instances(class) => HookTarget::instances(runtime, *class),
        }
    }
}

fn ensure_shared(runtime: &Runtime, class: TypeHandle) -> Result<(), HookError> {
    match runtime.type_kind(class) {
        Some(TypeKind::Shared) => Ok(()),
        Some(kind) => Err(HookError::UnsupportedTarget(format!(
            "`{}` is not a shared class ({kind:?})",
            runtime.type_name(class).unwrap_or_default()
        ))),
        None => Err(HookError::UnsupportedTarget(format!("{class:?} is not a live type"))),
    }
}
