//! Method and protocol resolution.
//!
//! Before anything is installed the engine needs the method's calling
//! convention and a way back to whatever implementation it supersedes. A
//! method implemented somewhere in the hierarchy provides both. A method
//! that is only declared by a conformed protocol provides the signature;
//! its "original" is a no-op returning the zero value.
//!
//! Protocols are searched in conformance order: the class's own protocols
//! first, then each superclass's, each protocol depth-first through the
//! protocols it inherits.

use crate::context::OriginalTarget;
use intercept_core::{
    HookError, MethodDescription, ProtocolHandle, Runtime, Selector, Signature, TypeHandle,
};

/// The signature of a method about to be hooked and what it supersedes.
#[derive(Debug, Clone)]
pub(crate) struct Resolution {
    pub(crate) signature: Signature,
    pub(crate) original: OriginalTarget,
}

/// Find the first protocol conformed to by `class` or its superclasses that
/// declares `selector` as an instance method, or as a class method when
/// `class_method` is set.
pub fn find_protocol_method(
    runtime: &Runtime,
    class: TypeHandle,
    selector: Selector,
    class_method: bool,
) -> Option<(ProtocolHandle, MethodDescription)> {
    runtime
        .ancestry(class)
        .into_iter()
        .flat_map(|ty| runtime.conformed_protocols(ty))
        .find_map(|protocol| {
            runtime
                .protocol_closure_methods(protocol)
                .into_iter()
                .find(|(_, m)| m.selector == selector && m.class_method == class_method)
        })
}

/// Resolve `selector` for hooking on `ty`.
///
/// `declared_class` is the shared class whose protocols are consulted and
/// `class_method` selects class-side declarations.
pub(crate) fn resolve_hook(
    runtime: &Runtime,
    ty: TypeHandle,
    declared_class: TypeHandle,
    selector: Selector,
    class_method: bool,
) -> Result<Resolution, HookError> {
    if let Some((owner, method)) = runtime.lookup_with_owner(ty, selector) {
        let signature = method.signature.clone();
        let original = if owner == ty {
            OriginalTarget::Own(method)
        } else {
            let parent = runtime.superclass(ty).ok_or_else(|| {
                HookError::InternalInconsistency(format!("`{selector}` inherited by a type with no superclass"))
            })?;
            OriginalTarget::Inherited { parent }
        };
        return Ok(Resolution { signature, original });
    }
    match find_protocol_method(runtime, declared_class, selector, class_method) {
        Some((_protocol, description)) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                %selector,
                protocol = ?runtime.protocol_name(_protocol),
                "hooking protocol method with no implementation"
            );
            Ok(Resolution {
                original: OriginalTarget::NoOp(description.signature.return_kind()),
                signature: description.signature,
            })
        }
        None => Err(HookError::MethodNotFound {
            type_name: runtime.type_name(declared_class).unwrap_or_default(),
            selector,
        }),
    }
}

/// Resolve the signature of a method to add on `ty`.
///
/// Fails if the method is implemented anywhere in the hierarchy, or if no
/// conformed protocol declares it.
pub(crate) fn resolve_added(
    runtime: &Runtime,
    ty: TypeHandle,
    declared_class: TypeHandle,
    selector: Selector,
    class_method: bool,
) -> Result<Signature, HookError> {
    if let Some((owner, _)) = runtime.lookup_with_owner(ty, selector) {
        return Err(HookError::MethodAlreadyImplemented {
            type_name: runtime.type_name(owner).unwrap_or_default(),
            selector,
        });
    }
    find_protocol_method(runtime, declared_class, selector, class_method)
        .map(|(_, description)| description.signature)
        .ok_or_else(|| HookError::NoMatchingProtocolMethod {
            type_name: runtime.type_name(declared_class).unwrap_or_default(),
            selector,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use intercept_core::{Value, ValueKind};

    fn fixture() -> (Runtime, TypeHandle, TypeHandle) {
        let runtime = Runtime::new();
        let root_protocol = runtime
            .define_protocol("Named")
            .optional("nickname", Signature::returning(ValueKind::Str))
            .register()
            .unwrap();
        let delegate = runtime
            .define_protocol("Delegate")
            .inherits(root_protocol)
            .optional("didFinish", Signature::new([ValueKind::Int], ValueKind::Void))
            .optional_class_method("shared", Signature::returning(ValueKind::Object))
            .register()
            .unwrap();
        let base = runtime
            .define_class("Base")
            .conforms_to(delegate)
            .method("run", Signature::returning(ValueKind::Int), |_, _| Ok(Value::Int(1)))
            .register()
            .unwrap();
        let derived = runtime.define_class("Derived").superclass(base).register().unwrap();
        (runtime, base, derived)
    }

    #[test]
    fn test_protocols_of_superclasses_and_parents() {
        let (runtime, _, derived) = fixture();
        let (_, found) = find_protocol_method(&runtime, derived, "nickname".into(), false).unwrap();
        assert_eq!(found.signature, Signature::returning(ValueKind::Str));
        assert!(find_protocol_method(&runtime, derived, "shared".into(), false).is_none());
        assert!(find_protocol_method(&runtime, derived, "shared".into(), true).is_some());
    }

    #[test]
    fn test_resolve_hook_kinds() {
        let (runtime, base, derived) = fixture();
        let own = resolve_hook(&runtime, base, base, "run".into(), false).unwrap();
        assert!(matches!(own.original, OriginalTarget::Own(_)));
        let inherited = resolve_hook(&runtime, derived, derived, "run".into(), false).unwrap();
        assert!(matches!(inherited.original, OriginalTarget::Inherited { parent } if parent == base));
        let declared = resolve_hook(&runtime, derived, derived, "didFinish".into(), false).unwrap();
        assert!(matches!(declared.original, OriginalTarget::NoOp(ValueKind::Void)));
        let err = resolve_hook(&runtime, derived, derived, "fly".into(), false).unwrap_err();
        assert!(matches!(err, HookError::MethodNotFound { .. }));
    }

    #[test]
    fn test_resolve_added() {
        let (runtime, _, derived) = fixture();
        let sig = resolve_added(&runtime, derived, derived, "didFinish".into(), false).unwrap();
        assert_eq!(sig.arity(), 1);
        let err = resolve_added(&runtime, derived, derived, "run".into(), false).unwrap_err();
        assert_eq!(
            err,
            HookError::MethodAlreadyImplemented {
                type_name: "Base".into(),
                selector: "run".into(),
            }
        );
        let err = resolve_added(&runtime, derived, derived, "fly".into(), false).unwrap_err();
        assert!(matches!(err, HookError::NoMatchingProtocolMethod { .. }));
    }
}
