//! Dispatch targets and method table entries.

use crate::{
    error::InvokeError,
    object::{Object, ObjectId},
    runtime::Runtime,
    selector::Selector,
    signature::Signature,
    specialize::ConsumerTag,
    types::TypeHandle,
    value::{Value, ValueKind},
};
use std::{fmt, sync::Arc};

/// The receiver of a message: an instance, or a class for class methods.
#[derive(Clone, Copy)]
pub enum Receiver<'a> {
    /// An object. During `deinit` this is the object being destroyed.
    Instance(&'a Object),
    /// A class receiving one of its own methods.
    Class {
        /// The runtime the class belongs to.
        runtime: &'a Runtime,
        /// The class itself (not its metaclass).
        class: TypeHandle,
    },
}

impl<'a> Receiver<'a> {
    /// The runtime the receiver belongs to.
    pub fn runtime(&self) -> &'a Runtime {
        match *self {
            Receiver::Instance(object) => object.runtime(),
            Receiver::Class { runtime, .. } => runtime,
        }
    }

    /// The object, if the receiver is an instance.
    pub fn as_object(&self) -> Option<&'a Object> {
        match *self {
            Receiver::Instance(object) => Some(object),
            Receiver::Class { .. } => None,
        }
    }

    /// The object's id, if the receiver is an instance.
    pub fn object_id(&self) -> Option<ObjectId> {
        self.as_object().map(Object::id)
    }

    /// The type whose dispatch table serves this receiver.
    pub fn dispatch_type(&self) -> Option<TypeHandle> {
        match *self {
            Receiver::Instance(object) => Some(object.isa()),
            Receiver::Class { runtime, class } => runtime.metaclass(class),
        }
    }

    /// Name of the receiver's visible class.
    pub fn type_name(&self) -> String {
        let (runtime, class) = match *self {
            Receiver::Instance(object) => (object.runtime(), object.class()),
            Receiver::Class { runtime, class } => (runtime, class),
        };
        runtime.type_name(class).unwrap_or_else(|| "<disposed>".to_owned())
    }
}

impl fmt::Debug for Receiver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Receiver::Instance(object) => write!(f, "Instance({} {})", self.type_name(), object.id()),
            Receiver::Class { .. } => write!(f, "Class({})", self.type_name()),
        }
    }
}

/// Signature of a dispatch target body.
pub type TargetFn = dyn Fn(&Receiver<'_>, &[Value]) -> Result<Value, InvokeError> + Send + Sync;

/// An opaque callable bound to a (type, selector) pair.
///
/// Targets compare by identity: two clones of one target are equal, two
/// targets built from equal closures are not.
#[derive(Clone)]
pub struct DispatchTarget(Arc<TargetFn>);

impl DispatchTarget {
    /// Wrap a callable.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Receiver<'_>, &[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// A target that does nothing and returns the zero value of `ret`.
    pub fn noop(ret: ValueKind) -> Self {
        Self::new(move |_, _| Ok(Value::default_for(ret)))
    }

    /// Call the target.
    pub fn invoke(&self, receiver: &Receiver<'_>, args: &[Value]) -> Result<Value, InvokeError> {
        (self.0)(receiver, args)
    }

    /// Identity comparison.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Stable identity for logging and bookkeeping.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DispatchTarget({:#x})", self.id())
    }
}

/// Who put a method into a dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodOrigin {
    /// Declared with the class.
    Declared,
    /// Installed at run time by a subtype consumer (interception, observation).
    Synthesized(ConsumerTag),
}

/// A dispatch table entry.
#[derive(Debug, Clone)]
pub struct Method {
    /// The method identifier.
    pub selector: Selector,
    /// Calling-convention descriptor.
    pub signature: Signature,
    /// The installed callable.
    pub target: DispatchTarget,
    /// Who installed it.
    pub origin: MethodOrigin,
}

impl Method {
    /// A declared method.
    pub fn new(selector: Selector, signature: Signature, target: DispatchTarget) -> Self {
        Self {
            selector,
            signature,
            target,
            origin: MethodOrigin::Declared,
        }
    }

    /// A method installed at run time by `consumer`.
    pub fn synthesized(
        selector: Selector,
        signature: Signature,
        target: DispatchTarget,
        consumer: ConsumerTag,
    ) -> Self {
        Self {
            selector,
            signature,
            target,
            origin: MethodOrigin::Synthesized(consumer),
        }
    }

    /// Same entry with a different target, keeping selector and signature.
    pub fn with_target(&self, target: DispatchTarget, consumer: ConsumerTag) -> Self {
        Self::synthesized(self.selector, self.signature.clone(), target, consumer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_identity() {
        let a = DispatchTarget::noop(ValueKind::Void);
        let b = a.clone();
        let c = DispatchTarget::noop(ValueKind::Void);
        assert!(DispatchTarget::ptr_eq(&a, &b));
        assert!(!DispatchTarget::ptr_eq(&a, &c));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_noop_returns_zero_value() {
        let runtime = Runtime::new();
        let receiver = Receiver::Class {
            runtime: &runtime,
            class: runtime.root_class(),
        };
        let target = DispatchTarget::noop(ValueKind::Int);
        assert_eq!(target.invoke(&receiver, &[]).unwrap(), Value::Int(0));
    }
}
