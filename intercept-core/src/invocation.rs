//! Messages rendered as values.
//!
//! An [`Invocation`] holds every element of a message: target, selector,
//! arguments and, once dispatched, the return value. It can be dispatched
//! repeatedly, to different targets, with arguments changed in between.

use crate::{
    error::InvokeError,
    object::ObjectRef,
    selector::Selector,
    signature::Signature,
    value::Value,
};

/// Payload handed to a `forwardInvocation` implementation when the receiver
/// does not implement a selector.
#[derive(Debug, Clone)]
pub struct ForwardedMessage {
    /// The selector that was sent.
    pub selector: Selector,
    /// The arguments that were supplied.
    pub arguments: Vec<Value>,
}

/// A dispatchable message.
#[derive(Debug, Clone)]
pub struct Invocation {
    target: Option<ObjectRef>,
    selector: Selector,
    signature: Signature,
    arguments: Vec<Value>,
    return_value: Option<Value>,
}

impl Invocation {
    /// An invocation with no target and zero-valued arguments.
    pub fn new(selector: Selector, signature: Signature) -> Self {
        let arguments = signature.params().iter().map(|k| Value::default_for(*k)).collect();
        Self {
            target: None,
            selector,
            signature,
            arguments,
            return_value: None,
        }
    }

    /// An invocation of `selector` on `target`, using the signature the
    /// target's dispatch table declares.
    pub fn for_message(target: &ObjectRef, selector: impl Into<Selector>) -> Result<Self, InvokeError> {
        let selector = selector.into();
        let signature = target
            .runtime()
            .method_signature(target.isa(), selector)
            .ok_or_else(|| InvokeError::UnrecognizedSelector {
                type_name: target.type_name(),
                selector,
            })?;
        let mut invocation = Self::new(selector, signature);
        invocation.target = Some(target.clone());
        Ok(invocation)
    }

    /// The target, if set.
    pub fn target(&self) -> Option<&ObjectRef> {
        self.target.as_ref()
    }

    /// Set the target.
    pub fn set_target(&mut self, target: Option<ObjectRef>) {
        self.target = target;
    }

    /// The selector.
    pub fn selector(&self) -> Selector {
        self.selector
    }

    /// Change the selector. When a target is set, the new selector must have a
    /// compatible signature on it.
    pub fn set_selector(&mut self, selector: impl Into<Selector>) -> Result<(), InvokeError> {
        let selector = selector.into();
        if let Some(target) = &self.target {
            let compatible = target
                .runtime()
                .method_signature(target.isa(), selector)
                .is_some_and(|sig| sig.is_compatible(&self.signature));
            if !compatible {
                return Err(InvokeError::UnrecognizedSelector {
                    type_name: target.type_name(),
                    selector,
                });
            }
        }
        self.selector = selector;
        Ok(())
    }

    /// The calling convention.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The arguments.
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// One argument.
    pub fn argument(&self, index: usize) -> Option<&Value> {
        self.arguments.get(index)
    }

    /// Replace one argument.
    pub fn set_argument(&mut self, index: usize, value: Value) -> Result<(), InvokeError> {
        let expected = *self.signature.params().get(index).ok_or(InvokeError::ArgumentCount {
            selector: self.selector,
            expected: self.signature.arity(),
            found: index + 1,
        })?;
        if !expected.accepts(value.kind()) {
            return Err(InvokeError::ArgumentType {
                selector: self.selector,
                index,
                expected,
                found: value.kind(),
            });
        }
        self.arguments[index] = value;
        Ok(())
    }

    /// Replace all arguments.
    pub fn set_arguments(&mut self, arguments: Vec<Value>) -> Result<(), InvokeError> {
        self.signature.check_args(self.selector, &arguments)?;
        self.arguments = arguments;
        Ok(())
    }

    /// The value produced by the last dispatch, or set explicitly.
    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    /// Set the return value without dispatching.
    pub fn set_return_value(&mut self, value: Value) {
        self.return_value = Some(value);
    }

    /// Whether the method returns nothing.
    pub fn is_void_return(&self) -> bool {
        self.signature.is_void_return()
    }

    /// Dispatch to the current target and store the return value.
    pub fn invoke(&mut self) -> Result<(), InvokeError> {
        let target = self.target.clone().ok_or(InvokeError::Deallocated)?;
        let value = target.send(self.selector, &self.arguments)?;
        self.return_value = Some(value);
        Ok(())
    }

    /// Set the target, then dispatch.
    pub fn invoke_with_target(&mut self, target: ObjectRef) -> Result<(), InvokeError> {
        self.target = Some(target);
        self.invoke()
    }
}
