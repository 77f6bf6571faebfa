#![allow(dead_code)]

use intercept::{
    ClosureHandle, ObjectRef, ProtocolHandle, Runtime, Signature, TypeHandle, Value, ValueKind,
};

// ============================================================================
// Test Classes
// ============================================================================

/// A runtime with a `Counter` class, a `LoudCounter` subclass and a
/// `CounterDelegate` protocol the counter conforms to.
pub struct Fixture {
    pub runtime: Runtime,
    pub counter: TypeHandle,
    pub loud: TypeHandle,
    pub delegate: ProtocolHandle,
}

impl Fixture {
    pub fn new() -> Self {
        let runtime = Runtime::new();
        let delegate = runtime
            .define_protocol("CounterDelegate")
            .optional("reset", Signature::void())
            .optional("describe", Signature::returning(ValueKind::Str))
            .optional_class_method("version", Signature::returning(ValueKind::Int))
            .register()
            .unwrap();
        let counter = runtime
            .define_class("Counter")
            .property("n", ValueKind::Int)
            .method("increment", Signature::returning(ValueKind::Int), |receiver, _| {
                let n = receiver
                    .as_object()
                    .and_then(|object| object.ivar("n"))
                    .and_then(|value| value.as_int())
                    .unwrap_or_default();
                Ok(Value::Int(n + 1))
            })
            .class_method("zero", Signature::returning(ValueKind::Int), |_, _| Ok(Value::Int(0)))
            .conforms_to(delegate)
            .register()
            .unwrap();
        let loud = runtime
            .define_class("LoudCounter")
            .superclass(counter)
            .register()
            .unwrap();
        Self {
            runtime,
            counter,
            loud,
            delegate,
        }
    }

    /// A new counter holding `n`.
    pub fn counter_with(&self, n: i64) -> ObjectRef {
        let object = self.runtime.instantiate(self.counter).unwrap();
        object.set_ivar("n", Value::Int(n));
        object
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn increment(object: &ObjectRef) -> i64 {
    object.send("increment", &[]).unwrap().as_int().unwrap()
}

/// An instead closure for `increment` that doubles the original's result.
pub fn doubling() -> ClosureHandle {
    ClosureHandle::replacement(Signature::returning(ValueKind::Int), |original, _, args| {
        let result = original.call(args)?.as_int().unwrap_or_default();
        Ok(Value::Int(result * 2))
    })
}

/// An instead closure for `increment` that returns `value` without calling
/// the original.
pub fn constant(value: i64) -> ClosureHandle {
    ClosureHandle::implementation(Signature::returning(ValueKind::Int), move |_, _| Ok(Value::Int(value)))
}
