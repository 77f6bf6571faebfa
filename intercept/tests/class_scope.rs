mod common;

use common::{Fixture, constant, doubling, increment};
use intercept::{
    ClosureHandle, HookError, HookModes, HookScope, HookTarget, Hookable, RuntimeHooks, Selector, Signature,
    Value, ValueKind, testing::CallCounter,
};

#[test]
fn test_class_method_hooks() {
    let fx = Fixture::new();
    let class = fx.runtime.class_hooks(fx.counter).unwrap();

    let token = class
        .instead(
            "zero",
            ClosureHandle::implementation(Signature::returning(ValueKind::Int), |_, _| Ok(Value::Int(42))),
        )
        .unwrap();
    assert_eq!(token.scope(), HookScope::Class);
    assert_eq!(fx.runtime.send_class(fx.counter, "zero", &[]).unwrap(), Value::Int(42));
    assert!(class.is_hooked("zero", HookModes::INSTEAD));

    // Instance methods are not visible on the class side.
    let err = class
        .before("increment", ClosureHandle::observer(|_, _| Ok(())))
        .unwrap_err();
    assert!(matches!(err, HookError::MethodNotFound { .. }));

    token.revert();
    assert_eq!(fx.runtime.send_class(fx.counter, "zero", &[]).unwrap(), Value::Int(0));
}

#[test]
fn test_class_hooks_leave_instances_alone() {
    let fx = Fixture::new();
    let object = fx.counter_with(1);
    let counter = CallCounter::new();

    let _token = fx
        .runtime
        .class_hooks(fx.counter)
        .unwrap()
        .before("zero", counter.closure())
        .unwrap();
    assert_eq!(increment(&object), 2);
    assert_eq!(counter.count(), 0);
    fx.runtime.send_class(fx.counter, "zero", &[]).unwrap();
    assert_eq!(counter.count(), 1);
    assert_eq!(object.isa(), fx.counter);
}

#[test]
fn test_instance_hooks_reach_every_instance() {
    let fx = Fixture::new();
    let first = fx.counter_with(1);
    let second = fx.counter_with(10);
    let instances = fx.runtime.instance_hooks(fx.counter).unwrap();

    let token = instances.instead("increment", doubling()).unwrap();
    let third = fx.counter_with(100);
    assert_eq!(increment(&first), 4);
    assert_eq!(increment(&second), 22);
    assert_eq!(increment(&third), 202);
    assert_eq!(first.isa(), fx.counter);

    token.revert();
    assert_eq!(increment(&first), 2);
    assert!(fx.runtime.own_method(fx.counter, "increment".into()).is_some());
}

#[test]
fn test_instance_hooks_on_a_subclass() {
    let fx = Fixture::new();
    let plain = fx.counter_with(1);
    let loud = fx.runtime.instantiate(fx.loud).unwrap();

    let token = fx
        .runtime
        .instance_hooks(fx.loud)
        .unwrap()
        .instead("increment", constant(99))
        .unwrap();
    assert_eq!(increment(&loud), 99);
    assert_eq!(increment(&plain), 2);

    // The inherited implementation is found at call time.
    let _base = fx
        .runtime
        .instance_hooks(fx.counter)
        .unwrap()
        .before("increment", ClosureHandle::observer(|_, _| Ok(())))
        .unwrap();
    token.revert();
    assert_eq!(increment(&loud), 1);
    assert!(fx.runtime.own_method(fx.loud, "increment".into()).is_none());
}

#[test]
fn test_revert_all_for_filters_modes() {
    let fx = Fixture::new();
    let instances = fx.runtime.instance_hooks(fx.counter).unwrap();
    let counter = CallCounter::new();

    let _tokens = [
        instances.before("increment", counter.closure()).unwrap(),
        instances.after("increment", counter.closure()).unwrap(),
        instances.instead("increment", doubling()).unwrap(),
    ];
    assert_eq!(
        instances.revert_all_for("increment", HookModes::BEFORE | HookModes::AFTER),
        2
    );
    assert!(instances.is_hooked("increment", HookModes::INSTEAD));
    assert!(!instances.is_hooked("increment", HookModes::BEFORE | HookModes::AFTER));

    let object = fx.counter_with(1);
    assert_eq!(increment(&object), 4);
    assert_eq!(counter.count(), 0);

    assert_eq!(instances.revert_all_for("zero", HookModes::ALL), 0);
    assert_eq!(instances.revert_all(), 1);
    assert_eq!(increment(&object), 2);
    assert_eq!(intercept::context_count(&fx.runtime), 0);
}

#[test]
fn test_scopes_are_independent() {
    let fx = Fixture::new();
    let object = fx.counter_with(1);
    let object_target = HookTarget::object(&object);
    let instances_target = HookTarget::instances(&fx.runtime, fx.counter).unwrap();

    let _object = intercept::hook(&object_target, "increment", intercept::HookMode::Instead, doubling()).unwrap();
    let _instances =
        intercept::hook(&instances_target, "increment", intercept::HookMode::Instead, doubling()).unwrap();

    assert_eq!(increment(&object), 8);
    assert_eq!(intercept::revert_all(&instances_target), 1);
    assert!(intercept::is_hooked(&object_target, "increment", HookModes::ALL));
    assert!(!intercept::is_hooked(&instances_target, "increment", HookModes::ALL));
    assert_eq!(increment(&object), 4);
}

#[test]
fn test_unsupported_targets() {
    let fx = Fixture::new();
    let object = fx.counter_with(0);
    let _token = object.hooks().instead("increment", constant(1)).unwrap();

    let metaclass = fx.runtime.metaclass(fx.counter).unwrap();
    assert!(matches!(
        fx.runtime.instance_hooks(metaclass),
        Err(HookError::UnsupportedTarget(_))
    ));
    assert!(matches!(
        fx.runtime.class_hooks(object.isa()),
        Err(HookError::UnsupportedTarget(_))
    ));
}

#[test]
fn test_protocol_declared_method_can_be_hooked() {
    let fx = Fixture::new();
    let object = fx.counter_with(0);
    let instances = fx.runtime.instance_hooks(fx.counter).unwrap();
    let counter = CallCounter::new();

    let token = instances.before("describe", counter.closure()).unwrap();
    assert!(object.responds_to("describe"));
    assert_eq!(object.send("describe", &[]).unwrap(), Value::from(""));
    assert_eq!(counter.count(), 1);

    token.revert();
    assert!(!object.responds_to("describe"));
}

#[test]
fn test_added_methods() {
    let fx = Fixture::new();
    let object = fx.counter_with(5);
    let instances = fx.runtime.instance_hooks(fx.counter).unwrap();

    let reset = instances
        .add_method(
            "reset",
            ClosureHandle::implementation(Signature::void(), |receiver, _| {
                if let Some(object) = receiver.as_object() {
                    object.set_ivar("n", Value::Int(0));
                }
                Ok(Value::Void)
            }),
        )
        .unwrap();
    object.send("reset", &[]).unwrap();
    assert_eq!(increment(&object), 1);
    assert!(instances.is_hooked("reset", HookModes::ADDED));
    assert!(!instances.is_hooked("reset", HookModes::HOOKS));

    let err = instances
        .add_method("increment", ClosureHandle::implementation(Signature::returning(ValueKind::Int), |_, _| Ok(Value::Int(0))))
        .unwrap_err();
    assert_eq!(
        err,
        HookError::MethodAlreadyImplemented {
            type_name: "Counter".into(),
            selector: "increment".into(),
        }
    );
    let err = instances
        .add_method("fly", ClosureHandle::implementation(Signature::void(), |_, _| Ok(Value::Void)))
        .unwrap_err();
    assert!(matches!(err, HookError::NoMatchingProtocolMethod { .. }));
    let err = instances
        .add_method("describe", ClosureHandle::implementation(Signature::void(), |_, _| Ok(Value::Void)))
        .unwrap_err();
    assert!(matches!(err, HookError::SignatureMismatch { .. }));

    reset.revert();
    assert!(!object.responds_to("reset"));
}

#[test]
fn test_added_class_method() {
    let fx = Fixture::new();
    let class = fx.runtime.class_hooks(fx.counter).unwrap();
    let token = class
        .add_method(
            "version",
            ClosureHandle::implementation(Signature::returning(ValueKind::Int), |_, _| Ok(Value::Int(3))),
        )
        .unwrap();
    assert_eq!(fx.runtime.send_class(fx.counter, "version", &[]).unwrap(), Value::Int(3));
    assert_eq!(class.hooked_selectors(), vec![Selector::from("version")]);
    token.revert();
    assert!(fx.runtime.send_class(fx.counter, "version", &[]).is_err());
}

#[test]
fn test_reverting_an_added_method_while_it_is_hooked() {
    let fx = Fixture::new();
    let object = fx.counter_with(5);
    let instances = fx.runtime.instance_hooks(fx.counter).unwrap();
    let counter = CallCounter::new();

    let added = instances
        .add_method(
            "reset",
            ClosureHandle::implementation(Signature::void(), |receiver, _| {
                if let Some(object) = receiver.as_object() {
                    object.set_ivar("n", Value::Int(0));
                }
                Ok(Value::Void)
            }),
        )
        .unwrap();
    let before = instances.before("reset", counter.closure()).unwrap();

    added.revert();
    object.send("reset", &[]).unwrap();
    assert_eq!(counter.count(), 1);
    assert_eq!(increment(&object), 6);

    before.revert();
    assert!(!object.responds_to("reset"));
    assert_eq!(intercept::context_count(&fx.runtime), 0);
}
