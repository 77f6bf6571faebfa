mod common;

use common::{Fixture, constant, doubling, increment};
use intercept::{
    ClosureHandle, HookError, HookModes, HookToken, Hookable, RuntimeHooks, Selector, Signature, Value, ValueKind,
    observation::{is_observed, observe},
    testing::{CallCounter, ChangeLog, OrderLog},
};
use parking_lot::Mutex;
use std::{
    sync::{
        Arc, Barrier,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

/// A slot a hook can take its own token out of.
type TokenSlot = Arc<Mutex<Option<HookToken>>>;

fn revert_slot(slot: &TokenSlot) {
    let token = slot.lock().take();
    if let Some(token) = token {
        token.revert();
    }
}

// ============================================================================
// Destruction
// ============================================================================

#[test]
fn test_destroying_an_object_reverts_its_hooks() {
    let fx = Fixture::new();
    let types = fx.runtime.live_type_count();
    let object = fx.counter_with(1);
    let counter = CallCounter::new();

    let tokens = [
        object.hooks().before("increment", counter.closure()).unwrap(),
        object.hooks().instead("increment", doubling()).unwrap(),
        object
            .hooks()
            .add_method("reset", ClosureHandle::implementation(Signature::void(), |_, _| Ok(Value::Void)))
            .unwrap(),
    ];
    assert_eq!(fx.runtime.live_type_count(), types + 1);
    assert_eq!(increment(&object), 4);

    drop(object);
    assert!(tokens.iter().all(|token| !token.is_active()));
    assert_eq!(fx.runtime.live_type_count(), types);
    assert_eq!(fx.runtime.specialized_object_count(), 0);
    assert_eq!(intercept::context_count(&fx.runtime), 0);
    assert_eq!(intercept::active_hook_count(&fx.runtime), 0);

    for token in &tokens {
        token.revert();
        assert_eq!(token.apply(), Err(HookError::TargetDeallocated));
    }
}

#[test]
fn test_destruction_leaves_other_objects_hooked() {
    let fx = Fixture::new();
    let doomed = fx.counter_with(1);
    let survivor = fx.counter_with(1);

    let _doomed = doomed.hooks().instead("increment", constant(0)).unwrap();
    let survivor_token = survivor.hooks().instead("increment", constant(7)).unwrap();
    drop(doomed);

    assert!(survivor_token.is_active());
    assert_eq!(increment(&survivor), 7);
    assert_eq!(fx.runtime.specialized_object_count(), 1);
}

#[test]
fn test_deinit_hooks() {
    let fx = Fixture::new();
    let log = OrderLog::new();
    let object = fx.counter_with(0);

    let before = object.hooks().before_deinit(log.observer("before")).unwrap();
    let _after = object.hooks().after_deinit(log.observer("after")).unwrap();
    assert!(object.hooks().is_hooked(Selector::deinit(), HookModes::BEFORE));
    assert!(log.entries().is_empty());

    drop(object);
    assert_eq!(log.entries(), vec!["before", "after"]);
    assert!(!before.is_active());
    assert_eq!(intercept::context_count(&fx.runtime), 0);
    assert_eq!(fx.runtime.specialized_object_count(), 0);
}

#[test]
fn test_instead_of_deinit_sees_the_dying_object() {
    let fx = Fixture::new();
    let log = OrderLog::new();
    let object = fx.counter_with(3);

    let recorder = log.clone();
    let _token = object
        .hooks()
        .instead_of_deinit(ClosureHandle::replacement(Signature::void(), move |original, receiver, args| {
            let n = receiver
                .as_object()
                .and_then(|object| object.ivar("n"))
                .and_then(|value| value.as_int())
                .unwrap_or_default();
            recorder.push(format!("n={n}"));
            original.call(args)
        }))
        .unwrap();

    drop(object);
    assert_eq!(log.entries(), vec!["n=3"]);
}

#[test]
fn test_reverted_deinit_hook_does_not_run() {
    let fx = Fixture::new();
    let log = OrderLog::new();
    let object = fx.counter_with(0);

    let token = object.hooks().before_deinit(log.observer("before")).unwrap();
    token.revert();
    drop(object);
    assert!(log.entries().is_empty());
}

// ============================================================================
// Cooperation with key-value observation
// ============================================================================

#[test]
fn test_observation_then_hook() {
    let fx = Fixture::new();
    let types = fx.runtime.live_type_count();
    let object = fx.counter_with(0);
    let setter = Selector::setter_for("n");
    let changes = ChangeLog::new();
    let counter = CallCounter::new();

    let observation = observe(&object, "n", changes.callback()).unwrap();
    let subtype = object.isa();
    let token = object.hooks().before(setter, counter.closure()).unwrap();
    assert_eq!(object.isa(), subtype);

    object.send(setter, &[Value::Int(5)]).unwrap();
    assert_eq!(changes.count(), 1);
    assert_eq!(counter.count(), 1);

    token.revert();
    assert_eq!(object.isa(), subtype);
    object.send(setter, &[Value::Int(6)]).unwrap();
    assert_eq!(changes.count(), 2);
    assert_eq!(counter.count(), 1);

    observation.invalidate();
    assert!(!is_observed(&object));
    assert_eq!(object.isa(), fx.counter);
    assert_eq!(fx.runtime.live_type_count(), types);
    assert_eq!(increment(&object), 7);
}

#[test]
fn test_hook_then_observation() {
    let fx = Fixture::new();
    let types = fx.runtime.live_type_count();
    let object = fx.counter_with(0);
    let setter = Selector::setter_for("n");
    let changes = ChangeLog::new();
    let counter = CallCounter::new();

    let token = object.hooks().before(setter, counter.closure()).unwrap();
    let subtype = object.isa();
    let observation = observe(&object, "n", changes.callback()).unwrap();
    assert_eq!(object.isa(), subtype);

    object.send(setter, &[Value::Int(5)]).unwrap();
    assert_eq!(changes.count(), 1);
    assert_eq!(counter.count(), 1);

    // The hook is wrapped by the observer; it stays behind as a pass-through.
    token.revert();
    assert!(!object.hooks().is_hooked(setter, HookModes::ALL));
    object.send(setter, &[Value::Int(6)]).unwrap();
    assert_eq!(changes.count(), 2);
    assert_eq!(counter.count(), 1);
    assert_eq!(increment(&object), 7);

    // Hooking again layers on top of the observer.
    let again = object.hooks().before(setter, counter.closure()).unwrap();
    object.send(setter, &[Value::Int(8)]).unwrap();
    assert_eq!(changes.count(), 3);
    assert_eq!(counter.count(), 2);
    again.revert();

    observation.invalidate();
    assert_eq!(object.isa(), fx.counter);
    assert_eq!(fx.runtime.live_type_count(), types);
    object.send(setter, &[Value::Int(1)]).unwrap();
    assert_eq!(changes.count(), 3);
    assert_eq!(counter.count(), 2);
    assert_eq!(increment(&object), 2);
}

// ============================================================================
// Detaching during a call
// ============================================================================

#[test]
fn test_before_hook_reverting_itself_mid_call() {
    let fx = Fixture::new();
    let types = fx.runtime.live_type_count();
    let object = fx.runtime.instantiate(fx.loud).unwrap();
    object.set_ivar("n", Value::Int(0));

    let slot: TokenSlot = Arc::default();
    let inner = slot.clone();
    let token = object
        .hooks()
        .before(
            "increment",
            ClosureHandle::observer(move |_, _| {
                revert_slot(&inner);
                Ok(())
            }),
        )
        .unwrap();
    *slot.lock() = Some(token.clone());

    assert_eq!(object.send("increment", &[]).unwrap(), Value::Int(1));
    assert!(!token.is_active());
    assert_eq!(object.isa(), fx.loud);
    assert!(fx.runtime.specialization_of(object.id()).is_none());
    assert_eq!(fx.runtime.live_type_count(), types);
    assert_eq!(increment(&object), 1);
}

#[test]
fn test_instead_hook_reverting_itself_then_calling_original() {
    let fx = Fixture::new();
    let types = fx.runtime.live_type_count();
    let object = fx.counter_with(4);

    let slot: TokenSlot = Arc::default();
    let inner = slot.clone();
    let token = object
        .hooks()
        .instead(
            "increment",
            ClosureHandle::replacement(Signature::returning(ValueKind::Int), move |original, _, args| {
                revert_slot(&inner);
                let result = original.call(args)?.as_int().unwrap_or_default();
                Ok(Value::Int(result * 10))
            }),
        )
        .unwrap();
    *slot.lock() = Some(token.clone());

    assert_eq!(increment(&object), 50);
    assert!(!token.is_active());
    assert_eq!(object.isa(), fx.counter);
    assert_eq!(fx.runtime.live_type_count(), types);
    assert_eq!(increment(&object), 5);
}

#[test]
fn test_revert_from_another_thread_while_hook_runs() {
    let fx = Fixture::new();
    let types = fx.runtime.live_type_count();
    let object = fx.counter_with(2);
    let barrier = Arc::new(Barrier::new(2));

    let gate = barrier.clone();
    let token = object
        .hooks()
        .before(
            "increment",
            ClosureHandle::observer(move |_, _| {
                gate.wait();
                gate.wait();
                Ok(())
            }),
        )
        .unwrap();

    let caller = {
        let object = object.clone();
        thread::spawn(move || object.send("increment", &[]))
    };
    barrier.wait();
    token.revert();
    assert_eq!(object.isa(), fx.counter);
    barrier.wait();

    assert_eq!(caller.join().unwrap().unwrap(), Value::Int(3));
    assert_eq!(fx.runtime.specialized_object_count(), 0);
    assert_eq!(fx.runtime.live_type_count(), types);
    assert_eq!(intercept::context_count(&fx.runtime), 0);
}

#[test]
fn test_observation_ending_while_setter_runs() {
    let fx = Fixture::new();
    let types = fx.runtime.live_type_count();
    let object = fx.counter_with(0);
    let barrier = Arc::new(Barrier::new(2));
    let armed = Arc::new(AtomicBool::new(true));

    // The observing setter reads the old value through the getter first.
    let gate = barrier.clone();
    let trigger = armed.clone();
    let getter = fx
        .runtime
        .instance_hooks(fx.counter)
        .unwrap()
        .before(
            "n",
            ClosureHandle::observer(move |_, _| {
                if trigger.swap(false, Ordering::SeqCst) {
                    gate.wait();
                    gate.wait();
                }
                Ok(())
            }),
        )
        .unwrap();
    let observation = observe(&object, "n", ChangeLog::new().callback()).unwrap();
    assert_ne!(object.isa(), fx.counter);

    let writer = {
        let object = object.clone();
        thread::spawn(move || object.send(Selector::setter_for("n"), &[Value::Int(5)]))
    };
    barrier.wait();
    observation.invalidate();
    assert_eq!(object.isa(), fx.counter);
    barrier.wait();

    writer.join().unwrap().unwrap();
    assert_eq!(increment(&object), 6);
    assert!(!is_observed(&object));
    assert_eq!(fx.runtime.live_type_count(), types);

    getter.revert();
    assert_eq!(intercept::context_count(&fx.runtime), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_hooking() {
    let fx = Fixture::new();
    let types = fx.runtime.live_type_count();
    let shared = fx.counter_with(0);
    let counter = CallCounter::new();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let runtime = fx.runtime.clone();
            let class = fx.counter;
            let shared = shared.clone();
            let counter = counter.clone();
            thread::spawn(move || {
                let instances = runtime.instance_hooks(class).unwrap();
                for _ in 0..25 {
                    let object = runtime.instantiate(class).unwrap();
                    let token = object.hooks().instead("increment", doubling()).unwrap();
                    let observer = instances.before("increment", counter.closure()).unwrap();
                    assert_eq!(increment(&object), 2);
                    assert_eq!(increment(&shared), 1);
                    observer.revert();
                    token.revert();
                    assert_eq!(increment(&object), 1);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(counter.count() >= 200);
    assert_eq!(intercept::context_count(&fx.runtime), 0);
    assert_eq!(intercept::active_hook_count(&fx.runtime), 0);
    assert_eq!(fx.runtime.specialized_object_count(), 0);
    assert_eq!(fx.runtime.live_type_count(), types);
}
