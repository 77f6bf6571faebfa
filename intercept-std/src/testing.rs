//! Testing utilities for Intercept.
//!
//! This module provides helpers that make testing hooks and observers easier.
//!
//! # Features
//!
//! - [`RecordingObserver`]: A closure source that records every call it sees
//! - [`CallCounter`]: Counts invocations
//! - [`OrderLog`]: A shared log for asserting the order closures ran in
//! - [`ChangeLog`]: Records key-value observation changes

use crate::observation::Change;
use intercept_core::{ClosureHandle, Object, ObjectId, Signature, Value};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

// ============================================================================
// Recording Observer
// ============================================================================

/// One call seen by a [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// The receiving object, or `None` for a class receiver.
    pub receiver: Option<ObjectId>,
    /// The arguments.
    pub args: Vec<Value>,
}

/// Records every call of the closures it hands out.
///
/// # Example
///
/// ```rust,ignore
/// let recorder = RecordingObserver::new();
/// let token = object.hooks().before("setName", recorder.closure())?;
/// object.send("setName", &[Value::from("Ada")])?;
/// assert_eq!(recorder.calls()[0].args, vec![Value::from("Ada")]);
/// ```
#[derive(Clone, Default)]
pub struct RecordingObserver {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl RecordingObserver {
    /// Create a new recording observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// A before/after closure that records into this observer.
    pub fn closure(&self) -> ClosureHandle {
        let calls = self.calls.clone();
        ClosureHandle::observer(move |receiver, args| {
            calls.lock().push(RecordedCall {
                receiver: receiver.object_id(),
                args: args.to_vec(),
            });
            Ok(())
        })
    }

    /// Get a clone of the recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Get the number of recorded calls.
    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Clear all recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

// ============================================================================
// Call Counter
// ============================================================================

/// Counts calls of the closures it hands out.
#[derive(Clone, Default)]
pub struct CallCounter {
    count: Arc<AtomicUsize>,
}

impl CallCounter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// A before/after closure that increments the counter.
    pub fn closure(&self) -> ClosureHandle {
        let count = self.count.clone();
        ClosureHandle::observer(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    /// An instead closure that increments the counter and calls through.
    pub fn pass_through(&self, signature: Signature) -> ClosureHandle {
        let count = self.count.clone();
        ClosureHandle::replacement(signature, move |original, _, args| {
            count.fetch_add(1, Ordering::SeqCst);
            original.call(args)
        })
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reset the counter.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

// ============================================================================
// Order Log
// ============================================================================

/// A shared log of labels, for asserting execution order.
#[derive(Clone, Default)]
pub struct OrderLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl OrderLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a label.
    pub fn push(&self, label: impl Into<String>) {
        self.entries.lock().push(label.into());
    }

    /// A before/after closure that appends `label`.
    pub fn observer(&self, label: &str) -> ClosureHandle {
        let log = self.clone();
        let label = label.to_owned();
        ClosureHandle::observer(move |_, _| {
            log.push(label.clone());
            Ok(())
        })
    }

    /// An instead closure that appends `label`, calls through, then appends
    /// `label` with a `/end` suffix.
    pub fn wrapper(&self, label: &str, signature: Signature) -> ClosureHandle {
        let log = self.clone();
        let label = label.to_owned();
        ClosureHandle::replacement(signature, move |original, _, args| {
            log.push(label.clone());
            let result = original.call(args);
            log.push(format!("{label}/end"));
            result
        })
    }

    /// Get a clone of the entries.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Clear the log.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ============================================================================
// Change Log
// ============================================================================

/// Records observation changes.
#[derive(Clone, Default)]
pub struct ChangeLog {
    changes: Arc<Mutex<Vec<Change>>>,
}

impl ChangeLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback for [`observe`](crate::observation::observe).
    pub fn callback(&self) -> impl Fn(&Object, &Change) + Send + Sync + 'static {
        let changes = self.changes.clone();
        move |_: &Object, change: &Change| changes.lock().push(change.clone())
    }

    /// Get a clone of the recorded changes.
    pub fn changes(&self) -> Vec<Change> {
        self.changes.lock().clone()
    }

    /// Get the number of recorded changes.
    pub fn count(&self) -> usize {
        self.changes.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intercept_core::{Original, Receiver, Runtime, ValueKind};

    #[test]
    fn test_order_log_wrapper() {
        let runtime = Runtime::new();
        let receiver = Receiver::Class {
            runtime: &runtime,
            class: runtime.root_class(),
        };
        let log = OrderLog::new();
        let wrapper = log.wrapper("outer", Signature::returning(ValueKind::Int));
        let inner_log = log.clone();
        let next = move |_: &[Value]| -> Result<Value, intercept_core::InvokeError> {
            inner_log.push("original");
            Ok(Value::Int(1))
        };
        let value = wrapper.replace(&Original::new(&next), &receiver, &[]).unwrap();
        assert_eq!(value, Value::Int(1));
        assert_eq!(log.entries(), vec!["outer", "original", "outer/end"]);
    }

    #[test]
    fn test_counter_and_recorder() {
        let runtime = Runtime::new();
        let object = runtime.instantiate(runtime.root_class()).unwrap();
        let receiver = Receiver::Instance(&object);
        let counter = CallCounter::new();
        let recorder = RecordingObserver::new();
        counter.closure().observe(&receiver, &[]).unwrap();
        recorder.closure().observe(&receiver, &[Value::Int(2)]).unwrap();
        assert_eq!(counter.count(), 1);
        assert_eq!(
            recorder.calls(),
            vec![RecordedCall {
                receiver: Some(object.id()),
                args: vec![Value::Int(2)],
            }]
        );
        counter.reset();
        recorder.clear();
        assert_eq!((counter.count(), recorder.count()), (0, 0));
    }
}
