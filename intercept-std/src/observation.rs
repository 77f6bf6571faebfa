//! Key-value observation.
//!
//! Observing a key moves the object onto its private subtype (as the
//! [`ConsumerTag::OBSERVATION`] consumer) and overrides the key's setter on
//! that subtype. The override reads the old value, forwards to the setter it
//! replaced, reads the new value and notifies every observer of the key.
//!
//! # Cooperation
//!
//! The subtype is the same one the interception engine uses, so both
//! mechanisms can override methods of one object at once. When the last
//! observer of a key leaves:
//!
//! - if the override is still the installed entry, the entry it replaced is
//!   put back (or the entry is removed when it replaced nothing);
//! - otherwise someone wrapped the override since, and it is switched to
//!   pass-through so the wrapper keeps working.
//!
//! # Example
//!
//! ```rust,ignore
//! let observation = observe(&person, "name", |_, change| {
//!     println!("{} changed from {:?} to {:?}", change.key, change.old, change.new);
//! })?;
//! person.send("setName", &[Value::from("Ada")])?;
//! observation.invalidate();
//! ```

use crate::kvc::KeyValueCoding;
use intercept_core::{
    AssociationKey, ConsumerTag, DestroyObserverId, DispatchTarget, Method, Object,
    ObjectId, ObjectRef, Receiver, Runtime, RuntimeError, Selector, TypeHandle, Value,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use thiserror::Error;

const STATE_KEY: AssociationKey = AssociationKey::new("intercept.observation");

static NEXT_OBSERVATION: AtomicU64 = AtomicU64::new(1);

/// Errors from starting an observation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObservationError {
    /// The object has no setter for the key.
    #[error("`{type_name}` has no setter for key `{key}`")]
    UnknownKey {
        /// Name of the object's class.
        type_name: String,
        /// The key.
        key: String,
    },

    /// The private subtype could not be created or modified.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Another collaborator stored foreign state under the observation slot.
    #[error("observation state slot is occupied by a foreign value")]
    StateConflict,
}

/// A change delivered to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// The observed key.
    pub key: String,
    /// Value before the setter ran.
    pub old: Value,
    /// Value after the setter ran.
    pub new: Value,
}

type ObserverFn = dyn Fn(&Object, &Change) + Send + Sync;
type ObserverList = Arc<Mutex<Vec<(u64, Arc<ObserverFn>)>>>;

struct KeyObservers {
    subtype: TypeHandle,
    setter: Selector,
    observers: ObserverList,
    installed: DispatchTarget,
    replaced: Option<Method>,
    active: Arc<AtomicBool>,
}

#[derive(Default)]
struct ObservationState {
    keys: Mutex<HashMap<String, KeyObservers>>,
}

/// Handle to one observer of one key.
///
/// The observer stays registered until [`invalidate`](Self::invalidate) is
/// called, the handle is dropped, or the object is destroyed.
pub struct Observation {
    id: u64,
    key: String,
    runtime: Runtime,
    object_id: ObjectId,
    object: Weak<Object>,
    destroy_observer: Mutex<Option<DestroyObserverId>>,
    live: Arc<AtomicBool>,
}

impl Observation {
    /// The observed key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The observed object's id.
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Whether the observer is still registered.
    pub fn is_active(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Remove the observer. Idempotent.
    pub fn invalidate(&self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }
        let runtime = self.runtime.clone();
        runtime.serialized(|| {
            match self.object.upgrade() {
                Some(object) => {
                    if let Some(id) = self.destroy_observer.lock().take() {
                        object.remove_destroy_observer(id);
                    }
                    let _removed = remove_observer(&object, &self.key, self.id);
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(object = %self.object_id, key = %self.key, "observed object already destroyed");
                }
            }
            runtime.release_specialization(self.object_id, ConsumerTag::OBSERVATION);
        });
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.invalidate();
    }
}

impl std::fmt::Debug for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observation")
            .field("object", &self.object_id)
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Observe changes to `key` made through its setter.
pub fn observe<F>(object: &ObjectRef, key: &str, callback: F) -> Result<Observation, ObservationError>
where
    F: Fn(&Object, &Change) + Send + Sync + 'static,
{
    let runtime = object.runtime().clone();
    let setter = Selector::setter_for(key);
    if !object.responds_to(setter) {
        return Err(ObservationError::UnknownKey {
            type_name: object.type_name(),
            key: key.to_owned(),
        });
    }
    let id = NEXT_OBSERVATION.fetch_add(1, Ordering::Relaxed);
    runtime.serialized(|| {
        let subtype = runtime.specialize(object, ConsumerTag::OBSERVATION)?;
        if let Err(err) = add_observer(object, subtype, key, setter, id, Arc::new(callback)) {
            runtime.release_specialization(object.id(), ConsumerTag::OBSERVATION);
            return Err(err);
        }

        let live = Arc::new(AtomicBool::new(true));
        let on_destroy = live.clone();
        let destroy_observer = object.on_destroy(move |_| {
            on_destroy.store(false, Ordering::SeqCst);
        });
        #[cfg(feature = "tracing")]
        tracing::debug!(object = %object.id(), key, "added observer");
        Ok(Observation {
            id,
            key: key.to_owned(),
            runtime: runtime.clone(),
            object_id: object.id(),
            object: object.downgrade(),
            destroy_observer: Mutex::new(Some(destroy_observer)),
            live,
        })
    })
}

/// Whether any key of `object` is observed.
pub fn is_observed(object: &Object) -> bool {
    object
        .runtime()
        .specialization_of(object.id())
        .is_some_and(|info| info.has_consumer(ConsumerTag::OBSERVATION))
}

/// Keys of `object` that currently have observers, sorted.
pub fn observed_keys(object: &Object) -> Vec<String> {
    let Some(state) = object.associated::<ObservationState>(STATE_KEY) else {
        return Vec::new();
    };
    let mut keys: Vec<String> = state.keys.lock().keys().cloned().collect();
    keys.sort();
    keys
}

fn add_observer(
    object: &Object,
    subtype: TypeHandle,
    key: &str,
    setter: Selector,
    id: u64,
    callback: Arc<ObserverFn>,
) -> Result<(), ObservationError> {
    let runtime = object.runtime();
    let state = object
        .associated_or_insert_with(STATE_KEY, ObservationState::default)
        .ok_or(ObservationError::StateConflict)?;
    let mut keys = state.keys.lock();
    if let Some(existing) = keys.get(key) {
        existing.observers.lock().push((id, callback));
        return Ok(());
    }

    let signature = runtime
        .method_signature(subtype, setter)
        .ok_or_else(|| ObservationError::UnknownKey {
            type_name: object.type_name(),
            key: key.to_owned(),
        })?;
    let replaced = runtime.own_method(subtype, setter);
    let parent = runtime
        .superclass(subtype)
        .ok_or(ObservationError::Runtime(RuntimeError::UnknownType(subtype)))?;
    let observers: ObserverList = Arc::new(Mutex::new(vec![(id, callback)]));
    let active = Arc::new(AtomicBool::new(true));
    let installed = setter_override(
        key.to_owned(),
        parent,
        setter,
        replaced.as_ref().map(|m| m.target.clone()),
        observers.clone(),
        active.clone(),
    );
    let method = Method::synthesized(setter, signature, installed.clone(), ConsumerTag::OBSERVATION);
    let _previous = runtime.install_method(subtype, method)?;
    keys.insert(
        key.to_owned(),
        KeyObservers {
            subtype,
            setter,
            observers,
            installed,
            replaced,
            active,
        },
    );
    Ok(())
}

fn remove_observer(object: &Object, key: &str, id: u64) -> Option<KeyObservers> {
    let runtime = object.runtime();
    let state = object.associated::<ObservationState>(STATE_KEY)?;
    let finished = {
        let mut keys = state.keys.lock();
        let entry = keys.get(key)?;
        let now_empty = {
            let mut observers = entry.observers.lock();
            observers.retain(|(observer_id, _)| *observer_id != id);
            observers.is_empty()
        };
        if !now_empty {
            return None;
        }
        keys.remove(key)?
    };

    if runtime.is_installed(finished.subtype, finished.setter, &finished.installed) {
        let restored = match finished.replaced.clone() {
            Some(method) => runtime.install_method(finished.subtype, method),
            None => runtime.remove_method(finished.subtype, finished.setter),
        };
        if let Err(_err) = restored {
            #[cfg(feature = "tracing")]
            tracing::warn!(object = %object.id(), key, error = %_err, "could not restore setter");
        }
    } else {
        // Wrapped by another consumer since; keep the override as a pass-through.
        finished.active.store(false, Ordering::SeqCst);
        #[cfg(feature = "tracing")]
        tracing::debug!(object = %object.id(), key, "setter override left as pass-through");
    }
    Some(finished)
}

/// `parent` is the superclass of the subtype the override lives on, captured
/// so a setter still running after the subtype is disposed can reach it.
fn setter_override(
    key: String,
    parent: TypeHandle,
    setter: Selector,
    replaced: Option<DispatchTarget>,
    observers: ObserverList,
    active: Arc<AtomicBool>,
) -> DispatchTarget {
    DispatchTarget::new(move |receiver, args| {
        let forward = |receiver: &Receiver<'_>| match &replaced {
            Some(target) => target.invoke(receiver, args),
            None => receiver.runtime().send_from(receiver, parent, setter, args),
        };
        let Some(object) = receiver.as_object() else {
            return forward(receiver);
        };
        if !active.load(Ordering::SeqCst) {
            return forward(receiver);
        }
        let old = object.value_for_key(&key).unwrap_or_default();
        let result = forward(receiver)?;
        let new = object.value_for_key(&key).unwrap_or_default();
        let snapshot: Vec<Arc<ObserverFn>> = observers.lock().iter().map(|(_, f)| f.clone()).collect();
        let change = Change {
            key: key.clone(),
            old,
            new,
        };
        for observer in snapshot {
            observer(object, &change);
        }
        Ok(result)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use intercept_core::{Signature, ValueKind};

    fn person(runtime: &Runtime) -> ObjectRef {
        let class = match runtime.class_named("Person") {
            Some(class) => class,
            None => runtime
                .define_class("Person")
                .property("name", ValueKind::Str)
                .property("age", ValueKind::Int)
                .register()
                .unwrap(),
        };
        runtime.instantiate(class).unwrap()
    }

    #[test]
    fn test_observer_sees_old_and_new() {
        let runtime = Runtime::new();
        let ada = person(&runtime);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observation = observe(&ada, "name", move |_, change| sink.lock().push(change.clone())).unwrap();

        ada.send("setName", &[Value::from("Ada")]).unwrap();
        ada.send("setName", &[Value::from("Ada L.")]).unwrap();
        let changes = seen.lock().clone();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].old, Value::from(""));
        assert_eq!(changes[0].new, Value::from("Ada"));
        assert_eq!(changes[1].old, Value::from("Ada"));
        assert!(is_observed(&ada));
        assert_eq!(observed_keys(&ada), vec!["name".to_owned()]);

        observation.invalidate();
        ada.send("setName", &[Value::from("Grace")]).unwrap();
        assert_eq!(seen.lock().len(), 2);
        assert!(!is_observed(&ada));
        assert_eq!(ada.isa(), ada.class());
    }

    #[test]
    fn test_other_instances_unaffected() {
        let runtime = Runtime::new();
        let a = person(&runtime);
        let b = person(&runtime);
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let _observation = observe(&a, "age", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        b.send("setAge", &[Value::Int(3)]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        a.send("setAge", &[Value::Int(3)]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_invalidates() {
        let runtime = Runtime::new();
        let ada = person(&runtime);
        let types = runtime.live_type_count();
        {
            let _first = observe(&ada, "name", |_, _| {}).unwrap();
            let _second = observe(&ada, "age", |_, _| {}).unwrap();
            assert_eq!(runtime.live_type_count(), types + 1);
        }
        assert!(!is_observed(&ada));
        assert_eq!(runtime.live_type_count(), types);
        assert!(observed_keys(&ada).is_empty());
    }

    #[test]
    fn test_object_destruction_deactivates() {
        let runtime = Runtime::new();
        let ada = person(&runtime);
        let observation = observe(&ada, "name", |_, _| {}).unwrap();
        let types = runtime.live_type_count();
        drop(ada);
        assert!(!observation.is_active());
        assert_eq!(runtime.live_type_count(), types - 1);
        observation.invalidate();
    }

    #[test]
    fn test_unknown_key() {
        let runtime = Runtime::new();
        let ada = person(&runtime);
        let err = observe(&ada, "height", |_, _| {}).unwrap_err();
        assert!(matches!(err, ObservationError::UnknownKey { .. }));
        assert!(runtime.specialization_of(ada.id()).is_none());
    }

    #[test]
    fn test_wrapped_override_becomes_pass_through() {
        let runtime = Runtime::new();
        let ada = person(&runtime);
        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();
        let observation = observe(&ada, "name", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        // Another consumer wraps the override on the shared subtype.
        let other = ConsumerTag::new("wrapper");
        let subtype = runtime.specialize(&ada, other).unwrap();
        let setter = Selector::setter_for("name");
        let inner = runtime.own_method(subtype, setter).unwrap();
        let inner_target = inner.target.clone();
        let wrapper = DispatchTarget::new(move |receiver, args| inner_target.invoke(receiver, args));
        runtime
            .install_method(
                subtype,
                Method::synthesized(setter, Signature::new([ValueKind::Str], ValueKind::Void), wrapper, other),
            )
            .unwrap();

        observation.invalidate();
        ada.send("setName", &[Value::from("Ada")]).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(ada.send("name", &[]).unwrap(), Value::from("Ada"));
        assert!(runtime.specialization_of(ada.id()).unwrap().has_consumer(other));
    }
}
