//! Runtime objects.
//!
//! An [`Object`] carries a mutable runtime type pointer (`isa`), instance
//! variables, associated values and an explicit destruction channel. The
//! declared class never changes; `isa` moves to a specialized subtype and back
//! as consumers come and go.
//!
//! On drop, the object
//! 1. dispatches `deinit` through its current dispatch table (so hooks on
//!    `deinit` run),
//! 2. fires destruction observers in registration order,
//! 3. lets the runtime dispose any specialized subtype still left.

use crate::{
    dispatch::Receiver,
    error::InvokeError,
    runtime::Runtime,
    selector::Selector,
    types::TypeHandle,
    value::Value,
};
use parking_lot::{Mutex, RwLock};
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

/// Shared reference to a runtime object.
pub type ObjectRef = Arc<Object>;

/// Process-unique object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u64);

impl ObjectId {
    /// The raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Key for values associated with an object by collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssociationKey(&'static str);

impl AssociationKey {
    /// Create a key. Keys are compared by name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }
}

/// Handle returned by [`Object::on_destroy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestroyObserverId(u64);

type DestroyObserver = Box<dyn FnOnce(ObjectId) + Send>;

static NEXT_OBSERVER: AtomicU64 = AtomicU64::new(1);

/// A live object of the host object model.
pub struct Object {
    id: ObjectId,
    runtime: Runtime,
    class: TypeHandle,
    isa: Mutex<TypeHandle>,
    ivars: RwLock<HashMap<Arc<str>, Value>>,
    associated: Mutex<HashMap<AssociationKey, Arc<dyn Any + Send + Sync>>>,
    destroy_observers: Mutex<Vec<(DestroyObserverId, DestroyObserver)>>,
    this: Weak<Object>,
}

impl Object {
    pub(crate) fn new_ref(
        runtime: Runtime,
        id: ObjectId,
        class: TypeHandle,
        ivars: HashMap<Arc<str>, Value>,
    ) -> ObjectRef {
        Arc::new_cyclic(|this| Object {
            id,
            runtime,
            class,
            isa: Mutex::new(class),
            ivars: RwLock::new(ivars),
            associated: Mutex::new(HashMap::new()),
            destroy_observers: Mutex::new(Vec::new()),
            this: this.clone(),
        })
    }

    /// The object's id.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The runtime the object belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The declared (shared) class, regardless of specialization.
    pub fn class(&self) -> TypeHandle {
        self.class
    }

    /// The current runtime type used for dispatch.
    pub fn isa(&self) -> TypeHandle {
        *self.isa.lock()
    }

    pub(crate) fn set_isa(&self, handle: TypeHandle) {
        *self.isa.lock() = handle;
    }

    /// A new strong reference, unless the object is being destroyed.
    pub fn retain(&self) -> Option<ObjectRef> {
        self.this.upgrade()
    }

    /// A weak reference to this object.
    pub fn downgrade(&self) -> Weak<Object> {
        self.this.clone()
    }

    /// Name of the declared class.
    pub fn type_name(&self) -> String {
        self.runtime
            .type_name(self.class)
            .unwrap_or_else(|| "<disposed>".to_owned())
    }

    /// Send a message to this object.
    pub fn send(&self, selector: impl Into<Selector>, args: &[Value]) -> Result<Value, InvokeError> {
        self.runtime
            .dispatch(&Receiver::Instance(self), selector.into(), args)
    }

    /// Whether the object implements or forwards `selector`.
    pub fn responds_to(&self, selector: impl Into<Selector>) -> bool {
        self.runtime.lookup(self.isa(), selector.into()).is_some()
    }

    /// Read an instance variable.
    pub fn ivar(&self, key: &str) -> Option<Value> {
        self.ivars.read().get(key).cloned()
    }

    /// Write an instance variable, returning the previous value.
    pub fn set_ivar(&self, key: &str, value: Value) -> Option<Value> {
        let mut ivars = self.ivars.write();
        match ivars.get_mut(key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                ivars.insert(Arc::from(key), value);
                None
            }
        }
    }

    /// Fetch an associated value of type `T`.
    pub fn associated<T: Any + Send + Sync>(&self, key: AssociationKey) -> Option<Arc<T>> {
        let value = self.associated.lock().get(&key).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Fetch an associated value, creating it on first use.
    ///
    /// Returns `None` if a value of another type is already stored under `key`.
    pub fn associated_or_insert_with<T, F>(&self, key: AssociationKey, init: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let value = self
            .associated
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(init()))
            .clone();
        value.downcast::<T>().ok()
    }

    /// Remove an associated value, returning it.
    pub fn remove_associated(&self, key: AssociationKey) -> Option<Arc<dyn Any + Send + Sync>> {
        self.associated.lock().remove(&key)
    }

    /// Register a callback fired once when the object is destroyed.
    pub fn on_destroy<F>(&self, observer: F) -> DestroyObserverId
    where
        F: FnOnce(ObjectId) + Send + 'static,
    {
        let id = DestroyObserverId(NEXT_OBSERVER.fetch_add(1, Ordering::Relaxed));
        self.destroy_observers.lock().push((id, Box::new(observer)));
        id
    }

    /// Unregister a destruction callback. Returns whether it was registered.
    pub fn remove_destroy_observer(&self, id: DestroyObserverId) -> bool {
        let removed = {
            let mut observers = self.destroy_observers.lock();
            observers
                .iter()
                .position(|(observer_id, _)| *observer_id == id)
                .map(|index| observers.remove(index))
        };
        removed.is_some()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("class", &self.type_name())
            .field("isa", &self.isa())
            .finish()
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        let runtime = self.runtime.clone();
        if let Err(_err) = runtime.dispatch(&Receiver::Instance(self), Selector::deinit(), &[]) {
            #[cfg(feature = "tracing")]
            tracing::warn!(object = %self.id, error = %_err, "deinit dispatch failed");
        }
        // Observers may register further observers while running.
        loop {
            let observers = std::mem::take(&mut *self.destroy_observers.lock());
            if observers.is_empty() {
                break;
            }
            for (_, observer) in observers {
                observer(self.id);
            }
        }
        runtime.finalize_object(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_ivars() {
        let runtime = Runtime::new();
        let object = runtime.instantiate(runtime.root_class()).unwrap();
        assert_eq!(object.set_ivar("n", Value::Int(1)), None);
        assert_eq!(object.set_ivar("n", Value::Int(2)), Some(Value::Int(1)));
        assert_eq!(object.ivar("n"), Some(Value::Int(2)));
    }

    #[test]
    fn test_destroy_observers_fire_once_in_order() {
        let runtime = Runtime::new();
        let object = runtime.instantiate(runtime.root_class()).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let expected_id = object.id();
        for tag in [1, 2] {
            let order = order.clone();
            object.on_destroy(move |id| {
                assert_eq!(id, expected_id);
                order.lock().push(tag);
            });
        }
        drop(object);
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn test_removed_observer_does_not_fire() {
        let runtime = Runtime::new();
        let object = runtime.instantiate(runtime.root_class()).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let id = object.on_destroy(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(object.remove_destroy_observer(id));
        assert!(!object.remove_destroy_observer(id));
        drop(object);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_associated_values() {
        const KEY: AssociationKey = AssociationKey::new("test.counter");
        let runtime = Runtime::new();
        let object = runtime.instantiate(runtime.root_class()).unwrap();
        let first = object.associated_or_insert_with(KEY, || 7u32).unwrap();
        let second = object.associated_or_insert_with(KEY, || 9u32).unwrap();
        assert_eq!((*first, *second), (7, 7));
        assert!(object.associated::<String>(KEY).is_none());
        assert!(object.remove_associated(KEY).is_some());
        assert!(object.associated::<u32>(KEY).is_none());
    }

    #[test]
    fn test_retain_while_alive() {
        let runtime = Runtime::new();
        let object = runtime.instantiate(runtime.root_class()).unwrap();
        let again = object.retain().unwrap();
        assert!(Arc::ptr_eq(&object, &again));
    }
}
