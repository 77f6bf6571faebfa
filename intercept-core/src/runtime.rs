//! The host object model.
//!
//! [`Runtime`] is a cheaply clonable handle to one object model: the type
//! arena with its dispatch tables, the protocol table, the per-object
//! specialization records and the serialization gateway.
//!
//! # Serialization
//!
//! Every mutation performed on behalf of a consumer (installing or removing a
//! method, creating or disposing a specialized subtype) runs inside
//! [`Runtime::serialized`], a single reentrant mutual-exclusion domain.
//! Message dispatch never enters it: [`Runtime::dispatch`] takes a short read
//! lock to resolve the target, releases it, then calls the target.

use crate::{
    class::ClassBuilder,
    dispatch::{DispatchTarget, Method, Receiver},
    error::{InvokeError, RuntimeError},
    invocation::ForwardedMessage,
    object::{Object, ObjectId, ObjectRef},
    protocol::{ProtocolArena, ProtocolBuilder},
    selector::Selector,
    signature::Signature,
    specialize::Specialization,
    types::{TypeArena, TypeHandle, TypeKind, TypeRecord},
    value::{Value, ValueKind},
};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Configuration for a [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Prefix of specialized subtype names. Default `"Intercept_"`.
    pub subtype_prefix: String,
    /// Maximum number of live types, including metaclasses and subtypes.
    pub type_capacity: usize,
    /// Name of the root class. Default `"Object"`.
    pub root_class_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            subtype_prefix: "Intercept_".to_owned(),
            type_capacity: 1 << 20,
            root_class_name: "Object".to_owned(),
        }
    }
}

/// Builder for a [`Runtime`].
///
/// # Example
/// ```ignore
/// let runtime = Runtime::builder()
///     .with_subtype_prefix("Hooked_")
///     .with_type_capacity(1024)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the specialized subtype name prefix.
    pub fn with_subtype_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.subtype_prefix = prefix.into();
        self
    }

    /// Set the maximum number of live types.
    pub fn with_type_capacity(mut self, capacity: usize) -> Self {
        self.config.type_capacity = capacity;
        self
    }

    /// Set the root class name.
    pub fn with_root_class_name(mut self, name: impl Into<String>) -> Self {
        self.config.root_class_name = name.into();
        self
    }

    /// Build the runtime.
    pub fn build(self) -> Runtime {
        Runtime::with_config(self.config)
    }
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) types: RwLock<TypeArena>,
    pub(crate) protocols: RwLock<ProtocolArena>,
    pub(crate) specializations: Mutex<HashMap<ObjectId, Specialization>>,
    gate: ReentrantMutex<()>,
    next_object: AtomicU64,
    extensions: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    root: TypeHandle,
}

/// Handle to an object model.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("types", &self.live_type_count())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Create a runtime with default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Start configuring a runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let mut types = TypeArena::new(config.type_capacity.max(2));
        let root = bootstrap_root(&mut types, &config.root_class_name);
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                types: RwLock::new(types),
                protocols: RwLock::new(ProtocolArena::default()),
                specializations: Mutex::new(HashMap::new()),
                gate: ReentrantMutex::new(()),
                next_object: AtomicU64::new(1),
                extensions: Mutex::new(HashMap::new()),
                root,
            }),
        }
    }

    /// The configuration this runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Run `f` inside the runtime's serial execution region.
    ///
    /// The region is reentrant: a closure running inside it may call back
    /// into code that enters it again on the same thread.
    pub fn serialized<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.gate.lock();
        f()
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(a: &Runtime, b: &Runtime) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Per-runtime state of type `T`, created on first use.
    pub fn extension<T: Any + Send + Sync + Default>(&self) -> Arc<T> {
        let value = self
            .inner
            .extensions
            .lock()
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(T::default()))
            .clone();
        match value.downcast::<T>() {
            Ok(ext) => ext,
            // Keyed by `TypeId::of::<T>()`, so the downcast cannot fail.
            Err(_) => unreachable!("extension slot holds a foreign type"),
        }
    }

    // ------------------------------------------------------------------
    // Classes
    // ------------------------------------------------------------------

    /// The root class every other class descends from.
    pub fn root_class(&self) -> TypeHandle {
        self.inner.root
    }

    /// Start defining a class. Its superclass defaults to the root class.
    pub fn define_class(&self, name: impl Into<String>) -> ClassBuilder<'_> {
        ClassBuilder::new(self, name.into())
    }

    /// Start defining a protocol.
    pub fn define_protocol(&self, name: impl Into<String>) -> ProtocolBuilder<'_> {
        ProtocolBuilder::new(self, name.into())
    }

    /// Look up a shared class by name.
    pub fn class_named(&self, name: &str) -> Option<TypeHandle> {
        self.inner.types.read().named(name)
    }

    /// Name of a type.
    pub fn type_name(&self, handle: TypeHandle) -> Option<String> {
        self.inner.types.read().get(handle).map(|r| r.name.to_string())
    }

    /// Kind of a type.
    pub fn type_kind(&self, handle: TypeHandle) -> Option<TypeKind> {
        self.inner.types.read().get(handle).map(|r| r.kind)
    }

    /// Whether the handle names a live type.
    pub fn is_live(&self, handle: TypeHandle) -> bool {
        self.inner.types.read().get(handle).is_some()
    }

    /// Whether the type is a private per-object subtype.
    pub fn is_specialized(&self, handle: TypeHandle) -> bool {
        matches!(self.type_kind(handle), Some(TypeKind::Specialized { .. }))
    }

    /// Superclass of a type.
    pub fn superclass(&self, handle: TypeHandle) -> Option<TypeHandle> {
        self.inner.types.read().get(handle)?.superclass
    }

    /// Metaclass of a type.
    pub fn metaclass(&self, handle: TypeHandle) -> Option<TypeHandle> {
        self.inner.types.read().get(handle)?.metaclass
    }

    /// `handle` followed by all of its superclasses.
    pub fn ancestry(&self, handle: TypeHandle) -> Vec<TypeHandle> {
        let types = self.inner.types.read();
        let mut chain = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            let Some(record) = types.get(h) else { break };
            chain.push(h);
            current = record.superclass;
        }
        chain
    }

    /// Whether `handle` is `ancestor` or inherits from it.
    pub fn is_subclass(&self, handle: TypeHandle, ancestor: TypeHandle) -> bool {
        self.ancestry(handle).contains(&ancestor)
    }

    /// Protocols a type directly declares conformance to.
    pub fn conformed_protocols(&self, handle: TypeHandle) -> Vec<crate::ProtocolHandle> {
        self.inner
            .types
            .read()
            .get(handle)
            .map(|r| r.protocols.clone())
            .unwrap_or_default()
    }

    /// Properties a type declares directly, with their kinds.
    pub fn declared_properties(&self, handle: TypeHandle) -> Vec<(String, ValueKind)> {
        self.inner
            .types
            .read()
            .get(handle)
            .map(|r| r.properties.iter().map(|(n, k)| (n.to_string(), *k)).collect())
            .unwrap_or_default()
    }

    /// Number of live types. Specialized subtypes count while they exist.
    pub fn live_type_count(&self) -> usize {
        self.inner.types.read().live()
    }

    pub(crate) fn allocate_type(&self, record: TypeRecord, named: bool) -> Result<TypeHandle, RuntimeError> {
        let handle = self
            .inner
            .types
            .write()
            .insert(record, named)
            .map_err(RuntimeError::SubclassCreationFailed)?;
        Ok(handle)
    }

    pub(crate) fn dispose_type(&self, handle: TypeHandle) -> Option<TypeRecord> {
        self.inner.types.write().remove(handle)
    }

    pub(crate) fn with_type_mut<R>(
        &self,
        handle: TypeHandle,
        f: impl FnOnce(&mut TypeRecord) -> R,
    ) -> Result<R, RuntimeError> {
        let mut types = self.inner.types.write();
        let record = types.get_mut(handle).ok_or(RuntimeError::UnknownType(handle))?;
        Ok(f(record))
    }

    // ------------------------------------------------------------------
    // Dispatch tables
    // ------------------------------------------------------------------

    /// Resolve `selector` on `handle`, walking superclasses.
    pub fn lookup(&self, handle: TypeHandle, selector: Selector) -> Option<Method> {
        self.inner
            .types
            .read()
            .lookup(handle, selector)
            .map(|(_, method)| method.clone())
    }

    /// Resolve `selector` and report which type in the chain implements it.
    pub fn lookup_with_owner(&self, handle: TypeHandle, selector: Selector) -> Option<(TypeHandle, Method)> {
        self.inner
            .types
            .read()
            .lookup(handle, selector)
            .map(|(owner, method)| (owner, method.clone()))
    }

    /// Signature of `selector` as resolved from `handle`.
    pub fn method_signature(&self, handle: TypeHandle, selector: Selector) -> Option<Signature> {
        self.inner
            .types
            .read()
            .lookup(handle, selector)
            .map(|(_, method)| method.signature.clone())
    }

    /// The entry `handle` itself holds for `selector`, ignoring superclasses.
    pub fn own_method(&self, handle: TypeHandle, selector: Selector) -> Option<Method> {
        self.inner.types.read().get(handle)?.methods.get(&selector).cloned()
    }

    /// Selectors `handle` itself implements.
    pub fn own_selectors(&self, handle: TypeHandle) -> Vec<Selector> {
        let types = self.inner.types.read();
        let mut selectors: Vec<Selector> = types
            .get(handle)
            .map(|r| r.methods.keys().copied().collect())
            .unwrap_or_default();
        selectors.sort();
        selectors
    }

    /// Install `method` on `handle`, superseding any entry for the same
    /// selector. Returns the superseded entry.
    pub fn install_method(&self, handle: TypeHandle, method: Method) -> Result<Option<Method>, RuntimeError> {
        self.serialized(|| {
            #[cfg(feature = "tracing")]
            tracing::trace!(ty = ?handle, selector = %method.selector, target = ?method.target, "install method");
            self.with_type_mut(handle, |record| record.methods.insert(method.selector, method))
        })
    }

    /// Remove the entry `handle` holds for `selector`.
    pub fn remove_method(&self, handle: TypeHandle, selector: Selector) -> Result<Option<Method>, RuntimeError> {
        self.serialized(|| {
            #[cfg(feature = "tracing")]
            tracing::trace!(ty = ?handle, %selector, "remove method");
            self.with_type_mut(handle, |record| record.methods.remove(&selector))
        })
    }

    /// Whether the currently installed entry for `selector` on `handle` is `target`.
    pub fn is_installed(&self, handle: TypeHandle, selector: Selector, target: &DispatchTarget) -> bool {
        self.inner
            .types
            .read()
            .get(handle)
            .and_then(|r| r.methods.get(&selector))
            .is_some_and(|m| DispatchTarget::ptr_eq(&m.target, target))
    }

    // ------------------------------------------------------------------
    // Objects and messaging
    // ------------------------------------------------------------------

    /// Create an instance of a shared class. Properties start at their zero value.
    pub fn instantiate(&self, class: TypeHandle) -> Result<ObjectRef, RuntimeError> {
        let ivars = {
            let types = self.inner.types.read();
            let record = types.get(class).ok_or(RuntimeError::UnknownType(class))?;
            if record.kind != TypeKind::Shared {
                return Err(RuntimeError::NotInstantiable(record.name.to_string()));
            }
            let mut ivars = HashMap::new();
            let mut current = Some(class);
            while let Some(handle) = current {
                let Some(record) = types.get(handle) else { break };
                for (name, kind) in &record.properties {
                    ivars
                        .entry(name.clone())
                        .or_insert_with(|| Value::default_for(*kind));
                }
                current = record.superclass;
            }
            ivars
        };
        let id = ObjectId(self.inner.next_object.fetch_add(1, Ordering::Relaxed));
        Ok(Object::new_ref(self.clone(), id, class, ivars))
    }

    /// Send a message to an object.
    pub fn send(&self, object: &Object, selector: impl Into<Selector>, args: &[Value]) -> Result<Value, InvokeError> {
        self.dispatch(&Receiver::Instance(object), selector.into(), args)
    }

    /// Send a class method to a class.
    pub fn send_class(
        &self,
        class: TypeHandle,
        selector: impl Into<Selector>,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        self.dispatch(&Receiver::Class { runtime: self, class }, selector.into(), args)
    }

    /// Dispatch a message through the receiver's current dispatch table.
    ///
    /// Arguments and the return value are validated against the resolved
    /// method's signature. A selector nobody implements is handed to the
    /// receiver's `forwardInvocation` implementation if it has one.
    pub fn dispatch(&self, receiver: &Receiver<'_>, selector: Selector, args: &[Value]) -> Result<Value, InvokeError> {
        let start = receiver.dispatch_type().ok_or_else(|| InvokeError::UnrecognizedSelector {
            type_name: receiver.type_name(),
            selector,
        })?;
        self.dispatch_from(receiver, start, selector, args)
    }

    /// Dispatch starting at the superclass of `from`.
    pub fn send_super(
        &self,
        receiver: &Receiver<'_>,
        from: TypeHandle,
        selector: Selector,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        match self.superclass(from) {
            Some(parent) => self.dispatch_from(receiver, parent, selector, args),
            None => Err(InvokeError::UnrecognizedSelector {
                type_name: receiver.type_name(),
                selector,
            }),
        }
    }

    /// Dispatch starting at `start` itself, whatever the receiver's current
    /// type. Fails if `start` is no longer live.
    pub fn send_from(
        &self,
        receiver: &Receiver<'_>,
        start: TypeHandle,
        selector: Selector,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        if !self.is_live(start) {
            return Err(InvokeError::UnrecognizedSelector {
                type_name: receiver.type_name(),
                selector,
            });
        }
        self.dispatch_from(receiver, start, selector, args)
    }

    fn dispatch_from(
        &self,
        receiver: &Receiver<'_>,
        start: TypeHandle,
        selector: Selector,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        let resolved = {
            let types = self.inner.types.read();
            match types.lookup(start, selector) {
                Some((_, method)) => {
                    method.signature.check_args(selector, args)?;
                    Some((method.target.clone(), method.signature.clone()))
                }
                None => None,
            }
        };
        match resolved {
            Some((target, signature)) => {
                let value = target.invoke(receiver, args)?;
                signature.check_return(selector, &value)?;
                Ok(value)
            }
            None => self.forward(receiver, start, selector, args),
        }
    }

    fn forward(
        &self,
        receiver: &Receiver<'_>,
        start: TypeHandle,
        selector: Selector,
        args: &[Value],
    ) -> Result<Value, InvokeError> {
        let forwarding = selector != Selector::forward_invocation();
        let handler = if forwarding {
            self.lookup(start, Selector::forward_invocation())
        } else {
            None
        };
        match handler {
            Some(method) => {
                let message = Value::opaque(ForwardedMessage {
                    selector,
                    arguments: args.to_vec(),
                });
                method.target.invoke(receiver, &[message])
            }
            None => Err(InvokeError::UnrecognizedSelector {
                type_name: receiver.type_name(),
                selector,
            }),
        }
    }
}

fn bootstrap_root(types: &mut TypeArena, name: &str) -> TypeHandle {
    let name: Arc<str> = Arc::from(name);
    let mut record = TypeRecord::new(name.clone(), None, TypeKind::Shared);
    record.methods.insert(
        Selector::deinit(),
        Method::new(Selector::deinit(), Signature::void(), DispatchTarget::noop(ValueKind::Void)),
    );
    record.methods.insert(
        Selector::new("description"),
        Method::new(
            Selector::new("description"),
            Signature::returning(ValueKind::Str),
            DispatchTarget::new(|receiver, _| {
                Ok(match receiver.as_object() {
                    Some(object) => Value::from(format!("<{} {}>", receiver.type_name(), object.id())),
                    None => Value::from(receiver.type_name()),
                })
            }),
        ),
    );
    // An empty arena always has room for the root pair.
    let root = match types.insert(record, true) {
        Ok(handle) => handle,
        Err(reason) => unreachable!("bootstrapping root class: {reason}"),
    };
    let meta = TypeRecord::new(name, None, TypeKind::Meta { instance: root });
    let meta = match types.insert(meta, false) {
        Ok(handle) => handle,
        Err(reason) => unreachable!("bootstrapping root metaclass: {reason}"),
    };
    if let Some(record) = types.get_mut(root) {
        record.metaclass = Some(meta);
    }
    root
}
