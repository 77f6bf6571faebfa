//! Class definition.

use crate::{
    dispatch::{DispatchTarget, Method, Receiver},
    error::{InvokeError, RuntimeError},
    protocol::ProtocolHandle,
    runtime::Runtime,
    selector::Selector,
    signature::Signature,
    types::{TypeHandle, TypeKind, TypeRecord},
    value::{Value, ValueKind},
};
use std::sync::Arc;

/// Builder for a new shared class and its metaclass.
///
/// # Example
/// ```ignore
/// let counter = runtime
///     .define_class("Counter")
///     .property("n", ValueKind::Int)
///     .method("increment", Signature::returning(ValueKind::Int), |receiver, _| { ... })
///     .class_method("zero", Signature::returning(ValueKind::Int), |_, _| Ok(Value::Int(0)))
///     .register()?;
/// ```
pub struct ClassBuilder<'r> {
    runtime: &'r Runtime,
    name: String,
    superclass: TypeHandle,
    methods: Vec<Method>,
    class_methods: Vec<Method>,
    protocols: Vec<ProtocolHandle>,
    properties: Vec<(Arc<str>, ValueKind)>,
}

impl<'r> ClassBuilder<'r> {
    pub(crate) fn new(runtime: &'r Runtime, name: String) -> Self {
        Self {
            runtime,
            name,
            superclass: runtime.root_class(),
            methods: Vec::new(),
            class_methods: Vec::new(),
            protocols: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Set the superclass.
    pub fn superclass(mut self, superclass: TypeHandle) -> Self {
        self.superclass = superclass;
        self
    }

    /// Add an instance method.
    pub fn method<F>(mut self, selector: impl Into<Selector>, signature: Signature, body: F) -> Self
    where
        F: Fn(&Receiver<'_>, &[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        self.methods
            .push(Method::new(selector.into(), signature, DispatchTarget::new(body)));
        self
    }

    /// Add a class (static) method.
    pub fn class_method<F>(mut self, selector: impl Into<Selector>, signature: Signature, body: F) -> Self
    where
        F: Fn(&Receiver<'_>, &[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        self.class_methods
            .push(Method::new(selector.into(), signature, DispatchTarget::new(body)));
        self
    }

    /// Add a stored property with a generated getter `key` and setter `setKey`.
    pub fn property(mut self, key: &str, kind: ValueKind) -> Self {
        let name: Arc<str> = Arc::from(key);
        let getter_key = name.clone();
        self.methods.push(Method::new(
            Selector::new(key),
            Signature::returning(kind),
            DispatchTarget::new(move |receiver, _| {
                let object = receiver.as_object().ok_or(InvokeError::Deallocated)?;
                Ok(object
                    .ivar(&getter_key)
                    .unwrap_or_else(|| Value::default_for(kind)))
            }),
        ));
        let setter_key = name.clone();
        self.methods.push(Method::new(
            Selector::setter_for(key),
            Signature::new([kind], ValueKind::Void),
            DispatchTarget::new(move |receiver, args| {
                let object = receiver.as_object().ok_or(InvokeError::Deallocated)?;
                let value = args.first().cloned().unwrap_or_default();
                let _previous = object.set_ivar(&setter_key, value);
                Ok(Value::Void)
            }),
        ));
        self.properties.push((name, kind));
        self
    }

    /// Declare conformance to a protocol.
    pub fn conforms_to(mut self, protocol: ProtocolHandle) -> Self {
        self.protocols.push(protocol);
        self
    }

    /// Register the class.
    ///
    /// Fails if the name is taken, the superclass is not a live shared class,
    /// or a required method of a conformed protocol is not implemented.
    pub fn register(self) -> Result<TypeHandle, RuntimeError> {
        let runtime = self.runtime;
        runtime.serialized(|| {
            let super_meta = match runtime.type_kind(self.superclass) {
                Some(TypeKind::Shared) => runtime.metaclass(self.superclass),
                Some(_) => {
                    let name = runtime.type_name(self.superclass).unwrap_or_default();
                    return Err(RuntimeError::NotInstantiable(name));
                }
                None => return Err(RuntimeError::UnknownType(self.superclass)),
            };
            for protocol in &self.protocols {
                if runtime.protocol_name(*protocol).is_none() {
                    return Err(RuntimeError::UnknownProtocol(protocol.index()));
                }
            }
            if runtime.class_named(&self.name).is_some() {
                return Err(RuntimeError::ClassExists(self.name));
            }

            let name: Arc<str> = Arc::from(self.name.as_str());
            let mut record = TypeRecord::new(name.clone(), Some(self.superclass), TypeKind::Shared);
            record.protocols = self.protocols.clone();
            record.properties = self.properties;
            for method in self.methods {
                record.methods.insert(method.selector, method);
            }
            let class = runtime.allocate_type(record, true)?;

            let mut meta = TypeRecord::new(name, super_meta, TypeKind::Meta { instance: class });
            for method in self.class_methods {
                meta.methods.insert(method.selector, method);
            }
            let meta = match runtime.allocate_type(meta, false) {
                Ok(meta) => meta,
                Err(err) => {
                    let _record = runtime.dispose_type(class);
                    return Err(err);
                }
            };
            runtime.with_type_mut(class, |record| record.metaclass = Some(meta))?;

            if let Err(err) = check_conformance(runtime, class, meta, &self.protocols) {
                let _meta = runtime.dispose_type(meta);
                let _class = runtime.dispose_type(class);
                return Err(err);
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(class = %self.name, ty = ?class, "registered class");
            Ok(class)
        })
    }
}

fn check_conformance(
    runtime: &Runtime,
    class: TypeHandle,
    meta: TypeHandle,
    protocols: &[ProtocolHandle],
) -> Result<(), RuntimeError> {
    for &protocol in protocols {
        for (owner, description) in runtime.protocol_closure_methods(protocol) {
            if !description.required {
                continue;
            }
            let host = if description.class_method { meta } else { class };
            if runtime.lookup(host, description.selector).is_none() {
                return Err(RuntimeError::MissingRequiredMethod {
                    class: runtime.type_name(class).unwrap_or_default(),
                    protocol: runtime.protocol_name(owner).unwrap_or_default(),
                    selector: description.selector,
                });
            }
        }
    }
    Ok(())
}
