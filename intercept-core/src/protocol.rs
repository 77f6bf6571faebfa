//! Protocols: named sets of method declarations a class can conform to.

use crate::{error::RuntimeError, runtime::Runtime, selector::Selector, signature::Signature};
use std::{collections::HashMap, sync::Arc};

/// Opaque identifier of a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolHandle(u32);

impl ProtocolHandle {
    pub(crate) fn index(self) -> u32 {
        self.0
    }
}

/// A method declared by a protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescription {
    /// The declared selector.
    pub selector: Selector,
    /// The declared calling convention.
    pub signature: Signature,
    /// Whether conforming classes must implement it.
    pub required: bool,
    /// Whether it is a class (static) method.
    pub class_method: bool,
}

pub(crate) struct ProtocolRecord {
    name: Arc<str>,
    inherits: Vec<ProtocolHandle>,
    methods: Vec<MethodDescription>,
}

#[derive(Default)]
pub(crate) struct ProtocolArena {
    records: Vec<ProtocolRecord>,
    by_name: HashMap<Arc<str>, ProtocolHandle>,
}

/// Builder for a protocol.
///
/// # Example
/// ```ignore
/// let delegate = runtime
///     .define_protocol("CounterDelegate")
///     .inherits(base_protocol)
///     .optional("counterDidReset", Signature::void())
///     .register()?;
/// ```
pub struct ProtocolBuilder<'r> {
    runtime: &'r Runtime,
    name: String,
    inherits: Vec<ProtocolHandle>,
    methods: Vec<MethodDescription>,
}

impl<'r> ProtocolBuilder<'r> {
    pub(crate) fn new(runtime: &'r Runtime, name: String) -> Self {
        Self {
            runtime,
            name,
            inherits: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Inherit every declaration of `parent`.
    pub fn inherits(mut self, parent: ProtocolHandle) -> Self {
        self.inherits.push(parent);
        self
    }

    fn declare(mut self, selector: Selector, signature: Signature, required: bool, class_method: bool) -> Self {
        self.methods.push(MethodDescription {
            selector,
            signature,
            required,
            class_method,
        });
        self
    }

    /// Declare a required instance method.
    pub fn required(self, selector: impl Into<Selector>, signature: Signature) -> Self {
        self.declare(selector.into(), signature, true, false)
    }

    /// Declare an optional instance method.
    pub fn optional(self, selector: impl Into<Selector>, signature: Signature) -> Self {
        self.declare(selector.into(), signature, false, false)
    }

    /// Declare a required class method.
    pub fn required_class_method(self, selector: impl Into<Selector>, signature: Signature) -> Self {
        self.declare(selector.into(), signature, true, true)
    }

    /// Declare an optional class method.
    pub fn optional_class_method(self, selector: impl Into<Selector>, signature: Signature) -> Self {
        self.declare(selector.into(), signature, false, true)
    }

    /// Register the protocol.
    pub fn register(self) -> Result<ProtocolHandle, RuntimeError> {
        let runtime = self.runtime;
        runtime.serialized(|| {
            let mut arena = runtime.inner.protocols.write();
            if arena.by_name.contains_key(self.name.as_str()) {
                return Err(RuntimeError::ProtocolExists(self.name));
            }
            if let Some(unknown) = self
                .inherits
                .iter()
                .find(|p| p.0 as usize >= arena.records.len())
            {
                return Err(RuntimeError::UnknownProtocol(unknown.0));
            }
            let handle = ProtocolHandle(arena.records.len() as u32);
            let name: Arc<str> = Arc::from(self.name.as_str());
            arena.records.push(ProtocolRecord {
                name: name.clone(),
                inherits: self.inherits,
                methods: self.methods,
            });
            arena.by_name.insert(name, handle);
            Ok(handle)
        })
    }
}

impl Runtime {
    /// Look up a protocol by name.
    pub fn protocol_named(&self, name: &str) -> Option<ProtocolHandle> {
        self.inner.protocols.read().by_name.get(name).copied()
    }

    /// Name of a protocol.
    pub fn protocol_name(&self, protocol: ProtocolHandle) -> Option<String> {
        self.inner
            .protocols
            .read()
            .records
            .get(protocol.0 as usize)
            .map(|r| r.name.to_string())
    }

    /// Protocols `protocol` directly inherits from.
    pub fn protocol_inherits(&self, protocol: ProtocolHandle) -> Vec<ProtocolHandle> {
        self.inner
            .protocols
            .read()
            .records
            .get(protocol.0 as usize)
            .map(|r| r.inherits.clone())
            .unwrap_or_default()
    }

    /// Methods `protocol` itself declares.
    pub fn protocol_methods(&self, protocol: ProtocolHandle) -> Vec<MethodDescription> {
        self.inner
            .protocols
            .read()
            .records
            .get(protocol.0 as usize)
            .map(|r| r.methods.clone())
            .unwrap_or_default()
    }

    /// The declaration of `selector` in `protocol` itself, if any.
    pub fn protocol_declaration(
        &self,
        protocol: ProtocolHandle,
        selector: Selector,
        class_method: bool,
    ) -> Option<MethodDescription> {
        self.inner
            .protocols
            .read()
            .records
            .get(protocol.0 as usize)?
            .methods
            .iter()
            .find(|m| m.selector == selector && m.class_method == class_method)
            .cloned()
    }

    /// Every declaration reachable from `protocol`, depth-first, each paired
    /// with the protocol that declares it.
    pub fn protocol_closure_methods(&self, protocol: ProtocolHandle) -> Vec<(ProtocolHandle, MethodDescription)> {
        let mut out = Vec::new();
        let mut seen = Vec::new();
        let mut stack = vec![protocol];
        while let Some(current) = stack.pop() {
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);
            for method in self.protocol_methods(current) {
                out.push((current, method));
            }
            // Reverse so the first parent is visited first.
            stack.extend(self.protocol_inherits(current).into_iter().rev());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn test_register_and_query() {
        let runtime = Runtime::new();
        let base = runtime
            .define_protocol("Base")
            .optional("ping", Signature::void())
            .register()
            .unwrap();
        let derived = runtime
            .define_protocol("Derived")
            .inherits(base)
            .optional("count", Signature::returning(ValueKind::Int))
            .optional_class_method("shared", Signature::returning(ValueKind::Object))
            .register()
            .unwrap();
        assert_eq!(runtime.protocol_named("Derived"), Some(derived));
        assert_eq!(runtime.protocol_inherits(derived), vec![base]);
        assert!(runtime.protocol_declaration(derived, "count".into(), false).is_some());
        assert!(runtime.protocol_declaration(derived, "shared".into(), false).is_none());
        assert!(runtime.protocol_declaration(derived, "shared".into(), true).is_some());

        let all: Vec<_> = runtime
            .protocol_closure_methods(derived)
            .into_iter()
            .map(|(owner, m)| (owner, m.selector.name()))
            .collect();
        assert_eq!(all, vec![(derived, "count"), (derived, "shared"), (base, "ping")]);
    }

    #[test]
    fn test_duplicate_protocol() {
        let runtime = Runtime::new();
        runtime.define_protocol("P").register().unwrap();
        let err = runtime.define_protocol("P").register().unwrap_err();
        assert_eq!(err, RuntimeError::ProtocolExists("P".into()));
    }
}
