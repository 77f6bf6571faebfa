//! Runtime type descriptors and the type arena.
//!
//! Every class is a [`TypeRecord`] in an arena owned by the
//! [`Runtime`](crate::Runtime). Records point at their superclass, forming a
//! single-rooted tree, and own a dispatch table mapping selectors to
//! [`Method`]s. Handles carry a generation so a handle to a disposed
//! specialized subtype never aliases a later record in the same slot.

use crate::{
    dispatch::Method,
    object::ObjectId,
    protocol::ProtocolHandle,
    selector::Selector,
    value::ValueKind,
};
use std::{collections::HashMap, sync::Arc};

/// Opaque identifier of a runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle {
    index: u32,
    generation: u32,
}

/// What a type record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// A declared class shared by all of its instances.
    Shared,
    /// The metaclass holding a class's own (static) methods.
    Meta {
        /// The class whose metaclass this is.
        instance: TypeHandle,
    },
    /// A private subtype whose only instance is one object.
    Specialized {
        /// The object this subtype was created for.
        object: ObjectId,
        /// The type the object had before specialization.
        base: TypeHandle,
    },
}

pub(crate) struct TypeRecord {
    pub(crate) name: Arc<str>,
    pub(crate) superclass: Option<TypeHandle>,
    pub(crate) metaclass: Option<TypeHandle>,
    pub(crate) kind: TypeKind,
    pub(crate) methods: HashMap<Selector, Method>,
    pub(crate) protocols: Vec<ProtocolHandle>,
    pub(crate) properties: Vec<(Arc<str>, ValueKind)>,
}

impl TypeRecord {
    pub(crate) fn new(name: Arc<str>, superclass: Option<TypeHandle>, kind: TypeKind) -> Self {
        Self {
            name,
            superclass,
            metaclass: None,
            kind,
            methods: HashMap::new(),
            protocols: Vec::new(),
            properties: Vec::new(),
        }
    }
}

struct Slot {
    generation: u32,
    record: Option<TypeRecord>,
}

/// Arena of type records with name lookup for shared classes.
pub(crate) struct TypeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_name: HashMap<Arc<str>, TypeHandle>,
    live: usize,
    capacity: usize,
}

impl TypeArena {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_name: HashMap::new(),
            live: 0,
            capacity,
        }
    }

    pub(crate) fn get(&self, handle: TypeHandle) -> Option<&TypeRecord> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_ref())
    }

    pub(crate) fn get_mut(&mut self, handle: TypeHandle) -> Option<&mut TypeRecord> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_mut())
    }

    pub(crate) fn named(&self, name: &str) -> Option<TypeHandle> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }

    /// Insert a record. `named` records are registered for name lookup and
    /// must have a unique name.
    pub(crate) fn insert(&mut self, record: TypeRecord, named: bool) -> Result<TypeHandle, String> {
        if named && self.by_name.contains_key(&record.name) {
            return Err(format!("type name `{}` is already registered", record.name));
        }
        if self.live >= self.capacity {
            return Err(format!("type table exhausted ({} types)", self.capacity));
        }
        let name = record.name.clone();
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.record = Some(record);
                TypeHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .map_err(|_| "type handle space exhausted".to_owned())?;
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                TypeHandle {
                    index,
                    generation: 0,
                }
            }
        };
        if named {
            self.by_name.insert(name, handle);
        }
        self.live += 1;
        Ok(handle)
    }

    /// Remove a record, returning it so the caller can drop it outside the lock.
    pub(crate) fn remove(&mut self, handle: TypeHandle) -> Option<TypeRecord> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let record = slot.record.take()?;
        if self.by_name.get(&record.name) == Some(&handle) {
            self.by_name.remove(&record.name);
        }
        self.free.push(handle.index);
        self.live -= 1;
        Some(record)
    }

    /// Find the first method for `selector`, starting at `handle` and walking
    /// superclasses.
    pub(crate) fn lookup(&self, mut handle: TypeHandle, selector: Selector) -> Option<(TypeHandle, &Method)> {
        loop {
            let record = self.get(handle)?;
            if let Some(method) = record.methods.get(&selector) {
                return Some((handle, method));
            }
            handle = record.superclass?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, superclass: Option<TypeHandle>) -> TypeRecord {
        TypeRecord::new(Arc::from(name), superclass, TypeKind::Shared)
    }

    #[test]
    fn test_insert_and_lookup_by_name() {
        let mut arena = TypeArena::new(8);
        let root = arena.insert(record("Object", None), true).unwrap();
        assert_eq!(arena.named("Object"), Some(root));
        assert!(arena.insert(record("Object", None), true).is_err());
    }

    #[test]
    fn test_removed_handle_is_stale() {
        let mut arena = TypeArena::new(8);
        let first = arena.insert(record("Tmp", None), true).unwrap();
        assert!(arena.remove(first).is_some());
        let second = arena.insert(record("Tmp", None), true).unwrap();
        assert!(arena.get(first).is_none());
        assert!(arena.get(second).is_some());
        assert_eq!(arena.live(), 1);
    }

    #[test]
    fn test_capacity() {
        let mut arena = TypeArena::new(1);
        arena.insert(record("A", None), true).unwrap();
        let err = arena.insert(record("B", None), true).unwrap_err();
        assert!(err.contains("exhausted"));
    }
}
