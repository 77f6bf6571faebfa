//! Per-object specialized subtypes.
//!
//! An object gets at most one private subtype, shared by every consumer that
//! needs per-object overrides (interception, observation, or anything else
//! that registers a [`ConsumerTag`]). Uses are counted per tag; the subtype
//! lives until the last use of the last tag is released, at which point the
//! object's type pointer goes back to its shared class and the subtype is
//! disposed. A consumer that releases while others remain is responsible
//! for removing its own overrides first.

use crate::{
    error::RuntimeError,
    object::{Object, ObjectId},
    runtime::Runtime,
    types::{TypeHandle, TypeKind, TypeRecord},
};
use std::{collections::HashMap, fmt, sync::Weak};

/// Identifies a consumer of specialized subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerTag(&'static str);

impl ConsumerTag {
    /// The interception engine.
    pub const INTERCEPTION: ConsumerTag = ConsumerTag("interception");
    /// Key-value observation.
    pub const OBSERVATION: ConsumerTag = ConsumerTag("observation");

    /// A custom consumer.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The consumer's name.
    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ConsumerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

pub(crate) struct Specialization {
    subtype: TypeHandle,
    base: TypeHandle,
    object: Weak<Object>,
    consumers: HashMap<ConsumerTag, usize>,
}

/// Snapshot of an object's specialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecializationInfo {
    /// The private subtype.
    pub subtype: TypeHandle,
    /// The shared type the object had before.
    pub base: TypeHandle,
    /// Outstanding uses per consumer.
    pub consumers: Vec<(ConsumerTag, usize)>,
}

impl SpecializationInfo {
    /// Outstanding uses by `consumer`.
    pub fn uses(&self, consumer: ConsumerTag) -> usize {
        self.consumers
            .iter()
            .find(|(tag, _)| *tag == consumer)
            .map_or(0, |(_, n)| *n)
    }

    /// Whether `consumer` holds any use.
    pub fn has_consumer(&self, consumer: ConsumerTag) -> bool {
        self.uses(consumer) > 0
    }
}

impl Runtime {
    /// Return the object's private subtype, creating it if needed, and count
    /// one use by `consumer`.
    ///
    /// When the object already has a subtype (created by any consumer) it is
    /// reused rather than layered.
    pub fn specialize(&self, object: &Object, consumer: ConsumerTag) -> Result<TypeHandle, RuntimeError> {
        self.serialized(|| {
            let mut specializations = self.inner.specializations.lock();
            if let Some(existing) = specializations.get_mut(&object.id()) {
                *existing.consumers.entry(consumer).or_default() += 1;
                return Ok(existing.subtype);
            }

            let base = object.isa();
            let base_name = self
                .type_name(base)
                .ok_or(RuntimeError::UnknownType(base))?;
            let name = format!("{}{}_{}", self.inner.config.subtype_prefix, base_name, object.id().get());
            let mut record = TypeRecord::new(
                name.as_str().into(),
                Some(base),
                TypeKind::Specialized {
                    object: object.id(),
                    base,
                },
            );
            record.metaclass = self.metaclass(base);
            let subtype = self.allocate_type(record, true)?;
            object.set_isa(subtype);
            specializations.insert(
                object.id(),
                Specialization {
                    subtype,
                    base,
                    object: object.downgrade(),
                    consumers: HashMap::from([(consumer, 1)]),
                },
            );
            #[cfg(feature = "tracing")]
            tracing::debug!(object = %object.id(), subtype = %name, %consumer, "created specialized subtype");
            Ok(subtype)
        })
    }

    /// Release one use by `consumer`. Returns whether the subtype was disposed.
    pub fn release_specialization(&self, object: ObjectId, consumer: ConsumerTag) -> bool {
        self.serialized(|| {
            let finished = {
                let mut specializations = self.inner.specializations.lock();
                let Some(entry) = specializations.get_mut(&object) else {
                    return false;
                };
                match entry.consumers.get_mut(&consumer) {
                    Some(n) if *n > 1 => *n -= 1,
                    Some(_) => {
                        entry.consumers.remove(&consumer);
                    }
                    None => return false,
                }
                if !entry.consumers.is_empty() {
                    return false;
                }
                specializations.remove(&object)
            };
            match finished {
                Some(specialization) => {
                    self.dissolve(object, specialization);
                    true
                }
                None => false,
            }
        })
    }

    /// The object's specialization, if it has one.
    pub fn specialization_of(&self, object: ObjectId) -> Option<SpecializationInfo> {
        let specializations = self.inner.specializations.lock();
        let entry = specializations.get(&object)?;
        let mut consumers: Vec<_> = entry.consumers.iter().map(|(t, n)| (*t, *n)).collect();
        consumers.sort_by_key(|(tag, _)| tag.name());
        Some(SpecializationInfo {
            subtype: entry.subtype,
            base: entry.base,
            consumers,
        })
    }

    /// Number of objects that currently have a specialized subtype.
    pub fn specialized_object_count(&self) -> usize {
        self.inner.specializations.lock().len()
    }

    /// Dispose whatever specialization survived the object's destruction.
    pub(crate) fn finalize_object(&self, object: ObjectId) {
        self.serialized(|| {
            let leftover = self.inner.specializations.lock().remove(&object);
            if let Some(specialization) = leftover {
                #[cfg(feature = "tracing")]
                tracing::debug!(%object, consumers = specialization.consumers.len(), "disposing subtype of destroyed object");
                self.dissolve(object, specialization);
            }
        });
    }

    fn dissolve(&self, _object: ObjectId, specialization: Specialization) {
        if let Some(live) = specialization.object.upgrade() {
            live.set_isa(specialization.base);
        }
        let record = self.dispose_type(specialization.subtype);
        #[cfg(feature = "tracing")]
        tracing::debug!(object = %_object, subtype = ?specialization.subtype, "disposed specialized subtype");
        drop(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{signature::Signature, value::ValueKind};

    #[test]
    fn test_specialize_and_release() {
        let runtime = Runtime::new();
        let class = runtime.define_class("Thing").register().unwrap();
        let object = runtime.instantiate(class).unwrap();
        let types_before = runtime.live_type_count();

        let subtype = runtime.specialize(&object, ConsumerTag::INTERCEPTION).unwrap();
        assert_eq!(object.isa(), subtype);
        assert_eq!(object.class(), class);
        assert_eq!(runtime.superclass(subtype), Some(class));
        assert!(runtime.is_specialized(subtype));
        assert_eq!(runtime.type_name(subtype).unwrap(), format!("Intercept_Thing_{}", object.id().get()));

        assert!(runtime.release_specialization(object.id(), ConsumerTag::INTERCEPTION));
        assert_eq!(object.isa(), class);
        assert!(!runtime.is_live(subtype));
        assert_eq!(runtime.live_type_count(), types_before);
    }

    #[test]
    fn test_consumers_share_one_subtype() {
        let runtime = Runtime::new();
        let object = runtime.instantiate(runtime.root_class()).unwrap();
        let first = runtime.specialize(&object, ConsumerTag::OBSERVATION).unwrap();
        let second = runtime.specialize(&object, ConsumerTag::INTERCEPTION).unwrap();
        assert_eq!(first, second);

        let info = runtime.specialization_of(object.id()).unwrap();
        assert!(info.has_consumer(ConsumerTag::OBSERVATION));
        assert_eq!(info.uses(ConsumerTag::INTERCEPTION), 1);

        assert!(!runtime.release_specialization(object.id(), ConsumerTag::OBSERVATION));
        assert_eq!(object.isa(), first);
        assert!(runtime.release_specialization(object.id(), ConsumerTag::INTERCEPTION));
        assert!(runtime.specialization_of(object.id()).is_none());
    }

    #[test]
    fn test_release_unknown_consumer_is_noop() {
        let runtime = Runtime::new();
        let object = runtime.instantiate(runtime.root_class()).unwrap();
        runtime.specialize(&object, ConsumerTag::INTERCEPTION).unwrap();
        assert!(!runtime.release_specialization(object.id(), ConsumerTag::new("other")));
        assert!(runtime.specialization_of(object.id()).is_some());
    }

    #[test]
    fn test_overrides_stay_on_one_object() {
        let runtime = Runtime::new();
        let class = runtime
            .define_class("Greeter")
            .method("greet", Signature::returning(ValueKind::Str), |_, _| Ok("hello".into()))
            .register()
            .unwrap();
        let a = runtime.instantiate(class).unwrap();
        let b = runtime.instantiate(class).unwrap();
        let subtype = runtime.specialize(&a, ConsumerTag::INTERCEPTION).unwrap();
        let method = runtime.lookup(class, "greet".into()).unwrap();
        runtime
            .install_method(
                subtype,
                method.with_target(
                    crate::DispatchTarget::new(|_, _| Ok("hi".into())),
                    ConsumerTag::INTERCEPTION,
                ),
            )
            .unwrap();
        assert_eq!(a.send("greet", &[]).unwrap().as_str(), Some("hi"));
        assert_eq!(b.send("greet", &[]).unwrap().as_str(), Some("hello"));
    }

    #[test]
    fn test_destroyed_object_leaves_no_subtype() {
        let runtime = Runtime::new();
        let object = runtime.instantiate(runtime.root_class()).unwrap();
        let types_before = runtime.live_type_count();
        runtime.specialize(&object, ConsumerTag::OBSERVATION).unwrap();
        assert_eq!(runtime.live_type_count(), types_before + 1);
        drop(object);
        assert_eq!(runtime.live_type_count(), types_before);
        assert_eq!(runtime.specialized_object_count(), 0);
    }

    #[test]
    fn test_exhausted_type_table() {
        let runtime = Runtime::builder().with_type_capacity(2).build();
        let object = runtime.instantiate(runtime.root_class()).unwrap();
        let err = runtime.specialize(&object, ConsumerTag::INTERCEPTION).unwrap_err();
        assert!(matches!(err, RuntimeError::SubclassCreationFailed(_)));
        assert_eq!(object.isa(), runtime.root_class());
    }
}
