//! Per-runtime bookkeeping of contexts and attachments.
//!
//! The registry is a runtime extension. Every mutation runs inside
//! [`Runtime::serialized`]; the registry's own mutex is only held for map
//! updates and is never held while dispatch tables change, user closures
//! run, or anything that may own an object is dropped.

use crate::{
    context::{ContextKey, HookContext, Released},
    modes::HookModes,
    resolver::{resolve_added, resolve_hook},
    scope::{HookScope, HookTarget},
};
use intercept_core::{
    ClosureHandle, ConsumerTag, DestroyObserverId, DispatchTarget, HookError, HookMode, Method,
    Object, ObjectId, Runtime, Selector, TypeHandle, Value, ValueKind,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

pub(crate) type AttachmentId = u64;

/// What an attachment contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttachmentKind {
    Hook(HookMode),
    Added,
}

impl AttachmentKind {
    fn matches(self, modes: HookModes) -> bool {
        match self {
            AttachmentKind::Hook(mode) => modes.includes(mode),
            AttachmentKind::Added => modes.contains(HookModes::ADDED),
        }
    }
}

struct Attachment {
    key: ContextKey,
    kind: AttachmentKind,
    closure: ClosureHandle,
    object: Option<ObjectId>,
}

struct AddedMethod {
    target: DispatchTarget,
    alive: Arc<AtomicBool>,
}

struct ObjectEntry {
    observer: DestroyObserverId,
    object: Weak<Object>,
    attachments: usize,
}

#[derive(Default)]
struct RegistryState {
    contexts: HashMap<ContextKey, Arc<HookContext>>,
    added: HashMap<ContextKey, AddedMethod>,
    /// Reverted added methods still wrapped by a context, keyed by (type, selector).
    orphans: HashMap<(TypeHandle, Selector), DispatchTarget>,
    attachments: HashMap<AttachmentId, Attachment>,
    objects: HashMap<ObjectId, ObjectEntry>,
}

/// Contexts and attachments of one runtime.
#[derive(Default)]
pub(crate) struct HookRegistry {
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
}

/// Everything one detach gives up, dropped after the registry lock is released.
#[derive(Default)]
struct Detached {
    attachment: Option<Attachment>,
    released: Vec<Released>,
    methods: Vec<Method>,
    context: Option<Arc<HookContext>>,
}

impl HookRegistry {
    pub(crate) fn of(runtime: &Runtime) -> Arc<HookRegistry> {
        runtime.extension::<HookRegistry>()
    }

    fn next_id(&self) -> AttachmentId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ------------------------------------------------------------------
    // Attaching
    // ------------------------------------------------------------------

    /// Attach `closure` in `mode` to `selector` of `target`.
    pub(crate) fn hook(
        &self,
        target: &HookTarget,
        selector: Selector,
        mode: HookMode,
        closure: &ClosureHandle,
    ) -> Result<AttachmentId, HookError> {
        let runtime = target.runtime();
        runtime.serialized(|| {
            let ty = acquire_type(target)?;
            let attached = self.hook_on(target, ty, selector, mode, closure);
            if attached.is_err() {
                release_type(target);
            }
            attached
        })
    }

    fn hook_on(
        &self,
        target: &HookTarget,
        ty: TypeHandle,
        selector: Selector,
        mode: HookMode,
        closure: &ClosureHandle,
    ) -> Result<AttachmentId, HookError> {
        let runtime = target.runtime();
        let key = ContextKey {
            ty,
            selector,
            scope: target.scope(),
        };
        let existing = self.state.lock().contexts.get(&key).cloned();
        let (context, created) = match existing {
            Some(context) => (context, false),
            None => {
                let resolution = resolve_hook(
                    runtime,
                    ty,
                    target.declared_class(),
                    selector,
                    key.scope == HookScope::Class,
                )?;
                closure.check(mode, &resolution.signature, selector)?;
                let context = HookContext::install(runtime, key, resolution.signature, resolution.original)?;
                (context, true)
            }
        };

        let released = match context.attach(closure, mode) {
            Ok(released) => released,
            Err(err) => {
                if created {
                    let _released = context.teardown(runtime, |_| false);
                }
                return Err(err);
            }
        };

        let id = self.next_id();
        {
            let mut state = self.state.lock();
            if created {
                state.contexts.insert(key, context.clone());
            }
            state.attachments.insert(
                id,
                Attachment {
                    key,
                    kind: AttachmentKind::Hook(mode),
                    closure: closure.clone(),
                    object: object_id(target),
                },
            );
        }
        self.track_object(target);
        drop(released);
        Ok(id)
    }

    /// Add `closure` as the implementation of a protocol method `target`
    /// does not implement.
    pub(crate) fn add_method(
        &self,
        target: &HookTarget,
        selector: Selector,
        closure: &ClosureHandle,
    ) -> Result<AttachmentId, HookError> {
        let runtime = target.runtime();
        runtime.serialized(|| {
            let ty = acquire_type(target)?;
            let added = self.add_on(target, ty, selector, closure);
            if added.is_err() {
                release_type(target);
            }
            added
        })
    }

    fn add_on(
        &self,
        target: &HookTarget,
        ty: TypeHandle,
        selector: Selector,
        closure: &ClosureHandle,
    ) -> Result<AttachmentId, HookError> {
        let runtime = target.runtime();
        let key = ContextKey {
            ty,
            selector,
            scope: target.scope(),
        };
        let signature = resolve_added(
            runtime,
            ty,
            target.declared_class(),
            selector,
            key.scope == HookScope::Class,
        )?;
        closure.check_implementation(&signature, selector)?;

        let alive = Arc::new(AtomicBool::new(true));
        let body = added_target(closure.clone(), alive.clone(), signature.return_kind());
        let method = Method::synthesized(selector, signature, body.clone(), ConsumerTag::INTERCEPTION);
        let _superseded = runtime.install_method(ty, method)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(ty = ?ty, %selector, scope = %key.scope, "added method");

        let id = self.next_id();
        {
            let mut state = self.state.lock();
            state.added.insert(key, AddedMethod { target: body, alive });
            state.attachments.insert(
                id,
                Attachment {
                    key,
                    kind: AttachmentKind::Added,
                    closure: closure.clone(),
                    object: object_id(target),
                },
            );
        }
        self.track_object(target);
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Detaching
    // ------------------------------------------------------------------

    /// Detach one attachment. Returns whether it was attached.
    pub(crate) fn detach(&self, runtime: &Runtime, id: AttachmentId) -> bool {
        runtime.serialized(|| {
            let detached = self.detach_inner(runtime, id);
            let was_attached = detached.attachment.is_some();
            drop(detached);
            was_attached
        })
    }

    fn detach_inner(&self, runtime: &Runtime, id: AttachmentId) -> Detached {
        let mut detached = Detached::default();
        let mut added = None;
        {
            let mut state = self.state.lock();
            let Some(attachment) = state.attachments.remove(&id) else {
                return detached;
            };
            let key = attachment.key;
            match attachment.kind {
                AttachmentKind::Hook(mode) => match state.contexts.get(&key).cloned() {
                    Some(context) => {
                        let (found, released) = context.detach(&attachment.closure, mode);
                        detached.released.push(released);
                        if !found {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(selector = %key.selector, %mode, "closure missing from its context");
                        }
                        if context.is_empty() {
                            state.contexts.remove(&key);
                            detached.context = Some(context);
                        }
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(selector = %key.selector, %mode, "revert found no context; ignoring");
                    }
                },
                AttachmentKind::Added => added = state.added.remove(&key),
            }
            detached.attachment = Some(attachment);
        }

        let Some(attachment) = detached.attachment.as_ref() else {
            return detached;
        };
        let key = attachment.key;

        if let Some(context) = &detached.context {
            let released = context.teardown(runtime, |original| self.take_orphan(key, original));
            detached.released.push(released);
        }

        if let Some(added) = added {
            added.alive.store(false, Ordering::SeqCst);
            if runtime.is_installed(key.ty, key.selector, &added.target) {
                match runtime.remove_method(key.ty, key.selector) {
                    Ok(removed) => detached.methods.extend(removed),
                    Err(_err) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(selector = %key.selector, error = %_err, "could not remove added method");
                    }
                }
            } else {
                #[cfg(feature = "tracing")]
                tracing::debug!(selector = %key.selector, "added method is wrapped; it now does nothing");
                self.state.lock().orphans.insert((key.ty, key.selector), added.target);
            }
        }

        if let Some(object) = attachment.object {
            runtime.release_specialization(object, ConsumerTag::INTERCEPTION);
            self.untrack_object(object);
        }
        detached
    }

    fn take_orphan(&self, key: ContextKey, original: &DispatchTarget) -> bool {
        let mut state = self.state.lock();
        let is_orphan = state
            .orphans
            .get(&(key.ty, key.selector))
            .is_some_and(|orphan| DispatchTarget::ptr_eq(orphan, original));
        if is_orphan {
            state.orphans.remove(&(key.ty, key.selector));
        }
        is_orphan
    }

    /// Detach every attachment on `target` matching `selector` and `modes`.
    pub(crate) fn revert_matching(&self, target: &HookTarget, selector: Option<Selector>, modes: HookModes) -> usize {
        let runtime = target.runtime();
        runtime.serialized(|| {
            let Some(ty) = target.current_type() else {
                return 0;
            };
            let scope = target.scope();
            let ids: Vec<AttachmentId> = {
                let state = self.state.lock();
                let mut ids: Vec<AttachmentId> = state
                    .attachments
                    .iter()
                    .filter(|(_, a)| {
                        a.key.ty == ty
                            && a.key.scope == scope
                            && selector.is_none_or(|s| s == a.key.selector)
                            && a.kind.matches(modes)
                    })
                    .map(|(id, _)| *id)
                    .collect();
                ids.sort_unstable();
                ids
            };
            ids.into_iter()
                .filter(|id| self.detach(runtime, *id))
                .count()
        })
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    fn track_object(&self, target: &HookTarget) {
        let HookTarget::Object(object) = target else {
            return;
        };
        {
            let mut state = self.state.lock();
            if let Some(entry) = state.objects.get_mut(&object.id()) {
                entry.attachments += 1;
                return;
            }
        }
        let runtime = object.runtime().clone();
        let observer = object.on_destroy(move |id| HookRegistry::of(&runtime).object_destroyed(&runtime, id));
        self.state.lock().objects.insert(
            object.id(),
            ObjectEntry {
                observer,
                object: object.downgrade(),
                attachments: 1,
            },
        );
    }

    fn untrack_object(&self, id: ObjectId) {
        let finished = {
            let mut state = self.state.lock();
            match state.objects.get_mut(&id) {
                Some(entry) if entry.attachments > 1 => {
                    entry.attachments -= 1;
                    None
                }
                Some(_) => state.objects.remove(&id),
                None => None,
            }
        };
        if let Some(entry) = finished {
            if let Some(object) = entry.object.upgrade() {
                object.remove_destroy_observer(entry.observer);
            }
        }
    }

    /// Revert everything attached to a destroyed object.
    fn object_destroyed(&self, runtime: &Runtime, id: ObjectId) {
        runtime.serialized(|| {
            let ids: Vec<AttachmentId> = {
                let mut state = self.state.lock();
                state.objects.remove(&id);
                let mut ids: Vec<AttachmentId> = state
                    .attachments
                    .iter()
                    .filter(|(_, a)| a.object == Some(id))
                    .map(|(attachment, _)| *attachment)
                    .collect();
                ids.sort_unstable();
                ids
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(object = %id, attachments = ids.len(), "auto-reverting hooks of destroyed object");
            let mut types = Vec::new();
            for attachment in ids {
                let detached = self.detach_inner(runtime, attachment);
                if let Some(a) = &detached.attachment {
                    types.push(a.key.ty);
                }
                drop(detached);
            }
            let orphans: Vec<DispatchTarget> = {
                let mut state = self.state.lock();
                let stale: Vec<_> = state
                    .orphans
                    .keys()
                    .filter(|(ty, _)| types.contains(ty))
                    .copied()
                    .collect();
                stale.into_iter().filter_map(|k| state.orphans.remove(&k)).collect()
            };
            drop(orphans);
        });
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub(crate) fn is_attached(&self, id: AttachmentId) -> bool {
        self.state.lock().attachments.contains_key(&id)
    }

    pub(crate) fn is_hooked(&self, target: &HookTarget, selector: Selector, modes: HookModes) -> bool {
        let Some(ty) = target.current_type() else {
            return false;
        };
        let key = ContextKey {
            ty,
            selector,
            scope: target.scope(),
        };
        let state = self.state.lock();
        let hooked = state
            .contexts
            .get(&key)
            .is_some_and(|context| context.modes().intersects(modes));
        hooked || (modes.contains(HookModes::ADDED) && state.added.contains_key(&key))
    }

    pub(crate) fn hooked_selectors(&self, target: &HookTarget) -> Vec<Selector> {
        let Some(ty) = target.current_type() else {
            return Vec::new();
        };
        let scope = target.scope();
        let state = self.state.lock();
        let mut selectors: Vec<Selector> = state
            .contexts
            .keys()
            .chain(state.added.keys())
            .filter(|key| key.ty == ty && key.scope == scope)
            .map(|key| key.selector)
            .collect();
        selectors.sort_by_key(|s| s.name());
        selectors.dedup();
        selectors
    }

    pub(crate) fn context_count(&self) -> usize {
        self.state.lock().contexts.len()
    }

    pub(crate) fn attachment_count(&self) -> usize {
        self.state.lock().attachments.len()
    }
}

fn object_id(target: &HookTarget) -> Option<ObjectId> {
    match target {
        HookTarget::Object(object) => Some(object.id()),
        HookTarget::Class { .. } | HookTarget::Instances { .. } => None,
    }
}

/// The type whose dispatch table the target's hooks live on. For an object
/// this takes one interception use of its private subtype.
fn acquire_type(target: &HookTarget) -> Result<TypeHandle, HookError> {
    match target {
        HookTarget::Object(object) => Ok(object.runtime().specialize(object, ConsumerTag::INTERCEPTION)?),
        HookTarget::Class { runtime, class } => runtime
            .metaclass(*class)
            .ok_or_else(|| HookError::UnsupportedTarget(format!("{class:?} has no metaclass"))),
        HookTarget::Instances { class, .. } => Ok(*class),
    }
}

fn release_type(target: &HookTarget) {
    if let HookTarget::Object(object) = target {
        object
            .runtime()
            .release_specialization(object.id(), ConsumerTag::INTERCEPTION);
    }
}

fn added_target(closure: ClosureHandle, alive: Arc<AtomicBool>, ret: ValueKind) -> DispatchTarget {
    DispatchTarget::new(move |receiver, args| {
        if alive.load(Ordering::SeqCst) {
            closure.implement(receiver, args)
        } else {
            Ok(Value::default_for(ret))
        }
    })
}
