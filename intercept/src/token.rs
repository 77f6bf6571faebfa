//! Hook tokens.
//!
//! Every attach operation returns a [`HookToken`]. The token identifies one
//! attachment of one closure and is the handle used to revert it. Tokens
//! are cheap to clone; clones refer to the same attachment.
//!
//! Dropping a token does **not** revert the hook. Hooks stay in place until
//! [`HookToken::revert`] is called, a bulk revert matches them, or (for the
//! object scope) the object is destroyed.

use crate::{
    registry::{AttachmentId, AttachmentKind, HookRegistry},
    scope::{HookScope, HookTarget, TokenTarget},
};
use intercept_core::{ClosureHandle, HookError, HookMode, Runtime, Selector};
use parking_lot::Mutex;
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Handle to one attached closure.
#[derive(Clone)]
pub struct HookToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    runtime: Runtime,
    target: TokenTarget,
    selector: Selector,
    kind: AttachmentKind,
    closure: ClosureHandle,
    attachment: Mutex<Option<AttachmentId>>,
}

impl HookToken {
    pub(crate) fn new(target: &HookTarget, selector: Selector, kind: AttachmentKind, closure: ClosureHandle) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                runtime: target.runtime().clone(),
                target: target.downgrade(),
                selector,
                kind,
                closure,
                attachment: Mutex::new(None),
            }),
        }
    }

    /// Attach the token's closure.
    ///
    /// Fails with [`HookError::AlreadyActive`] while the token is attached,
    /// and with [`HookError::TargetDeallocated`] once its object is gone.
    /// A reverted token can be applied again.
    pub fn apply(&self) -> Result<(), HookError> {
        let inner = &self.inner;
        inner.runtime.serialized(|| {
            let registry = HookRegistry::of(&inner.runtime);
            let current = *inner.attachment.lock();
            if current.is_some_and(|id| registry.is_attached(id)) {
                return Err(HookError::AlreadyActive);
            }
            let target = inner.target.upgrade(&inner.runtime)?;
            let attached = match inner.kind {
                AttachmentKind::Hook(mode) => registry.hook(&target, inner.selector, mode, &inner.closure),
                AttachmentKind::Added => registry.add_method(&target, inner.selector, &inner.closure),
            };
            let id = match attached {
                Ok(id) => id,
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(selector = %inner.selector, error = %err, "hook rejected");
                    return Err(err);
                }
            };
            *inner.attachment.lock() = Some(id);
            drop(target);
            Ok(())
        })
    }

    /// Detach the token's closure.
    ///
    /// Reverting a token that is not attached (never applied, already
    /// reverted, or reverted in bulk or by destruction) does nothing.
    pub fn revert(&self) {
        let inner = &self.inner;
        inner.runtime.serialized(|| {
            let Some(id) = inner.attachment.lock().take() else {
                return;
            };
            if !HookRegistry::of(&inner.runtime).detach(&inner.runtime, id) {
                #[cfg(feature = "tracing")]
                tracing::trace!(selector = %inner.selector, "token was already detached");
            }
        });
    }

    /// Whether the closure is currently attached.
    pub fn is_active(&self) -> bool {
        let current = *self.inner.attachment.lock();
        current.is_some_and(|id| HookRegistry::of(&self.inner.runtime).is_attached(id))
    }

    /// The hooked selector.
    pub fn selector(&self) -> Selector {
        self.inner.selector
    }

    /// The hook mode, or `None` for an added method.
    pub fn mode(&self) -> Option<HookMode> {
        match self.inner.kind {
            AttachmentKind::Hook(mode) => Some(mode),
            AttachmentKind::Added => None,
        }
    }

    /// Whether the token adds a protocol method rather than hooking one.
    pub fn is_added_method(&self) -> bool {
        self.inner.kind == AttachmentKind::Added
    }

    /// The scope of the token's target.
    pub fn scope(&self) -> HookScope {
        self.inner.target.scope()
    }

    /// The attached closure.
    pub fn closure(&self) -> &ClosureHandle {
        &self.inner.closure
    }

    /// The runtime the token belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }
}

impl PartialEq for HookToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for HookToken {}

impl Hash for HookToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for HookToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("HookToken");
        s.field("selector", &self.inner.selector)
            .field("scope", &self.inner.target.scope());
        match self.inner.kind {
            AttachmentKind::Hook(mode) => s.field("mode", &mode),
            AttachmentKind::Added => s.field("mode", &"added"),
        };
        s.field("active", &self.is_active()).finish()
    }
}
