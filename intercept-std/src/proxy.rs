//! Forwarding proxies.
//!
//! A proxy is an instance of a class that implements nothing but
//! `forwardInvocation`. Every other message reaches that method, is turned
//! into an [`Invocation`] aimed at the wrapped target and handed to the
//! proxy's handler. The default handler invokes it unchanged.
//!
//! The proxy class is registered once per runtime under the subtype prefix
//! and remembered by handle, so a user class that happens to share its name
//! is never taken for it.

use intercept_core::{
    AssociationKey, ForwardedMessage, Invocation, InvokeError, Object, ObjectRef, Receiver,
    Runtime, RuntimeError, Selector, Signature, TypeHandle, Value, ValueKind,
};
use parking_lot::Mutex;
use std::sync::Arc;

const PROXY_CLASS: &str = "ObjectProxy";
const PROXY_STATE: AssociationKey = AssociationKey::new("intercept.proxy");

type HandlerFn = dyn Fn(&mut Invocation) -> Result<(), InvokeError> + Send + Sync;

/// The runtime's proxy class, once registered.
#[derive(Default)]
struct ProxyClass {
    class: Mutex<Option<TypeHandle>>,
}

struct ProxyState {
    target: ObjectRef,
    handler: Arc<HandlerFn>,
}

/// Constructors and queries for forwarding proxies.
pub struct ObjectProxy;

impl ObjectProxy {
    /// A proxy that forwards every message to `target` unchanged.
    pub fn new(target: &ObjectRef) -> Result<ObjectRef, RuntimeError> {
        Self::with_handler(target, Invocation::invoke)
    }

    /// A proxy whose handler decides what happens to each message.
    ///
    /// The handler receives an invocation already aimed at `target` and
    /// carrying the original arguments; whatever return value it leaves in
    /// the invocation is returned to the sender.
    pub fn with_handler<F>(target: &ObjectRef, handler: F) -> Result<ObjectRef, RuntimeError>
    where
        F: Fn(&mut Invocation) -> Result<(), InvokeError> + Send + Sync + 'static,
    {
        let runtime = target.runtime();
        let class = proxy_class(runtime)?;
        let proxy = runtime.instantiate(class)?;
        let _state = proxy.associated_or_insert_with(PROXY_STATE, || ProxyState {
            target: target.clone(),
            handler: Arc::new(handler),
        });
        Ok(proxy)
    }

    /// The object a proxy forwards to.
    pub fn target_of(proxy: &Object) -> Option<ObjectRef> {
        proxy
            .associated::<ProxyState>(PROXY_STATE)
            .map(|state| state.target.clone())
    }

    /// Whether `object` is a proxy.
    pub fn is_proxy(object: &Object) -> bool {
        let registered = *object.runtime().extension::<ProxyClass>().class.lock();
        registered == Some(object.class())
    }
}

fn proxy_class(runtime: &Runtime) -> Result<TypeHandle, RuntimeError> {
    let cache = runtime.extension::<ProxyClass>();
    runtime.serialized(|| {
        let mut slot = cache.class.lock();
        if let Some(class) = *slot {
            if runtime.is_live(class) {
                return Ok(class);
            }
        }
        let name = format!("{}{PROXY_CLASS}", runtime.config().subtype_prefix);
        let class = runtime
            .define_class(name)
            .method(
                Selector::forward_invocation(),
                Signature::new([ValueKind::Opaque], ValueKind::Any),
                forward_invocation,
            )
            .register()?;
        *slot = Some(class);
        Ok(class)
    })
}

fn forward_invocation(receiver: &Receiver<'_>, args: &[Value]) -> Result<Value, InvokeError> {
    let proxy = receiver.as_object().ok_or(InvokeError::Deallocated)?;
    let message = args
        .first()
        .and_then(|arg| arg.downcast_ref::<ForwardedMessage>())
        .ok_or_else(|| InvokeError::custom("forwardInvocation expects a forwarded message"))?;
    let state = proxy
        .associated::<ProxyState>(PROXY_STATE)
        .ok_or_else(|| InvokeError::custom("proxy has no target"))?;

    let mut invocation = Invocation::for_message(&state.target, message.selector)?;
    invocation.set_arguments(message.arguments.clone())?;
    (state.handler)(&mut invocation)?;
    Ok(invocation.return_value().cloned().unwrap_or_default())
}
