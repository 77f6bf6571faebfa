//! Logging hook for method observation.

use intercept_core::{ClosureHandle, Selector};

/// A hook that logs every call of one method for debugging/observation.
///
/// # Example
///
/// ```rust,ignore
/// let token = object.hooks().before("increment", LoggingHook::new("increment").into_closure())?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LoggingHook {
    selector: Selector,
}

impl LoggingHook {
    /// Create a logging hook for `selector`.
    pub fn new(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
        }
    }

    /// The selector named in each log line.
    pub fn selector(&self) -> Selector {
        self.selector
    }

    /// An observer closure usable as a before or after hook.
    pub fn into_closure(self) -> ClosureHandle {
        ClosureHandle::observer(move |receiver, args| {
            #[cfg(feature = "tracing")]
            {
                tracing::info!(receiver = %receiver.type_name(), selector = %self.selector, ?args, "Processing call");
            }
            #[cfg(not(feature = "tracing"))]
            {
                let _ = (receiver, args); // Suppress unused warning
            }
            Ok(())
        })
    }
}
