//! Single-slot store for the latest runtime context.

use std::sync::Arc;

use tabhive_core::runtime::RuntimeContext;

/// Holds the most recent runtime context pushed by the host.
///
/// Replacement is whole-record and last-write-wins; readers share the
/// stored value through an `Arc`.
#[derive(Debug, Default)]
pub struct RuntimeContextStore {
    current: Option<Arc<RuntimeContext>>,
}

impl RuntimeContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored context. Returns whether the content changed.
    pub fn replace(&mut self, context: RuntimeContext) -> bool {
        let changed = self.current.as_deref() != Some(&context);
        self.current = Some(Arc::new(context));
        changed
    }

    pub fn current(&self) -> Option<Arc<RuntimeContext>> {
        self.current.clone()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
