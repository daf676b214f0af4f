//! Handler registry
//!
//! Maps action type strings to handler capabilities. Handlers are plug-ins:
//! the core only ever sees `Arc<dyn ActionHandler>`.

use crate::handlers::types::ActionHandler;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Registry of handler capabilities
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    /// Map of action type to handler
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for an action type
    pub fn register(&mut self, action_type: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action_type.into(), handler);
    }

    /// Builder-style registration
    pub fn with(mut self, action_type: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(action_type, handler);
        self
    }

    /// Get handler for an action type
    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action_type).cloned()
    }

    /// Registered action types, sorted
    pub fn action_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("action_types", &self.action_types())
            .finish()
    }
}
