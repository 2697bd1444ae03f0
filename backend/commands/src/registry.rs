/// Command registry: the handler types commands are discovered from.
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::descriptor::CommandDescriptor;
use crate::handler::HandlerType;

/// Registered handler types, shared between setup code and the service.
///
/// Registering while the service runs takes effect on the next reload.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: Arc<RwLock<Vec<Arc<HandlerType>>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Arc<HandlerType>) -> &Self {
        self.handlers.write().push(handler);
        self
    }

    pub fn handlers(&self) -> Vec<Arc<HandlerType>> {
        self.handlers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Descriptors for every registered command, in registration order.
    ///
    /// A command registered twice (same trigger, handler type and method)
    /// appears once.
    pub fn discover(&self) -> Vec<Arc<CommandDescriptor>> {
        let mut seen = HashSet::new();
        let mut descriptors = Vec::new();
        for handler in self.handlers() {
            for method in handler.commands() {
                let descriptor = CommandDescriptor::new(Arc::clone(&handler), Arc::clone(method));
                if seen.insert(descriptor.key()) {
                    descriptors.push(Arc::new(descriptor));
                } else {
                    debug!(command = %descriptor.name(), handler = %handler.display_name(), "Skipping duplicate command");
                }
            }
        }
        descriptors
    }
}
