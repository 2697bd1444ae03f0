//! Service container and the logger dependency handed to handlers.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::Span;

/// A type-erased, shareable value: a service, a handler instance or a
/// converted argument.
pub type Value = Arc<dyn Any + Send + Sync>;

/// `TypeId`-keyed registry of shared services.
///
/// Trait objects are registered wrapped in an `Arc`, e.g.
/// `services.insert::<Arc<dyn LoggerFactory>>(factory)`.
#[derive(Clone, Default)]
pub struct Services {
    values: HashMap<TypeId, (&'static str, Value)>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.insert_arc(Arc::new(value))
    }

    pub fn insert_arc<T: Any + Send + Sync>(&mut self, value: Arc<T>) -> &mut Self {
        self.values
            .insert(TypeId::of::<T>(), (type_name::<T>(), value as Value));
        self
    }

    /// Builder-style `insert`.
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.get_value(TypeId::of::<T>())?.downcast::<T>().ok()
    }

    pub fn get_value(&self, id: TypeId) -> Option<Value> {
        self.values.get(&id).map(|(_, value)| Arc::clone(value))
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.values.values().map(|(name, _)| name))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Named logger injected into handlers and commands.
///
/// Events logged through it are recorded inside the logger's span, so the
/// owning handler shows up as a structured field.
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
    span: Span,
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let span = tracing::info_span!("handler", name = %name);
        Self { name, span }
    }

    pub fn from_span(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn debug(&self, message: &str) {
        let _enter = self.span.enter();
        tracing::debug!("{message}");
    }

    pub fn info(&self, message: &str) {
        let _enter = self.span.enter();
        tracing::info!("{message}");
    }

    pub fn warn(&self, message: &str) {
        let _enter = self.span.enter();
        tracing::warn!("{message}");
    }

    pub fn error(&self, message: &str) {
        let _enter = self.span.enter();
        tracing::error!("{message}");
    }
}

/// Creates named loggers. Register as `Arc<dyn LoggerFactory>`.
pub trait LoggerFactory: Send + Sync {
    fn create_logger(&self, name: &str) -> Logger;
}

/// Logger for `name`, from the registered factory when there is one.
pub fn logger_for(services: &Services, name: &str) -> Logger {
    match services.get::<Arc<dyn LoggerFactory>>() {
        Some(factory) => factory.create_logger(name),
        None => Logger::new(name),
    }
}
