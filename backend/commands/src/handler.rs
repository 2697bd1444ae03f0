//! Handler types: how a handler is constructed, its lifetime, and the
//! commands it owns.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use parlor_core::RequirePrefix;

use crate::converters::{short_type_name, TypeInfo};
use crate::descriptor::{CommandMethod, CommandSpec, InvokeFn};
use crate::error::CommandError;
use crate::resolver::Arguments;
use crate::services::{Logger, Value};
use crate::types::{CommandResult, OptionOverrides};

/// Handlers that hold resources released after use.
///
/// Transient handlers are disposed after every invocation, persistent ones
/// when the provider shuts down.
#[async_trait]
pub trait Disposable: Send + Sync {
    async fn dispose(&self) -> anyhow::Result<()>;
}

pub(crate) type DisposeFn = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type BuildFn = Arc<dyn Fn(&Dependencies) -> anyhow::Result<Value> + Send + Sync>;

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub(crate) enum DependencySource {
    Required,
    Optional,
    Default(Arc<dyn Fn() -> Value + Send + Sync>),
}

/// One constructor parameter.
#[derive(Clone)]
pub struct Dependency {
    pub(crate) ty: TypeInfo,
    pub(crate) source: DependencySource,
}

impl Dependency {
    pub fn ty(&self) -> &TypeInfo {
        &self.ty
    }

    pub fn is_required(&self) -> bool {
        matches!(self.source, DependencySource::Required)
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty.display_name())?;
        if !self.is_required() {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// Resolved constructor arguments.
#[derive(Clone, Default)]
pub struct Dependencies {
    values: Vec<(TypeInfo, Option<Value>)>,
}

impl Dependencies {
    pub(crate) fn new(values: Vec<(TypeInfo, Option<Value>)>) -> Self {
        Self { values }
    }

    fn find(&self, id: TypeId) -> Option<&Option<Value>> {
        self.values.iter().find(|(ty, _)| ty.id() == id).map(|(_, v)| v)
    }

    /// A required dependency.
    pub fn get<T: Any + Send + Sync>(&self) -> anyhow::Result<Arc<T>> {
        self.optional::<T>()
            .ok_or_else(|| anyhow!("dependency `{}` was not resolved", type_name::<T>()))
    }

    /// An optional dependency; `None` when it was not available.
    pub fn optional<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let value = self.find(TypeId::of::<T>())?.clone()?;
        value.downcast::<T>().ok()
    }

    pub fn logger(&self) -> anyhow::Result<Logger> {
        self.get::<Logger>().map(|logger| (*logger).clone())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.values.iter().map(|(ty, v)| (ty.display_name(), v.is_some())))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// A way of building `H` from resolvable dependencies.
pub struct Constructor<H> {
    dependencies: Vec<Dependency>,
    framework: Option<i32>,
    build: Arc<dyn Fn(&Dependencies) -> anyhow::Result<H> + Send + Sync>,
}

impl<H: Send + Sync + 'static> Constructor<H> {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&Dependencies) -> anyhow::Result<H> + Send + Sync + 'static,
    {
        Self {
            dependencies: Vec::new(),
            framework: None,
            build: Arc::new(build),
        }
    }

    fn depend(mut self, ty: TypeInfo, source: DependencySource) -> Self {
        self.dependencies.push(Dependency { ty, source });
        self
    }

    /// Requires a `T` service.
    pub fn service<T: Any + Send + Sync>(self) -> Self {
        self.depend(TypeInfo::of::<T>(), DependencySource::Required)
    }

    /// Uses a `T` service when registered.
    pub fn optional<T: Any + Send + Sync>(self) -> Self {
        self.depend(TypeInfo::of::<T>(), DependencySource::Optional)
    }

    /// Uses a `T` service, or `default()` when none is registered.
    pub fn with_default<T, F>(self, default: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let default = Arc::new(move || Arc::new(default()) as Value);
        self.depend(TypeInfo::of::<T>(), DependencySource::Default(default))
    }

    /// Requires a [`Logger`], created for the handler type when no logger
    /// service is registered.
    pub fn logger(self) -> Self {
        self.service::<Logger>()
    }

    /// Marks the constructor as intended for the engine.
    ///
    /// When a handler type has any marked constructors, only those are tried.
    pub fn framework(self) -> Self {
        self.framework_priority(0)
    }

    pub fn framework_priority(mut self, priority: i32) -> Self {
        self.framework = Some(priority);
        self
    }

    fn erase(self) -> ErasedConstructor {
        let build = self.build;
        ErasedConstructor {
            dependencies: self.dependencies,
            framework: self.framework,
            build: Arc::new(move |deps: &Dependencies| -> anyhow::Result<Value> {
                Ok(Arc::new(build(deps)?))
            }),
        }
    }
}

#[derive(Clone)]
pub(crate) struct ErasedConstructor {
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) framework: Option<i32>,
    pub(crate) build: BuildFn,
}

impl fmt::Debug for ErasedConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("dependencies", &self.dependencies)
            .field("framework", &self.framework)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Handler type
// ---------------------------------------------------------------------------

/// Everything the engine knows about one handler type.
pub struct HandlerType {
    id: TypeId,
    name: &'static str,
    persistent: bool,
    priority: Option<i32>,
    overrides: OptionOverrides,
    constructors: Vec<ErasedConstructor>,
    dispose: Option<DisposeFn>,
    commands: Vec<Arc<CommandMethod>>,
}

impl HandlerType {
    pub fn builder<H: Send + Sync + 'static>() -> HandlerTypeBuilder<H> {
        HandlerTypeBuilder {
            persistent: false,
            priority: None,
            overrides: OptionOverrides::default(),
            constructors: Vec::new(),
            dispose: None,
            commands: Vec::new(),
            _handler: PhantomData,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn display_name(&self) -> String {
        short_type_name(self.name)
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn is_disposable(&self) -> bool {
        self.dispose.is_some()
    }

    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    pub fn overrides(&self) -> &OptionOverrides {
        &self.overrides
    }

    pub fn commands(&self) -> &[Arc<CommandMethod>] {
        &self.commands
    }

    pub(crate) fn constructors(&self) -> &[ErasedConstructor] {
        &self.constructors
    }

    /// Dispose `instance` if this handler type is disposable.
    pub(crate) async fn dispose_instance(&self, instance: Value) -> anyhow::Result<()> {
        match &self.dispose {
            Some(dispose) => dispose(instance).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerType")
            .field("name", &self.name)
            .field("persistent", &self.persistent)
            .field("priority", &self.priority)
            .field("constructors", &self.constructors)
            .field("commands", &self.commands.len())
            .finish()
    }
}

/// Registration builder for a handler type `H`.
pub struct HandlerTypeBuilder<H> {
    persistent: bool,
    priority: Option<i32>,
    overrides: OptionOverrides,
    constructors: Vec<ErasedConstructor>,
    dispose: Option<DisposeFn>,
    commands: Vec<Arc<CommandMethod>>,
    _handler: PhantomData<fn() -> H>,
}

impl<H: Send + Sync + 'static> HandlerTypeBuilder<H> {
    /// Keep one instance for the engine's lifetime.
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// Priority for commands that do not set their own.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.overrides.prefix = Some(prefix.into());
        self
    }

    pub fn require_prefix(mut self, require: RequirePrefix) -> Self {
        self.overrides.require_prefix = Some(require);
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.overrides.case_sensitive = Some(case_sensitive);
        self
    }

    pub fn constructor(mut self, constructor: Constructor<H>) -> Self {
        self.constructors.push(constructor.erase());
        self
    }

    /// Add a command method.
    pub fn command<F, Fut>(mut self, spec: CommandSpec, body: F) -> Self
    where
        F: Fn(Arc<H>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CommandResult>> + Send + 'static,
    {
        let invoke: InvokeFn = Arc::new(move |instance: Value, args: Arguments| {
            match instance.downcast::<H>() {
                Ok(handler) => body(handler, args).boxed(),
                Err(_) => futures::future::ready(Err(CommandError::HandlerTypeMismatch {
                    expected: type_name::<H>(),
                }
                .into()))
                .boxed(),
            }
        });
        self.commands.push(Arc::new(CommandMethod::new(spec, invoke)));
        self
    }

    pub fn build(self) -> Arc<HandlerType> {
        Arc::new(HandlerType {
            id: TypeId::of::<H>(),
            name: type_name::<H>(),
            persistent: self.persistent,
            priority: self.priority,
            overrides: self.overrides,
            constructors: self.constructors,
            dispose: self.dispose,
            commands: self.commands,
        })
    }
}

impl<H: Default + Send + Sync + 'static> HandlerTypeBuilder<H> {
    /// Construct with `H::default()`.
    pub fn default_constructor(self) -> Self {
        self.constructor(Constructor::new(|_| Ok(H::default())))
    }
}

impl<H: Disposable + 'static> HandlerTypeBuilder<H> {
    /// Dispose instances through [`Disposable`].
    pub fn disposable(mut self) -> Self {
        self.dispose = Some(Arc::new(|instance: Value| {
            async move {
                match instance.downcast::<H>() {
                    Ok(handler) => handler.dispose().await,
                    Err(_) => Err(CommandError::HandlerTypeMismatch {
                        expected: type_name::<H>(),
                    }
                    .into()),
                }
            }
            .boxed()
        }));
        self
    }
}
