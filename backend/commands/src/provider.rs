//! Handler lifecycle provider.
//!
//! Chooses a constructor per handler type by probing which dependencies can
//! be resolved, caches that choice, keeps persistent instances for the
//! provider's lifetime and disposes them on shutdown.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::converters::TypeInfo;
use crate::descriptor::CommandDescriptor;
use crate::error::CommandError;
use crate::handler::{Dependencies, DependencySource, ErasedConstructor, HandlerType};
use crate::services::{logger_for, Logger, Services, Value};

/// Constructor chosen for a handler type, with its resolved dependencies.
#[derive(Debug)]
pub struct HandlerDescriptor {
    pub handler: Arc<HandlerType>,
    constructor: ErasedConstructor,
    dependencies: Dependencies,
}

impl HandlerDescriptor {
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    fn instantiate(&self) -> anyhow::Result<Value> {
        (self.constructor.build)(&self.dependencies)
    }
}

#[derive(Default)]
struct ProviderState {
    descriptors: HashMap<TypeId, Arc<HandlerDescriptor>>,
    persistent: HashMap<TypeId, (Value, Arc<HandlerType>)>,
    disposed: bool,
}

/// Creates and caches handler instances.
#[derive(Default)]
pub struct HandlerProvider {
    state: Mutex<ProviderState>,
}

impl HandlerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler instance for `descriptor`'s handler type.
    ///
    /// The lock is held only while looking up or creating the instance.
    pub fn get_handler(
        &self,
        descriptor: &CommandDescriptor,
        services: &Services,
    ) -> anyhow::Result<HandlerLease> {
        let handler = descriptor.handler();
        let id = handler.id();
        let mut state = self.state.lock();
        if state.disposed {
            return Err(CommandError::Disposed.into());
        }

        if let Some((instance, _)) = state.persistent.get(&id) {
            return Ok(HandlerLease::new(Arc::clone(instance), true, Arc::clone(handler)));
        }

        let recipe = match state.descriptors.get(&id) {
            Some(recipe) => Arc::clone(recipe),
            None => {
                let recipe = Arc::new(choose_constructor(handler, services)?);
                debug!(
                    handler = %handler.display_name(),
                    dependencies = recipe.dependency_count(),
                    "Handler constructor resolved"
                );
                state.descriptors.insert(id, Arc::clone(&recipe));
                recipe
            }
        };

        let instance = recipe.instantiate()?;
        if handler.is_persistent() {
            debug!(handler = %handler.display_name(), "Caching persistent handler");
            state
                .persistent
                .insert(id, (Arc::clone(&instance), Arc::clone(handler)));
            return Ok(HandlerLease::new(instance, true, Arc::clone(handler)));
        }
        Ok(HandlerLease::new(instance, false, Arc::clone(handler)))
    }

    /// Cached recipe for a handler type, once one has been chosen.
    pub fn handler_descriptor(&self, id: TypeId) -> Option<Arc<HandlerDescriptor>> {
        self.state.lock().descriptors.get(&id).cloned()
    }

    /// Dispose every persistent instance and clear the caches.
    ///
    /// A failing disposal is logged and does not stop the others.
    pub async fn dispose_all(&self) {
        let persistent = {
            let mut state = self.state.lock();
            state.disposed = true;
            state.descriptors.clear();
            std::mem::take(&mut state.persistent)
        };
        if persistent.is_empty() {
            return;
        }
        info!(count = persistent.len(), "Disposing persistent handlers");
        for (_, (instance, handler)) in persistent {
            if let Err(e) = handler.dispose_instance(instance).await {
                warn!(handler = %handler.display_name(), error = %e, "Failed to dispose handler");
            }
        }
    }
}

/// Try constructors in preference order; the first fully resolvable wins.
fn choose_constructor(handler: &Arc<HandlerType>, services: &Services) -> Result<HandlerDescriptor, CommandError> {
    let constructors = handler.constructors();
    let framework: Vec<&ErasedConstructor> =
        constructors.iter().filter(|c| c.framework.is_some()).collect();
    let mut candidates = if framework.is_empty() {
        constructors.iter().collect()
    } else {
        framework
    };
    // Stable: ties keep registration order.
    candidates.sort_by(|a, b| {
        b.framework
            .cmp(&a.framework)
            .then_with(|| b.dependencies.len().cmp(&a.dependencies.len()))
    });

    let mut resolved: HashMap<TypeId, Value> = HashMap::new();
    let mut missing = Vec::new();
    for candidate in candidates {
        match resolve_dependencies(handler, candidate, services, &mut resolved) {
            Ok(dependencies) => {
                return Ok(HandlerDescriptor {
                    handler: Arc::clone(handler),
                    constructor: candidate.clone(),
                    dependencies,
                })
            }
            Err(ty) => {
                debug!(
                    handler = %handler.display_name(),
                    dependency = %ty.display_name(),
                    "Constructor skipped, dependency unavailable"
                );
                missing.push(ty.display_name());
            }
        }
    }

    let mut seen = HashSet::new();
    missing.retain(|name| seen.insert(name.clone()));
    Err(CommandError::HandlerResolution {
        handler: handler.display_name(),
        missing,
    })
}

/// Resolve each dependency: this call's cache, the container, the logger
/// special case, the dependency's default, then `None` if optional.
fn resolve_dependencies(
    handler: &HandlerType,
    constructor: &ErasedConstructor,
    services: &Services,
    resolved: &mut HashMap<TypeId, Value>,
) -> Result<Dependencies, TypeInfo> {
    let mut values = Vec::with_capacity(constructor.dependencies.len());
    for dependency in &constructor.dependencies {
        let ty = dependency.ty();
        let value = resolved
            .get(&ty.id())
            .cloned()
            .or_else(|| services.get_value(ty.id()))
            .or_else(|| {
                ty.is::<Logger>()
                    .then(|| Arc::new(logger_for(services, &handler.display_name())) as Value)
            })
            .or_else(|| match &dependency.source {
                DependencySource::Default(default) => Some(default()),
                _ => None,
            });

        match value {
            Some(value) => {
                resolved.insert(ty.id(), Arc::clone(&value));
                values.push((ty.clone(), Some(value)));
            }
            None if matches!(dependency.source, DependencySource::Optional) => {
                values.push((ty.clone(), None));
            }
            None => return Err(ty.clone()),
        }
    }
    Ok(Dependencies::new(values))
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

/// A handler instance checked out for one invocation.
///
/// Releasing a transient lease disposes the instance. A lease dropped without
/// being released disposes it in the background.
pub struct HandlerLease {
    instance: Option<Value>,
    persistent: bool,
    handler: Arc<HandlerType>,
}

impl HandlerLease {
    fn new(instance: Value, persistent: bool, handler: Arc<HandlerType>) -> Self {
        Self {
            instance: Some(instance),
            persistent,
            handler,
        }
    }

    pub fn instance(&self) -> Option<&Value> {
        self.instance.as_ref()
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn handler(&self) -> &Arc<HandlerType> {
        &self.handler
    }

    /// End the invocation; transient disposable handlers are disposed now.
    pub async fn release(mut self) {
        let Some(instance) = self.instance.take() else { return };
        if self.persistent {
            return;
        }
        if let Err(e) = self.handler.dispose_instance(instance).await {
            warn!(handler = %self.handler.display_name(), error = %e, "Failed to dispose handler");
        }
    }
}

impl Drop for HandlerLease {
    fn drop(&mut self) {
        if self.persistent || !self.handler.is_disposable() {
            return;
        }
        let Some(instance) = self.instance.take() else { return };
        let handler = Arc::clone(&self.handler);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = handler.dispose_instance(instance).await {
                    warn!(handler = %handler.display_name(), error = %e, "Failed to dispose handler");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::descriptor::CommandSpec;
    use crate::handler::{Constructor, Disposable};
    use crate::types::CommandResult;

    struct Database(&'static str);

    struct Greeter {
        source: &'static str,
        disposed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Disposable for Greeter {
        async fn dispose(&self) -> anyhow::Result<()> {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn descriptor(handler: Arc<HandlerType>) -> CommandDescriptor {
        let method = Arc::clone(&handler.commands()[0]);
        CommandDescriptor::new(handler, method)
    }

    fn greeter(persistent: bool, disposed: Arc<AtomicUsize>) -> CommandDescriptor {
        let d1 = Arc::clone(&disposed);
        let d2 = Arc::clone(&disposed);
        let mut builder = HandlerType::builder::<Greeter>()
            .constructor(Constructor::new(move |_| {
                Ok(Greeter {
                    source: "none",
                    disposed: Arc::clone(&d1),
                })
            }))
            .constructor(
                Constructor::new(move |deps| {
                    Ok(Greeter {
                        source: deps.get::<Database>()?.0,
                        disposed: Arc::clone(&d2),
                    })
                })
                .service::<Database>()
                .logger(),
            )
            .disposable()
            .command(CommandSpec::text("greet"), |_h, _args| async {
                Ok(CommandResult::success())
            });
        if persistent {
            builder = builder.persistent();
        }
        descriptor(builder.build())
    }

    fn instance_of(lease: &HandlerLease) -> Arc<Greeter> {
        lease.instance().cloned().unwrap().downcast::<Greeter>().unwrap()
    }

    #[tokio::test]
    async fn persistent_handlers_are_shared() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let provider = HandlerProvider::new();
        let services = Services::new();
        let d = greeter(true, disposed.clone());

        let a = provider.get_handler(&d, &services).unwrap();
        let b = provider.get_handler(&d, &services).unwrap();
        assert!(a.is_persistent());
        assert!(Arc::ptr_eq(&instance_of(&a), &instance_of(&b)));
        a.release().await;
        b.release().await;
        assert_eq!(disposed.load(Ordering::SeqCst), 0);

        provider.dispose_all().await;
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(provider.get_handler(&d, &services).is_err());
    }

    #[tokio::test]
    async fn transient_handlers_are_fresh_and_disposed() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let provider = HandlerProvider::new();
        let services = Services::new();
        let d = greeter(false, disposed.clone());

        let a = provider.get_handler(&d, &services).unwrap();
        let b = provider.get_handler(&d, &services).unwrap();
        assert!(!Arc::ptr_eq(&instance_of(&a), &instance_of(&b)));
        a.release().await;
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        b.release().await;
        assert_eq!(disposed.load(Ordering::SeqCst), 2);

        provider.dispose_all().await;
        assert_eq!(disposed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn prefers_constructor_with_most_resolvable_dependencies() {
        let provider = HandlerProvider::new();
        let services = Services::new().with(Database("postgres"));
        let d = greeter(false, Arc::new(AtomicUsize::new(0)));

        let lease = provider.get_handler(&d, &services).unwrap();
        assert_eq!(instance_of(&lease).source, "postgres");
        let recipe = provider.handler_descriptor(d.handler().id()).unwrap();
        assert_eq!(recipe.dependency_count(), 2);
        lease.release().await;
    }

    #[tokio::test]
    async fn falls_back_when_dependency_missing() {
        let provider = HandlerProvider::new();
        let d = greeter(false, Arc::new(AtomicUsize::new(0)));
        let lease = provider.get_handler(&d, &Services::new()).unwrap();
        assert_eq!(instance_of(&lease).source, "none");
        lease.release().await;
    }

    #[test]
    fn framework_constructors_take_precedence() {
        struct Picky(u8);
        let handler = HandlerType::builder::<Picky>()
            .constructor(Constructor::new(|deps| Ok(Picky(*deps.get::<u8>()?))).service::<u8>())
            .constructor(Constructor::new(|_| Ok(Picky(1))).framework_priority(1))
            .constructor(Constructor::new(|_| Ok(Picky(2))).framework_priority(5))
            .command(CommandSpec::text("pick"), |_h, _args| async {
                Ok(CommandResult::success())
            })
            .build();
        let provider = HandlerProvider::new();
        let lease = provider
            .get_handler(&descriptor(handler), &Services::new().with(9u8))
            .unwrap();
        let picked = lease.instance().cloned().unwrap().downcast::<Picky>().unwrap();
        assert_eq!(picked.0, 2);
    }

    #[test]
    fn unresolvable_handler_is_a_configuration_error() {
        struct Needy;
        let handler = HandlerType::builder::<Needy>()
            .constructor(Constructor::new(|_| Ok(Needy)).service::<Database>())
            .command(CommandSpec::text("need"), |_h, _args| async {
                Ok(CommandResult::success())
            })
            .build();
        let err = HandlerProvider::new()
            .get_handler(&descriptor(handler), &Services::new())
            .err()
            .unwrap();
        match err.downcast_ref::<CommandError>() {
            Some(CommandError::HandlerResolution { handler, missing }) => {
                assert_eq!(handler, "Needy");
                assert_eq!(missing, &["Database"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_dependencies_are_reported_once() {
        struct Cache;
        struct Needy;
        let handler = HandlerType::builder::<Needy>()
            .constructor(Constructor::new(|_| Ok(Needy)).service::<Database>())
            .constructor(Constructor::new(|_| Ok(Needy)).service::<Cache>())
            .constructor(Constructor::new(|_| Ok(Needy)).service::<Database>())
            .command(CommandSpec::text("need"), |_h, _args| async {
                Ok(CommandResult::success())
            })
            .build();
        let err = HandlerProvider::new()
            .get_handler(&descriptor(handler), &Services::new())
            .err()
            .unwrap();
        match err.downcast_ref::<CommandError>() {
            Some(CommandError::HandlerResolution { missing, .. }) => {
                assert_eq!(missing, &["Database", "Cache"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    struct Faulty;

    #[async_trait]
    impl Disposable for Faulty {
        async fn dispose(&self) -> anyhow::Result<()> {
            anyhow::bail!("disk unplugged")
        }
    }

    #[tokio::test]
    async fn one_failed_disposal_does_not_stop_the_rest() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let faulty = HandlerType::builder::<Faulty>()
            .persistent()
            .constructor(Constructor::new(|_| Ok(Faulty)))
            .disposable()
            .command(CommandSpec::text("faulty"), |_h, _args| async {
                Ok(CommandResult::success())
            })
            .build();
        let provider = HandlerProvider::new();
        let services = Services::new();
        let greeter = greeter(true, disposed.clone());

        for d in [descriptor(faulty), greeter] {
            provider.get_handler(&d, &services).unwrap().release().await;
        }
        provider.dispose_all().await;
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn defaults_and_optionals_fill_missing_services() {
        struct Tuned {
            retries: u32,
            label: Option<Arc<String>>,
        }
        let handler = HandlerType::builder::<Tuned>()
            .constructor(
                Constructor::new(|deps| {
                    Ok(Tuned {
                        retries: *deps.get::<u32>()?,
                        label: deps.optional::<String>(),
                    })
                })
                .with_default::<u32, _>(|| 3)
                .optional::<String>(),
            )
            .command(CommandSpec::text("tune"), |_h, _args| async {
                Ok(CommandResult::success())
            })
            .build();
        let lease = HandlerProvider::new()
            .get_handler(&descriptor(handler), &Services::new())
            .unwrap();
        let tuned = lease.instance().cloned().unwrap().downcast::<Tuned>().unwrap();
        assert_eq!(tuned.retries, 3);
        assert!(tuned.label.is_none());
    }
}
