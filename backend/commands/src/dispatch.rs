/// Command dispatch: the service that listens for chat messages, matches them
/// against the command table and runs the winning command.
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use parlor_config::{CommandsOptions, ParlorConfig, TokenizerOptions};
use parlor_core::{ChatClient, ChatMessage, ClientError, SendError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::CommandContext;
use crate::converters::ConverterRegistry;
use crate::descriptor::{CommandCatalog, CommandDescriptor};
use crate::error::CommandError;
use crate::handler::HandlerType;
use crate::handlers::help_handler_type;
use crate::instance::{build_instance, CommandInstance, MatchResult};
use crate::provider::{HandlerLease, HandlerProvider};
use crate::registry::CommandRegistry;
use crate::resolver::{ParameterBuilderValues, ParameterResolver, ParamsResult};
use crate::services::{Services, Value};
use crate::tokenizer::ArgumentTokenizer;
use crate::types::CommandResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotStarted,
    Started,
    Disposed,
}

/// Loaded commands, highest priority first.
struct CommandTable {
    instances: Vec<Arc<dyn CommandInstance>>,
    catalog: Arc<CommandCatalog>,
}

impl CommandTable {
    fn empty() -> Self {
        Self {
            instances: Vec::new(),
            catalog: Arc::new(CommandCatalog::default()),
        }
    }

    async fn dispose(&self) {
        for instance in &self.instances {
            instance.dispose().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct CommandsServiceBuilder {
    client: Arc<dyn ChatClient>,
    services: Services,
    options: CommandsOptions,
    tokenizer: TokenizerOptions,
    converters: ConverterRegistry,
    registry: CommandRegistry,
}

impl CommandsServiceBuilder {
    pub fn services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    pub fn options(mut self, options: CommandsOptions) -> Self {
        self.options = options;
        self
    }

    pub fn tokenizer(mut self, options: TokenizerOptions) -> Self {
        self.tokenizer = options;
        self
    }

    /// Command and tokenizer options from a prepared config.
    pub fn config(self, config: &ParlorConfig) -> Self {
        self.options(CommandsOptions::from(config))
            .tokenizer(TokenizerOptions::from(config))
    }

    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = converters;
        self
    }

    pub fn registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn handler(self, handler: Arc<HandlerType>) -> Self {
        self.registry.register(handler);
        self
    }

    pub fn build(self) -> Arc<CommandsService> {
        Arc::new(CommandsService {
            client: self.client,
            services: self.services,
            options: Arc::new(self.options),
            tokenizer: Arc::new(ArgumentTokenizer::new(&self.tokenizer)),
            registry: self.registry,
            provider: HandlerProvider::new(),
            resolver: ParameterResolver::new(Arc::new(self.converters)),
            table: ArcSwap::from_pointee(CommandTable::empty()),
            state: Mutex::new(ServiceState::NotStarted),
            lifecycle: tokio::sync::Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The command engine.
///
/// Messages are dispatched concurrently; each dispatch walks the command
/// table sequentially and stops at the first command that does not skip.
pub struct CommandsService {
    client: Arc<dyn ChatClient>,
    services: Services,
    options: Arc<CommandsOptions>,
    tokenizer: Arc<ArgumentTokenizer>,
    registry: CommandRegistry,
    provider: HandlerProvider,
    resolver: ParameterResolver,
    table: ArcSwap<CommandTable>,
    state: Mutex<ServiceState>,
    /// Startup lock; also owns the listener task.
    lifecycle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl CommandsService {
    pub fn builder(client: Arc<dyn ChatClient>) -> CommandsServiceBuilder {
        CommandsServiceBuilder {
            client,
            services: Services::new(),
            options: CommandsOptions::default(),
            tokenizer: TokenizerOptions::default(),
            converters: ConverterRegistry::new(),
            registry: CommandRegistry::new(),
        }
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    pub fn options(&self) -> &Arc<CommandsOptions> {
        &self.options
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &HandlerProvider {
        &self.provider
    }

    /// The currently loaded commands.
    pub fn catalog(&self) -> Arc<CommandCatalog> {
        Arc::clone(&self.table.load().catalog)
    }

    /// Load the command table and start listening for messages.
    ///
    /// Calling it again reloads the table from the registry. In-flight
    /// dispatches keep using the table they started with.
    pub async fn start(self: &Arc<Self>, cancellation: &CancellationToken) -> anyhow::Result<()> {
        let mut listener = tokio::select! {
            guard = self.lifecycle.lock() => guard,
            _ = cancellation.cancelled() => return Err(CommandError::Cancelled.into()),
        };
        if self.state() == ServiceState::Disposed {
            return Err(CommandError::Disposed.into());
        }

        let mut descriptors = self.registry.discover();
        if self.options.enable_help_command {
            let help = help_handler_type();
            for method in help.commands() {
                let descriptor = CommandDescriptor::new(Arc::clone(&help), Arc::clone(method));
                if descriptors.iter().all(|d| d.key() != descriptor.key()) {
                    descriptors.push(Arc::new(descriptor));
                }
            }
        }
        // Stable sort: equal priorities keep discovery order.
        descriptors.sort_by(|a, b| b.priority().cmp(&a.priority()));

        let instances = descriptors
            .iter()
            .map(|d| build_instance(Arc::clone(d), &self.tokenizer))
            .collect::<Result<Vec<_>, _>>()?;
        let catalog = Arc::new(CommandCatalog::from_descriptors(&descriptors));
        let count = instances.len();

        let previous = self.table.swap(Arc::new(CommandTable { instances, catalog }));
        previous.dispose().await;

        *self.state.lock() = ServiceState::Started;
        if listener.is_none() {
            *listener = Some(self.spawn_listener());
        }
        info!(commands = count, client = %self.client.name(), "Commands service started");
        Ok(())
    }

    /// Reload the command table. Same as calling [`start`](Self::start) again.
    pub async fn reload(self: &Arc<Self>, cancellation: &CancellationToken) -> anyhow::Result<()> {
        self.start(cancellation).await
    }

    fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.client.subscribe();
        let service = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(message) => {
                            let Some(service) = service.upgrade() else { break };
                            tokio::spawn(async move {
                                service.handle_message(message).await;
                            });
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Command listener lagged, messages dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Command listener stopped");
        })
    }

    /// Dispatch a received message. Never fails; every outcome is a result.
    pub async fn handle_message(&self, message: ChatMessage) -> CommandResult {
        if self.state() != ServiceState::Started {
            return CommandResult::not_handled();
        }
        if self.options.ignore_own_messages
            && message.sender_id.is_some()
            && message.sender_id == self.client.current_user_id()
        {
            debug!(message_id = %message.id, "Ignoring own message");
            return CommandResult::not_handled();
        }
        let context = CommandContext::new(message, Arc::clone(&self.client), Arc::clone(&self.options));
        self.dispatch(&context, &CancellationToken::new()).await
    }

    /// Run the command loop for `context`. Errors are logged and returned
    /// inside the result.
    pub async fn dispatch(&self, context: &CommandContext, cancellation: &CancellationToken) -> CommandResult {
        let linked = LinkedToken::new(&self.shutdown, cancellation);
        self.run(context, linked.token()).await
    }

    /// Run the command loop and surface a captured error to the caller.
    pub async fn execute(&self, context: &CommandContext, cancellation: &CancellationToken) -> anyhow::Result<CommandResult> {
        match self.state() {
            ServiceState::NotStarted => return Err(CommandError::NotStarted.into()),
            ServiceState::Disposed => return Err(CommandError::Disposed.into()),
            ServiceState::Started => {}
        }
        let mut result = self.dispatch(context, cancellation).await;
        match result.take_error() {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }

    async fn run(&self, context: &CommandContext, token: &CancellationToken) -> CommandResult {
        let table = self.table.load_full();
        let extras = [Arc::clone(&table.catalog) as Value];

        for instance in &table.instances {
            let descriptor = instance.descriptor();
            let result = match self.attempt(instance, context, token, &extras).await {
                Ok(Some(result)) => result,
                Ok(None) => continue,
                Err(err) => self.handle_error(descriptor, context, err),
            };
            if result.is_skip() {
                debug!(command = %descriptor.name(), "Command skipped");
                continue;
            }
            return result;
        }
        CommandResult::not_handled()
    }

    /// One candidate: match, requirements, handler, parameters, invoke.
    /// `Ok(None)` when the command did not match.
    async fn attempt(
        &self,
        instance: &Arc<dyn CommandInstance>,
        context: &CommandContext,
        token: &CancellationToken,
        extras: &[Value],
    ) -> anyhow::Result<Option<CommandResult>> {
        let descriptor = instance.descriptor();
        let MatchResult::Matched(matched) = cancellable(token, instance.check_match(context)).await? else {
            return Ok(None);
        };
        debug!(command = %descriptor.name(), handler = %descriptor.handler().display_name(), "Command matched");

        for requirement in descriptor.requirements() {
            if !cancellable(token, requirement.check(context, &self.services)).await? {
                let messages: Vec<String> = requirement.error_message().map(str::to_string).into_iter().collect();
                debug!(command = %descriptor.name(), "Command requirement not met");
                self.send_replies(context, &messages).await?;
                return Ok(Some(CommandResult::failure(messages)));
            }
        }

        let lease = self.provider.get_handler(descriptor, &self.services)?;
        let values = ParameterBuilderValues {
            context,
            services: &self.services,
            matched: &matched,
            cancellation: token,
            instance,
            extras,
        };
        let result = self.invoke(descriptor, &lease, &values).await;
        lease.release().await;
        result.map(Some)
    }

    async fn invoke(
        &self,
        descriptor: &CommandDescriptor,
        lease: &HandlerLease,
        values: &ParameterBuilderValues<'_>,
    ) -> anyhow::Result<CommandResult> {
        let args = match self
            .resolver
            .build_parameters(descriptor.name(), descriptor.params(), values)?
        {
            ParamsResult::Success(args) => args,
            ParamsResult::Failure(messages) => {
                self.send_replies(values.context, &messages).await?;
                return Ok(CommandResult::failure(messages));
            }
        };

        let instance = lease
            .instance()
            .cloned()
            .ok_or_else(|| anyhow!("handler lease for `{}` was already released", descriptor.name()))?;
        let token = values.cancellation;
        let result = cancellable(token, descriptor.method().invoke(instance, args)).await?;
        self.send_replies(values.context, result.messages()).await?;
        Ok(result)
    }

    async fn send_replies(&self, context: &CommandContext, messages: &[String]) -> anyhow::Result<()> {
        for text in messages.iter().filter(|t| !t.is_empty()) {
            context.reply(text.as_str()).await?;
        }
        Ok(())
    }

    fn handle_error(&self, descriptor: &CommandDescriptor, context: &CommandContext, err: anyhow::Error) -> CommandResult {
        let command = descriptor.name();
        let handler = descriptor.handler().display_name();
        if CommandError::is_cancellation(&err) {
            warn!(command = %command, handler = %handler, "Command execution cancelled");
        } else if is_silenced(&err, context.message()) {
            warn!(
                command = %command,
                recipient = context.message().reply_target(),
                "Cannot reply, bot is silenced for this recipient"
            );
        } else {
            error!(command = %command, handler = %handler, error = %format!("{err:#}"), "Command execution failed");
        }
        CommandResult::from_error(err)
    }

    /// Stop listening, dispose the command table and all persistent handlers.
    pub async fn dispose(&self) {
        let mut listener = self.lifecycle.lock().await;
        {
            let mut state = self.state.lock();
            if *state == ServiceState::Disposed {
                return;
            }
            *state = ServiceState::Disposed;
        }
        if let Some(handle) = listener.take() {
            handle.abort();
        }
        self.shutdown.cancel();

        let table = self.table.swap(Arc::new(CommandTable::empty()));
        table.dispose().await;
        self.provider.dispose_all().await;
        info!("Commands service disposed");
    }
}

impl Drop for CommandsService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A send failure for the chat the triggering message came from, refused
/// because the bot is muted or blocked there.
fn is_silenced(err: &anyhow::Error, message: &ChatMessage) -> bool {
    let send = err.chain().find_map(|cause| {
        cause.downcast_ref::<SendError>().or_else(|| match cause.downcast_ref::<ClientError>() {
            Some(ClientError::Send(send)) => Some(send),
            _ => None,
        })
    });
    send.is_some_and(|send| {
        send.is_silenced()
            && send.message.recipient_id == message.reply_target()
            && send.message.kind == message.kind
    })
}

async fn cancellable<T>(
    token: &CancellationToken,
    future: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(CommandError::Cancelled.into()),
        result = future => result,
    }
}

/// Child of the service's shutdown token that is also cancelled with the
/// caller's token.
struct LinkedToken {
    token: CancellationToken,
    forward: JoinHandle<()>,
}

impl LinkedToken {
    fn new(shutdown: &CancellationToken, caller: &CancellationToken) -> Self {
        let token = shutdown.child_token();
        if caller.is_cancelled() {
            token.cancel();
        }
        let forward = {
            let token = token.clone();
            let caller = caller.clone();
            tokio::spawn(async move {
                caller.cancelled().await;
                token.cancel();
            })
        };
        Self { token, forward }
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for LinkedToken {
    fn drop(&mut self) {
        self.forward.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parlor_core::{LocalClient, RequirePrefix, FORBIDDEN_STATUS, SILENCED_ERROR_CODE};

    use super::*;
    use crate::descriptor::{CommandSpec, Param};
    use crate::handler::{Constructor, Disposable};
    use crate::requirements::GroupOnly;

    /// Records which commands ran.
    #[derive(Default)]
    struct Journal(Mutex<Vec<String>>);

    impl Journal {
        fn push(&self, entry: &str) {
            self.0.lock().push(entry.to_string());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    struct Harness {
        client: Arc<LocalClient>,
        journal: Arc<Journal>,
        service: Arc<CommandsService>,
    }

    impl Harness {
        async fn start(handlers: Vec<Arc<HandlerType>>, options: CommandsOptions) -> Self {
            Self::start_with(LocalClient::new(), handlers, options).await
        }

        async fn start_with(client: LocalClient, handlers: Vec<Arc<HandlerType>>, options: CommandsOptions) -> Self {
            let client = Arc::new(client);
            let journal = Arc::new(Journal::default());
            let mut services = Services::new();
            services.insert_arc(Arc::clone(&journal));
            let mut builder = CommandsService::builder(client.clone())
                .services(services)
                .options(options);
            for handler in handlers {
                builder = builder.handler(handler);
            }
            let service = builder.build();
            service.start(&CancellationToken::new()).await.unwrap();
            Self {
                client,
                journal,
                service,
            }
        }

        fn context(&self, message: ChatMessage) -> CommandContext {
            CommandContext::new(message, self.client.clone(), Arc::clone(self.service.options()))
        }

        async fn execute(&self, message: ChatMessage) -> anyhow::Result<CommandResult> {
            self.service
                .execute(&self.context(message), &CancellationToken::new())
                .await
        }

        fn sent_texts(&self) -> Vec<String> {
            self.client.sent().into_iter().map(|m| m.text).collect()
        }
    }

    fn journaled(name: &'static str, trigger: &str, priority: i32, outcome: fn() -> CommandResult) -> Arc<HandlerType> {
        // One handler type for all; the method name keeps commands apart.
        struct Plain;
        HandlerType::builder::<Plain>()
            .constructor(Constructor::new(|_| Ok(Plain)))
            .command(
                CommandSpec::text(trigger)
                    .method(name)
                    .priority(priority)
                    .param(Param::of::<Journal>("journal")),
                move |_h, args| async move {
                    args.arc::<Journal>(0)?.push(name);
                    Ok(outcome())
                },
            )
            .build()
    }

    fn no_help() -> CommandsOptions {
        CommandsOptions {
            enable_help_command: false,
            ..CommandsOptions::default()
        }
    }

    #[tokio::test]
    async fn skip_falls_through_to_lower_priority() {
        let h = Harness::start(
            vec![
                journaled("low", "go", 0, || CommandResult::reply("from low")),
                journaled("high", "go", 10, CommandResult::skip),
            ],
            no_help(),
        )
        .await;

        let result = h.execute(ChatMessage::group(1, 2, "!go")).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.messages(), ["from low"]);
        assert_eq!(h.journal.entries(), ["high", "low"]);
        assert_eq!(h.sent_texts(), ["from low"]);
    }

    #[tokio::test]
    async fn equal_priority_keeps_registration_order() {
        let h = Harness::start(
            vec![
                journaled("first", "go", 0, CommandResult::skip),
                journaled("second", "go", 0, CommandResult::success),
            ],
            no_help(),
        )
        .await;
        h.execute(ChatMessage::group(1, 2, "!go")).await.unwrap();
        assert_eq!(h.journal.entries(), ["first", "second"]);
    }

    #[tokio::test]
    async fn unmatched_message_is_not_handled() {
        let h = Harness::start(vec![journaled("go", "go", 0, CommandResult::success)], no_help()).await;
        let result = h.execute(ChatMessage::group(1, 2, "!stop")).await.unwrap();
        assert!(result.is_failure());
        assert!(result.messages().is_empty());
        assert!(h.journal.entries().is_empty());
    }

    #[tokio::test]
    async fn prefix_requirement_depends_on_chat_kind() {
        let options = CommandsOptions {
            require_prefix: RequirePrefix::GROUP,
            ..no_help()
        };
        let h = Harness::start(vec![journaled("go", "go", 0, CommandResult::success)], options).await;

        assert!(h.execute(ChatMessage::group(1, 2, "go")).await.unwrap().is_failure());
        assert!(h.execute(ChatMessage::private(1, 2, "go")).await.unwrap().is_success());
        assert!(h.execute(ChatMessage::group(1, 2, "!go")).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn missing_argument_replies_without_invoking() {
        struct Dice;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let dice = HandlerType::builder::<Dice>()
            .constructor(Constructor::new(|_| Ok(Dice)))
            .command(
                CommandSpec::text("roll").param(Param::of::<i32>("sides")),
                move |_h, _args| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(CommandResult::success())
                    }
                },
            )
            .build();
        let h = Harness::start(vec![dice], no_help()).await;

        let result = h.execute(ChatMessage::group(1, 2, "!roll")).await.unwrap();
        assert!(result.is_failure());
        assert!(!result.messages().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.sent_texts(), result.messages());
    }

    struct Tracked {
        disposed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Disposable for Tracked {
        async fn dispose(&self) -> anyhow::Result<()> {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tracked(persistent: bool, disposed: Arc<AtomicUsize>) -> Arc<HandlerType> {
        let builder = HandlerType::builder::<Tracked>()
            .constructor(Constructor::new(move |_| {
                Ok(Tracked {
                    disposed: Arc::clone(&disposed),
                })
            }))
            .disposable()
            .command(CommandSpec::text("track"), |_h, _args| async {
                Ok(CommandResult::success())
            });
        let builder = if persistent { builder.persistent() } else { builder };
        builder.build()
    }

    #[tokio::test]
    async fn transient_handlers_are_disposed_after_each_call() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let h = Harness::start(vec![tracked(false, disposed.clone())], no_help()).await;

        h.execute(ChatMessage::group(1, 2, "!track")).await.unwrap();
        h.execute(ChatMessage::group(1, 2, "!track")).await.unwrap();
        assert_eq!(disposed.load(Ordering::SeqCst), 2);

        h.service.dispose().await;
        assert_eq!(disposed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_handlers_are_disposed_once_on_shutdown() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let h = Harness::start(vec![tracked(true, disposed.clone())], no_help()).await;

        h.execute(ChatMessage::group(1, 2, "!track")).await.unwrap();
        h.execute(ChatMessage::group(1, 2, "!track")).await.unwrap();
        assert_eq!(disposed.load(Ordering::SeqCst), 0);

        h.service.dispose().await;
        h.service.dispose().await;
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    fn slow() -> Arc<HandlerType> {
        struct Slow;
        HandlerType::builder::<Slow>()
            .constructor(Constructor::new(|_| Ok(Slow)))
            .command(CommandSpec::text("slow"), |_h, _args| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(CommandResult::reply("done"))
            })
            .build()
    }

    fn cancel_soon() -> CancellationToken {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        token
    }

    #[tokio::test]
    async fn cancellation_is_a_failure_on_dispatch_and_an_error_on_execute() {
        let h = Harness::start(vec![slow()], no_help()).await;

        let ctx = h.context(ChatMessage::group(1, 2, "!slow"));
        let result = h.service.dispatch(&ctx, &cancel_soon()).await;
        assert!(result.is_failure());
        assert!(CommandError::is_cancellation(result.error().unwrap()));

        let err = h.service.execute(&ctx, &cancel_soon()).await.unwrap_err();
        assert!(CommandError::is_cancellation(&err));
        assert!(h.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn silenced_send_failure_becomes_failure() {
        let h = Harness::start(vec![journaled("go", "go", 0, || CommandResult::reply("hi"))], no_help()).await;
        h.client.fail_sends_to(1, FORBIDDEN_STATUS, Some(SILENCED_ERROR_CODE));

        let ctx = h.context(ChatMessage::group(1, 2, "!go"));
        let result = h.service.dispatch(&ctx, &CancellationToken::new()).await;
        let err = result.error().unwrap();
        assert!(is_silenced(err, ctx.message()));

        let other = h.context(ChatMessage::group(5, 2, "!go"));
        assert!(!is_silenced(err, other.message()));

        let err = h.service.execute(&ctx, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ClientError>(), Some(ClientError::Send(_))));
    }

    #[tokio::test]
    async fn command_errors_surface_on_execute_only() {
        struct Broken;
        let broken = HandlerType::builder::<Broken>()
            .constructor(Constructor::new(|_| Ok(Broken)))
            .command(CommandSpec::text("boom"), |_h, _args| async {
                Err(anyhow!("kaboom"))
            })
            .build();
        let h = Harness::start(vec![broken], no_help()).await;

        let ctx = h.context(ChatMessage::group(1, 2, "!boom"));
        let result = h.service.dispatch(&ctx, &CancellationToken::new()).await;
        assert_eq!(result.error().map(|e| e.to_string()).as_deref(), Some("kaboom"));

        let err = h.service.execute(&ctx, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "kaboom");
    }

    #[tokio::test]
    async fn unmet_requirement_never_resolves_handler() {
        struct Admin;
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let admin = HandlerType::builder::<Admin>()
            .constructor(Constructor::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Admin)
            }))
            .command(
                CommandSpec::text("kick").require(GroupOnly::with_message("Groups only.")),
                |_h, _args| async { Ok(CommandResult::success()) },
            )
            .build();
        let h = Harness::start(vec![admin], no_help()).await;

        let result = h.execute(ChatMessage::private(1, 2, "!kick")).await.unwrap();
        assert!(result.is_failure());
        assert_eq!(result.messages(), ["Groups only."]);
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert_eq!(h.sent_texts(), ["Groups only."]);

        assert!(h.execute(ChatMessage::group(1, 2, "!kick")).await.unwrap().is_success());
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn help_lists_commands() {
        let summary = HandlerType::builder::<Journal>()
            .constructor(Constructor::new(|_| Ok(Journal::default())))
            .command(CommandSpec::text("roll").summary("Roll dice."), |_h, _args| async {
                Ok(CommandResult::success())
            })
            .build();
        let h = Harness::start(vec![summary], CommandsOptions::default()).await;

        let result = h.execute(ChatMessage::group(1, 2, "!help")).await.unwrap();
        assert_eq!(result.messages(), ["Available commands:\n• !roll - Roll dice."]);
        assert_eq!(h.service.catalog().len(), 2);
    }

    #[tokio::test]
    async fn own_messages_are_ignored() {
        let h = Harness::start_with(
            LocalClient::new().with_user_id(99),
            vec![journaled("go", "go", 0, || CommandResult::reply("hi"))],
            no_help(),
        )
        .await;

        let result = h.service.handle_message(ChatMessage::group(1, 99, "!go")).await;
        assert!(result.is_failure());
        assert!(h.journal.entries().is_empty());

        let result = h.service.handle_message(ChatMessage::group(1, 2, "!go")).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn listener_dispatches_delivered_messages() {
        let h = Harness::start(vec![journaled("go", "go", 0, || CommandResult::reply("pong"))], no_help()).await;
        assert_eq!(h.client.subscriber_count(), 1);

        h.client.deliver(ChatMessage::group(1, 2, "!go"));
        for _ in 0..100 {
            if !h.client.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.sent_texts(), ["pong"]);
    }

    #[tokio::test]
    async fn lifecycle_states() {
        let client = Arc::new(LocalClient::new());
        let service = CommandsService::builder(client.clone()).build();
        let ctx = CommandContext::new(
            ChatMessage::group(1, 2, "!x"),
            client,
            Arc::clone(service.options()),
        );

        let err = service.execute(&ctx, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CommandError>(), Some(CommandError::NotStarted)));
        assert!(service.handle_message(ChatMessage::group(1, 2, "!help")).await.is_failure());

        service.start(&CancellationToken::new()).await.unwrap();
        assert_eq!(service.state(), ServiceState::Started);
        service.dispose().await;
        assert_eq!(service.state(), ServiceState::Disposed);

        let err = service.execute(&ctx, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CommandError>(), Some(CommandError::Disposed)));
        assert!(service.start(&CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn reload_picks_up_new_registrations() {
        let h = Harness::start(vec![], no_help()).await;
        assert!(h.execute(ChatMessage::group(1, 2, "!go")).await.unwrap().is_failure());

        h.service
            .registry()
            .register(journaled("go", "go", 0, CommandResult::success));
        h.service.reload(&CancellationToken::new()).await.unwrap();
        assert!(h.execute(ChatMessage::group(1, 2, "!go")).await.unwrap().is_success());
        assert_eq!(h.client.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn invalid_trigger_fails_start() {
        struct Bad;
        let bad = HandlerType::builder::<Bad>()
            .command(CommandSpec::regex("(oops"), |_h, _args| async {
                Ok(CommandResult::success())
            })
            .build();
        let client = Arc::new(LocalClient::new());
        let service = CommandsService::builder(client).handler(bad).build();
        let err = service.start(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CommandError>(),
            Some(CommandError::InvalidTrigger { .. })
        ));
        assert_eq!(service.state(), ServiceState::NotStarted);
    }
}
