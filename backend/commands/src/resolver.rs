//! Parameter resolver: binds a command's declared parameters to values.

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use parlor_core::{ChatClient, ChatMessage};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::{CommandContext, CommandContextOptions};
use crate::converters::ConverterRegistry;
use crate::descriptor::{Param, ParamKind};
use crate::error::CommandError;
use crate::instance::{CommandInstance, CommandMatch};
use crate::services::{logger_for, Logger, Services, Value};

pub const DEFAULT_CONVERSION_ERROR: &str = "Invalid value '{arg}' for {name}: expected {type}.";
pub const DEFAULT_MISSING_ERROR: &str = "Missing required argument {name} ({type}).";

/// Everything a parameter can be bound from during one invocation.
pub struct ParameterBuilderValues<'a> {
    pub context: &'a CommandContext,
    pub services: &'a Services,
    pub matched: &'a CommandMatch,
    pub cancellation: &'a CancellationToken,
    pub instance: &'a Arc<dyn CommandInstance>,
    /// Additional injectable objects, matched by their concrete type.
    pub extras: &'a [Value],
}

#[derive(Debug)]
pub enum ParamsResult {
    Success(Arguments),
    /// User-facing messages explaining why the arguments are invalid.
    Failure(Vec<String>),
}

/// Resolved argument values, in declaration order.
#[derive(Clone, Default)]
pub struct Arguments {
    names: Vec<String>,
    values: Vec<Option<Value>>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Option<Value>) {
        self.names.push(name.into());
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Shared value at `index`.
    pub fn arc<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, CommandError> {
        self.values
            .get(index)
            .cloned()
            .flatten()
            .and_then(|v| v.downcast::<T>().ok())
            .ok_or(CommandError::Argument {
                index,
                expected: type_name::<T>(),
            })
    }

    pub fn get<T: Any + Send + Sync + Clone>(&self, index: usize) -> Result<T, CommandError> {
        self.arc::<T>(index).map(|v| (*v).clone())
    }

    /// `None` when the optional argument was not given.
    pub fn opt<T: Any + Send + Sync + Clone>(&self, index: usize) -> Option<T> {
        self.get(index).ok()
    }

    pub fn by_name<T: Any + Send + Sync + Clone>(&self, name: &str) -> Result<T, CommandError> {
        let index = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or(CommandError::Argument {
                index: self.len(),
                expected: type_name::<T>(),
            })?;
        self.get(index)
    }
}

impl std::fmt::Debug for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.names.iter().zip(self.values.iter().map(Option::is_some)))
            .finish()
    }
}

/// Resolves parameters using the converter registry for positional tokens.
pub struct ParameterResolver {
    converters: Arc<ConverterRegistry>,
}

impl ParameterResolver {
    pub fn new(converters: Arc<ConverterRegistry>) -> Self {
        Self { converters }
    }

    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    /// Bind `params` in declaration order; the first source that applies
    /// wins. Only positional arguments consume tokens.
    ///
    /// Returns `Err` for parameters that can never be bound, which is a
    /// registration mistake rather than bad user input.
    pub fn build_parameters(
        &self,
        command: &str,
        params: &[Param],
        values: &ParameterBuilderValues<'_>,
    ) -> Result<ParamsResult, CommandError> {
        let mut args = Arguments::new();
        let mut tokens = values.matched.tokens.iter();

        for param in params {
            if let Some(value) = self.inject(param, values) {
                args.push(param.name(), Some(value));
                continue;
            }

            let ty = param.ty();
            let unsupported = || CommandError::UnsupportedParameter {
                command: command.to_string(),
                parameter: param.name().to_string(),
                ty: ty.display_name(),
            };

            // A named capture group binds by name and leaves the tokens alone.
            // An unmatched group still consumes its position.
            let token = match values.matched.groups.get(param.name()) {
                Some(group) => group.as_deref(),
                None => tokens.next().and_then(|t| t.as_deref()),
            };
            match token {
                Some(token) => {
                    let converter = self.converters.get_converter(ty).ok_or_else(unsupported)?;
                    match converter.convert(token) {
                        Ok(value) => args.push(param.name(), Some(value)),
                        Err(e) => {
                            debug!(command, parameter = param.name(), token = %token, error = %e, "Argument conversion failed");
                            let template = param.conversion_template().unwrap_or(DEFAULT_CONVERSION_ERROR);
                            return Ok(ParamsResult::Failure(vec![render(template, param, token)]));
                        }
                    }
                }
                None if param.default().is_some() => args.push(param.name(), param.default().cloned()),
                None if param.is_optional() => args.push(param.name(), None),
                None if self.converters.get_converter(ty).is_none() => return Err(unsupported()),
                None => {
                    let template = param.missing_template().unwrap_or(DEFAULT_MISSING_ERROR);
                    return Ok(ParamsResult::Failure(vec![render(template, param, "")]));
                }
            }
        }

        Ok(ParamsResult::Success(args))
    }

    /// Sources tried before positional arguments.
    fn inject(&self, param: &Param, values: &ParameterBuilderValues<'_>) -> Option<Value> {
        let ty = param.ty();
        let id = ty.id();
        let context = values.context;

        if let Some(extra) = values.extras.iter().find(|v| (***v).type_id() == id) {
            return Some(Arc::clone(extra));
        }
        if id == TypeId::of::<CommandContext>() {
            return Some(Arc::new(context.clone()));
        }
        if id == TypeId::of::<ChatMessage>() {
            return Some(Arc::clone(context.message()) as Value);
        }
        if id == TypeId::of::<Arc<dyn ChatClient>>() {
            return Some(Arc::new(Arc::clone(context.client())));
        }
        if id == TypeId::of::<CommandContextOptions>() {
            return Some(Arc::new(values.matched.options.clone()));
        }
        if id == TypeId::of::<Arc<dyn CommandInstance>>() {
            return Some(Arc::new(Arc::clone(values.instance)));
        }
        if id == TypeId::of::<CancellationToken>() {
            return Some(Arc::new(values.cancellation.clone()));
        }
        if let Some(service) = values.services.get_value(id) {
            return Some(service);
        }
        if param.kind() == ParamKind::RemainingText && ty.is::<String>() {
            return Some(Arc::new(values.matched.args_text.clone()));
        }
        if ty.is::<Logger>() {
            let name = values.instance.descriptor().handler().display_name();
            return Some(Arc::new(logger_for(values.services, &name)));
        }
        None
    }
}

fn render(template: &str, param: &Param, token: &str) -> String {
    template
        .replace("{arg}", token)
        .replace("{type}", &param.ty().display_name())
        .replace("{name}", param.name())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parlor_config::CommandsOptions;
    use parlor_core::LocalClient;

    use super::*;
    use crate::descriptor::{CommandCatalog, CommandDescriptor, CommandSpec};
    use crate::handler::HandlerType;
    use crate::instance::build_instance;
    use crate::tokenizer::ArgumentTokenizer;
    use crate::types::CommandResult;

    struct Dice;

    struct Fixture {
        context: CommandContext,
        services: Services,
        cancellation: CancellationToken,
        instance: Arc<dyn CommandInstance>,
        resolver: ParameterResolver,
    }

    impl Fixture {
        fn new() -> Self {
            let handler = HandlerType::builder::<Dice>()
                .command(CommandSpec::text("roll"), |_h, _args| async {
                    Ok(CommandResult::success())
                })
                .build();
            let descriptor = Arc::new(CommandDescriptor::new(
                Arc::clone(&handler),
                Arc::clone(&handler.commands()[0]),
            ));
            Self {
                context: CommandContext::new(
                    ChatMessage::group(1, 2, "!roll 3 6"),
                    Arc::new(LocalClient::new()),
                    Arc::new(CommandsOptions::default()),
                ),
                services: Services::new().with(String::from("service")),
                cancellation: CancellationToken::new(),
                instance: build_instance(descriptor, &Arc::new(ArgumentTokenizer::default()))
                    .unwrap(),
                resolver: ParameterResolver::new(Arc::new(ConverterRegistry::new())),
            }
        }

        fn resolve(&self, params: &[Param], matched: &CommandMatch, extras: &[Value]) -> Result<ParamsResult, CommandError> {
            let values = ParameterBuilderValues {
                context: &self.context,
                services: &self.services,
                matched,
                cancellation: &self.cancellation,
                instance: &self.instance,
                extras,
            };
            self.resolver.build_parameters("roll", params, &values)
        }
    }

    fn matched(tokens: &[&str]) -> CommandMatch {
        CommandMatch {
            args_text: tokens.join(" "),
            tokens: tokens.iter().map(|t| Some(t.to_string())).collect(),
            groups: HashMap::new(),
            options: CommandContextOptions::from(&CommandsOptions::default()),
        }
    }

    fn success(result: Result<ParamsResult, CommandError>) -> Arguments {
        match result.unwrap() {
            ParamsResult::Success(args) => args,
            ParamsResult::Failure(messages) => panic!("unexpected failure: {messages:?}"),
        }
    }

    fn failure(result: Result<ParamsResult, CommandError>) -> Vec<String> {
        match result.unwrap() {
            ParamsResult::Success(args) => panic!("unexpected success: {args:?}"),
            ParamsResult::Failure(messages) => messages,
        }
    }

    #[test]
    fn injects_framework_values_without_consuming_tokens() {
        let fx = Fixture::new();
        let params = [
            Param::of::<CommandContext>("ctx"),
            Param::of::<u32>("count"),
            Param::of::<ChatMessage>("message"),
            Param::of::<CancellationToken>("token"),
            Param::of::<CommandContextOptions>("options"),
            Param::of::<Arc<dyn ChatClient>>("client"),
            Param::of::<u32>("sides"),
        ];
        let args = success(fx.resolve(&params, &matched(&["3", "6"]), &[]));
        assert_eq!(args.get::<u32>(1).unwrap(), 3);
        assert_eq!(args.get::<u32>(6).unwrap(), 6);
        assert_eq!(args.arc::<ChatMessage>(2).unwrap().text, "!roll 3 6");
        assert_eq!(args.get::<CommandContextOptions>(4).unwrap().prefix, "!");
        assert_eq!(args.arc::<Arc<dyn ChatClient>>(5).unwrap().name(), "local");
    }

    #[test]
    fn services_and_extras_are_injected() {
        let fx = Fixture::new();
        let catalog = Arc::new(CommandCatalog::default());
        let params = [Param::of::<String>("svc"), Param::of::<CommandCatalog>("catalog")];
        let args = success(fx.resolve(&params, &matched(&[]), &[catalog as Value]));
        assert_eq!(args.get::<String>(0).unwrap(), "service");
        assert!(args.arc::<CommandCatalog>(1).unwrap().is_empty());
    }

    #[test]
    fn remaining_text_only_when_marked() {
        let mut fx = Fixture::new();
        fx.services = Services::new();
        let params = [Param::text("rest"), Param::of::<String>("first")];
        let args = success(fx.resolve(&params, &matched(&["a", "b"]), &[]));
        assert_eq!(args.get::<String>(0).unwrap(), "a b");
        assert_eq!(args.get::<String>(1).unwrap(), "a");
    }

    #[test]
    fn missing_required_argument_fails() {
        let fx = Fixture::new();
        let messages = failure(fx.resolve(&[Param::of::<i32>("sides")], &matched(&[]), &[]));
        assert_eq!(messages, ["Missing required argument sides (i32)."]);
    }

    #[test]
    fn defaults_and_optionals() {
        let fx = Fixture::new();
        let params = [
            Param::of::<i32>("count").default_value(1i32),
            Param::of::<i32>("sides").optional(),
        ];
        let args = success(fx.resolve(&params, &matched(&[]), &[]));
        assert_eq!(args.get::<i32>(0).unwrap(), 1);
        assert_eq!(args.opt::<i32>(1), None);
        assert_eq!(args.by_name::<i32>("count").unwrap(), 1);
    }

    #[test]
    fn conversion_failure_uses_template() {
        let fx = Fixture::new();
        let params = [Param::of::<u8>("sides").conversion_error("{arg} is not a valid {name}")];
        let messages = failure(fx.resolve(&params, &matched(&["many"]), &[]));
        assert_eq!(messages, ["many is not a valid sides"]);

        let messages = failure(fx.resolve(&[Param::of::<u8>("sides")], &matched(&["-1"]), &[]));
        assert_eq!(messages, ["Invalid value '-1' for sides: expected u8."]);
    }

    #[test]
    fn named_groups_bind_by_name() {
        let fx = Fixture::new();
        let mut m = matched(&["3"]);
        m.groups.insert("sides".into(), Some("20".into()));
        let params = [Param::of::<u32>("sides"), Param::of::<u32>("count")];
        let args = success(fx.resolve(&params, &m, &[]));
        assert_eq!(args.get::<u32>(0).unwrap(), 20);
        assert_eq!(args.get::<u32>(1).unwrap(), 3);
    }

    #[test]
    fn unmatched_groups_keep_later_arguments_in_place() {
        let mut fx = Fixture::new();
        fx.services = Services::new();
        let mut m = matched(&[]);
        m.tokens = vec![None, Some("3".into())];
        m.groups.insert("sides".into(), Some("20".into()));
        m.groups.insert("mode".into(), None);
        let params = [
            Param::of::<u32>("sides"),
            Param::of::<u32>("multiplier").default_value(1u32),
            Param::of::<u32>("count"),
            Param::of::<String>("mode").optional(),
        ];
        let args = success(fx.resolve(&params, &m, &[]));
        assert_eq!(args.get::<u32>(0).unwrap(), 20);
        assert_eq!(args.get::<u32>(1).unwrap(), 1);
        assert_eq!(args.get::<u32>(2).unwrap(), 3);
        assert_eq!(args.opt::<String>(3), None);
    }

    #[test]
    fn default_applies_without_a_converter() {
        #[derive(Debug, PartialEq)]
        struct Unknown(u8);
        let fx = Fixture::new();
        let params = [
            Param::of::<Unknown>("thing").default_value(Unknown(7)),
            Param::of::<Unknown>("other").optional(),
        ];
        let args = success(fx.resolve(&params, &matched(&[]), &[]));
        assert_eq!(*args.arc::<Unknown>(0).unwrap(), Unknown(7));
        assert!(args.arc::<Unknown>(1).is_err());

        let err = fx
            .resolve(&[Param::of::<Unknown>("thing")], &matched(&[]), &[])
            .unwrap_err();
        assert!(matches!(err, CommandError::UnsupportedParameter { .. }));
    }

    #[test]
    fn unsupported_parameter_is_a_configuration_error() {
        struct Unknown;
        let fx = Fixture::new();
        let err = fx
            .resolve(&[Param::of::<Unknown>("thing")], &matched(&["x"]), &[])
            .unwrap_err();
        assert!(matches!(err, CommandError::UnsupportedParameter { .. }));
    }
}
