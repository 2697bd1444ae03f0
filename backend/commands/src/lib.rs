//! `parlor-commands` - the command engine.
//!
//! Handler types declare commands through [`HandlerType::builder`]; the
//! [`CommandsService`] matches incoming chat messages against them, binds
//! typed arguments and runs the first command that does not skip.

pub mod context;
pub mod converters;
pub mod descriptor;
pub mod detection;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod instance;
pub mod provider;
pub mod registry;
pub mod requirements;
pub mod resolver;
pub mod services;
pub mod tokenizer;
pub mod types;

pub use context::{CommandContext, CommandContextOptions};
pub use converters::{ArgConverter, ArgEnum, ConverterRegistry, TypeInfo};
pub use descriptor::{CatalogEntry, CommandCatalog, CommandDescriptor, CommandSpec, Param, ParamKind};
pub use dispatch::{CommandsService, CommandsServiceBuilder, ServiceState};
pub use error::{BoxError, CommandError, ConversionError};
pub use handler::{Constructor, Dependencies, Disposable, HandlerType, HandlerTypeBuilder};
pub use handlers::{help_handler_type, HelpHandler};
pub use instance::{CommandInstance, CommandMatch, MatchResult};
pub use provider::{HandlerLease, HandlerProvider};
pub use registry::CommandRegistry;
pub use requirements::{CommandRequirement, GroupOnly, PrivateOnly, SenderIn};
pub use resolver::{Arguments, ParameterResolver, ParamsResult};
pub use services::{Logger, LoggerFactory, Services, Value};
pub use tokenizer::ArgumentTokenizer;
pub use types::{CommandResult, CommandStatus, OptionOverrides, Trigger};
