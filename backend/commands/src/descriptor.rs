//! Command descriptors: immutable metadata for one registered command.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use parlor_core::RequirePrefix;

use crate::converters::{ArgEnum, TypeInfo};
use crate::handler::HandlerType;
use crate::requirements::CommandRequirement;
use crate::resolver::Arguments;
use crate::services::Value;
use crate::types::{CommandResult, OptionOverrides, Trigger};

/// Type-erased command body: handler instance plus resolved arguments.
pub type InvokeFn =
    Arc<dyn Fn(Value, Arguments) -> BoxFuture<'static, anyhow::Result<CommandResult>> + Send + Sync>;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Injected from context, services, or the next argument token.
    Regular,
    /// Receives the raw argument text after the trigger.
    RemainingText,
}

/// A declared command parameter.
#[derive(Clone)]
pub struct Param {
    name: String,
    ty: TypeInfo,
    kind: ParamKind,
    default: Option<Value>,
    optional: bool,
    conversion_error: Option<String>,
    missing_error: Option<String>,
}

impl Param {
    pub fn of<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self::with_type(name, TypeInfo::of::<T>())
    }

    pub fn enumeration<E: ArgEnum>(name: impl Into<String>) -> Self {
        Self::with_type(name, TypeInfo::enumeration::<E>())
    }

    /// A `String` parameter bound to the whole argument text.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            kind: ParamKind::RemainingText,
            ..Self::of::<String>(name)
        }
    }

    fn with_type(name: impl Into<String>, ty: TypeInfo) -> Self {
        Self {
            name: name.into(),
            ty,
            kind: ParamKind::Regular,
            default: None,
            optional: false,
            conversion_error: None,
            missing_error: None,
        }
    }

    /// Value used when no argument token is left.
    pub fn default_value<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.default = Some(Arc::new(value));
        self
    }

    /// Leave the argument empty when no token is left.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Reply template for a failed conversion. `{arg}`, `{type}` and
    /// `{name}` are substituted.
    pub fn conversion_error(mut self, template: impl Into<String>) -> Self {
        self.conversion_error = Some(template.into());
        self
    }

    /// Reply template for a missing argument. `{type}` and `{name}` are
    /// substituted.
    pub fn missing_error(mut self, template: impl Into<String>) -> Self {
        self.missing_error = Some(template.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeInfo {
        &self.ty
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn conversion_template(&self) -> Option<&str> {
        self.conversion_error.as_deref()
    }

    pub fn missing_template(&self) -> Option<&str> {
        self.missing_error.as_deref()
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.name)
            .field("ty", &self.ty.display_name())
            .field("kind", &self.kind)
            .field("optional", &(self.optional || self.default.is_some()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Command spec
// ---------------------------------------------------------------------------

/// Registration-time description of one command method.
#[derive(Clone)]
pub struct CommandSpec {
    trigger: Trigger,
    method: Option<String>,
    params: Vec<Param>,
    priority: Option<i32>,
    overrides: OptionOverrides,
    requirements: Vec<Arc<dyn CommandRequirement>>,
    summary: Option<String>,
    hidden: bool,
}

impl CommandSpec {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            method: None,
            params: Vec::new(),
            priority: None,
            overrides: OptionOverrides::default(),
            requirements: Vec::new(),
            summary: None,
            hidden: false,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(Trigger::text(name))
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::new(Trigger::regex(pattern))
    }

    /// Method name, used for identity and logging. Defaults to the trigger.
    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.method = Some(name.into());
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

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

    pub fn require(mut self, requirement: impl CommandRequirement + 'static) -> Self {
        self.requirements.push(Arc::new(requirement));
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Leave the command out of the help listing.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn method_name(&self) -> &str {
        self.method.as_deref().unwrap_or_else(|| self.trigger.pattern())
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("trigger", &self.trigger)
            .field("method", &self.method_name())
            .field("params", &self.params)
            .field("priority", &self.priority)
            .field("overrides", &self.overrides)
            .field("requirements", &self.requirements.len())
            .finish()
    }
}

/// A command method bound to its handler type.
pub struct CommandMethod {
    spec: CommandSpec,
    invoke: InvokeFn,
}

impl CommandMethod {
    pub(crate) fn new(spec: CommandSpec, invoke: InvokeFn) -> Self {
        Self { spec, invoke }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        self.spec.method_name()
    }

    pub(crate) fn invoke(&self, instance: Value, args: Arguments) -> BoxFuture<'static, anyhow::Result<CommandResult>> {
        (self.invoke)(instance, args)
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Identity of a descriptor: trigger plus executable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorKey {
    pub trigger: Trigger,
    pub handler: TypeId,
    pub method: String,
}

/// Immutable metadata for one discovered command.
pub struct CommandDescriptor {
    handler: Arc<HandlerType>,
    method: Arc<CommandMethod>,
    priority: i32,
    overrides: OptionOverrides,
}

impl CommandDescriptor {
    /// Priority and overrides resolve command first, then handler type.
    pub fn new(handler: Arc<HandlerType>, method: Arc<CommandMethod>) -> Self {
        let spec = method.spec();
        let priority = spec.priority.or(handler.priority()).unwrap_or(0);
        let overrides = spec.overrides.or(handler.overrides());
        Self {
            handler,
            method,
            priority,
            overrides,
        }
    }

    pub fn key(&self) -> DescriptorKey {
        DescriptorKey {
            trigger: self.trigger().clone(),
            handler: self.handler.id(),
            method: self.name().to_string(),
        }
    }

    pub fn trigger(&self) -> &Trigger {
        self.method.spec().trigger()
    }

    pub fn name(&self) -> &str {
        self.method.name()
    }

    pub fn handler(&self) -> &Arc<HandlerType> {
        &self.handler
    }

    pub fn method(&self) -> &Arc<CommandMethod> {
        &self.method
    }

    pub fn params(&self) -> &[Param] {
        self.method.spec().params()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn overrides(&self) -> &OptionOverrides {
        &self.overrides
    }

    pub fn requirements(&self) -> &[Arc<dyn CommandRequirement>] {
        &self.method.spec().requirements
    }

    pub fn summary(&self) -> Option<&str> {
        self.method.spec().summary.as_deref()
    }

    pub fn is_hidden(&self) -> bool {
        self.method.spec().hidden
    }

    pub fn is_persistent(&self) -> bool {
        self.handler.is_persistent()
    }
}

impl PartialEq for CommandDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for CommandDescriptor {}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("trigger", self.trigger())
            .field("handler", &self.handler.name())
            .field("method", &self.name())
            .field("priority", &self.priority)
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub trigger: Trigger,
    pub handler: String,
    pub summary: Option<String>,
    pub priority: i32,
    pub hidden: bool,
}

/// Read-only listing of the loaded command table, injectable into commands.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    entries: Vec<CatalogEntry>,
}

impl CommandCatalog {
    pub fn from_descriptors<'a>(descriptors: impl IntoIterator<Item = &'a Arc<CommandDescriptor>>) -> Self {
        let entries = descriptors
            .into_iter()
            .map(|d| CatalogEntry {
                name: d.name().to_string(),
                trigger: d.trigger().clone(),
                handler: d.handler().display_name(),
                summary: d.summary().map(str::to_string),
                priority: d.priority(),
                hidden: d.is_hidden(),
            })
            .collect();
        Self { entries }
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn visible(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|e| !e.hidden)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
