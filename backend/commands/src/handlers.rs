/// Built-in command handlers.
use std::sync::Arc;

use crate::context::CommandContextOptions;
use crate::descriptor::{CommandCatalog, CommandSpec, Param};
use crate::handler::HandlerType;
use crate::types::{CommandResult, Trigger};

// ---------------------------------------------------------------------------
// help
// ---------------------------------------------------------------------------

/// Lists the visible commands of the loaded table.
#[derive(Debug, Default)]
pub struct HelpHandler;

impl HelpHandler {
    pub fn render(&self, catalog: &CommandCatalog, options: &CommandContextOptions) -> String {
        let mut lines = vec!["Available commands:".to_string()];
        for entry in catalog.visible() {
            let usage = match &entry.trigger {
                Trigger::Text(name) => format!("{}{}", options.prefix, name),
                Trigger::Regex(_) => format!("{}{}", options.prefix, entry.name),
            };
            match &entry.summary {
                Some(summary) => lines.push(format!("• {usage} - {summary}")),
                None => lines.push(format!("• {usage}")),
            }
        }
        lines.join("\n")
    }
}

/// Handler type for the built-in `help` command. Runs after every other
/// command.
pub fn help_handler_type() -> Arc<HandlerType> {
    HandlerType::builder::<HelpHandler>()
        .persistent()
        .priority(i32::MIN)
        .default_constructor()
        .command(
            CommandSpec::text("help")
                .summary("Show available commands.")
                .hidden()
                .param(Param::of::<CommandCatalog>("catalog"))
                .param(Param::of::<CommandContextOptions>("options")),
            |handler: Arc<HelpHandler>, args| async move {
                let catalog = args.arc::<CommandCatalog>(0)?;
                let options = args.arc::<CommandContextOptions>(1)?;
                Ok(CommandResult::reply(handler.render(&catalog, &options)))
            },
        )
        .build()
}
