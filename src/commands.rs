//! Prefix commands a bot understands, e.g. `mb1!config set quiet_mode false`.

use std::sync::Arc;

use tracing::info;

use crate::communication_channel::CommunicationChannel;
use crate::config::{ConfigError, Configuration, SharedConfig};
use crate::conversation_manager::ConversationScheduler;
use crate::error::EngineError;

pub const NO_PERMISSION_TEXT: &str = "Sorry, you don't have permission to do that.";
pub const SERVER_NOT_ALLOWED_TEXT: &str = "Sorry, I don't have permission to run on this server.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ConfigHelp,
    ConfigShow,
    ConfigSet { name: String, value: String },
    /// `config set` with the wrong number of arguments.
    ConfigSetUsage,
    Generate,
    Repeat(String),
}

impl Command {
    fn owner_only(&self) -> bool {
        matches!(
            self,
            Command::ConfigSet { .. } | Command::Generate | Command::Repeat(_)
        )
    }
}

/// Who issued a command and where.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub author_id: u64,
    pub server_id: Option<u64>,
}

/// Parses `content` if it starts with `prefix` and names a known command.
pub fn parse(prefix: &str, content: &str) -> Option<Command> {
    let rest = content.trim().strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();

    match words.next()? {
        "config" => match words.next() {
            None | Some("help") => Some(Command::ConfigHelp),
            Some("show") => Some(Command::ConfigShow),
            Some("set") => {
                let args: Vec<&str> = words.collect();
                match args.as_slice() {
                    [name, value] => Some(Command::ConfigSet {
                        name: name.to_string(),
                        value: value.to_string(),
                    }),
                    _ => Some(Command::ConfigSetUsage),
                }
            }
            Some(_) => Some(Command::ConfigHelp),
        },
        "generate" => Some(Command::Generate),
        "repeat" => {
            let text = rest.trim_start().strip_prefix("repeat")?.trim();
            Some(Command::Repeat(text.to_string()))
        }
        _ => None,
    }
}

fn usage(prefix: &str) -> String {
    let mut text = format!(
        "**Usage**:\n`{prefix}config set <parameter name> <value>`\n`{prefix}config show`\n"
    );
    text.push_str("**Parameters**:\n");
    for field in Configuration::fields() {
        text.push_str(&format!("`{}` ({})\n", field.name, field.type_name));
    }
    text
}

/// Runs a command, answering in `channel`.
pub async fn execute(
    command: Command,
    invocation: Invocation,
    prefix: &str,
    config: &SharedConfig,
    scheduler: &Arc<ConversationScheduler>,
    channel: Arc<dyn CommunicationChannel>,
) -> Result<(), EngineError> {
    let current = config.snapshot();
    let server_allowed = invocation
        .server_id
        .map_or(false, |id| current.is_server_allowed(id));
    if !server_allowed {
        channel.send_message(SERVER_NOT_ALLOWED_TEXT).await?;
        return Ok(());
    }
    if command.owner_only() && invocation.author_id != current.owner_id {
        channel.send_message(NO_PERMISSION_TEXT).await?;
        return Ok(());
    }

    match command {
        Command::ConfigHelp => channel.send_message(&usage(prefix)).await?,
        Command::ConfigShow => channel.send_message(&current.show()).await?,
        Command::ConfigSetUsage => {
            let text = format!("**Usage**: `{prefix}config set <parameter name> <value>`");
            channel.send_message(&text).await?
        }
        Command::ConfigSet { name, value } => {
            let reply = match config.set_field(&name, &value) {
                Ok(change) if change.persisted => {
                    info!(bot = %scheduler.bot_name(), field = %change.field, old = %change.old, new = %change.new, "configuration changed");
                    format!("`{}` changed from {} to {}", change.field, change.old, change.new)
                }
                Ok(_) => EngineError::ConfigPersistFailed.user_message(),
                Err(ConfigError::InvalidSelectionAlgorithm(name)) => {
                    EngineError::InvalidSelectionAlgorithm(name).user_message()
                }
                Err(e) => e.to_string(),
            };
            channel.send_message(&reply).await?
        }
        Command::Generate => {
            match scheduler.generate_on_demand(channel).await {
                // Failure text has already been sent to the channel.
                Ok(_) | Err(EngineError::GenerationFailed) => {}
                Err(e) => return Err(e),
            }
        }
        Command::Repeat(text) => {
            info!(bot = %scheduler.bot_name(), %text, "repeat");
            channel.send_message(&text).await?
        }
    }
    Ok(())
}
