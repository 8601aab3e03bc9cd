//! Special commands parser for interactive chat
//!
//! Lines starting with `/` manage sessions instead of being sent to the
//! assistant. Command names are case-insensitive; arguments (titles and
//! search text) keep their case.

use crate::models::SessionId;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a new session, optionally titled
    New(Option<String>),

    /// Reload and print the session list
    Sessions,

    /// Switch to another session
    Switch(SessionId),

    /// Leave the current session; the next message starts a new one
    Detach,

    /// Rename the current session
    Rename(String),

    /// Delete a session (the current one when no id is given)
    Delete(Option<SessionId>),

    /// Delete the current session's messages
    Clear,

    /// Search sessions by title and content
    Search(String),

    /// Print the current session's messages again
    History,

    /// Display help information
    Help,

    /// Exit the chat
    Exit,

    /// Not a special command; send the line as a message
    None,
}

/// Parse user input into a special command
///
/// Returns `SpecialCommand::None` for ordinary chat input. `exit` and
/// `quit` work with or without the leading slash.
///
/// # Errors
///
/// Returns a [`CommandError`] for unknown commands and missing or malformed
/// arguments.
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, arg)) => (name.to_lowercase(), arg.trim()),
        None => (lower.clone(), ""),
    };

    match name.as_str() {
        "exit" | "quit" | "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        "/help" | "/?" => Ok(SpecialCommand::Help),

        "/new" => Ok(SpecialCommand::New(optional(arg))),
        "/sessions" => Ok(SpecialCommand::Sessions),
        "/detach" => Ok(SpecialCommand::Detach),
        "/clear" => Ok(SpecialCommand::Clear),
        "/history" => Ok(SpecialCommand::History),

        "/switch" => {
            let id = required(arg, "/switch", "/switch <session-id>")?;
            parse_id("/switch", id).map(SpecialCommand::Switch)
        }
        "/rename" => {
            let title = required(arg, "/rename", "/rename <title>")?;
            Ok(SpecialCommand::Rename(title.to_string()))
        }
        "/delete" => match optional(arg) {
            Some(id) => parse_id("/delete", &id).map(|id| SpecialCommand::Delete(Some(id))),
            None => Ok(SpecialCommand::Delete(None)),
        },
        "/search" => {
            let query = required(arg, "/search", "/search <text>")?;
            Ok(SpecialCommand::Search(query.to_string()))
        }

        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

fn optional(arg: &str) -> Option<String> {
    if arg.is_empty() {
        None
    } else {
        Some(arg.to_string())
    }
}

fn required<'a>(arg: &'a str, command: &str, usage: &str) -> Result<&'a str, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument {
            command: command.to_string(),
            usage: usage.to_string(),
        })
    } else {
        Ok(arg)
    }
}

fn parse_id(command: &str, arg: &str) -> Result<SessionId, CommandError> {
    arg.parse().map_err(|_| CommandError::UnsupportedArgument {
        command: command.to_string(),
        arg: arg.to_string(),
    })
}

/// Display help information for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

SESSIONS:
  /new [title]       - Start a new session
  /sessions          - List recent sessions
  /switch <id>       - Continue another session
  /detach            - Leave the current session
  /rename <title>    - Rename the current session
  /delete [id]       - Delete a session (default: the current one)
  /clear             - Delete the current session's messages
  /search <text>     - Search sessions by title and content
  /history           - Print the current session again

REPLIES:
  Ctrl+C             - Stop the reply being written
                       (at the prompt, Ctrl+C does nothing; use /exit)

OTHER:
  /help              - Show this help message
  /exit, /quit       - Leave the chat

Anything else you type is sent to the assistant.
"#
    );
}
