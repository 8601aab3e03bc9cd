//! Session management commands and the tables they print
//!
//! `streamchat sessions ...` talks to the store directly; no controller is
//! involved. The table and transcript printers are shared with the chat
//! REPL.

use crate::cli::SessionCommand;
use crate::config::Config;
use crate::error::Result;
use crate::models::{ChatMessage, ChatSession, Role, SessionId};
use crate::persistence::{HttpSessionStore, SessionStore, SessionUpdate};
use colored::Colorize;
use prettytable::{format, Table};

const TITLE_WIDTH: usize = 40;

/// Handle `sessions` subcommands
pub async fn handle_sessions(config: &Config, command: SessionCommand) -> Result<()> {
    let store = HttpSessionStore::new(&config.server)?;

    match command {
        SessionCommand::List { page, json } => {
            let page = store
                .list_sessions(page, config.chat.session_page_size)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
                return Ok(());
            }
            if page.items.is_empty() {
                println!("{}", "No sessions found.".yellow());
                return Ok(());
            }
            println!(
                "\nSessions (page {} of {}, {} total):",
                page.page,
                page.pages.max(1),
                page.total
            );
            print_session_table(&page.items, None);
            println!();
            println!(
                "Use {} to continue a session.",
                "streamchat chat --session <ID>".cyan()
            );
            println!();
        }
        SessionCommand::Show { id, json } => {
            let id = SessionId(id);
            let (session, messages) = tokio::try_join!(
                store.get_session(id),
                store.get_messages(id, 1, config.chat.message_page_size)
            )?;
            if json {
                let value = serde_json::json!({
                    "session": session,
                    "messages": messages.items,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }
            print_session_header(&session);
            print_transcript(&messages.items);
        }
        SessionCommand::Rename { id, title } => {
            let session = store
                .update_session(SessionId(id), SessionUpdate::title(title.trim()))
                .await?;
            println!(
                "{}",
                format!("Renamed session {} to '{}'", session.id, session.title).green()
            );
        }
        SessionCommand::Delete { id } => {
            store.delete_session(SessionId(id)).await?;
            println!("{}", format!("Deleted session {}", id).green());
        }
        SessionCommand::Clear { id } => {
            store.clear_messages(SessionId(id)).await?;
            println!("{}", format!("Cleared messages of session {}", id).green());
        }
        SessionCommand::Search { query, json } => {
            let sessions = store
                .search_sessions(query.clone(), config.chat.search_limit)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
                return Ok(());
            }
            if sessions.is_empty() {
                println!("{}", format!("No sessions match '{}'.", query).yellow());
                return Ok(());
            }
            print_session_table(&sessions, None);
        }
    }

    Ok(())
}

/// Print sessions as a table, marking `current` with `*`
pub fn print_session_table(sessions: &[ChatSession], current: Option<SessionId>) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for session in sessions {
        let marker = if Some(session.id) == current { "*" } else { " " };
        let updated = session
            .updated_at
            .or(session.created_at)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(prettytable::row![
            format!("{}{}", marker, session.id).cyan(),
            truncate_title(&session.title, TITLE_WIDTH),
            session.message_count,
            updated
        ]);
    }

    table.printstd();
}

/// Print a one-line description of a session
pub fn print_session_header(session: &ChatSession) {
    println!(
        "\n{} {}",
        format!("Session {}:", session.id).bold(),
        session.title.cyan()
    );
    if !session.model_name.is_empty() {
        println!("{}", format!("Model: {}", session.model_name).dimmed());
    }
    println!();
}

/// Print messages the way the chat REPL shows them
pub fn print_transcript(messages: &[ChatMessage]) {
    if messages.is_empty() {
        println!("{}", "(no messages yet)".dimmed());
        return;
    }
    for message in messages {
        println!("{} {}", role_label(message.role), message.content);
    }
    println!();
}

/// Colored prefix for a message author
pub fn role_label(role: Role) -> colored::ColoredString {
    match role {
        Role::User => "you>".green().bold(),
        Role::Assistant => "assistant>".cyan().bold(),
        Role::System => "system>".dimmed(),
    }
}

/// Shortens `title` to `max` characters, ending in `...` when cut
fn truncate_title(title: &str, max: usize) -> String {
    if title.chars().count() <= max {
        return title.to_string();
    }
    let kept: String = title.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_title_short() {
        assert_eq!(truncate_title("Trip", 40), "Trip");
    }

    #[test]
    fn test_truncate_title_long() {
        let title = "a".repeat(50);
        let truncated = truncate_title(&title, 40);
        assert_eq!(truncated.chars().count(), 40);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_title_multibyte() {
        let title = "日本語のタイトル".repeat(4);
        let truncated = truncate_title(&title, 10);
        assert_eq!(truncated.chars().count(), 10);
    }

    #[test]
    fn test_print_helpers_do_not_panic() {
        let mut session = ChatSession::provisional(SessionId(3));
        session.title = "x".repeat(80);
        print_session_table(&[session.clone()], Some(SessionId(3)));
        print_session_header(&session);
        print_transcript(&[ChatMessage::user(Some(SessionId(3)), "hello")]);
        print_transcript(&[]);
    }
}
