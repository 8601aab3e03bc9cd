/*!
Command handlers for the CLI

- `chat`: interactive streaming chat
- `sessions`: session management without a chat

Both build their clients from [`crate::config::Config`]; the chat handler
drives a [`crate::chat::ControllerHandle`] and renders its snapshots.
*/

use crate::config::Config;
use crate::error::Result;

// Special commands parser for the chat prompt
pub mod special_commands;

// Session subcommands and shared table output
pub mod sessions;

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Spawns the conversation controller and runs a readline loop. Each
    //! line is either a special command or a message; while a reply
    //! streams, the loop follows controller snapshots and prints the text
    //! as it grows. Ctrl+C during a reply stops it.

    use super::sessions::{
        print_session_header, print_session_table, print_transcript, role_label,
    };
    use super::*;
    use crate::chat::{
        spawn_controller, ControllerHandle, ControllerSettings, ControllerSnapshot,
        ConversationController,
    };
    use crate::commands::special_commands::{
        parse_special_command, print_help, SpecialCommand,
    };
    use crate::error::is_validation_error;
    use crate::models::{ChatStatus, Role};
    use crate::persistence::HttpSessionStore;
    use crate::stream::HttpStreamConnector;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;
    use std::sync::Arc;

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `session` - Optional session to continue
    ///
    /// # Examples
    ///
    /// ```
    /// use streamchat::commands::chat;
    /// use streamchat::config::Config;
    ///
    /// // In application code:
    /// // chat::run_chat(Config::default(), None).await?;
    /// ```
    pub async fn run_chat(config: Config, session: Option<i64>) -> Result<()> {
        tracing::info!("Starting interactive chat mode");

        let store = Arc::new(HttpSessionStore::new(&config.server)?);
        let connector = Arc::new(HttpStreamConnector::new(&config.server)?);
        let controller = ConversationController::new(
            store,
            connector,
            ControllerSettings::from(&config.chat),
        );
        let (handle, task) = spawn_controller(controller, config.chat.command_queue_depth);

        if let Err(e) = handle.refresh_sessions().await {
            tracing::warn!(error = %e, "Could not load sessions");
            println!("{}", format!("Could not load sessions: {}", e).yellow());
        }

        if let Some(id) = session {
            handle
                .select_session(Some(crate::models::SessionId(id)))
                .await?;
            show_current(&handle.snapshot());
        }

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(&config);

        loop {
            let prompt = format_prompt(&handle.snapshot());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::Exit) => break,
                        Ok(SpecialCommand::None) => {
                            if let Err(e) = exchange(&handle, trimmed).await {
                                print_error(&e);
                            }
                        }
                        Ok(command) => {
                            if let Err(e) = run_special_command(&handle, command).await {
                                print_error(&e);
                            }
                        }
                        Err(e) => println!("{}", e.to_string().red()),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "Use /exit to leave the chat".dimmed());
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    tracing::error!("Readline error: {}", e);
                    break;
                }
            }
        }

        drop(handle);
        if let Err(e) = task.await {
            tracing::warn!("Controller task ended abnormally: {}", e);
        }
        println!("Goodbye!");
        Ok(())
    }

    /// Sends one message and renders the reply until the exchange ends
    async fn exchange(handle: &ControllerHandle, text: &str) -> Result<()> {
        let mut updates = handle.subscribe();
        handle.send(text).await?;

        let baseline = updates.borrow_and_update().messages.len();
        let mut reply = ReplyPrinter::default();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut stopping = false;

        loop {
            let snapshot = updates.borrow_and_update().clone();
            reply.show(&snapshot, baseline);

            if !snapshot.status.is_busy() {
                reply.finish();
                if snapshot.status == ChatStatus::Error {
                    if let Some(error) = &snapshot.last_error {
                        println!(
                            "{}",
                            format!("Reply failed ({}): {}", error.code, error.message).red()
                        );
                    }
                    handle.dismiss_error().await?;
                }
                break;
            }

            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = &mut ctrl_c, if !stopping => {
                    stopping = true;
                    if handle.stop().await? {
                        reply.finish();
                        println!("{}", "Stopped.".yellow());
                    }
                }
            }
        }

        Ok(())
    }

    async fn run_special_command(
        handle: &ControllerHandle,
        command: SpecialCommand,
    ) -> Result<()> {
        match command {
            SpecialCommand::New(title) => {
                let session = handle.create_session(title).await?;
                println!(
                    "{}",
                    format!("Started session {}: {}", session.id, session.title).green()
                );
            }
            SpecialCommand::Sessions => {
                handle.refresh_sessions().await?;
                show_sessions(&handle.snapshot());
            }
            SpecialCommand::Switch(id) => {
                handle.select_session(Some(id)).await?;
                show_current(&handle.snapshot());
            }
            SpecialCommand::Detach => {
                handle.select_session(None).await?;
                println!("{}", "Your next message starts a new session.".green());
            }
            SpecialCommand::Rename(title) => {
                let id = current_session_id(handle)?;
                let session = handle.rename_session(id, title).await?;
                println!("{}", format!("Renamed to '{}'", session.title).green());
            }
            SpecialCommand::Delete(id) => {
                let id = match id {
                    Some(id) => id,
                    None => current_session_id(handle)?,
                };
                handle.delete_session(id).await?;
                println!("{}", format!("Deleted session {}", id).green());
            }
            SpecialCommand::Clear => {
                let id = current_session_id(handle)?;
                handle.clear_session(id).await?;
                println!("{}", "Cleared the session's messages.".green());
            }
            SpecialCommand::Search(query) => {
                handle.search_sessions(query).await?;
                show_sessions(&handle.snapshot());
            }
            SpecialCommand::History => show_current(&handle.snapshot()),
            SpecialCommand::Help => print_help(),
            SpecialCommand::Exit | SpecialCommand::None => {}
        }
        Ok(())
    }

    fn current_session_id(handle: &ControllerHandle) -> Result<crate::models::SessionId> {
        handle
            .snapshot()
            .current_session
            .map(|s| s.id)
            .ok_or_else(|| {
                crate::error::StreamChatError::Validation("no session is selected".to_string())
                    .into()
            })
    }

    fn show_sessions(snapshot: &ControllerSnapshot) {
        if snapshot.sessions.is_empty() {
            println!("{}", "No sessions found.".yellow());
            return;
        }
        print_session_table(
            &snapshot.sessions,
            snapshot.current_session.as_ref().map(|s| s.id),
        );
    }

    fn show_current(snapshot: &ControllerSnapshot) {
        match &snapshot.current_session {
            Some(session) => print_session_header(session),
            None => println!("{}", "\nNew conversation\n".bold()),
        }
        print_transcript(&snapshot.messages);
    }

    fn print_error(error: &anyhow::Error) {
        if is_validation_error(error) {
            println!("{}", error.to_string().yellow());
        } else {
            println!("{}", format!("Error: {}", error).red());
        }
    }

    fn format_prompt(snapshot: &ControllerSnapshot) -> String {
        match &snapshot.current_session {
            Some(session) => format!("[{}] >> ", session.title),
            None => "[new] >> ".to_string(),
        }
    }

    fn print_welcome_banner(config: &Config) {
        println!();
        println!("{}", "StreamChat".bold());
        println!("Connected to {}", config.server.base_url.cyan());
        println!(
            "Type {} for commands, {} to leave.",
            "/help".cyan(),
            "/exit".cyan()
        );
        println!();
    }

    /// Prints the growing assistant reply of one exchange
    ///
    /// The reply is the message right after the user's, at index
    /// `baseline` of the snapshot.
    #[derive(Debug, Default)]
    pub(crate) struct ReplyPrinter {
        printed: String,
        started: bool,
    }

    /// What to write for a new version of the reply
    #[derive(Debug, PartialEq, Eq)]
    pub(crate) enum ReplyDelta<'a> {
        Append(&'a str),
        Rewrite(&'a str),
        Unchanged,
    }

    impl ReplyPrinter {
        pub(crate) fn delta<'a>(&self, content: &'a str) -> ReplyDelta<'a> {
            if content == self.printed {
                ReplyDelta::Unchanged
            } else if let Some(rest) = content.strip_prefix(self.printed.as_str()) {
                ReplyDelta::Append(rest)
            } else {
                ReplyDelta::Rewrite(content)
            }
        }

        fn show(&mut self, snapshot: &ControllerSnapshot, baseline: usize) {
            let Some(message) = snapshot.messages.get(baseline) else {
                return;
            };
            if message.role != Role::Assistant {
                return;
            }
            if !self.started {
                print!("{} ", role_label(Role::Assistant));
                self.started = true;
            }
            match self.delta(&message.content) {
                ReplyDelta::Append(rest) => print!("{}", rest),
                ReplyDelta::Rewrite(content) => {
                    print!("\n{} {}", role_label(Role::Assistant), content)
                }
                ReplyDelta::Unchanged => return,
            }
            let _ = std::io::stdout().flush();
            self.printed = message.content.clone();
        }

        fn finish(&mut self) {
            if self.started {
                println!();
                println!();
                self.started = false;
            }
        }
    }

}
