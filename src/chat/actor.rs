//! Single-writer task around the controller
//!
//! The controller is owned by one task. Commands arrive over a bounded
//! queue with a `oneshot` reply each; stream events come from the
//! controller's open exchange. One `tokio::select!` loop applies both, so
//! no two transitions ever run at once. After every transition the task
//! publishes a [`ControllerSnapshot`] on a `watch` channel.
//!
//! ```text
//! ControllerHandle --Command--> [ mpsc ] --> ControllerActor --snapshot--> [ watch ] --> renderers
//!                                               ^
//!                                     StreamSession events
//! ```

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::chat::controller::{ControllerSnapshot, ConversationController};
use crate::error::{Result, StreamChatError};
use crate::models::{ChatSession, SessionId};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Send(String, Reply<()>),
    Stop(oneshot::Sender<bool>),
    SelectSession(Option<SessionId>, Reply<()>),
    CreateSession(Option<String>, Reply<ChatSession>),
    RenameSession(SessionId, String, Reply<ChatSession>),
    DeleteSession(SessionId, Reply<()>),
    ClearSession(SessionId, Reply<()>),
    RefreshSessions(Reply<()>),
    SearchSessions(String, Reply<()>),
    DismissError(oneshot::Sender<bool>),
}

/// Cloneable handle used by the rendering layer
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<ControllerSnapshot>,
}

/// Spawns the controller task
///
/// The task runs until every handle is dropped, cancelling any exchange
/// still open on the way out.
pub fn spawn_controller(
    controller: ConversationController,
    queue_depth: usize,
) -> (ControllerHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(queue_depth.max(1));
    let (snapshots_tx, snapshots_rx) = watch::channel(controller.snapshot());

    let actor = ControllerActor {
        controller,
        commands: commands_rx,
        snapshots: snapshots_tx,
    };
    let task = tokio::spawn(actor.run());

    (
        ControllerHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
        },
        task,
    )
}

impl ControllerHandle {
    /// Latest published state
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver notified after every transition
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshots.clone()
    }

    /// Sends a user message
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| Command::Send(text, reply)).await?
    }

    /// Stops the exchange in progress; false if there was none
    pub async fn stop(&self) -> Result<bool> {
        self.request(Command::Stop).await
    }

    /// Switches session, or to no session with `None`
    pub async fn select_session(&self, session_id: Option<SessionId>) -> Result<()> {
        self.request(|reply| Command::SelectSession(session_id, reply))
            .await?
    }

    /// Creates a session and makes it current
    pub async fn create_session(&self, title: Option<String>) -> Result<ChatSession> {
        self.request(|reply| Command::CreateSession(title, reply))
            .await?
    }

    /// Renames a session
    pub async fn rename_session(
        &self,
        session_id: SessionId,
        title: impl Into<String>,
    ) -> Result<ChatSession> {
        let title = title.into();
        self.request(|reply| Command::RenameSession(session_id, title, reply))
            .await?
    }

    /// Deletes a session
    pub async fn delete_session(&self, session_id: SessionId) -> Result<()> {
        self.request(|reply| Command::DeleteSession(session_id, reply))
            .await?
    }

    /// Deletes a session's messages
    pub async fn clear_session(&self, session_id: SessionId) -> Result<()> {
        self.request(|reply| Command::ClearSession(session_id, reply))
            .await?
    }

    /// Reloads the session list
    pub async fn refresh_sessions(&self) -> Result<()> {
        self.request(Command::RefreshSessions).await?
    }

    /// Replaces the session list with search results
    pub async fn search_sessions(&self, query: impl Into<String>) -> Result<()> {
        let query = query.into();
        self.request(|reply| Command::SearchSessions(query, reply))
            .await?
    }

    /// Dismisses the last exchange error
    pub async fn dismiss_error(&self) -> Result<bool> {
        self.request(Command::DismissError).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| StreamChatError::ControllerClosed("command queue closed".to_string()))?;
        reply_rx.await.map_err(|_| {
            StreamChatError::ControllerClosed("controller dropped the request".to_string()).into()
        })
    }
}

struct ControllerActor {
    controller: ConversationController,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<ControllerSnapshot>,
}

enum Step {
    Command(Option<Command>),
    Event(crate::stream::StreamEvent),
}

impl ControllerActor {
    async fn run(mut self) {
        tracing::debug!("Controller task started");
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                Some(event) = self.controller.next_event() => Step::Event(event),
            };

            match step {
                Step::Command(Some(command)) => self.handle(command).await,
                Step::Command(None) => break,
                Step::Event(event) => {
                    tracing::debug!(event = event.name(), "Stream event");
                    self.controller.apply_event(event).await;
                }
            }
            self.publish();
        }

        self.controller.shutdown();
        self.publish();
        tracing::debug!("Controller task stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Send(text, reply) => {
                let result = self.controller.send(&text);
                self.reply(reply, result);
            }
            Command::Stop(reply) => {
                let stopped = self.controller.stop();
                self.reply(reply, stopped);
            }
            Command::SelectSession(id, reply) => {
                let result = self.controller.select_session(id).await;
                self.reply(reply, result);
            }
            Command::CreateSession(title, reply) => {
                let result = self.controller.create_session(title).await;
                self.reply(reply, result);
            }
            Command::RenameSession(id, title, reply) => {
                let result = self.controller.rename_session(id, &title).await;
                self.reply(reply, result);
            }
            Command::DeleteSession(id, reply) => {
                let result = self.controller.delete_session(id).await;
                self.reply(reply, result);
            }
            Command::ClearSession(id, reply) => {
                let result = self.controller.clear_session(id).await;
                self.reply(reply, result);
            }
            Command::RefreshSessions(reply) => {
                let result = self.controller.refresh_sessions().await;
                self.reply(reply, result);
            }
            Command::SearchSessions(query, reply) => {
                let result = self.controller.search_sessions(&query).await;
                self.reply(reply, result);
            }
            Command::DismissError(reply) => {
                let dismissed = self.controller.dismiss_error();
                self.reply(reply, dismissed);
            }
        }
    }

    /// Publishes the new state before answering the caller
    fn reply<T>(&self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        // The caller may have stopped waiting; the transition still happened.
        let _ = reply.send(value);
    }

    fn publish(&self) {
        let snapshot = self.controller.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
