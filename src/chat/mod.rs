//! Conversation state and its single-writer runtime
//!
//! - [`message_log`] and [`registry`] are plain containers that only
//!   enforce their own invariants.
//! - [`controller`] is the state machine composing them with a stream
//!   session.
//! - [`actor`] runs the controller on one task behind a cloneable handle.

pub mod actor;
pub mod controller;
pub mod message_log;
pub mod metrics;
pub mod registry;

pub use actor::{spawn_controller, ControllerHandle};
pub use controller::{ControllerSettings, ControllerSnapshot, ConversationController};
pub use message_log::MessageLog;
pub use registry::SessionRegistry;
