//! Conversation layer
//!
//! `state` holds the pure transition function, `machine` the stateful wrapper
//! with change listeners, and `session` the async loop that connects the
//! resolver, the executor and the outside world.

pub mod machine;
pub mod session;
pub mod state;

pub use machine::ConversationStateMachine;
pub use session::{Session, SessionHandle, SessionMessage, SessionOutput, ALARM_PROMPT};
pub use state::{transition, ConversationState, Event};
