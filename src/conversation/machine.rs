//! Stateful wrapper around `transition` with change listeners

use super::state::{self, ConversationState, Event};
use tracing::{debug, info};

type Listener = Box<dyn Fn(&ConversationState, &ConversationState) + Send + Sync>;

/// Owns the single current state; only `handle` advances it
pub struct ConversationStateMachine {
    state: ConversationState,
    listeners: Vec<Listener>,
}

impl Default for ConversationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStateMachine {
    pub fn new() -> Self {
        Self {
            state: ConversationState::Idle,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Called with `(old, new)` after every change
    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: Fn(&ConversationState, &ConversationState) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Apply an event. Returns true when the state changed.
    pub fn handle(&mut self, event: Event) -> bool {
        let next = state::transition(&self.state, &event);
        if next == self.state {
            debug!(state = self.state.name(), ?event, "event ignored");
            return false;
        }

        info!(from = self.state.name(), to = next.name(), "conversation state changed");
        let old = std::mem::replace(&mut self.state, next);
        for listener in &self.listeners {
            listener(&old, &self.state);
        }
        true
    }

    pub fn can_accept_input(&self) -> bool {
        state::can_accept_input(&self.state)
    }

    pub fn can_start_new_command(&self) -> bool {
        state::can_start_new_command(&self.state)
    }
}
