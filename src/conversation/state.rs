//! Conversation states, events and the pure transition function

use crate::command::types::Command;
use std::time::Duration;

/// Where the operator and the pendant are in the conversation
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    Listening {
        continuous: bool,
    },
    AwaitingCommandAfterWake {
        timeout: Duration,
    },
    AwaitingConfirmation {
        pending_command: Command,
        /// Whole chain when confirming several commands at once; empty otherwise
        chained_commands: Vec<Command>,
    },
    ExecutingCommand {
        command: Command,
    },
    ExecutingChain {
        commands: Vec<Command>,
        index: usize,
    },
    Speaking {
        message: String,
        resume_after: bool,
        previous_state: Box<ConversationState>,
    },
    /// Machine alarm. The session admits only commands that clear it.
    AwaitingUnlock,
    Error {
        message: String,
        retryable: bool,
    },
}

impl ConversationState {
    pub fn name(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::Listening { .. } => "listening",
            ConversationState::AwaitingCommandAfterWake { .. } => "awaiting_command",
            ConversationState::AwaitingConfirmation { .. } => "awaiting_confirmation",
            ConversationState::ExecutingCommand { .. } => "executing",
            ConversationState::ExecutingChain { .. } => "executing_chain",
            ConversationState::Speaking { .. } => "speaking",
            ConversationState::AwaitingUnlock => "awaiting_unlock",
            ConversationState::Error { .. } => "error",
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StartListening { continuous: bool },
    WakeWordDetected { timeout: Duration },
    WakeWordTimeout,
    CommandParsed { command: Command, needs_confirmation: bool },
    ChainedCommandsParsed { commands: Vec<Command>, needs_confirmation: bool },
    ConfirmationReceived,
    CancellationReceived,
    CommandExecuted,
    ChainStepCompleted,
    ChainCompleted,
    SpeakingStarted { message: String, resume_after: bool },
    SpeakingCompleted,
    ErrorOccurred { message: String, retryable: bool },
    AlarmRaised,
    Reset,
}

/// Next state for `(state, event)`. Events that make no sense in the
/// current state return it unchanged.
pub fn transition(state: &ConversationState, event: &Event) -> ConversationState {
    use ConversationState as S;

    match (state, event) {
        (_, Event::StartListening { continuous }) => S::Listening {
            continuous: *continuous,
        },

        (_, Event::WakeWordDetected { timeout }) => S::AwaitingCommandAfterWake { timeout: *timeout },
        (S::AwaitingCommandAfterWake { .. }, Event::WakeWordTimeout) => S::Idle,

        (_, Event::CommandParsed { command, needs_confirmation: true }) => S::AwaitingConfirmation {
            pending_command: command.clone(),
            chained_commands: Vec::new(),
        },
        (_, Event::CommandParsed { command, needs_confirmation: false }) => S::ExecutingCommand {
            command: command.clone(),
        },

        (_, Event::ChainedCommandsParsed { commands, .. }) if commands.is_empty() => state.clone(),
        (_, Event::ChainedCommandsParsed { commands, needs_confirmation: true }) => {
            S::AwaitingConfirmation {
                pending_command: commands[0].clone(),
                chained_commands: commands.clone(),
            }
        }
        (_, Event::ChainedCommandsParsed { commands, needs_confirmation: false }) => {
            S::ExecutingChain {
                commands: commands.clone(),
                index: 0,
            }
        }

        (
            S::AwaitingConfirmation {
                pending_command,
                chained_commands,
            },
            Event::ConfirmationReceived,
        ) => {
            if chained_commands.is_empty() {
                S::ExecutingCommand {
                    command: pending_command.clone(),
                }
            } else {
                S::ExecutingChain {
                    commands: chained_commands.clone(),
                    index: 0,
                }
            }
        }

        (S::AwaitingConfirmation { .. }, Event::CancellationReceived)
        | (S::ExecutingChain { .. }, Event::CancellationReceived) => S::Idle,

        (S::ExecutingCommand { .. }, Event::CommandExecuted) => S::Idle,

        (S::ExecutingChain { commands, index }, Event::ChainStepCompleted) => {
            let next = index + 1;
            if next >= commands.len() {
                S::Idle
            } else {
                S::ExecutingChain {
                    commands: commands.clone(),
                    index: next,
                }
            }
        }

        (_, Event::ChainCompleted) => S::Idle,

        (
            _,
            Event::SpeakingStarted {
                message,
                resume_after,
            },
        ) => S::Speaking {
            message: message.clone(),
            resume_after: *resume_after,
            previous_state: Box::new(state.clone()),
        },

        (
            S::Speaking {
                resume_after,
                previous_state,
                ..
            },
            Event::SpeakingCompleted,
        ) => match previous_state.as_ref() {
            S::Listening { .. } if *resume_after => previous_state.as_ref().clone(),
            _ => S::Idle,
        },

        (_, Event::ErrorOccurred { message, retryable }) => S::Error {
            message: message.clone(),
            retryable: *retryable,
        },

        (_, Event::AlarmRaised) => S::AwaitingUnlock,

        (_, Event::Reset) => S::Idle,

        // Anything else is not valid here
        _ => state.clone(),
    }
}

/// Whether a transcript should be processed in this state
pub fn can_accept_input(state: &ConversationState) -> bool {
    matches!(
        state,
        ConversationState::Listening { .. }
            | ConversationState::AwaitingCommandAfterWake { .. }
            | ConversationState::AwaitingConfirmation { .. }
    )
}

/// Whether a new command may be started in this state
pub fn can_start_new_command(state: &ConversationState) -> bool {
    matches!(
        state,
        ConversationState::Idle
            | ConversationState::Listening { .. }
            | ConversationState::AwaitingCommandAfterWake { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::instructions;

    fn run(mut state: ConversationState, events: &[Event]) -> ConversationState {
        for event in events {
            state = transition(&state, event);
        }
        state
    }

    #[test]
    fn test_wake_word_timeout_returns_to_idle() {
        let state = run(
            ConversationState::Idle,
            &[
                Event::StartListening { continuous: false },
                Event::WakeWordDetected {
                    timeout: Duration::from_secs(8),
                },
            ],
        );
        assert!(matches!(state, ConversationState::AwaitingCommandAfterWake { .. }));
        assert_eq!(transition(&state, &Event::WakeWordTimeout), ConversationState::Idle);
    }

    #[test]
    fn test_wake_timeout_ignored_elsewhere() {
        let listening = ConversationState::Listening { continuous: true };
        assert_eq!(transition(&listening, &Event::WakeWordTimeout), listening);
    }

    #[test]
    fn test_command_with_and_without_confirmation() {
        let cmd = instructions::home(&[]);
        let pending = transition(
            &ConversationState::Idle,
            &Event::CommandParsed {
                command: cmd.clone(),
                needs_confirmation: true,
            },
        );
        assert!(matches!(pending, ConversationState::AwaitingConfirmation { .. }));
        assert_eq!(
            transition(&pending, &Event::ConfirmationReceived),
            ConversationState::ExecutingCommand { command: cmd.clone() }
        );
        assert_eq!(
            transition(&pending, &Event::CancellationReceived),
            ConversationState::Idle
        );

        let direct = transition(
            &ConversationState::Idle,
            &Event::CommandParsed {
                command: cmd.clone(),
                needs_confirmation: false,
            },
        );
        assert_eq!(direct, ConversationState::ExecutingCommand { command: cmd });
        assert_eq!(transition(&direct, &Event::CommandExecuted), ConversationState::Idle);
    }

    #[test]
    fn test_chain_of_three_completes_after_three_steps() {
        let commands = vec![
            instructions::home(&[]),
            instructions::unlock(),
            instructions::spindle_off(),
        ];
        let mut state = ConversationState::ExecutingChain { commands, index: 0 };
        for step in 1..=3 {
            state = transition(&state, &Event::ChainStepCompleted);
            if step < 3 {
                assert!(matches!(state, ConversationState::ExecutingChain { index, .. } if index == step));
            }
        }
        assert_eq!(state, ConversationState::Idle);
    }

    #[test]
    fn test_confirmed_chain_starts_at_first_command() {
        let commands = vec![instructions::home(&[]), instructions::unlock()];
        let pending = transition(
            &ConversationState::Listening { continuous: false },
            &Event::ChainedCommandsParsed {
                commands: commands.clone(),
                needs_confirmation: true,
            },
        );
        match &pending {
            ConversationState::AwaitingConfirmation { pending_command, chained_commands } => {
                assert_eq!(pending_command, &commands[0]);
                assert_eq!(chained_commands.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            transition(&pending, &Event::ConfirmationReceived),
            ConversationState::ExecutingChain { commands, index: 0 }
        );
    }

    #[test]
    fn test_empty_chain_is_ignored() {
        let state = ConversationState::Listening { continuous: false };
        let next = transition(
            &state,
            &Event::ChainedCommandsParsed {
                commands: vec![],
                needs_confirmation: false,
            },
        );
        assert_eq!(next, state);
    }

    #[test]
    fn test_speaking_resumes_listening_only_when_asked() {
        let listening = ConversationState::Listening { continuous: true };
        let speaking = transition(
            &listening,
            &Event::SpeakingStarted {
                message: "Feed rate is 1000".into(),
                resume_after: true,
            },
        );
        assert_eq!(transition(&speaking, &Event::SpeakingCompleted), listening);

        let speaking = transition(
            &listening,
            &Event::SpeakingStarted {
                message: "hi".into(),
                resume_after: false,
            },
        );
        assert_eq!(transition(&speaking, &Event::SpeakingCompleted), ConversationState::Idle);
    }

    #[test]
    fn test_nested_speech_returns_to_the_speaking_state() {
        let listening = ConversationState::Listening { continuous: true };
        let first = transition(
            &listening,
            &Event::SpeakingStarted { message: "one".into(), resume_after: true },
        );
        let second = transition(
            &first,
            &Event::SpeakingStarted { message: "two".into(), resume_after: true },
        );
        match &second {
            ConversationState::Speaking { message, previous_state, .. } => {
                assert_eq!(message, "two");
                assert_eq!(previous_state.as_ref(), &first);
            }
            other => panic!("unexpected {:?}", other),
        }
        // The return point is a Speaking state, not Listening
        assert_eq!(transition(&second, &Event::SpeakingCompleted), ConversationState::Idle);
    }

    #[test]
    fn test_start_listening_from_every_state() {
        let states = [
            ConversationState::Idle,
            ConversationState::AwaitingUnlock,
            ConversationState::ExecutingCommand { command: instructions::home(&[]) },
            ConversationState::Error { message: "x".into(), retryable: false },
            ConversationState::Speaking {
                message: "hi".into(),
                resume_after: false,
                previous_state: Box::new(ConversationState::Idle),
            },
        ];
        for state in states {
            assert_eq!(
                transition(&state, &Event::StartListening { continuous: true }),
                ConversationState::Listening { continuous: true },
                "from {}",
                state.name()
            );
            assert!(matches!(
                transition(&state, &Event::WakeWordDetected { timeout: Duration::from_secs(1) }),
                ConversationState::AwaitingCommandAfterWake { .. }
            ));
        }
    }

    #[test]
    fn test_invalid_events_leave_state_unchanged() {
        let idle = ConversationState::Idle;
        assert_eq!(transition(&idle, &Event::ConfirmationReceived), idle);
        assert_eq!(transition(&idle, &Event::CommandExecuted), idle);
        assert_eq!(transition(&idle, &Event::SpeakingCompleted), idle);
        assert_eq!(transition(&idle, &Event::ChainStepCompleted), idle);
    }

    #[test]
    fn test_error_and_reset() {
        let error = transition(
            &ConversationState::ExecutingCommand {
                command: instructions::probe(crate::core::types::ProbeAxis::Z, Default::default()),
            },
            &Event::ErrorOccurred {
                message: "Probe failed".into(),
                retryable: true,
            },
        );
        assert!(matches!(error, ConversationState::Error { retryable: true, .. }));
        assert!(matches!(
            transition(&error, &Event::StartListening { continuous: false }),
            ConversationState::Listening { .. }
        ));
        assert_eq!(transition(&error, &Event::Reset), ConversationState::Idle);
    }

    #[test]
    fn test_alarm_enters_unlock_state() {
        let locked = transition(&ConversationState::Listening { continuous: true }, &Event::AlarmRaised);
        assert_eq!(locked, ConversationState::AwaitingUnlock);

        let unlocking = transition(
            &locked,
            &Event::CommandParsed { command: instructions::unlock(), needs_confirmation: false },
        );
        assert!(matches!(unlocking, ConversationState::ExecutingCommand { .. }));
        assert_eq!(transition(&locked, &Event::Reset), ConversationState::Idle);
    }

    #[test]
    fn test_speech_during_alarm_ends_idle() {
        let speaking = transition(
            &ConversationState::AwaitingUnlock,
            &Event::SpeakingStarted { message: "Alarm".into(), resume_after: true },
        );
        assert_eq!(transition(&speaking, &Event::SpeakingCompleted), ConversationState::Idle);
    }

    #[test]
    fn test_input_gates() {
        assert!(!can_accept_input(&ConversationState::Idle));
        assert!(can_accept_input(&ConversationState::Listening { continuous: false }));
        assert!(can_start_new_command(&ConversationState::Idle));
        assert!(!can_start_new_command(&ConversationState::AwaitingUnlock));
    }
}
