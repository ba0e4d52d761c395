//! Voice Pendant - spoken command layer for a CNC pendant
//!
//! Turns noisy transcripts into machine commands and runs the turn-taking
//! around them (confirmation, chaining, repeat/undo, alarms).

pub mod command;
pub mod conversation;
pub mod core;
pub mod machine;
pub mod nlu;
pub mod speech;
pub mod text;
