//! Command resolution and execution
//!
//! transcript -> CommandResolver -> Command(s) -> CommandExecutor -> Transport/Prober

pub mod executor;
pub mod grammar;
pub mod history;
pub mod instructions;
pub mod jog;
pub mod resolver;
pub mod types;

pub use executor::{command_delay, CommandExecutor, ExecutorEvent};
pub use history::{ExecutionHistory, PendantContext};
pub use resolver::{CommandResolver, Reply};
pub use types::{Command, CommandType, Resolution};
