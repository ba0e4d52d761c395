pub mod config;
pub mod error;
pub mod types;

pub use config::{ConversationConfig, LlmConfig, ParserConfig, PendantConfig};
pub use error::{PendantError, Result};
