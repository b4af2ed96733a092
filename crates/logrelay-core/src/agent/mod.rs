//! The agent collaborator: the slow, blocking call a request wraps.
//!
//! ```text
//! RequestProcessor --invoke(text)--> &dyn Agent --> AgentResult
//!                                        |
//!                                   CommandAgent
//!                                        |
//!                          `claude -p ... --output-format stream-json`
//! ```

pub mod command;
pub mod trait_def;

pub use command::CommandAgent;
pub use trait_def::{Agent, AgentResult, TokenUsage};
