//! Text generation over an OpenAI-compatible chat completions API

mod client;
mod error;

pub use client::{parse_completion, ChatClient};
pub use error::LlmError;
