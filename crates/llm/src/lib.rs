//! Text-generation and layout decision services over a chat-completions API.

pub mod client;
pub mod config;
pub mod prompts;
pub mod services;

pub use client::{ChatClient, ChatMessage, Completion, Role};
pub use config::ServiceConfig;
pub use services::{parse_slot_values, LlmServices};
