pub mod client;
pub mod error;
pub mod types;

pub use client::{CompletionClient, DEFAULT_BASE_URL, GenerationParams, OpenAiClient};
