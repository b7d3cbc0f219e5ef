// src/llm/mod.rs

//! LLM collaborator: the HTTP client and the `ContentEngine` contract the
//! schedulers and the compaction engine call through.

pub mod client;
pub mod content;

pub use client::LlmClient;
pub use content::{ContentEngine, GenerationHints, LlmContentEngine};
