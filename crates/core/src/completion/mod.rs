//! Text-completion service used for semantic merges.
//!
//! The engine only needs prompt-in / text-out. [`HttpCompletionClient`]
//! talks to an OpenAI-compatible chat endpoint; tests substitute their own
//! [`CompletionService`] implementations.

pub mod client;

use async_trait::async_trait;

use crate::errors::CompletionError;

pub use client::HttpCompletionClient;

/// A prompt-in / text-out completion backend.
///
/// Failures are returned as values so the merge executor can branch on
/// them and fall back.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}
