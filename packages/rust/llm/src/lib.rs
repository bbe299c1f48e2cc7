//! Chat-completion client used for relevance tagging.
//!
//! [`OpenAiClient`] talks to OpenAI or any API-compatible endpoint.
//! [`ChatClient`] is the seam the tagging code is written against.

pub mod client;
pub mod retry;

pub use client::{ChatClient, LlmClientConfig, OpenAiClient};
pub use retry::{RetryPolicy, parse_retry_after, should_retry};
