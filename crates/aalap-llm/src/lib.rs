//! Completion and embedding provider abstraction.
//!
//! Both capabilities are consumed as opaque services: a chat completion that turns a
//! message list into text, and an embedding call that turns text into a fixed-length
//! vector. Backends live behind [`LlmProvider`]; [`any::AnyProvider`] dispatches over
//! the configured one.

pub mod any;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;
pub(crate) mod retry;

pub use error::LlmError;
pub use provider::{LlmProvider, Message, Role};
