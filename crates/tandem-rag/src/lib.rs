//! Answers catalog questions from the vector index.
//!
//! A query is normalized and looked up in the [`RetrievalCache`]. On a miss
//! the [`AnswerComposer`] embeds it, retrieves the nearest records, renders
//! them into a bounded context with current price and availability, and
//! asks the generation provider. Only successful answers are cached.

pub mod cache;
pub mod composer;
pub mod prompt;

pub use cache::{CacheConfig, RetrievalCache, normalize_key, spawn_sweeper};
pub use composer::{Answer, AnswerComposer, AnswerConfig, AnswerSource};
pub use prompt::{DEFAULT_MAX_CONTEXT_CHARS, build_context, format_price, system_prompt};
