//! Text-to-Speech
//!
//! HTTP synthesis backend plus sentence-level streaming onto the outbound
//! audio channel.

mod http_backend;
mod sentences;
mod streaming;

pub use http_backend::{HttpTts, HttpTtsConfig};
pub use sentences::split_into_sentences;
pub use streaming::{SentenceSynthesizer, SpokenAudio};
