//! Speech-to-text adapter
//!
//! Caller audio is segmented into utterances by an energy endpointer and each
//! finished utterance is transcribed by an HTTP recognition service. Only
//! finalized, non-empty transcripts leave the session.

mod endpointing;
mod http_backend;

pub use endpointing::{Endpointer, EndpointerConfig};
pub use http_backend::{HttpStt, HttpSttConfig};
