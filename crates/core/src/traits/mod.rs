//! Backend traits for the call runtime
//!
//! Every external collaborator sits behind one of these so the orchestrator,
//! bridge and lifecycle controller can be driven by fakes in tests.
//!
//! ```text
//! Speech:     SpeechToText (streaming, final transcripts only), TextToSpeech
//! Language:   LanguageModel (completion + tool calls)
//! Telephony:  TelephonyControl (call-control commands)
//! Records:    CallRecordStore, AgentProfileSource (durable config, read/narrow write)
//! ```

mod llm;
mod records;
mod speech;
mod telephony;

pub use llm::LanguageModel;
pub use records::{AgentProfileSource, CallRecordStore};
pub use speech::{SpeechToText, SttSession, TextToSpeech};
pub use telephony::{DialRequest, TelephonyControl};
