//! Storage for the call agent
//!
//! Provides:
//! - Per-call session store with TTL expiry and control-id mapping
//! - In-process call records and agent profiles

pub mod error;
pub mod records;
pub mod sessions;

pub use error::StoreError;
pub use records::{InMemoryCallRecords, StaticProfileSource};
pub use sessions::{InMemorySessionStore, SessionStore};
