//! Durable call record and agent profile access

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::call::{AgentProfile, CallAnalysis, CallOutcome, CallRecord, CallStatus};
use crate::Result;

/// Narrow read/write access to call records
///
/// Updates are idempotent: applying the same update twice leaves the record
/// unchanged.
#[async_trait]
pub trait CallRecordStore: Send + Sync + 'static {
    /// Fetch a record; absence is `Ok(None)`
    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>>;

    /// Insert or replace a record
    async fn upsert(&self, record: CallRecord) -> Result<()>;

    /// Update status
    async fn set_status(&self, call_id: &str, status: CallStatus) -> Result<()>;

    /// Record the provider control identifier
    async fn set_control_id(&self, call_id: &str, control_id: &str) -> Result<()>;

    /// Mark answered; the first timestamp wins
    async fn mark_answered(&self, call_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Finalize with transcript, end time and duration
    async fn complete(
        &self,
        call_id: &str,
        status: CallStatus,
        transcript: String,
        ended_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Attach a recording reference
    async fn set_recording(&self, call_id: &str, url: &str) -> Result<()>;

    /// Record the outcome as observed by the lifecycle
    async fn set_outcome(&self, call_id: &str, outcome: CallOutcome) -> Result<()>;

    /// Attach post-call analysis; an outcome already recorded is kept
    async fn set_analysis(&self, call_id: &str, analysis: CallAnalysis) -> Result<()>;
}

/// Read-only source of agent profiles
#[async_trait]
pub trait AgentProfileSource: Send + Sync + 'static {
    async fn get_profile(&self, profile_id: &str) -> Result<Option<AgentProfile>>;
}
