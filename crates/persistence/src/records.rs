//! In-process call records and agent profiles
//!
//! Durable relational storage of call rows lives outside the runtime; these
//! implementations back single-node deployments and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;

use call_agent_core::{
    AgentProfile, AgentProfileSource, CallAnalysis, CallOutcome, CallRecord, CallRecordStore,
    CallStatus, Result,
};

use crate::StoreError;

/// Call records held in memory
#[derive(Default)]
pub struct InMemoryCallRecords {
    records: DashMap<String, CallRecord>,
}

impl InMemoryCallRecords {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, call_id: &str, f: impl FnOnce(&mut CallRecord)) -> Result<()> {
        let mut record = self
            .records
            .get_mut(call_id)
            .ok_or_else(|| StoreError::NotFound(call_id.to_string()))?;
        f(&mut *record);
        Ok(())
    }
}

#[async_trait]
impl CallRecordStore for InMemoryCallRecords {
    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>> {
        Ok(self.records.get(call_id).map(|r| r.clone()))
    }

    async fn upsert(&self, record: CallRecord) -> Result<()> {
        self.records.insert(record.call_id.clone(), record);
        Ok(())
    }

    async fn set_status(&self, call_id: &str, status: CallStatus) -> Result<()> {
        self.update(call_id, |r| r.status = status)
    }

    async fn set_control_id(&self, call_id: &str, control_id: &str) -> Result<()> {
        self.update(call_id, |r| r.control_id = Some(control_id.to_string()))
    }

    async fn mark_answered(&self, call_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.update(call_id, |r| {
            r.status = CallStatus::Answered;
            r.answered_at.get_or_insert(at);
        })
    }

    async fn complete(
        &self,
        call_id: &str,
        status: CallStatus,
        transcript: String,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(call_id, |r| {
            r.status = status;
            let ended = *r.ended_at.get_or_insert(ended_at);
            r.duration_secs = r
                .answered_at
                .map(|answered| (ended - answered).num_seconds().max(0) as u64);
            if !transcript.is_empty() || r.transcript.is_none() {
                r.transcript = Some(transcript);
            }
        })
    }

    async fn set_recording(&self, call_id: &str, url: &str) -> Result<()> {
        self.update(call_id, |r| r.recording_url = Some(url.to_string()))
    }

    async fn set_outcome(&self, call_id: &str, outcome: CallOutcome) -> Result<()> {
        self.update(call_id, |r| r.outcome = Some(outcome))
    }

    async fn set_analysis(&self, call_id: &str, analysis: CallAnalysis) -> Result<()> {
        self.update(call_id, |r| {
            r.outcome.get_or_insert(analysis.outcome);
            r.analysis = Some(analysis);
        })
    }
}

/// Profiles loaded once from configuration
pub struct StaticProfileSource {
    profiles: HashMap<String, AgentProfile>,
}

impl StaticProfileSource {
    pub fn new(profiles: impl IntoIterator<Item = AgentProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl AgentProfileSource for StaticProfileSource {
    async fn get_profile(&self, profile_id: &str) -> Result<Option<AgentProfile>> {
        Ok(self.profiles.get(profile_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> CallRecord {
        CallRecord {
            call_id: id.to_string(),
            tenant_id: "t".to_string(),
            agent_profile_id: "a".to_string(),
            contact_phone: "+15550100".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_lifecycle_updates() {
        let store = InMemoryCallRecords::new();
        store.upsert(record("c1")).await.unwrap();

        let answered = Utc::now();
        store.mark_answered("c1", answered).await.unwrap();
        // Second delivery keeps the first timestamp
        store
            .mark_answered("c1", answered + chrono::Duration::seconds(5))
            .await
            .unwrap();

        let ended = answered + chrono::Duration::seconds(42);
        store
            .complete("c1", CallStatus::Completed, "[AGENT]: hi".to_string(), ended)
            .await
            .unwrap();
        store
            .complete("c1", CallStatus::Completed, String::new(), ended)
            .await
            .unwrap();

        let r = store.get("c1").await.unwrap().unwrap();
        assert_eq!(r.status, CallStatus::Completed);
        assert_eq!(r.answered_at, Some(answered));
        assert_eq!(r.duration_secs, Some(42));
        assert_eq!(r.transcript.as_deref(), Some("[AGENT]: hi"));
    }

    #[tokio::test]
    async fn test_recording_and_analysis() {
        let store = InMemoryCallRecords::new();
        store.upsert(record("c1")).await.unwrap();
        store.set_recording("c1", "https://rec/1.mp3").await.unwrap();
        store
            .set_analysis(
                "c1",
                CallAnalysis {
                    summary: "Booked".to_string(),
                    outcome: CallOutcome::MeetingBooked,
                    sentiment: "positive".to_string(),
                },
            )
            .await
            .unwrap();
        let r = store.get("c1").await.unwrap().unwrap();
        assert_eq!(r.recording_url.as_deref(), Some("https://rec/1.mp3"));
        assert_eq!(r.analysis.map(|a| a.outcome), Some(CallOutcome::MeetingBooked));
    }

    #[tokio::test]
    async fn test_observed_outcome_survives_analysis() {
        let store = InMemoryCallRecords::new();
        store.upsert(record("c1")).await.unwrap();
        store
            .set_outcome("c1", CallOutcome::TransferredToHuman)
            .await
            .unwrap();
        store
            .set_analysis(
                "c1",
                CallAnalysis {
                    summary: "Asked for a person".to_string(),
                    outcome: CallOutcome::CallbackRequested,
                    sentiment: "neutral".to_string(),
                },
            )
            .await
            .unwrap();
        let r = store.get("c1").await.unwrap().unwrap();
        assert_eq!(r.outcome, Some(CallOutcome::TransferredToHuman));
        assert_eq!(
            r.analysis.map(|a| a.outcome),
            Some(CallOutcome::CallbackRequested)
        );
    }

    #[tokio::test]
    async fn test_missing_record_is_error() {
        let store = InMemoryCallRecords::new();
        assert!(store.set_status("nope", CallStatus::Failed).await.is_err());
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_source() {
        let profile: AgentProfile =
            serde_json::from_value(serde_json::json!({"id": "sdr", "tenant_id": "acme"})).unwrap();
        let source = StaticProfileSource::new(vec![profile]);
        assert_eq!(source.len(), 1);
        assert!(source.get_profile("sdr").await.unwrap().is_some());
        assert!(source.get_profile("other").await.unwrap().is_none());
    }
}
