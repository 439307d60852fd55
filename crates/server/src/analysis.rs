//! Post-call analysis
//!
//! After hangup the transcript is summarized by the language model into a
//! summary, an outcome label and a sentiment. Best effort: failures are
//! logged and never surface to the caller of the hangup handler.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use call_agent_agent::infer_outcome;
use call_agent_core::{
    CallAnalysis, CallOutcome, CallRecordStore, ConversationTurn, GenerateRequest, LanguageModel,
};

const ANALYSIS_PROMPT: &str = r#"Analyze this sales call transcript and provide:
1. A 2-3 sentence summary
2. Call outcome (meeting_booked, not_interested, callback_requested, bad_number, voicemail_left, no_answer, transferred_to_human, unknown)
3. Sentiment (positive, neutral, negative)

Respond in this exact JSON format:
{"summary": "...", "outcome": "...", "sentiment": "..."}"#;

const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    sentiment: Option<String>,
}

/// Parse the model's answer
///
/// Accepts bare JSON, JSON wrapped in a code fence, or JSON embedded in prose.
/// Anything else becomes a summary-only analysis with `fallback` as outcome.
pub fn parse_analysis(text: &str, fallback: CallOutcome) -> CallAnalysis {
    let raw = extract_json(text).and_then(|json| serde_json::from_str::<RawAnalysis>(json).ok());

    match raw {
        Some(raw) => CallAnalysis {
            summary: raw
                .summary
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| text.trim().to_string()),
            outcome: raw
                .outcome
                .map(|o| CallOutcome::parse(&o))
                .filter(|o| *o != CallOutcome::Unknown)
                .unwrap_or(fallback),
            sentiment: raw
                .sentiment
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "neutral".to_string()),
        },
        None => CallAnalysis {
            summary: text.trim().to_string(),
            outcome: fallback,
            sentiment: "neutral".to_string(),
        },
    }
}

fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (end > start).then(|| &unfenced[start..=end])
}

/// Summarize a finished call and store the result on its record
pub async fn analyze_call(
    llm: Arc<dyn LanguageModel>,
    records: Arc<dyn CallRecordStore>,
    call_id: String,
    history: Vec<ConversationTurn>,
) {
    let record = match records.get(&call_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::warn!(call_id = %call_id, "No call record to analyze");
            return;
        }
        Err(e) => {
            tracing::warn!(call_id = %call_id, error = %e, "Failed to load call record for analysis");
            return;
        }
    };

    let transcript = record.transcript.unwrap_or_default();
    if transcript.trim().is_empty() {
        tracing::debug!(call_id = %call_id, "Empty transcript, skipping analysis");
        return;
    }

    let fallback = infer_outcome(&history);
    let request = GenerateRequest::new(ANALYSIS_PROMPT).with_user_message(transcript);

    let analysis = match tokio::time::timeout(ANALYSIS_TIMEOUT, llm.generate(request)).await {
        Ok(Ok(response)) => parse_analysis(&response.text, fallback),
        Ok(Err(e)) => {
            metrics::counter!("call_analysis_failures_total").increment(1);
            tracing::warn!(call_id = %call_id, error = %e, "Post-call analysis failed");
            store_observed_outcome(records.as_ref(), &call_id, fallback).await;
            return;
        }
        Err(_) => {
            metrics::counter!("call_analysis_failures_total").increment(1);
            tracing::warn!(call_id = %call_id, "Post-call analysis timed out");
            store_observed_outcome(records.as_ref(), &call_id, fallback).await;
            return;
        }
    };

    let outcome = analysis.outcome;
    match records.set_analysis(&call_id, analysis).await {
        Ok(()) => tracing::info!(call_id = %call_id, outcome = outcome.as_str(), "Post-call analysis complete"),
        Err(e) => tracing::warn!(call_id = %call_id, error = %e, "Failed to store analysis"),
    }
}

/// Keep what the tool history proves when the model could not classify the call
async fn store_observed_outcome(records: &dyn CallRecordStore, call_id: &str, outcome: CallOutcome) {
    if outcome == CallOutcome::Unknown {
        return;
    }
    match records.set_outcome(call_id, outcome).await {
        Ok(()) => tracing::info!(call_id, outcome = outcome.as_str(), "Stored outcome from tool history"),
        Err(e) => tracing::warn!(call_id, error = %e, "Failed to store outcome"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use call_agent_core::{
        CallRecord, CallStatus, GenerateResponse, NewTurn, Result, ToolDefinition,
        ToolInvocation, ToolResult,
    };
    use call_agent_persistence::InMemoryCallRecords;
    use std::collections::HashMap;

    #[test]
    fn test_parse_plain_json() {
        let analysis = parse_analysis(
            r#"{"summary": "Booked a demo.", "outcome": "meeting_booked", "sentiment": "Positive"}"#,
            CallOutcome::Unknown,
        );
        assert_eq!(analysis.summary, "Booked a demo.");
        assert_eq!(analysis.outcome, CallOutcome::MeetingBooked);
        assert_eq!(analysis.sentiment, "positive");
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"summary\": \"Not a fit.\", \"outcome\": \"not_interested\", \"sentiment\": \"negative\"}\n```";
        let analysis = parse_analysis(text, CallOutcome::Unknown);
        assert_eq!(analysis.outcome, CallOutcome::NotInterested);
        assert_eq!(analysis.summary, "Not a fit.");
    }

    #[test]
    fn test_parse_prose_falls_back() {
        let analysis = parse_analysis("The caller hung up quickly.", CallOutcome::MeetingBooked);
        assert_eq!(analysis.summary, "The caller hung up quickly.");
        assert_eq!(analysis.outcome, CallOutcome::MeetingBooked);
        assert_eq!(analysis.sentiment, "neutral");
    }

    #[test]
    fn test_unknown_label_uses_observed_outcome() {
        let analysis = parse_analysis(
            r#"{"summary": "ok", "outcome": "great call"}"#,
            CallOutcome::TransferredToHuman,
        );
        assert_eq!(analysis.outcome, CallOutcome::TransferredToHuman);
    }

    struct FixedLlm(Result<String>);

    #[async_trait]
    impl LanguageModel for FixedLlm {
        async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
            match &self.0 {
                Ok(text) => Ok(GenerateResponse::text(text.clone())),
                Err(e) => Err(call_agent_core::Error::Llm(e.to_string())),
            }
        }

        async fn generate_with_tools(
            &self,
            request: GenerateRequest,
            _tools: &[ToolDefinition],
        ) -> Result<GenerateResponse> {
            self.generate(request).await
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    async fn records_with(transcript: Option<&str>) -> Arc<InMemoryCallRecords> {
        let records = Arc::new(InMemoryCallRecords::new());
        records
            .upsert(CallRecord {
                call_id: "c1".to_string(),
                status: CallStatus::Completed,
                transcript: transcript.map(str::to_string),
                ..Default::default()
            })
            .await
            .unwrap();
        records
    }

    #[tokio::test]
    async fn test_analysis_stored() {
        let records = records_with(Some("[AGENT]: Hi\n[USER]: Not interested")).await;
        let llm = Arc::new(FixedLlm(Ok(
            r#"{"summary": "Declined.", "outcome": "not_interested", "sentiment": "neutral"}"#
                .to_string(),
        )));

        analyze_call(llm, records.clone(), "c1".to_string(), Vec::new()).await;

        let record = records.get("c1").await.unwrap().unwrap();
        let analysis = record.analysis.unwrap();
        assert_eq!(analysis.summary, "Declined.");
        assert_eq!(record.outcome, Some(CallOutcome::NotInterested));
    }

    #[tokio::test]
    async fn test_llm_failure_leaves_record_untouched() {
        let records = records_with(Some("[AGENT]: Hi")).await;
        let llm = Arc::new(FixedLlm(Err(call_agent_core::Error::Llm("down".into()))));

        analyze_call(llm, records.clone(), "c1".to_string(), Vec::new()).await;

        let record = records.get("c1").await.unwrap().unwrap();
        assert!(record.analysis.is_none());
        assert!(record.outcome.is_none());
    }

    #[tokio::test]
    async fn test_llm_failure_keeps_booked_outcome() {
        let records = records_with(Some("[AGENT]: You're booked for Tuesday")).await;
        let llm = Arc::new(FixedLlm(Err(call_agent_core::Error::Llm("down".into()))));

        let mut session = call_agent_core::CallSession::new("c1", "t", "a", "+1");
        session.append_turn(NewTurn::agent("Booked").with_tool_calls(vec![ToolInvocation {
            name: "book_meeting".to_string(),
            arguments: HashMap::new(),
            result: ToolResult::ok(serde_json::json!({"booked": true})),
        }]));

        analyze_call(llm, records.clone(), "c1".to_string(), session.history().to_vec()).await;

        let record = records.get("c1").await.unwrap().unwrap();
        assert!(record.analysis.is_none());
        assert_eq!(record.outcome, Some(CallOutcome::MeetingBooked));
    }

    #[tokio::test]
    async fn test_empty_transcript_skipped() {
        let records = records_with(None).await;
        let llm = Arc::new(FixedLlm(Ok("{}".to_string())));

        analyze_call(llm, records.clone(), "c1".to_string(), Vec::new()).await;

        assert!(records.get("c1").await.unwrap().unwrap().analysis.is_none());
    }

    #[tokio::test]
    async fn test_prose_answer_uses_inferred_outcome() {
        let records = records_with(Some("[AGENT]: Booked you in")).await;
        let llm = Arc::new(FixedLlm(Ok("A meeting was set.".to_string())));

        let mut session = call_agent_core::CallSession::new("c1", "t", "a", "+1");
        session.append_turn(NewTurn::agent("Booked").with_tool_calls(vec![ToolInvocation {
            name: "book_meeting".to_string(),
            arguments: HashMap::new(),
            result: ToolResult::ok(serde_json::json!({"booked": true})),
        }]));

        analyze_call(llm, records.clone(), "c1".to_string(), session.history().to_vec()).await;

        let record = records.get("c1").await.unwrap().unwrap();
        assert_eq!(record.outcome, Some(CallOutcome::MeetingBooked));
        assert_eq!(record.analysis.unwrap().summary, "A meeting was set.");
    }
}
