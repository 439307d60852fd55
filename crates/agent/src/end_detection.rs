//! Detecting when the agent has said goodbye
//!
//! Two tiers: explicit markers anywhere in the reply, then farewell phrases
//! only at its very end.

use call_agent_llm::END_CALL_MARKER;
use once_cell::sync::Lazy;
use regex::Regex;

/// Markers the model emits to request hang-up
pub const END_MARKERS: &[&str] = &[END_CALL_MARKER, "[HANGUP]"];

/// Any end marker, in any letter case
static END_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives: Vec<String> = END_MARKERS.iter().map(|m| regex::escape(m)).collect();
    Regex::new(&format!("(?i){}", alternatives.join("|"))).unwrap()
});

/// Closing phrases that end the call when they end the reply
pub const FAREWELL_PHRASES: &[&str] = &[
    "goodbye",
    "have a great day",
    "take care",
    "thank you for your time",
];

/// How an agent reply relates to ending the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndSignal {
    /// Keep talking
    Continue,
    /// An explicit marker was present
    Marker,
    /// The reply closed with a farewell
    Farewell,
}

impl EndSignal {
    pub fn ends_call(&self) -> bool {
        !matches!(self, EndSignal::Continue)
    }
}

/// Classify a raw model reply
pub fn detect_end(reply: &str) -> EndSignal {
    if END_MARKER_RE.is_match(reply) {
        return EndSignal::Marker;
    }

    let lowered = reply.to_lowercase();
    let tail = lowered.trim_end_matches(|c: char| c == '.' || c == '!' || c.is_whitespace());
    if FAREWELL_PHRASES.iter().any(|p| tail.ends_with(p)) {
        EndSignal::Farewell
    } else {
        EndSignal::Continue
    }
}

/// Remove end markers so they are never spoken
pub fn strip_markers(reply: &str) -> String {
    END_MARKER_RE
        .replace_all(reply, "")
        .split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_anywhere() {
        assert_eq!(detect_end("Thanks, bye now [END_CALL]"), EndSignal::Marker);
        assert_eq!(detect_end("[HANGUP] okay"), EndSignal::Marker);
    }

    #[test]
    fn test_farewell_suffix() {
        assert_eq!(detect_end("Thanks so much. Goodbye!"), EndSignal::Farewell);
        assert_eq!(detect_end("Have a great day."), EndSignal::Farewell);
        assert_eq!(detect_end("Alright, take care !  "), EndSignal::Farewell);
        assert!(detect_end("Thank you for your time").ends_call());
    }

    #[test]
    fn test_farewell_mid_sentence_continues() {
        assert_eq!(
            detect_end("I'll take care of that booking. What time works?"),
            EndSignal::Continue
        );
        assert_eq!(detect_end("Goodbye is not what I'm saying yet, so tell me more?"), EndSignal::Continue);
        assert!(!detect_end("").ends_call());
    }

    #[test]
    fn test_strip_markers() {
        assert_eq!(strip_markers("Thanks for your time. [END_CALL]"), "Thanks for your time.");
        assert_eq!(strip_markers("Bye [HANGUP] [END_CALL]"), "Bye");
        assert_eq!(strip_markers("[END_CALL]"), "");
        assert_eq!(strip_markers("No markers here"), "No markers here");
    }

    #[test]
    fn test_markers_ignore_case() {
        assert_eq!(detect_end("Okay, I'll let you go now. [end_call]"), EndSignal::Marker);
        assert_eq!(detect_end("[End_Call]"), EndSignal::Marker);
        assert_eq!(detect_end("Bye [hangup]"), EndSignal::Marker);
        assert_eq!(
            strip_markers("Okay, I'll let you go now. [end_call]"),
            "Okay, I'll let you go now."
        );
        assert_eq!(strip_markers("[End_Call] [HangUp]"), "");
    }
}
