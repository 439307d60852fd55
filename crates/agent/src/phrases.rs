//! Fixed lines the agent speaks or feeds the model

/// User-role directive that asks the model for its opening line
pub const GREETING_DIRECTIVE: &str = "[SYSTEM: The call has just been answered. Deliver your opening greeting. Be warm and natural.]";

/// Spoken when the greeting completion fails or times out
pub const FALLBACK_GREETING: &str = "Hi there! Thanks for picking up. How are you doing today?";

/// Spoken while tools run if the model returned no text with its calls
pub const TOOL_FILLER: &str = "Let me check that for you real quick.";

/// Follows the tool results in the follow-up completion
pub const TOOL_FOLLOW_UP_DIRECTIVE: &str = "[SYSTEM: Incorporate the tool results naturally into your response. Don't mention 'tools', just share the information conversationally.]";

/// Used when the follow-up completion fails and the model gave no text
pub const TOOL_FALLBACK: &str = "I wasn't able to pull that up just now, but I'm happy to keep going. What else can I help you with?";

/// Used when a regular turn's completion fails
pub const LLM_FALLBACK: &str = "Sorry, I missed that. Could you say that one more time?";

/// Spoken when the model ends the call without any closing words
pub const AGENT_FAREWELL: &str = "Thank you so much for your time today. Have a great day!";

pub const MAX_DURATION_FAREWELL: &str = "I want to be respectful of your time. Thank you so much for speaking with me today. Have a great day!";

pub const MAX_TURNS_FAREWELL: &str = "I appreciate your time. Let me wrap up here. Thank you for chatting with me today!";

/// Prefix of the synthetic system turn carrying tool results
pub const TOOL_RESULTS_HEADER: &str = "TOOL RESULTS:";
