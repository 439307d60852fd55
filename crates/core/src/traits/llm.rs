//! Language model trait

use async_trait::async_trait;

use crate::llm_types::{GenerateRequest, GenerateResponse, ToolDefinition};
use crate::Result;

/// Language model interface
///
/// A single completion per call; streaming is not needed on the phone path
/// because synthesis already flushes per sentence.
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Generate a plain completion
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Generate with tool definitions offered to the model
    async fn generate_with_tools(
        &self,
        request: GenerateRequest,
        tools: &[ToolDefinition],
    ) -> Result<GenerateResponse>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_types::ToolCall;
    use std::collections::HashMap;

    struct MockLlm;

    #[async_trait]
    impl LanguageModel for MockLlm {
        async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
            let last = request.last_user_message().unwrap_or_default().to_string();
            Ok(GenerateResponse::text(format!("echo: {}", last)))
        }

        async fn generate_with_tools(
            &self,
            _request: GenerateRequest,
            tools: &[ToolDefinition],
        ) -> Result<GenerateResponse> {
            let mut resp = GenerateResponse::text("");
            if let Some(tool) = tools.first() {
                resp = resp.with_tool_call(ToolCall::new(tool.name.clone(), HashMap::new()));
            }
            Ok(resp)
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_mock_llm() {
        let llm = MockLlm;
        let resp = llm
            .generate(GenerateRequest::new("sys").with_user_message("hi"))
            .await
            .unwrap();
        assert_eq!(resp.text, "echo: hi");

        let tools = vec![ToolDefinition {
            name: "end_call".to_string(),
            description: "End".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let resp = llm
            .generate_with_tools(GenerateRequest::new("sys"), &tools)
            .await
            .unwrap();
        assert!(resp.has_tool_calls());
    }
}
