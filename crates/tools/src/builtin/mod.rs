//! Built-in tools available to every agent profile

mod booking;
mod contact;
mod end_call;
mod transfer;
mod webhook;

pub use booking::BookMeetingTool;
pub use contact::LookupContactTool;
pub use end_call::EndCallTool;
pub use transfer::TransferCallTool;
pub use webhook::SendWebhookTool;

use call_agent_config::ToolsConfig;

use crate::{ToolError, ToolRegistry};

/// Registry with every built-in tool
pub fn create_registry(config: &ToolsConfig) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(EndCallTool);
    registry.register(TransferCallTool::new(config.transfer_number.clone()));
    registry.register(LookupContactTool);
    registry.register(BookMeetingTool::new(config)?);
    registry.register(SendWebhookTool::new(config)?);
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = create_registry(&ToolsConfig::default()).unwrap();
        assert_eq!(
            registry.tool_names(),
            vec![
                "book_meeting",
                "end_call",
                "lookup_contact",
                "send_webhook",
                "transfer_call"
            ]
        );
    }
}
