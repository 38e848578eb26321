use hub_core::types::{HelpdeskMessage, MessageType};

use crate::provider::{Message, Role};

/// Builds router/specialist input from raw helpdesk messages (spec §4.10
/// step 3): client messages (`type=0`) become `user` turns, everything
/// else becomes `assistant` turns, with private notes and system
/// activity entries prefixed so the model can tell them apart.
pub fn build_history(messages: &[HelpdeskMessage]) -> Vec<Message> {
    messages
        .iter()
        .map(|m| {
            let role = if m.message_type == MessageType::Incoming {
                Role::User
            } else {
                Role::Assistant
            };
            let content = if m.private {
                format!("[Внутренняя заметка оператора]: {}", m.content)
            } else if m.message_type == MessageType::Activity {
                format!("[СИСТЕМНАЯ ИНФОРМАЦИЯ!]: {}", m.content)
            } else {
                m.content.clone()
            };
            Message { role, content }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(id: i64, mt: MessageType, private: bool, content: &str) -> HelpdeskMessage {
        HelpdeskMessage {
            id,
            conversation_id: 1,
            content: content.to_string(),
            message_type: mt,
            private,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tags_private_and_activity_messages() {
        let history = build_history(&[
            msg(1, MessageType::Incoming, false, "привет"),
            msg(2, MessageType::Outgoing, true, "напомнить позже"),
            msg(3, MessageType::Activity, false, "conversation resolved"),
        ]);
        assert_eq!(history[0].role, Role::User);
        assert!(history[1].content.starts_with("[Внутренняя заметка"));
        assert!(history[2].content.starts_with("[СИСТЕМНАЯ ИНФОРМАЦИЯ!]"));
    }
}
