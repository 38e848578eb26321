use std::collections::HashMap;
use std::sync::Arc;

use hub_core::normalize::{is_file_link, split_message_by_links};
use hub_helpdesk::HelpdeskClient;
use hub_transports::TransportClient;
use tracing::{instrument, warn};

use crate::error::{PipelineError, Result};

/// Business-card intent markers (spec §4.10): an agent reply containing
/// one of these prefixes is, in addition to the plain text, followed by
/// a transport-native contact card.
const MY_CONTACT_MARKER: &str = "[Мой контакт]";
pub const MANAGER_CONTACT_MARKER: &str = "[Менеджер по строительству]";

#[derive(Debug, Clone)]
pub struct ContactCard {
    pub phone: String,
    pub first_name: String,
    pub last_name: Option<String>,
}

/// C10: dispatches an outbound helpdesk message to its transport,
/// resolving the conversation's transport and recipient phone, splitting
/// text/file segments, and appending contact cards for marked replies.
pub struct OutboundDispatcher {
    helpdesk: Arc<HelpdeskClient>,
    transports: HashMap<i64, Arc<dyn TransportClient>>,
    my_contact: ContactCard,
}

impl OutboundDispatcher {
    pub fn new(
        helpdesk: Arc<HelpdeskClient>,
        transports: HashMap<i64, Arc<dyn TransportClient>>,
        my_contact: ContactCard,
    ) -> Self {
        Self {
            helpdesk,
            transports,
            my_contact,
        }
    }

    #[instrument(skip(self, body), fields(conversation_id))]
    pub async fn dispatch(&self, conversation_id: i64, body: &str) -> Result<()> {
        let inbox_id = self.helpdesk.get_inbox_id_by_conversation(conversation_id).await?;
        let transport = self
            .transports
            .get(&inbox_id)
            .ok_or(PipelineError::NoTransport(inbox_id))?;
        let phone = self
            .helpdesk
            .get_contact_phone(conversation_id)
            .await?
            .ok_or(PipelineError::NoInbox(conversation_id))?;

        if let Some(payload) = body.strip_prefix(MANAGER_CONTACT_MARKER) {
            return self.dispatch_manager_contact(transport.as_ref(), conversation_id, &phone, payload).await;
        }

        let (text, card) = match body.strip_prefix(MY_CONTACT_MARKER) {
            Some(rest) => (rest.trim_start().to_string(), Some(self.my_contact.clone())),
            None => (body.to_string(), None),
        };

        for segment in split_message_by_links(&text) {
            if is_file_link(&segment) {
                transport.send_file_by_url(&phone, &segment, None, None).await?;
            } else {
                transport.send_text(&phone, &segment).await?;
            }
        }

        if let Some(card) = card {
            if let Err(e) = transport
                .send_contact(&phone, &card.phone, &card.first_name, card.last_name.as_deref())
                .await
            {
                warn!(error = %e, conversation_id, "failed to send contact card");
            }
        }
        Ok(())
    }

    /// `[Менеджер по строительству]` replies carry the manager's card as a
    /// `Имя:`/`Фамилия:`/`Телефон:` payload rather than plain chat text
    /// (spec §4.10), grounded on
    /// `original_source/chatwoot_api/functions/send_manager_contact.py`: a
    /// text note precedes the contact card, and the raw payload never
    /// reaches the client as a message.
    async fn dispatch_manager_contact(
        &self,
        transport: &dyn TransportClient,
        conversation_id: i64,
        phone: &str,
        payload: &str,
    ) -> Result<()> {
        let (first_name, last_name, contact_phone) = parse_contact_message(payload);
        let note = format!("Ваш менеджер по строительству {last_name} {first_name}.\nТелефон: {contact_phone}");

        transport.send_text(phone, &note).await?;
        if let Err(e) = transport.send_contact(phone, &contact_phone, &first_name, Some(&last_name)).await {
            warn!(error = %e, conversation_id, "failed to send manager contact card");
        }
        Ok(())
    }
}

/// Parses the manager-card payload's `Имя:`/`Фамилия:`/`Телефон:` lines,
/// grounded on `original_source/utils/parse_contact_payload.py`. Unrecognized
/// lines (including a leftover marker line) are ignored.
fn parse_contact_message(message: &str) -> (String, String, String) {
    let mut first_name = String::new();
    let mut last_name = String::new();
    let mut phone = String::new();

    for line in message.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Имя:") {
            first_name = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("Фамилия:") {
            last_name = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("Телефон:") {
            phone = rest.trim().to_string();
        }
    }

    (first_name, last_name, phone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_contact_payload_lines() {
        let (first, last, phone) = parse_contact_message(
            "Имя: Иван\nФамилия: Петров\nТелефон: +79990000000",
        );
        assert_eq!(first, "Иван");
        assert_eq!(last, "Петров");
        assert_eq!(phone, "+79990000000");
    }

    #[test]
    fn parse_ignores_unrelated_lines() {
        let (first, last, phone) = parse_contact_message(
            "\nИмя: Иван\nкомментарий оператора\nТелефон: +79990000000",
        );
        assert_eq!(first, "Иван");
        assert_eq!(last, "");
        assert_eq!(phone, "+79990000000");
    }
}
