use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, warn};

use crate::{
    error::Result,
    prompt::{Button, Prompt},
};

/// Destination chat: a numeric id or a public `@channel` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Username(String),
}

impl ChatId {
    /// Normalizes a configured chat id; `None` when nothing is configured.
    pub fn parse(raw: &str) -> Option<ChatId> {
        let cleaned: String = raw.trim().chars().filter(|c| *c != ' ').collect();
        if cleaned.is_empty() {
            return None;
        }
        let digits = cleaned.strip_prefix('-').unwrap_or(&cleaned);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(id) = cleaned.parse::<i64>() {
                return Some(ChatId::Id(id));
            }
        }
        Some(ChatId::Username(cleaned))
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Id(id) => write!(f, "{}", id),
            ChatId::Username(name) => f.write_str(name),
        }
    }
}

/// Outbound side of the chat platform.
///
/// `photo` and `document` are references understood by the platform: a URL,
/// a previously uploaded file id, or a local path the implementation uploads.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat: &ChatId, text: &str, keyboard: &[Vec<Button>]) -> Result<()>;
    async fn send_photo(
        &self,
        chat: &ChatId,
        photo: &str,
        caption: &str,
        keyboard: &[Vec<Button>],
    ) -> Result<()>;
    async fn send_document(&self, chat: &ChatId, document: &str, caption: &str) -> Result<()>;
    /// Download URL for an uploaded file, if the platform still has it.
    async fn file_url(&self, file_id: &str) -> Result<Option<String>>;
}

/// Sends a prompt, with its picture when it has one. A picture that cannot
/// be sent degrades to a plain text message.
pub async fn deliver_prompt(
    transport: &dyn ChatTransport,
    chat: &ChatId,
    prompt: &Prompt,
) -> Result<()> {
    if let Some(photo) = prompt.photo.as_deref() {
        match transport
            .send_photo(chat, photo, &prompt.text, &prompt.keyboard)
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) => warn!(chat = %chat, photo = %photo, error = %e, "photo send failed, sending text"),
        }
    }
    transport.send_text(chat, &prompt.text, &prompt.keyboard).await
}

/// Delivers prompts in order; a failed prompt does not stop the rest.
pub async fn deliver_all(transport: &dyn ChatTransport, chat: &ChatId, prompts: &[Prompt]) {
    for prompt in prompts {
        if let Err(e) = deliver_prompt(transport, chat, prompt).await {
            error!(chat = %chat, error = %e, "failed to deliver prompt");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{RecordingTransport, Sent};
    use super::*;

    #[test]
    fn chat_ids_are_normalized() {
        assert_eq!(ChatId::parse(" -100 123 "), Some(ChatId::Id(-100123)));
        assert_eq!(ChatId::parse("555"), Some(ChatId::Id(555)));
        assert_eq!(
            ChatId::parse("@chel3d_orders"),
            Some(ChatId::Username("@chel3d_orders".to_string()))
        );
        assert_eq!(ChatId::parse("-"), Some(ChatId::Username("-".to_string())));
        assert_eq!(ChatId::parse("   "), None);
    }

    #[tokio::test]
    async fn photo_failure_falls_back_to_text() {
        let transport = RecordingTransport {
            fail_photos: true,
            ..Default::default()
        };
        let prompt = Prompt::new("hello").with_photo(Some("missing.png".to_string()));
        deliver_prompt(&transport, &ChatId::Id(1), &prompt)
            .await
            .unwrap();
        assert_eq!(
            transport.sent(),
            vec![Sent::Text {
                chat: ChatId::Id(1),
                text: "hello".to_string()
            }]
        );
    }
}
