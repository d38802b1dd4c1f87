//! Telegram Bot API: outbound transport and webhook update decoding.

use async_trait::async_trait;
use order_flow::{
    Action, ChatId, ChatTransport, Customer, Event, FileDescriptor, FlowError,
    prompt::Button,
};
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use tracing::{debug, warn};

type FlowResult<T> = order_flow::Result<T>;

#[derive(Clone)]
pub struct TelegramTransport {
    client: Client,
    api_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

fn delivery_error(err: reqwest::Error) -> FlowError {
    FlowError::DeliveryError(err.to_string())
}

/// `reply_markup` for an inline keyboard, or `None` when there are no buttons.
pub fn inline_keyboard(keyboard: &[Vec<Button>]) -> Option<Value> {
    if keyboard.is_empty() {
        return None;
    }
    let rows: Vec<Vec<Value>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.label, "callback_data": b.data }))
                .collect()
        })
        .collect();
    Some(json!({ "inline_keyboard": rows }))
}

/// Local files are uploaded; anything else is passed through as a URL or file id.
fn local_file(reference: &str) -> Option<&Path> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return None;
    }
    let path = Path::new(reference);
    path.is_file().then_some(path)
}

impl TelegramTransport {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn check(&self, method: &str, response: reqwest::Response) -> FlowResult<Option<Value>> {
        let status = response.status();
        let body: ApiResponse = response.json().await.map_err(delivery_error)?;
        if !body.ok {
            let description = body.description.unwrap_or_else(|| status.to_string());
            return Err(FlowError::DeliveryError(format!("{}: {}", method, description)));
        }
        Ok(body.result)
    }

    async fn call(&self, method: &str, payload: Value) -> FlowResult<Option<Value>> {
        debug!(method, "calling Telegram Bot API");
        let response = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await
            .map_err(delivery_error)?;
        self.check(method, response).await
    }

    async fn upload(
        &self,
        method: &str,
        field: &str,
        chat: &ChatId,
        path: &Path,
        caption: &str,
        keyboard: &[Vec<Button>],
    ) -> FlowResult<()> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| FlowError::DeliveryError(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let mut form = Form::new()
            .text("chat_id", chat.to_string())
            .text("caption", caption.to_string())
            .part(field.to_string(), Part::bytes(bytes).file_name(file_name));
        if let Some(markup) = inline_keyboard(keyboard) {
            form = form.text("reply_markup", markup.to_string());
        }

        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(delivery_error)?;
        self.check(method, response).await.map(|_| ())
    }

    async fn send_media(
        &self,
        method: &str,
        field: &str,
        chat: &ChatId,
        reference: &str,
        caption: &str,
        keyboard: &[Vec<Button>],
    ) -> FlowResult<()> {
        if let Some(path) = local_file(reference) {
            return self.upload(method, field, chat, path, caption, keyboard).await;
        }
        let mut payload = json!({ "chat_id": chat, "caption": caption });
        payload[field] = json!(reference);
        if let Some(markup) = inline_keyboard(keyboard) {
            payload["reply_markup"] = markup;
        }
        self.call(method, payload).await.map(|_| ())
    }

    /// Stops the loading indicator on a pressed button.
    pub async fn answer_callback(&self, callback_id: &str) {
        if let Err(e) = self
            .call("answerCallbackQuery", json!({ "callback_query_id": callback_id }))
            .await
        {
            warn!(error = %e, "failed to answer callback query");
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat: &ChatId, text: &str, keyboard: &[Vec<Button>]) -> FlowResult<()> {
        let mut payload = json!({ "chat_id": chat, "text": text });
        if let Some(markup) = inline_keyboard(keyboard) {
            payload["reply_markup"] = markup;
        }
        self.call("sendMessage", payload).await.map(|_| ())
    }

    async fn send_photo(
        &self,
        chat: &ChatId,
        photo: &str,
        caption: &str,
        keyboard: &[Vec<Button>],
    ) -> FlowResult<()> {
        self.send_media("sendPhoto", "photo", chat, photo, caption, keyboard)
            .await
    }

    async fn send_document(&self, chat: &ChatId, document: &str, caption: &str) -> FlowResult<()> {
        self.send_media("sendDocument", "document", chat, document, caption, &[])
            .await
    }

    async fn file_url(&self, file_id: &str) -> FlowResult<Option<String>> {
        let result = self.call("getFile", json!({ "file_id": file_id })).await?;
        Ok(result
            .as_ref()
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .map(|path| format!("{}/file/bot{}/{}", self.api_url, self.token, path)))
    }
}

// Incoming updates, reduced to the fields the wizard reads.

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    fn customer(&self) -> Customer {
        let full_name = [Some(self.first_name.as_str()), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Customer::new(self.id, self.username.clone(), full_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub file_unique_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_unique_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub document: Option<Document>,
}

impl Message {
    fn event(&self) -> Option<Event> {
        if let Some(document) = &self.document {
            let mut file = FileDescriptor::document(&document.file_id, document.file_name.clone());
            file.unique_id = document.file_unique_id.clone();
            return Some(Event::FileReceived { file });
        }
        // Telegram lists sizes smallest first.
        if let Some(largest) = self.photo.as_ref().and_then(|sizes| sizes.last()) {
            let mut file = FileDescriptor::photo(&largest.file_id);
            file.unique_id = largest.file_unique_id.clone();
            return Some(Event::FileReceived { file });
        }
        let text = self.text.as_deref()?;
        if text.trim() == "/start" || text.trim().starts_with("/start ") {
            return Some(Event::Restart);
        }
        Some(Event::TextReceived {
            text: text.to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

/// An update decoded for the engine.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub customer: Customer,
    pub chat: ChatId,
    /// `None` for updates the wizard does not react to.
    pub event: Option<Event>,
    pub callback_id: Option<String>,
}

impl Update {
    pub fn into_inbound(self) -> Option<Inbound> {
        if let Some(callback) = self.callback_query {
            let chat = callback
                .message
                .as_ref()
                .map(|m| m.chat.id)
                .unwrap_or(callback.from.id);
            let event = match callback.data.as_deref().map(Action::decode) {
                Some(Ok(action)) => Some(Event::from(action)),
                Some(Err(e)) => {
                    debug!(update_id = self.update_id, error = %e, "ignoring callback data");
                    None
                }
                None => None,
            };
            return Some(Inbound {
                customer: callback.from.customer(),
                chat: ChatId::Id(chat),
                event,
                callback_id: Some(callback.id),
            });
        }

        let message = self.message?;
        let from = message.from.as_ref()?;
        Some(Inbound {
            customer: from.customer(),
            chat: ChatId::Id(message.chat.id),
            event: message.event(),
            callback_id: None,
        })
    }
}
