use std::{collections::HashSet, sync::Arc};
use tracing::{debug, error, info};

use crate::{
    repository::{FileDescriptor, FileKind, Order},
    transport::{ChatId, ChatTransport},
};

/// Who to contact about an order, as shown to staff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactInfo {
    pub user_id: i64,
    pub username: Option<String>,
    pub full_name: Option<String>,
}

impl From<&Order> for ContactInfo {
    fn from(order: &Order) -> Self {
        Self {
            user_id: order.user_id,
            username: order.username.clone(),
            full_name: order.full_name.clone(),
        }
    }
}

impl ContactInfo {
    fn block(&self) -> String {
        let name = self
            .full_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("Без имени");
        let username = match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(u) => format!("@{}", u),
            None => "нет username".to_string(),
        };
        format!(
            "👤 Клиент: {name}\n🔖 Username: {username}\n🆔 Telegram ID: {id}\n🔗 tg://user?id={id}\n\n",
            id = self.user_id
        )
    }
}

#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub order_id: i64,
    pub summary: String,
    pub contact: Option<ContactInfo>,
    pub files: Vec<FileDescriptor>,
}

impl NotificationRequest {
    pub fn staff_text(&self) -> String {
        let contact = self.contact.as_ref().map(ContactInfo::block).unwrap_or_default();
        format!("🆕 Заявка №{}\n\n{}{}", self.order_id, contact, self.summary)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Forwards submitted orders to the staff chat.
#[derive(Clone)]
pub struct NotificationRelay {
    transport: Arc<dyn ChatTransport>,
}

impl NotificationRelay {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// Sends the staff message and then every distinct file. Each item is
    /// attempted independently; failures are logged and counted.
    pub async fn dispatch(&self, chat: Option<&ChatId>, request: &NotificationRequest) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(chat) = chat else {
            debug!(order_id = request.order_id, "no orders chat configured, skipping notification");
            return report;
        };

        match self.transport.send_text(chat, &request.staff_text(), &[]).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                error!(order_id = request.order_id, chat = %chat, error = %e, "failed to send order summary");
                report.failed += 1;
            }
        }

        let mut seen = HashSet::new();
        for file in request.files.iter().filter(|f| seen.insert(f.file_id.as_str())) {
            let result = match file.kind {
                FileKind::Photo => {
                    let caption = format!("📎 Фото к заявке №{}", request.order_id);
                    self.transport.send_photo(chat, &file.file_id, &caption, &[]).await
                }
                FileKind::Document => {
                    let caption = format!("📎 Файл к заявке №{}", request.order_id);
                    self.transport.send_document(chat, &file.file_id, &caption).await
                }
            };
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    error!(
                        order_id = request.order_id,
                        file_id = %file.file_id,
                        error = %e,
                        "failed to forward order file"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            order_id = request.order_id,
            delivered = report.delivered,
            failed = report.failed,
            "order notification dispatched"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::{RecordingTransport, Sent};

    fn request(files: Vec<FileDescriptor>) -> NotificationRequest {
        NotificationRequest {
            order_id: 12,
            summary: "Тип заявки: 3D-сканирование\n• Тип сканирования: Предмет".to_string(),
            contact: Some(ContactInfo {
                user_id: 99,
                username: Some("ivan".to_string()),
                full_name: Some("Иван Петров".to_string()),
            }),
            files,
        }
    }

    #[test]
    fn staff_text_includes_contact_block() {
        assert_eq!(
            request(vec![]).staff_text(),
            "🆕 Заявка №12\n\n👤 Клиент: Иван Петров\n🔖 Username: @ivan\n🆔 Telegram ID: 99\n🔗 tg://user?id=99\n\nТип заявки: 3D-сканирование\n• Тип сканирования: Предмет"
        );
    }

    #[test]
    fn missing_contact_details_use_placeholders() {
        let mut req = request(vec![]);
        req.contact = Some(ContactInfo {
            user_id: 5,
            username: None,
            full_name: None,
        });
        let text = req.staff_text();
        assert!(text.contains("👤 Клиент: Без имени\n"));
        assert!(text.contains("🔖 Username: нет username\n"));

        req.contact = None;
        assert!(req.staff_text().starts_with("🆕 Заявка №12\n\nТип заявки"));
    }

    #[tokio::test]
    async fn files_are_deduplicated_and_captioned_by_kind() {
        let transport = Arc::new(RecordingTransport::default());
        let relay = NotificationRelay::new(transport.clone());
        let chat = ChatId::Id(-100);
        let report = relay
            .dispatch(
                Some(&chat),
                &request(vec![
                    FileDescriptor::photo("p1"),
                    FileDescriptor::document("d1", Some("part.stl".to_string())),
                    FileDescriptor::photo("p1"),
                ]),
            )
            .await;

        assert_eq!(report, DispatchReport { delivered: 3, failed: 0 });
        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(
            sent[1],
            Sent::Photo {
                chat: chat.clone(),
                photo: "p1".to_string(),
                caption: "📎 Фото к заявке №12".to_string()
            }
        );
        assert_eq!(
            sent[2],
            Sent::Document {
                chat,
                document: "d1".to_string(),
                caption: "📎 Файл к заявке №12".to_string()
            }
        );
    }

    #[tokio::test]
    async fn failures_do_not_stop_remaining_items() {
        let transport = Arc::new(RecordingTransport {
            fail_text: true,
            ..Default::default()
        });
        let relay = NotificationRelay::new(transport.clone());
        let report = relay
            .dispatch(Some(&ChatId::Id(1)), &request(vec![FileDescriptor::photo("p1")]))
            .await;
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
    }

    #[tokio::test]
    async fn no_chat_means_no_delivery() {
        let transport = Arc::new(RecordingTransport::default());
        let relay = NotificationRelay::new(transport.clone());
        let report = relay.dispatch(None, &request(vec![])).await;
        assert_eq!(report, DispatchReport::default());
        assert!(transport.sent().is_empty());
    }
}
