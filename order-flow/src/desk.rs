//! Operator-facing views over orders: listing, status changes, attachments and the message
//! thread with the customer.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    error::{FlowError, Result},
    repository::{
        Direction, Order, OrderFile, OrderMessage, OrderRepository, OrderStats, OrderStatus,
    },
    transport::{ChatId, ChatTransport},
};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MESSAGE_HISTORY: usize = 30;

/// An order together with the label staff see for its status.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub status_label: &'static str,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            status_label: order.status.label(),
            order,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    #[serde(flatten)]
    pub file: OrderFile,
    pub file_url: Option<String>,
}

#[derive(Clone)]
pub struct OperatorDesk {
    orders: Arc<dyn OrderRepository>,
    transport: Arc<dyn ChatTransport>,
}

impl OperatorDesk {
    pub fn new(orders: Arc<dyn OrderRepository>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { orders, transport }
    }

    /// Newest first. `page` counts from 1; out-of-range paging values fall back to defaults.
    pub async fn list_orders(
        &self,
        status_filter: Option<&str>,
        page: i64,
        limit: i64,
    ) -> Result<Vec<OrderView>> {
        let status = match status_filter.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(raw.parse::<OrderStatus>()?),
            None => None,
        };
        let page = page.max(1);
        let limit = if limit < 1 { DEFAULT_PAGE_SIZE } else { limit };
        let orders = self
            .orders
            .list_orders(status, limit, (page - 1) * limit)
            .await?;
        Ok(orders.into_iter().map(OrderView::from).collect())
    }

    pub async fn get_order(&self, order_id: i64) -> Result<OrderView> {
        self.load(order_id).await.map(OrderView::from)
    }

    pub async fn stats(&self) -> Result<OrderStats> {
        self.orders.stats().await
    }

    /// The status is validated before the order is touched.
    pub async fn update_status(&self, order_id: i64, status: &str) -> Result<OrderView> {
        let status = status.trim().parse::<OrderStatus>()?;
        self.load(order_id).await?;
        self.orders.update_status(order_id, status).await?;
        info!(order_id, status = %status, "order status updated");
        self.get_order(order_id).await
    }

    /// Attachments with a download link when the chat platform can still resolve one.
    pub async fn order_files(&self, order_id: i64) -> Result<Vec<FileView>> {
        let files = self.orders.list_files(order_id).await?;
        let mut views = Vec::with_capacity(files.len());
        for file in files {
            let file_url = match self.transport.file_url(&file.file_id).await {
                Ok(url) => url,
                Err(e) => {
                    warn!(order_id, file_id = %file.file_id, error = %e, "cannot resolve file url");
                    None
                }
            };
            views.push(FileView { file, file_url });
        }
        Ok(views)
    }

    /// The latest messages of the thread, oldest first.
    pub async fn order_messages(&self, order_id: i64) -> Result<Vec<OrderMessage>> {
        self.orders.list_messages(order_id, MESSAGE_HISTORY).await
    }

    /// Send `text` to the customer and log it on the order.
    pub async fn send_message(&self, order_id: i64, text: &str) -> Result<()> {
        let order = self.load(order_id).await?;
        if order.status == OrderStatus::Canceled {
            return Err(FlowError::Rejected(
                "Нельзя отправить сообщение для отменённой заявки".to_string(),
            ));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(FlowError::Rejected("Текст сообщения пустой".to_string()));
        }

        if let Err(e) = self
            .transport
            .send_text(&ChatId::Id(order.user_id), text, &[])
            .await
        {
            error!(order_id, user_id = order.user_id, error = %e, "operator message not delivered");
            return Err(FlowError::Rejected(
                "Не удалось отправить сообщение в Telegram".to_string(),
            ));
        }

        if let Err(e) = self.orders.add_message(order_id, Direction::Out, text).await {
            error!(order_id, error = %e, "failed to log outbound message");
        }
        Ok(())
    }

    async fn load(&self, order_id: i64) -> Result<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(FlowError::OrderNotFound(order_id))
    }
}
