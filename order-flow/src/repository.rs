use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::{
    error::{FlowError, Result},
    payload::Payload,
    step::{BRANCH_KEY, Branch},
};

/// Lifecycle of an order. Only `draft → new` is driven by the wizard; every
/// other change comes from staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    New,
    Submitted,
    InWork,
    Done,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Draft,
        OrderStatus::New,
        OrderStatus::Submitted,
        OrderStatus::InWork,
        OrderStatus::Done,
        OrderStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::New => "new",
            OrderStatus::Submitted => "submitted",
            OrderStatus::InWork => "in_work",
            OrderStatus::Done => "done",
            OrderStatus::Canceled => "canceled",
        }
    }

    /// Label shown in the admin panel.
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "Черновик",
            OrderStatus::New | OrderStatus::Submitted => "Новая заявка",
            OrderStatus::InWork => "В работе",
            OrderStatus::Done => "Готово",
            OrderStatus::Canceled => "Отменено",
        }
    }

    /// Status after submission: drafts (and rows with no usable status)
    /// become `new`, anything staff already set is kept.
    pub fn after_finalize(current: Option<&str>) -> OrderStatus {
        match current.map(str::parse::<OrderStatus>) {
            Some(Ok(OrderStatus::Draft)) | Some(Err(_)) | None => OrderStatus::New,
            Some(Ok(status)) => status,
        }
    }
}

impl FromStr for OrderStatus {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| FlowError::InvalidStatus(s.to_string()))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Photo,
    Document,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Photo => "photo",
            FileKind::Document => "document",
        }
    }
}

/// Attachment received from the user, identified by the chat platform's ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub file_id: String,
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: FileKind,
}

impl FileDescriptor {
    pub fn document(file_id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            file_id: file_id.into(),
            unique_id: None,
            name,
            kind: FileKind::Document,
        }
    }

    /// Photos carry no name on the wire, so one is derived from the id.
    pub fn photo(file_id: impl Into<String>) -> Self {
        let file_id = file_id.into();
        Self {
            name: Some(format!("photo_{}.jpg", file_id)),
            file_id,
            unique_id: None,
            kind: FileKind::Photo,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("файл")
    }
}

/// Who placed the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub user_id: i64,
    pub username: Option<String>,
    pub full_name: String,
}

impl Customer {
    pub fn new(user_id: i64, username: Option<String>, full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        Self {
            user_id,
            username: username.filter(|u| !u.is_empty()),
            full_name: if full_name.trim().is_empty() {
                "Без имени".to_string()
            } else {
                full_name.trim().to_string()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub branch: String,
    pub status: OrderStatus,
    pub payload: Payload,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFile {
    pub id: i64,
    pub order_id: i64,
    pub file_id: String,
    pub unique_id: Option<String>,
    pub file_name: Option<String>,
    pub file_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

impl FromStr for Direction {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            other => Err(FlowError::StorageError(format!("unknown direction: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderMessage {
    pub id: i64,
    pub order_id: i64,
    pub direction: Direction,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total_orders: i64,
    pub new_orders: i64,
    pub active_orders: i64,
}

/// Durable orders, their attachments and message log.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Creates a `draft` order whose payload holds only the branch.
    async fn create_order(&self, customer: &Customer, branch: Branch) -> Result<i64>;
    async fn update_payload(&self, order_id: i64, payload: &Payload, summary: &str) -> Result<()>;
    /// Stores the final summary and moves a draft to `new`.
    async fn finalize(&self, order_id: i64, summary: &str) -> Result<()>;
    async fn get_order(&self, order_id: i64) -> Result<Option<Order>>;
    /// Newest first.
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>>;
    async fn update_status(&self, order_id: i64, status: OrderStatus) -> Result<()>;
    async fn stats(&self) -> Result<OrderStats>;
    async fn add_file(&self, order_id: i64, file: &FileDescriptor) -> Result<()>;
    /// Newest first.
    async fn list_files(&self, order_id: i64) -> Result<Vec<OrderFile>>;
    async fn add_message(&self, order_id: i64, direction: Direction, text: &str) -> Result<()>;
    /// The latest `limit` messages in chronological order.
    async fn list_messages(&self, order_id: i64, limit: usize) -> Result<Vec<OrderMessage>>;
}

/// In-memory implementation of OrderRepository
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<DashMap<i64, Order>>,
    files: Arc<DashMap<i64, Vec<OrderFile>>>,
    messages: Arc<DashMap<i64, Vec<OrderMessage>>>,
    next_id: AtomicI64,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn with_order<T>(&self, order_id: i64, f: impl FnOnce(&mut Order) -> T) -> Result<T> {
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or(FlowError::OrderNotFound(order_id))?;
        let out = f(&mut *order);
        order.updated_at = Utc::now();
        Ok(out)
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, customer: &Customer, branch: Branch) -> Result<i64> {
        let id = self.next_id();
        let now = Utc::now();
        let mut payload = Payload::new();
        payload.set(BRANCH_KEY, branch.as_str());
        self.orders.insert(
            id,
            Order {
                id,
                user_id: customer.user_id,
                username: customer.username.clone(),
                full_name: Some(customer.full_name.clone()),
                branch: branch.as_str().to_string(),
                status: OrderStatus::Draft,
                payload,
                summary: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_payload(&self, order_id: i64, payload: &Payload, summary: &str) -> Result<()> {
        self.with_order(order_id, |order| {
            order.payload = payload.clone();
            order.summary = Some(summary.to_string());
        })
    }

    async fn finalize(&self, order_id: i64, summary: &str) -> Result<()> {
        self.with_order(order_id, |order| {
            order.status = OrderStatus::after_finalize(Some(order.status.as_str()));
            order.summary = Some(summary.to_string());
        })
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        Ok(self.orders.get(&order_id).map(|entry| entry.clone()))
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| status.is_none_or(|s| entry.status == s))
            .map(|entry| entry.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_status(&self, order_id: i64, status: OrderStatus) -> Result<()> {
        self.with_order(order_id, |order| order.status = status)
    }

    async fn stats(&self) -> Result<OrderStats> {
        let mut stats = OrderStats::default();
        for order in self.orders.iter() {
            stats.total_orders += 1;
            if matches!(order.status, OrderStatus::New | OrderStatus::Submitted) {
                stats.new_orders += 1;
            }
            if matches!(
                order.status,
                OrderStatus::New | OrderStatus::Submitted | OrderStatus::InWork | OrderStatus::Draft
            ) {
                stats.active_orders += 1;
            }
        }
        Ok(stats)
    }

    async fn add_file(&self, order_id: i64, file: &FileDescriptor) -> Result<()> {
        let record = OrderFile {
            id: self.next_id(),
            order_id,
            file_id: file.file_id.clone(),
            unique_id: file.unique_id.clone(),
            file_name: file.name.clone(),
            file_type: file.kind.as_str().to_string(),
            created_at: Utc::now(),
        };
        self.files.entry(order_id).or_default().push(record);
        Ok(())
    }

    async fn list_files(&self, order_id: i64) -> Result<Vec<OrderFile>> {
        Ok(self
            .files
            .get(&order_id)
            .map(|files| files.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_message(&self, order_id: i64, direction: Direction, text: &str) -> Result<()> {
        let message = OrderMessage {
            id: self.next_id(),
            order_id,
            direction,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        self.messages.entry(order_id).or_default().push(message);
        Ok(())
    }

    async fn list_messages(&self, order_id: i64, limit: usize) -> Result<Vec<OrderMessage>> {
        Ok(self
            .messages
            .get(&order_id)
            .map(|messages| {
                let skip = messages.len().saturating_sub(limit);
                messages.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Reads go through to memory; every write after order creation fails.
    #[derive(Default)]
    pub struct FailingOrderRepository {
        pub inner: InMemoryOrderRepository,
        pub fail_create: bool,
    }

    fn down() -> FlowError {
        FlowError::StorageError("database unavailable".to_string())
    }

    #[async_trait]
    impl OrderRepository for FailingOrderRepository {
        async fn create_order(&self, customer: &Customer, branch: Branch) -> Result<i64> {
            if self.fail_create {
                return Err(down());
            }
            self.inner.create_order(customer, branch).await
        }

        async fn update_payload(&self, _: i64, _: &Payload, _: &str) -> Result<()> {
            Err(down())
        }

        async fn finalize(&self, _: i64, _: &str) -> Result<()> {
            Err(down())
        }

        async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
            self.inner.get_order(order_id).await
        }

        async fn list_orders(
            &self,
            status: Option<OrderStatus>,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<Order>> {
            self.inner.list_orders(status, limit, offset).await
        }

        async fn update_status(&self, _: i64, _: OrderStatus) -> Result<()> {
            Err(down())
        }

        async fn stats(&self) -> Result<OrderStats> {
            Err(down())
        }

        async fn add_file(&self, _: i64, _: &FileDescriptor) -> Result<()> {
            Err(down())
        }

        async fn list_files(&self, order_id: i64) -> Result<Vec<OrderFile>> {
            self.inner.list_files(order_id).await
        }

        async fn add_message(&self, _: i64, _: Direction, _: &str) -> Result<()> {
            Err(down())
        }

        async fn list_messages(&self, order_id: i64, limit: usize) -> Result<Vec<OrderMessage>> {
            self.inner.list_messages(order_id, limit).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> Customer {
        Customer::new(42, Some("maker".to_string()), "Ivan Petrov")
    }

    #[test]
    fn finalize_only_promotes_drafts() {
        assert_eq!(OrderStatus::after_finalize(Some("draft")), OrderStatus::New);
        assert_eq!(OrderStatus::after_finalize(Some("")), OrderStatus::New);
        assert_eq!(OrderStatus::after_finalize(None), OrderStatus::New);
        assert_eq!(OrderStatus::after_finalize(Some("in_work")), OrderStatus::InWork);
        assert_eq!(OrderStatus::after_finalize(Some("canceled")), OrderStatus::Canceled);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            "archived".parse::<OrderStatus>(),
            Err(FlowError::InvalidStatus(_))
        ));
        assert_eq!("in_work".parse::<OrderStatus>().unwrap(), OrderStatus::InWork);
    }

    #[test]
    fn customer_name_defaults() {
        let c = Customer::new(1, Some(String::new()), "  ");
        assert_eq!(c.full_name, "Без имени");
        assert_eq!(c.username, None);
    }

    #[tokio::test]
    async fn order_lifecycle() {
        let repo = InMemoryOrderRepository::new();
        let id = repo.create_order(&customer(), Branch::Scan).await.unwrap();

        let order = repo.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Draft);
        assert_eq!(order.payload.get("branch"), Some("scan"));

        repo.finalize(id, "summary").await.unwrap();
        let order = repo.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.summary.as_deref(), Some("summary"));

        repo.update_status(id, OrderStatus::InWork).await.unwrap();
        repo.finalize(id, "again").await.unwrap();
        let order = repo.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::InWork);

        assert!(matches!(
            repo.update_payload(999, &Payload::new(), "").await,
            Err(FlowError::OrderNotFound(999))
        ));
    }

    #[tokio::test]
    async fn messages_come_back_chronologically() {
        let repo = InMemoryOrderRepository::new();
        let id = repo.create_order(&customer(), Branch::Print).await.unwrap();
        for i in 0..5 {
            repo.add_message(id, Direction::In, &format!("m{}", i)).await.unwrap();
        }
        let texts: Vec<String> = repo
            .list_messages(id, 3)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn stats_and_filtering() {
        let repo = InMemoryOrderRepository::new();
        let a = repo.create_order(&customer(), Branch::Print).await.unwrap();
        let b = repo.create_order(&customer(), Branch::Idea).await.unwrap();
        let c = repo.create_order(&customer(), Branch::Scan).await.unwrap();
        repo.finalize(a, "").await.unwrap();
        repo.update_status(b, OrderStatus::Done).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(
            stats,
            OrderStats {
                total_orders: 3,
                new_orders: 1,
                active_orders: 2
            }
        );

        let drafts = repo.list_orders(Some(OrderStatus::Draft), 10, 0).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, c);

        let page = repo.list_orders(None, 2, 0).await.unwrap();
        assert_eq!(page.iter().map(|o| o.id).collect::<Vec<_>>(), vec![c, b]);
    }
}
