use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use std::collections::HashMap;
use tracing::info;

use crate::{
    content::ContentStore,
    error::{FlowError, Result},
    payload::Payload,
    repository::{
        Customer, Direction, FileDescriptor, Order, OrderFile, OrderMessage, OrderRepository,
        OrderStats, OrderStatus,
    },
    step::{BRANCH_KEY, Branch},
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL,
        username TEXT,
        full_name TEXT,
        branch TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'draft',
        payload_json TEXT NOT NULL DEFAULT '{}',
        summary TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_files (
        id BIGSERIAL PRIMARY KEY,
        order_id BIGINT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
        telegram_file_id TEXT NOT NULL,
        file_unique_id TEXT,
        file_name TEXT,
        file_type TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_messages (
        id BIGSERIAL PRIMARY KEY,
        order_id BIGINT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
        direction TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bot_config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL DEFAULT '',
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)",
    "CREATE INDEX IF NOT EXISTS idx_order_messages_order ON order_messages(order_id, id)",
];

/// Open a pool and create the tables if they do not exist yet.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }
    info!("Connected to PostgreSQL, schema ready");
    Ok(pool)
}

#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let payload_json: String = row.try_get("payload_json")?;
    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        full_name: row.try_get("full_name")?,
        branch: row.try_get("branch")?,
        status: status.parse().map_err(|_| {
            FlowError::StorageError(format!("unknown status in database: {}", status))
        })?,
        payload: serde_json::from_str(&payload_json)?,
        summary: row.try_get("summary")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn file_from_row(row: &PgRow) -> Result<OrderFile> {
    Ok(OrderFile {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        file_id: row.try_get("telegram_file_id")?,
        unique_id: row.try_get("file_unique_id")?,
        file_name: row.try_get("file_name")?,
        file_type: row.try_get("file_type")?,
        created_at: row.try_get("created_at")?,
    })
}

fn message_from_row(row: &PgRow) -> Result<OrderMessage> {
    let direction: String = row.try_get("direction")?;
    Ok(OrderMessage {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        direction: direction.parse()?,
        text: row.try_get("text")?,
        created_at: row.try_get("created_at")?,
    })
}

const ORDER_COLUMNS: &str = "id, user_id, username, full_name, branch, status, payload_json, \
                             summary, created_at, updated_at";

fn expect_updated(order_id: i64, rows: u64) -> Result<()> {
    if rows == 0 {
        return Err(FlowError::OrderNotFound(order_id));
    }
    Ok(())
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create_order(&self, customer: &Customer, branch: Branch) -> Result<i64> {
        let mut payload = Payload::new();
        payload.set(BRANCH_KEY, branch.as_str());
        let row = sqlx::query(
            "INSERT INTO orders (user_id, username, full_name, branch, status, payload_json) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(customer.user_id)
        .bind(customer.username.as_deref())
        .bind(&customer.full_name)
        .bind(branch.as_str())
        .bind(OrderStatus::Draft.as_str())
        .bind(serde_json::to_string(&payload)?)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update_payload(&self, order_id: i64, payload: &Payload, summary: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET payload_json = $1, summary = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(serde_json::to_string(payload)?)
        .bind(summary)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        expect_updated(order_id, result.rows_affected())
    }

    async fn finalize(&self, order_id: i64, summary: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET summary = $1, updated_at = NOW(), \
             status = CASE WHEN status IS NULL OR status IN ('', 'draft') THEN 'new' ELSE status END \
             WHERE id = $2",
        )
        .bind(summary)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        expect_updated(order_id, result.rows_affected())
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM orders WHERE status = $1 ORDER BY id DESC LIMIT $2 OFFSET $3",
                    ORDER_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(status.as_str())
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM orders ORDER BY id DESC LIMIT $1 OFFSET $2",
                    ORDER_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(order_from_row).collect()
    }

    async fn update_status(&self, order_id: i64, status: OrderStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
                .bind(status.as_str())
                .bind(order_id)
                .execute(&self.pool)
                .await?;
        expect_updated(order_id, result.rows_affected())
    }

    async fn stats(&self) -> Result<OrderStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_orders, \
             COUNT(*) FILTER (WHERE status IN ('new', 'submitted')) AS new_orders, \
             COUNT(*) FILTER (WHERE status IN ('new', 'submitted', 'in_work', 'draft')) AS active_orders \
             FROM orders",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(OrderStats {
            total_orders: row.try_get("total_orders")?,
            new_orders: row.try_get("new_orders")?,
            active_orders: row.try_get("active_orders")?,
        })
    }

    async fn add_file(&self, order_id: i64, file: &FileDescriptor) -> Result<()> {
        sqlx::query(
            "INSERT INTO order_files (order_id, telegram_file_id, file_unique_id, file_name, file_type) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order_id)
        .bind(&file.file_id)
        .bind(file.unique_id.as_deref())
        .bind(file.name.as_deref())
        .bind(file.kind.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_files(&self, order_id: i64) -> Result<Vec<OrderFile>> {
        let rows = sqlx::query(
            "SELECT id, order_id, telegram_file_id, file_unique_id, file_name, file_type, created_at \
             FROM order_files WHERE order_id = $1 ORDER BY id DESC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(file_from_row).collect()
    }

    async fn add_message(&self, order_id: i64, direction: Direction, text: &str) -> Result<()> {
        sqlx::query("INSERT INTO order_messages (order_id, direction, text) VALUES ($1, $2, $3)")
            .bind(order_id)
            .bind(direction.as_str())
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_messages(&self, order_id: i64, limit: usize) -> Result<Vec<OrderMessage>> {
        let rows = sqlx::query(
            "SELECT id, order_id, direction, text, created_at FROM order_messages \
             WHERE order_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(order_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }
}

/// Content values in the `bot_config` table.
#[derive(Clone)]
pub struct PostgresContentStore {
    pool: PgPool,
}

impl PostgresContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for PostgresContentStore {
    async fn load(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM bot_config")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<(String, String)> {
                Ok((row.try_get("key")?, row.try_get("value")?))
            })
            .collect()
    }

    async fn save_many(&self, items: Vec<(String, String)>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in items {
            sqlx::query(
                "INSERT INTO bot_config (key, value, updated_at) VALUES ($1, $2, NOW()) \
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
