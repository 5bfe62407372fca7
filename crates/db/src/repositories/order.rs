use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use libdesk_core::domain::book::Isbn;
use libdesk_core::domain::customer::CustomerId;
use libdesk_core::domain::order::{
    NewOrder, OrderDetail, OrderId, OrderItemDetail, OrderStatus, OrderSummary,
};
use libdesk_core::errors::DomainError;

use super::{parse_price, parse_rfc3339, OrderRepository, RepositoryError};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderSummaryRecord {
    pub id: i64,
    pub customer_id: i64,
    pub status: String,
    pub created_at: String,
    pub customer_name: String,
    pub customer_email: String,
}

impl TryFrom<OrderSummaryRecord> for OrderSummary {
    type Error = RepositoryError;

    fn try_from(value: OrderSummaryRecord) -> Result<Self, Self::Error> {
        let status = OrderStatus::parse(&value.status).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid order status: {}", value.status))
        })?;

        Ok(Self {
            id: OrderId(value.id),
            customer_id: CustomerId(value.customer_id),
            status,
            created_at: parse_rfc3339("order created_at", &value.created_at)?,
            customer_name: value.customer_name,
            customer_email: value.customer_email,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderItemRecord {
    pub isbn: String,
    pub title: String,
    pub qty: i64,
    pub price_at_order: String,
}

impl TryFrom<OrderItemRecord> for OrderItemDetail {
    type Error = RepositoryError;

    fn try_from(value: OrderItemRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            price_at_order: parse_price("price_at_order", &value.price_at_order)?,
            isbn: Isbn(value.isbn),
            title: value.title,
            qty: value.qty,
        })
    }
}

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        order.validate()?;
        let requested = order.quantities_by_isbn()?;

        let mut tx = self.pool.begin().await?;

        // Writing first makes SQLite take the write lock before any stock is
        // read, so no other order can interleave between check and decrement.
        let inserted = sqlx::query(
            "INSERT INTO orders (customer_id, status, created_at)
             SELECT id, ?, ? FROM customers WHERE id = ?",
        )
        .bind(OrderStatus::Completed.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(order.customer_id.0)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(DomainError::CustomerNotFound(order.customer_id).into());
        }
        let order_id = OrderId(inserted.last_insert_rowid());

        let mut consumed: BTreeMap<&Isbn, i64> = BTreeMap::new();
        for line in &order.items {
            let price: Option<String> = sqlx::query_scalar(
                "UPDATE books SET stock = stock - ? WHERE isbn = ? AND stock >= ? RETURNING price",
            )
            .bind(line.qty)
            .bind(line.isbn.as_str())
            .bind(line.qty)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(price) = price else {
                let current: Option<i64> =
                    sqlx::query_scalar("SELECT stock FROM books WHERE isbn = ?")
                        .bind(line.isbn.as_str())
                        .fetch_optional(&mut *tx)
                        .await?;

                return Err(match current {
                    None => DomainError::BookNotFound(line.isbn.clone()),
                    Some(current) => DomainError::InsufficientStock {
                        isbn: line.isbn.clone(),
                        available: current + consumed.get(&line.isbn).copied().unwrap_or(0),
                        requested: requested.get(&line.isbn).copied().unwrap_or(line.qty),
                    },
                }
                .into());
            };

            sqlx::query(
                "INSERT INTO order_items (order_id, isbn, qty, price_at_order) VALUES (?, ?, ?, ?)",
            )
            .bind(order_id.0)
            .bind(line.isbn.as_str())
            .bind(line.qty)
            .bind(&price)
            .execute(&mut *tx)
            .await?;

            *consumed.entry(&line.isbn).or_insert(0) += line.qty;
        }

        tx.commit().await?;
        Ok(order_id)
    }

    async fn order_status(&self, id: OrderId) -> Result<OrderDetail, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT o.id, o.customer_id, o.status, o.created_at,
                    c.name AS customer_name, c.email AS customer_email
             FROM orders o
             JOIN customers c ON c.id = o.customer_id
             WHERE o.id = ?",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(DomainError::OrderNotFound(id).into());
        };
        let order = OrderSummary::try_from(order_summary_record_from_row(&row)?)?;

        let items = sqlx::query(
            "SELECT oi.isbn, b.title, oi.qty, oi.price_at_order
             FROM order_items oi
             JOIN books b ON b.isbn = oi.isbn
             WHERE oi.order_id = ?
             ORDER BY oi.id",
        )
        .bind(id.0)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|row| OrderItemDetail::try_from(order_item_record_from_row(row)?))
        .collect::<Result<Vec<_>, _>>()?;

        tx.commit().await?;
        Ok(OrderDetail { order, items })
    }
}

fn order_summary_record_from_row(row: &SqliteRow) -> Result<OrderSummaryRecord, RepositoryError> {
    Ok(OrderSummaryRecord {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        customer_name: row.try_get("customer_name")?,
        customer_email: row.try_get("customer_email")?,
    })
}

fn order_item_record_from_row(row: &SqliteRow) -> Result<OrderItemRecord, RepositoryError> {
    Ok(OrderItemRecord {
        isbn: row.try_get("isbn")?,
        title: row.try_get("title")?,
        qty: row.try_get("qty")?,
        price_at_order: row.try_get("price_at_order")?,
    })
}
