use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::book::Isbn;
use crate::domain::customer::CustomerId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// One requested line of a new order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub isbn: Isbn,
    pub qty: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub items: Vec<OrderLine>,
}

impl NewOrder {
    /// Shape checks that need no storage access.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::EmptyOrder);
        }
        for line in &self.items {
            if line.qty <= 0 {
                return Err(DomainError::InvalidQuantity { isbn: line.isbn.clone(), qty: line.qty });
            }
        }
        self.quantities_by_isbn().map(|_| ())
    }

    /// Total requested quantity per isbn, merging repeated lines.
    pub fn quantities_by_isbn(&self) -> Result<BTreeMap<Isbn, i64>, DomainError> {
        let mut totals = BTreeMap::new();
        for line in &self.items {
            let total = totals.entry(line.isbn.clone()).or_insert(0_i64);
            *total = total
                .checked_add(line.qty)
                .ok_or_else(|| DomainError::QuantityTooLarge(line.isbn.clone()))?;
        }
        Ok(totals)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: OrderId,
    pub isbn: Isbn,
    pub qty: i64,
    pub price_at_order: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Order header joined with the owning customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub customer_name: String,
    pub customer_email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemDetail {
    pub isbn: Isbn,
    pub title: String,
    pub qty: i64,
    pub price_at_order: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: OrderSummary,
    pub items: Vec<OrderItemDetail>,
}

impl OrderDetail {
    pub fn total(&self) -> Decimal {
        self.items.iter().map(|item| item.price_at_order * Decimal::from(item.qty)).sum()
    }
}
