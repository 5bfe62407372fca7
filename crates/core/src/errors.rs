use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::book::Isbn;
use crate::domain::customer::CustomerId;
use crate::domain::order::OrderId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Customer {0} not found")]
    CustomerNotFound(CustomerId),
    #[error("Book {0} not found")]
    BookNotFound(Isbn),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Not enough stock for {isbn}, have {available}, need {requested}")]
    InsufficientStock { isbn: Isbn, available: i64, requested: i64 },
    #[error("Invalid quantity {qty} for {isbn}: quantity must be positive")]
    InvalidQuantity { isbn: Isbn, qty: i64 },
    #[error("Invalid price {price} for {isbn}: price must not be negative")]
    InvalidPrice { isbn: Isbn, price: Decimal },
    #[error("Quantity requested for {0} is too large")]
    QuantityTooLarge(Isbn),
    #[error("Restocking {isbn} by {qty} would overflow its stock of {stock}")]
    StockOverflow { isbn: Isbn, stock: i64, qty: i64 },
    #[error("An order needs at least one item")]
    EmptyOrder,
    #[error("Unsupported search field `{0}` (expected title|author)")]
    InvalidSearchField(String),
}

/// Infrastructure failures surfaced above the repositories, before a
/// correlation id exists. Domain rejections never take this path.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("library storage failed: {0}")]
    Storage(String),
    #[error("language model failed: {0}")]
    Assistant(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Storage,
    Assistant,
}

/// What a caller gets to see: a fixed message and the id to grep the logs for.
/// `detail` stays server-side.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind:?} [{correlation_id}]: {detail}")]
pub struct InterfaceError {
    pub kind: FailureKind,
    pub detail: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            FailureKind::Storage => {
                "The library catalog is unavailable right now. Try again shortly."
            }
            FailureKind::Assistant => {
                "The desk assistant could not answer right now. Try again shortly."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl ApplicationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Storage(_) => FailureKind::Storage,
            Self::Assistant(_) => FailureKind::Assistant,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError {
            kind: self.kind(),
            detail: self.to_string(),
            correlation_id: correlation_id.into(),
        }
    }
}
