use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use libdesk_core::conversation::{Message, SessionId, ToolCallRecord};
use libdesk_core::domain::book::{Book, Isbn, SearchField};
use libdesk_core::domain::order::{NewOrder, OrderDetail, OrderId};
use libdesk_core::errors::DomainError;

use crate::DbPool;

pub mod book;
pub mod conversation;
pub mod memory;
pub mod order;

pub use book::SqlBookRepository;
pub use conversation::SqlConversationRepository;
pub use memory::{InMemoryConversationRepository, InMemoryLibrary};
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    /// The business rule that rejected the operation, if that is what failed.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(error) => Some(error),
            Self::Database(_) | Self::Decode(_) => None,
        }
    }
}

#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn list_books(&self) -> Result<Vec<Book>, RepositoryError>;

    /// Substring match on the chosen column, case-insensitive for ASCII.
    async fn search(&self, query: &str, by: SearchField) -> Result<Vec<Book>, RepositoryError>;

    async fn find(&self, isbn: &Isbn) -> Result<Option<Book>, RepositoryError>;

    /// Adds `qty` copies and returns the new stock level.
    async fn restock(&self, isbn: &Isbn, qty: i64) -> Result<i64, RepositoryError>;

    /// Overwrites the list price. Prices captured on past orders are untouched.
    async fn update_price(&self, isbn: &Isbn, price: Decimal) -> Result<Decimal, RepositoryError>;

    /// Books with `stock <= threshold`, lowest stock first.
    async fn low_stock(&self, threshold: i64) -> Result<Vec<Book>, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Creates a completed order atomically. Either every line is committed
    /// with its stock decremented or nothing changes.
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, RepositoryError>;

    async fn order_status(&self, id: OrderId) -> Result<OrderDetail, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn record_message(&self, message: &Message) -> Result<(), RepositoryError>;
    async fn record_tool_call(&self, call: &ToolCallRecord) -> Result<(), RepositoryError>;

    /// The latest `limit` messages of a session, oldest first.
    async fn recent_messages(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn tool_calls(&self, session_id: &SessionId)
        -> Result<Vec<ToolCallRecord>, RepositoryError>;
}

/// Handles to every repository the application layer works with.
#[derive(Clone)]
pub struct Repositories {
    pub books: Arc<dyn BookRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            books: Arc::new(SqlBookRepository::new(pool.clone())),
            orders: Arc::new(SqlOrderRepository::new(pool.clone())),
            conversations: Arc::new(SqlConversationRepository::new(pool)),
        }
    }

    pub fn in_memory(library: InMemoryLibrary) -> Self {
        let library = Arc::new(library);
        Self {
            books: library.clone(),
            orders: library,
            conversations: Arc::new(InMemoryConversationRepository::default()),
        }
    }
}

pub(crate) fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        RepositoryError::Decode(format!("invalid {} timestamp '{}': {}", field, value, err))
    })
}

pub(crate) fn parse_price(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|err| {
        RepositoryError::Decode(format!("invalid {} value '{}': {}", field, value, err))
    })
}
