use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use libdesk_core::conversation::{Message, SessionId, ToolCallRecord};
use libdesk_core::domain::book::{
    restocked, validate_price, validate_restock_quantity, Book, Isbn, SearchField,
};
use libdesk_core::domain::customer::{Customer, CustomerId};
use libdesk_core::domain::order::{
    NewOrder, Order, OrderDetail, OrderId, OrderItem, OrderItemDetail, OrderStatus, OrderSummary,
};
use libdesk_core::errors::DomainError;

use super::{BookRepository, ConversationRepository, OrderRepository, RepositoryError};

#[derive(Default)]
struct LibraryState {
    // Vec keeps insertion order, matching how SQLite scans the table.
    books: Vec<Book>,
    customers: BTreeMap<CustomerId, Customer>,
    orders: BTreeMap<OrderId, Order>,
    items: Vec<OrderItem>,
    next_order_id: i64,
}

impl LibraryState {
    fn book(&self, isbn: &Isbn) -> Option<&Book> {
        self.books.iter().find(|book| &book.isbn == isbn)
    }

    fn book_mut(&mut self, isbn: &Isbn) -> Option<&mut Book> {
        self.books.iter_mut().find(|book| &book.isbn == isbn)
    }
}

/// Books, customers and orders behind a single lock so an order sees and
/// changes stock atomically, the way the SQL transaction does.
#[derive(Default)]
pub struct InMemoryLibrary {
    state: RwLock<LibraryState>,
}

impl InMemoryLibrary {
    pub fn new(books: Vec<Book>, customers: Vec<Customer>) -> Self {
        let state = LibraryState {
            books,
            customers: customers.into_iter().map(|customer| (customer.id, customer)).collect(),
            ..LibraryState::default()
        };
        Self { state: RwLock::new(state) }
    }
}

#[async_trait]
impl BookRepository for InMemoryLibrary {
    async fn list_books(&self) -> Result<Vec<Book>, RepositoryError> {
        Ok(self.state.read().await.books.clone())
    }

    async fn search(&self, query: &str, by: SearchField) -> Result<Vec<Book>, RepositoryError> {
        let needle = query.to_ascii_lowercase();
        let state = self.state.read().await;
        Ok(state
            .books
            .iter()
            .filter(|book| {
                let haystack = match by {
                    SearchField::Title => &book.title,
                    SearchField::Author => &book.author,
                };
                haystack.to_ascii_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn find(&self, isbn: &Isbn) -> Result<Option<Book>, RepositoryError> {
        Ok(self.state.read().await.book(isbn).cloned())
    }

    async fn restock(&self, isbn: &Isbn, qty: i64) -> Result<i64, RepositoryError> {
        validate_restock_quantity(isbn, qty)?;
        let mut state = self.state.write().await;
        let book = state.book_mut(isbn).ok_or_else(|| DomainError::BookNotFound(isbn.clone()))?;
        book.stock = restocked(isbn, book.stock, qty)?;
        Ok(book.stock)
    }

    async fn update_price(&self, isbn: &Isbn, price: Decimal) -> Result<Decimal, RepositoryError> {
        validate_price(isbn, price)?;
        let mut state = self.state.write().await;
        let book = state.book_mut(isbn).ok_or_else(|| DomainError::BookNotFound(isbn.clone()))?;
        book.price = price;
        Ok(book.price)
    }

    async fn low_stock(&self, threshold: i64) -> Result<Vec<Book>, RepositoryError> {
        let state = self.state.read().await;
        let mut low: Vec<Book> =
            state.books.iter().filter(|book| book.stock <= threshold).cloned().collect();
        low.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.isbn.cmp(&b.isbn)));
        Ok(low)
    }
}

#[async_trait]
impl OrderRepository for InMemoryLibrary {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        order.validate()?;
        let mut state = self.state.write().await;

        if !state.customers.contains_key(&order.customer_id) {
            return Err(DomainError::CustomerNotFound(order.customer_id).into());
        }

        // Check every line before touching anything.
        let requested = order.quantities_by_isbn()?;
        for line in &order.items {
            let book =
                state.book(&line.isbn).ok_or_else(|| DomainError::BookNotFound(line.isbn.clone()))?;
            let wanted = requested.get(&line.isbn).copied().unwrap_or(line.qty);
            if book.stock < wanted {
                return Err(DomainError::InsufficientStock {
                    isbn: line.isbn.clone(),
                    available: book.stock,
                    requested: wanted,
                }
                .into());
            }
        }

        state.next_order_id += 1;
        let order_id = OrderId(state.next_order_id);
        let mut items = Vec::with_capacity(order.items.len());
        for line in &order.items {
            let book = state
                .book_mut(&line.isbn)
                .ok_or_else(|| DomainError::BookNotFound(line.isbn.clone()))?;
            book.stock -= line.qty;
            items.push(OrderItem {
                order_id,
                isbn: line.isbn.clone(),
                qty: line.qty,
                price_at_order: book.price,
            });
        }

        state.items.extend(items);
        state.orders.insert(
            order_id,
            Order {
                id: order_id,
                customer_id: order.customer_id,
                status: OrderStatus::Completed,
                created_at: Utc::now(),
            },
        );
        Ok(order_id)
    }

    async fn order_status(&self, id: OrderId) -> Result<OrderDetail, RepositoryError> {
        let state = self.state.read().await;
        let order = state.orders.get(&id).ok_or(DomainError::OrderNotFound(id))?;
        let customer = state
            .customers
            .get(&order.customer_id)
            .ok_or(DomainError::CustomerNotFound(order.customer_id))?;

        let items = state
            .items
            .iter()
            .filter(|item| item.order_id == id)
            .map(|item| OrderItemDetail {
                isbn: item.isbn.clone(),
                title: state.book(&item.isbn).map(|book| book.title.clone()).unwrap_or_default(),
                qty: item.qty,
                price_at_order: item.price_at_order,
            })
            .collect();

        Ok(OrderDetail {
            order: OrderSummary {
                id: order.id,
                customer_id: order.customer_id,
                status: order.status,
                created_at: order.created_at,
                customer_name: customer.name.clone(),
                customer_email: customer.email.clone(),
            },
            items,
        })
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    messages: RwLock<HashMap<SessionId, Vec<Message>>>,
    tool_calls: RwLock<HashMap<SessionId, Vec<ToolCallRecord>>>,
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn record_message(&self, message: &Message) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.entry(message.session_id.clone()).or_default().push(message.clone());
        Ok(())
    }

    async fn record_tool_call(&self, call: &ToolCallRecord) -> Result<(), RepositoryError> {
        let mut tool_calls = self.tool_calls.write().await;
        tool_calls.entry(call.session_id.clone()).or_default().push(call.clone());
        Ok(())
    }

    async fn recent_messages(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let Some(history) = messages.get(session_id) else {
            return Ok(Vec::new());
        };
        let skip = history.len().saturating_sub(limit as usize);
        Ok(history[skip..].to_vec())
    }

    async fn tool_calls(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ToolCallRecord>, RepositoryError> {
        let tool_calls = self.tool_calls.read().await;
        Ok(tool_calls.get(session_id).cloned().unwrap_or_default())
    }
}
