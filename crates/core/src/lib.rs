pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;

pub use conversation::{Message, MessageRole, SessionId, ToolCallRecord, DEFAULT_SESSION_ID};
pub use domain::book::{Book, Isbn, SearchField, DEFAULT_LOW_STOCK_THRESHOLD};
pub use domain::customer::{Customer, CustomerId};
pub use domain::order::{
    NewOrder, Order, OrderDetail, OrderId, OrderItem, OrderItemDetail, OrderLine, OrderStatus,
    OrderSummary,
};
pub use errors::{ApplicationError, DomainError, FailureKind, InterfaceError};
