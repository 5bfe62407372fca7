use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use libdesk_core::domain::book::{Isbn, SearchField};
use libdesk_core::domain::customer::CustomerId;
use libdesk_core::domain::order::{NewOrder, OrderId, OrderLine};
use libdesk_db::repositories::{Repositories, RepositoryError};

use crate::llm::ToolDefinition;

pub const TOOL_NAMES: &[&str] = &[
    "find_books",
    "create_order",
    "restock_book",
    "update_price",
    "order_status",
    "inventory_summary",
];

/// Every operation the model may ask for. Anything else is rejected before
/// it reaches the repositories.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum LibraryTool {
    FindBooks(FindBooksArgs),
    CreateOrder(CreateOrderArgs),
    RestockBook(RestockBookArgs),
    UpdatePrice(UpdatePriceArgs),
    OrderStatus(OrderStatusArgs),
    InventorySummary(InventorySummaryArgs),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FindBooksArgs {
    pub q: String,
    #[serde(default)]
    pub by: SearchField,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderArgs {
    pub customer_id: i64,
    pub items: Vec<OrderItemArgs>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderItemArgs {
    pub isbn: String,
    pub qty: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestockBookArgs {
    pub isbn: String,
    pub qty: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePriceArgs {
    pub isbn: String,
    pub price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderStatusArgs {
    pub order_id: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InventorySummaryArgs {
    #[serde(default)]
    pub threshold: Option<i64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: String, message: String },
}

impl LibraryTool {
    pub fn parse(name: &str, arguments: Value) -> Result<Self, ToolError> {
        if !TOOL_NAMES.contains(&name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }

        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        serde_json::from_value(json!({ "name": name, "arguments": arguments })).map_err(|error| {
            ToolError::InvalidArguments { tool: name.to_string(), message: error.to_string() }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FindBooks(_) => "find_books",
            Self::CreateOrder(_) => "create_order",
            Self::RestockBook(_) => "restock_book",
            Self::UpdatePrice(_) => "update_price",
            Self::OrderStatus(_) => "order_status",
            Self::InventorySummary(_) => "inventory_summary",
        }
    }
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "find_books",
            description: "Search books in the library by title or author.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "q": { "type": "string", "description": "Text to look for" },
                    "by": { "type": "string", "enum": ["title", "author"], "default": "title" }
                },
                "required": ["q"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create_order",
            description: "Create an order for a customer and reduce stock. Use this when the \
                          user says they bought or sold copies of specific books.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "customer_id": { "type": "integer", "description": "Customer ID" },
                    "items": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "isbn": { "type": "string", "description": "Book ISBN" },
                                "qty": { "type": "integer", "minimum": 1 }
                            },
                            "required": ["isbn", "qty"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["customer_id", "items"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "restock_book",
            description: "Increase the stock of a book by a given quantity.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "isbn": { "type": "string" },
                    "qty": { "type": "integer", "minimum": 1 }
                },
                "required": ["isbn", "qty"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "update_price",
            description: "Update the price of a book.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "isbn": { "type": "string" },
                    "price": { "type": "number", "minimum": 0 }
                },
                "required": ["isbn", "price"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "order_status",
            description: "Get the full details and status of an order.",
            parameters: json!({
                "type": "object",
                "properties": { "order_id": { "type": "integer" } },
                "required": ["order_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "inventory_summary",
            description: "List all books with stock less than or equal to the threshold.",
            parameters: json!({
                "type": "object",
                "properties": { "threshold": { "type": "integer", "default": 5 } },
                "additionalProperties": false
            }),
        },
    ]
}

/// Runs tools against the repositories and shapes results for the model.
#[derive(Clone)]
pub struct ToolExecutor {
    repositories: Repositories,
    low_stock_threshold: i64,
}

impl ToolExecutor {
    pub fn new(repositories: Repositories, low_stock_threshold: i64) -> Self {
        Self { repositories, low_stock_threshold }
    }

    /// Parses and runs one model tool call. Bad calls and rejected operations
    /// come back as `{"error": ...}` values; only infrastructure failures are
    /// returned as `Err`.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value, RepositoryError> {
        let tool = match LibraryTool::parse(name, arguments) {
            Ok(tool) => tool,
            Err(error) => {
                debug!(
                    event_name = "agent.tool_rejected",
                    tool = name,
                    error = %error,
                    "tool call rejected"
                );
                return Ok(error_value(error.to_string()));
            }
        };
        debug!(event_name = "agent.tool_dispatch", tool = tool.name(), "executing tool");

        match self.execute(&tool).await {
            Ok(value) => Ok(value),
            Err(RepositoryError::Domain(error)) => Ok(error_value(error.to_string())),
            Err(other) => Err(other),
        }
    }

    pub async fn execute(&self, tool: &LibraryTool) -> Result<Value, RepositoryError> {
        match tool {
            LibraryTool::FindBooks(args) => {
                let books = self.repositories.books.search(&args.q, args.by).await?;
                Ok(json!({ "books": books }))
            }
            LibraryTool::CreateOrder(args) => {
                let order = NewOrder {
                    customer_id: CustomerId(args.customer_id),
                    items: args
                        .items
                        .iter()
                        .map(|item| OrderLine { isbn: Isbn(item.isbn.clone()), qty: item.qty })
                        .collect(),
                };
                let order_id = self.repositories.orders.create_order(&order).await?;
                Ok(json!({ "order_id": order_id }))
            }
            LibraryTool::RestockBook(args) => {
                let isbn = Isbn(args.isbn.clone());
                let new_stock = self.repositories.books.restock(&isbn, args.qty).await?;
                Ok(json!({ "isbn": isbn, "new_stock": new_stock }))
            }
            LibraryTool::UpdatePrice(args) => {
                let isbn = Isbn(args.isbn.clone());
                let new_price = self.repositories.books.update_price(&isbn, args.price).await?;
                Ok(json!({ "isbn": isbn, "new_price": new_price }))
            }
            LibraryTool::OrderStatus(args) => {
                let detail = self.repositories.orders.order_status(OrderId(args.order_id)).await?;
                Ok(json!({ "order": detail.order, "items": detail.items }))
            }
            LibraryTool::InventorySummary(args) => {
                let threshold = args.threshold.unwrap_or(self.low_stock_threshold);
                let low_stock = self.repositories.books.low_stock(threshold).await?;
                Ok(json!({ "threshold": threshold, "low_stock": low_stock }))
            }
        }
    }
}

fn error_value(message: String) -> Value {
    json!({ "error": message })
}
