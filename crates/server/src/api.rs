use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use libdesk_agent::{AgentError, AgentRuntime};
use libdesk_core::conversation::SessionId;
use libdesk_core::domain::book::{Book, Isbn, SearchField};
use libdesk_core::domain::customer::CustomerId;
use libdesk_core::domain::order::{NewOrder, OrderId, OrderItemDetail, OrderLine, OrderSummary};
use libdesk_core::errors::{ApplicationError, DomainError, FailureKind, InterfaceError};
use libdesk_db::repositories::{Repositories, RepositoryError};

#[derive(Clone)]
pub struct ApiState {
    pub repositories: Repositories,
    pub agent: Arc<AgentRuntime>,
    pub low_stock_threshold: i64,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/books", get(list_books))
        .route("/search_books", get(search_books))
        .route("/create_order", post(create_order))
        .route("/restock_book", post(restock_book))
        .route("/update_price", post(update_price))
        .route("/order_status", get(order_status))
        .route("/inventory_summary", get(inventory_summary))
        .route("/chat", post(chat))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemBody {
    pub isbn: String,
    pub qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: i64,
    pub items: Vec<OrderItemBody>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: OrderId,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub isbn: String,
    pub qty: i64,
}

#[derive(Debug, Serialize)]
pub struct RestockResponse {
    pub isbn: Isbn,
    pub new_stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriceRequest {
    pub isbn: String,
    pub price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct UpdatePriceResponse {
    pub isbn: Isbn,
    pub new_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusQuery {
    pub order_id: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order: OrderSummary,
    pub items: Vec<OrderItemDetail>,
    pub total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct InventoryQuery {
    pub threshold: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub threshold: i64,
    pub low_stock: Vec<Book>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Malformed input is a 400. Rejected operations are a normal answer
/// (`200 {"error"}`). Anything else carries a generic message and a
/// correlation id for the logs.
#[derive(Debug)]
pub enum ApiError {
    Invalid(DomainError),
    Rejected(DomainError),
    Failed(InterfaceError),
}

impl ApiError {
    fn from_repository(error: RepositoryError, operation: &'static str) -> Self {
        match error {
            RepositoryError::Domain(domain) => Self::Rejected(domain),
            other => {
                let correlation_id = Uuid::new_v4().to_string();
                error!(
                    event_name = "api.operation_failed",
                    correlation_id = %correlation_id,
                    operation,
                    error = %other,
                    "library operation failed"
                );
                let failure = ApplicationError::Storage(other.to_string());
                Self::Failed(failure.into_interface(correlation_id))
            }
        }
    }

    fn from_agent(error: AgentError) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        error!(
            event_name = "api.chat_failed",
            correlation_id = %correlation_id,
            error = %error,
            "chat turn failed"
        );
        let failure = match error {
            AgentError::Repository(repository) => ApplicationError::Storage(repository.to_string()),
            AgentError::Llm(_) | AgentError::ToolRoundsExhausted(_) => {
                ApplicationError::Assistant(error.to_string())
            }
        };
        Self::Failed(failure.into_interface(correlation_id))
    }
}

fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        FailureKind::Assistant => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Invalid(domain) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody { error: domain.to_string(), correlation_id: None }),
            )
                .into_response(),
            Self::Rejected(domain) => {
                (StatusCode::OK, Json(ErrorBody { error: domain.to_string(), correlation_id: None }))
                    .into_response()
            }
            Self::Failed(error) => (
                failure_status(error.kind),
                Json(ErrorBody {
                    error: error.user_message().to_string(),
                    correlation_id: Some(error.correlation_id().to_string()),
                }),
            )
                .into_response(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_books(State(state): State<ApiState>) -> Result<Json<Vec<Book>>, ApiError> {
    let books = state
        .repositories
        .books
        .list_books()
        .await
        .map_err(|error| ApiError::from_repository(error, "list_books"))?;
    Ok(Json(books))
}

async fn search_books(
    State(state): State<ApiState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Book>>, ApiError> {
    let by = match query.by.as_deref() {
        Some(raw) => raw.parse::<SearchField>().map_err(ApiError::Invalid)?,
        None => SearchField::default(),
    };
    let books = state
        .repositories
        .books
        .search(&query.q, by)
        .await
        .map_err(|error| ApiError::from_repository(error, "search_books"))?;
    Ok(Json(books))
}

async fn create_order(
    State(state): State<ApiState>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    let order = NewOrder {
        customer_id: CustomerId(body.customer_id),
        items: body
            .items
            .into_iter()
            .map(|item| OrderLine { isbn: Isbn(item.isbn), qty: item.qty })
            .collect(),
    };

    let order_id = state.repositories.orders.create_order(&order).await.map_err(|error| {
        if let Some(domain) = error.domain() {
            warn!(
                event_name = "api.order_rejected",
                customer_id = order.customer_id.0,
                reason = %domain,
                "order rejected"
            );
        }
        ApiError::from_repository(error, "create_order")
    })?;

    info!(
        event_name = "api.order_created",
        order_id = order_id.0,
        customer_id = order.customer_id.0,
        lines = order.items.len(),
        "order created"
    );
    Ok(Json(CreateOrderResponse { order_id }))
}

async fn restock_book(
    State(state): State<ApiState>,
    Json(body): Json<RestockRequest>,
) -> Result<Json<RestockResponse>, ApiError> {
    let isbn = Isbn(body.isbn);
    let new_stock = state
        .repositories
        .books
        .restock(&isbn, body.qty)
        .await
        .map_err(|error| ApiError::from_repository(error, "restock_book"))?;

    info!(event_name = "api.book_restocked", isbn = %isbn, qty = body.qty, new_stock, "book restocked");
    Ok(Json(RestockResponse { isbn, new_stock }))
}

async fn update_price(
    State(state): State<ApiState>,
    Json(body): Json<UpdatePriceRequest>,
) -> Result<Json<UpdatePriceResponse>, ApiError> {
    let isbn = Isbn(body.isbn);
    let new_price = state
        .repositories
        .books
        .update_price(&isbn, body.price)
        .await
        .map_err(|error| ApiError::from_repository(error, "update_price"))?;

    info!(event_name = "api.price_updated", isbn = %isbn, new_price = %new_price, "price updated");
    Ok(Json(UpdatePriceResponse { isbn, new_price }))
}

async fn order_status(
    State(state): State<ApiState>,
    Query(query): Query<OrderStatusQuery>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let detail = state
        .repositories
        .orders
        .order_status(OrderId(query.order_id))
        .await
        .map_err(|error| ApiError::from_repository(error, "order_status"))?;
    let total = detail.total();
    Ok(Json(OrderStatusResponse { order: detail.order, items: detail.items, total }))
}

async fn inventory_summary(
    State(state): State<ApiState>,
    Query(query): Query<InventoryQuery>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let threshold = query.threshold.unwrap_or(state.low_stock_threshold);
    let low_stock = state
        .repositories
        .books
        .low_stock(threshold)
        .await
        .map_err(|error| ApiError::from_repository(error, "inventory_summary"))?;
    Ok(Json(InventoryResponse { threshold, low_stock }))
}

async fn chat(
    State(state): State<ApiState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = SessionId::from_optional(body.session_id.as_deref());
    info!(event_name = "api.chat_received", session_id = %session_id, "chat message received");

    let reply =
        state.agent.handle_message(&session_id, &body.message).await.map_err(ApiError::from_agent)?;
    Ok(Json(ChatResponse { reply }))
}
