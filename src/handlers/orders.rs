use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::str::FromStr;
use uuid::Uuid;

use super::check;
use crate::entities::OrderStatus;
use crate::services::orders::{
    CreateItemRequest, CreateOrderRequest, ItemMutationResponse, ItemResponse, OrderResponse,
    UpdateOrderRequest,
};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(&raw.trim().to_ascii_lowercase())
        .map_err(|_| ServiceError::InvalidInput(format!("Unknown order status: {raw}")))
}

// Orders are addressable by id or by their human number
async fn resolve_order_id(state: &AppState, id: &str) -> Result<Uuid, ServiceError> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return Ok(uuid);
    }
    state
        .services
        .orders
        .find_order_id_by_numero(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {}", id)))
}

/// List orders with pagination and an optional status filter
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    params(ListQuery),
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<PaginatedResponse<OrderResponse>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request parameters", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<OrderResponse>> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let limit = state.config.page_size(query.limit);
    let page = state
        .services
        .orders
        .list_orders(query.page.max(1), limit, status)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Create an order, optionally with its first line items
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created successfully", body = ApiResponse<OrderResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order number already in use", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    if let Err(failure) = check(&request) {
        return Ok(failure);
    }

    let order = state.services.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// Get an order with its items
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = String, Path, description = "Order ID or order number")),
    responses(
        (status = 200, description = "Order retrieved successfully", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<OrderResponse> {
    let order_id = resolve_order_id(&state, &id).await?;
    let order = state.services.orders.get_order(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Update order header fields; a new discount re-derives the net total
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}",
    summary = "Update order",
    params(("id" = String, Path, description = "Order ID or order number")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Order updated successfully", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    if let Err(failure) = check(&request) {
        return Ok(failure);
    }

    let order_id = resolve_order_id(&state, &id).await?;
    let order = state.services.orders.update_order(order_id, request).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(order))))
}

/// Delete an order together with its items
#[utoipa::path(
    delete,
    path = "/api/v1/orders/{id}",
    summary = "Delete order",
    params(("id" = String, Path, description = "Order ID or order number")),
    responses(
        (status = 204, description = "Order deleted successfully"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order_id = resolve_order_id(&state, &id).await?;
    state.services.orders.delete_order(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-derive an order's totals from its current items
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/recalculate",
    summary = "Recalculate order totals",
    params(("id" = String, Path, description = "Order ID or order number")),
    responses(
        (status = 200, description = "Totals recalculated", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn recalculate_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<OrderResponse> {
    let order_id = resolve_order_id(&state, &id).await?;
    let order = state.services.orders.recalculate(order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// List the line items of an order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/items",
    summary = "List order items",
    params(("id" = String, Path, description = "Order ID or order number")),
    responses(
        (status = 200, description = "Items retrieved successfully", body = ApiResponse<Vec<ItemResponse>>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<ItemResponse>> {
    let order_id = resolve_order_id(&state, &id).await?;
    let items = state.services.orders.get_items(order_id).await?;
    Ok(Json(ApiResponse::success(items)))
}

/// Add a line item; the response carries the refreshed totals
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/items",
    summary = "Add order item",
    params(("id" = String, Path, description = "Order ID or order number")),
    request_body = CreateItemRequest,
    responses(
        (status = 201, description = "Item added", body = ApiResponse<ItemMutationResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn add_order_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ItemMutationResponse>>), ServiceError> {
    if let Err(failure) = check(&request) {
        return Ok(failure);
    }

    let order_id = resolve_order_id(&state, &id).await?;
    let result = state.services.orders.add_item(order_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(result))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_known_statuses() {
        assert_eq!(parse_status("aberta").unwrap(), OrderStatus::Aberta);
        assert_eq!(parse_status(" EM_ANDAMENTO ").unwrap(), OrderStatus::EmAndamento);
        assert_matches!(parse_status("shipped"), Err(ServiceError::InvalidInput(_)));
    }
}
