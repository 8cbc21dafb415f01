use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use super::check;
use crate::services::orders::{ItemMutationResponse, UpdateItemRequest};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState};

/// Update a line item; the response carries the refreshed order totals
#[utoipa::path(
    patch,
    path = "/api/v1/items/{id}",
    summary = "Update order item",
    params(("id" = Uuid, Path, description = "Item ID")),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Item updated", body = ApiResponse<ItemMutationResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "items"
)]
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ItemMutationResponse>>), ServiceError> {
    if let Err(failure) = check(&request) {
        return Ok(failure);
    }

    let result = state.services.orders.update_item(id, request).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(result))))
}

/// Remove a line item; the response carries the refreshed order totals
#[utoipa::path(
    delete,
    path = "/api/v1/items/{id}",
    summary = "Remove order item",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item removed", body = ApiResponse<ItemMutationResponse>),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "items"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ItemMutationResponse> {
    let result = state.services.orders.remove_item(id).await?;
    Ok(Json(ApiResponse::success(result)))
}
