use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use uuid::Uuid;

use crate::services::inventory::{MovementResponse, PartResponse};
use crate::{ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

/// Movements across all parts, newest first
#[utoipa::path(
    get,
    path = "/api/v1/stock-movements",
    summary = "List stock movements",
    params(ListQuery),
    responses(
        (status = 200, description = "Movements retrieved", body = ApiResponse<PaginatedResponse<MovementResponse>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "stock"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<MovementResponse>> {
    let limit = state.config.page_size(query.limit);
    let page = state
        .services
        .parts
        .list_movements(None, query.page.max(1), limit)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/stock-movements/{id}",
    summary = "Get stock movement",
    params(("id" = Uuid, Path, description = "Movement ID")),
    responses(
        (status = 200, description = "Movement retrieved", body = ApiResponse<MovementResponse>),
        (status = 404, description = "Movement not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "stock"
)]
pub async fn get_movement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<MovementResponse> {
    let movement = state.services.parts.get_movement(id).await?;
    Ok(Json(ApiResponse::success(movement)))
}

/// Delete a movement, posting the compensating change to its part.
/// Returns the part as it stands afterwards.
#[utoipa::path(
    delete,
    path = "/api/v1/stock-movements/{id}",
    summary = "Reverse stock movement",
    params(("id" = Uuid, Path, description = "Movement ID")),
    responses(
        (status = 200, description = "Movement reversed", body = ApiResponse<PartResponse>),
        (status = 404, description = "Movement not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Adjustment superseded by later movements", body = crate::errors::ErrorResponse),
        (status = 422, description = "Received stock already consumed", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "stock"
)]
pub async fn delete_movement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PartResponse> {
    let part = state.services.parts.delete_movement(id).await?;
    Ok(Json(ApiResponse::success(part)))
}
