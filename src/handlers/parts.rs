use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use super::check;
use crate::services::inventory::{
    CreatePartRequest, MovementRecordedResponse, MovementResponse, PartResponse,
    RecordMovementRequest, UpdatePartRequest,
};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

/// List parts, optionally searching code and name
#[utoipa::path(
    get,
    path = "/api/v1/parts",
    summary = "List parts",
    params(ListQuery),
    responses(
        (status = 200, description = "Parts retrieved successfully", body = ApiResponse<PaginatedResponse<PartResponse>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "parts"
)]
pub async fn list_parts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<PartResponse>> {
    let limit = state.config.page_size(query.limit);
    let page = state
        .services
        .parts
        .list_parts(query.page.max(1), limit, query.search)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Register a part; `quantidade_inicial` is booked as an entrada
#[utoipa::path(
    post,
    path = "/api/v1/parts",
    summary = "Create part",
    request_body = CreatePartRequest,
    responses(
        (status = 201, description = "Part created", body = ApiResponse<PartResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Part code already in use", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "parts"
)]
pub async fn create_part(
    State(state): State<AppState>,
    Json(request): Json<CreatePartRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PartResponse>>), ServiceError> {
    if let Err(failure) = check(&request) {
        return Ok(failure);
    }

    let part = state.services.parts.create_part(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(part))))
}

/// Parts at or below their minimum quantity
#[utoipa::path(
    get,
    path = "/api/v1/parts/low-stock",
    summary = "List low-stock parts",
    responses(
        (status = 200, description = "Low-stock parts", body = ApiResponse<Vec<PartResponse>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "parts"
)]
pub async fn list_low_stock(State(state): State<AppState>) -> ApiResult<Vec<PartResponse>> {
    let parts = state.services.parts.list_low_stock().await?;
    Ok(Json(ApiResponse::success(parts)))
}

#[utoipa::path(
    get,
    path = "/api/v1/parts/{id}",
    summary = "Get part",
    params(("id" = Uuid, Path, description = "Part ID")),
    responses(
        (status = 200, description = "Part retrieved successfully", body = ApiResponse<PartResponse>),
        (status = 404, description = "Part not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "parts"
)]
pub async fn get_part(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PartResponse> {
    let part = state.services.parts.get_part(id).await?;
    Ok(Json(ApiResponse::success(part)))
}

/// Update catalog fields and thresholds. The quantity only moves through movements.
#[utoipa::path(
    put,
    path = "/api/v1/parts/{id}",
    summary = "Update part",
    params(("id" = Uuid, Path, description = "Part ID")),
    request_body = UpdatePartRequest,
    responses(
        (status = 200, description = "Part updated", body = ApiResponse<PartResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Part not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Part code already in use", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "parts"
)]
pub async fn update_part(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePartRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PartResponse>>), ServiceError> {
    if let Err(failure) = check(&request) {
        return Ok(failure);
    }

    let part = state.services.parts.update_part(id, request).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(part))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/parts/{id}",
    summary = "Delete part",
    params(("id" = Uuid, Path, description = "Part ID")),
    responses(
        (status = 204, description = "Part deleted"),
        (status = 404, description = "Part not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Part has stock movements", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "parts"
)]
pub async fn delete_part(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.parts.delete_part(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Movement history of one part, newest first
#[utoipa::path(
    get,
    path = "/api/v1/parts/{id}/movements",
    summary = "List part movements",
    params(("id" = Uuid, Path, description = "Part ID"), ListQuery),
    responses(
        (status = 200, description = "Movements retrieved", body = ApiResponse<PaginatedResponse<MovementResponse>>),
        (status = 404, description = "Part not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "stock"
)]
pub async fn list_part_movements(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<MovementResponse>> {
    let limit = state.config.page_size(query.limit);
    let page = state
        .services
        .parts
        .list_movements(Some(id), query.page.max(1), limit)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Apply an entrada, saida or ajuste to a part
#[utoipa::path(
    post,
    path = "/api/v1/parts/{id}/movements",
    summary = "Record stock movement",
    params(("id" = Uuid, Path, description = "Part ID")),
    request_body = RecordMovementRequest,
    responses(
        (status = 201, description = "Movement applied", body = ApiResponse<MovementRecordedResponse>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Part not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "stock"
)]
pub async fn record_movement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RecordMovementRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MovementRecordedResponse>>), ServiceError> {
    if let Err(failure) = check(&request) {
        return Ok(failure);
    }

    let recorded = state.services.parts.record_movement(id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(recorded))))
}
