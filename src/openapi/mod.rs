use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Oficina API",
        version = "0.1.0",
        description = r#"
# Repair shop work orders and parts inventory

- **Work orders**: line items (labor or parts) whose totals are re-derived
  server-side, in the same transaction, after every change
- **Parts inventory**: a stock ledger of `entrada`, `saida` and `ajuste`
  movements that keeps each part's current quantity in sync

## Money

Amounts are decimals serialized as strings and truncated (never rounded)
to two decimal places.

## Errors

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock: part FLT-001 has 3 units available, 5 requested",
  "request_id": "9f1c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20, max 100).
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Work orders and their totals"),
        (name = "items", description = "Work order line items"),
        (name = "parts", description = "Parts catalog"),
        (name = "stock", description = "Stock ledger movements")
    ),
    paths(
        crate::handlers::orders::list_orders,
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order,
        crate::handlers::orders::delete_order,
        crate::handlers::orders::recalculate_order,
        crate::handlers::orders::get_order_items,
        crate::handlers::orders::add_order_item,
        crate::handlers::items::update_item,
        crate::handlers::items::remove_item,
        crate::handlers::parts::list_parts,
        crate::handlers::parts::create_part,
        crate::handlers::parts::list_low_stock,
        crate::handlers::parts::get_part,
        crate::handlers::parts::update_part,
        crate::handlers::parts::delete_part,
        crate::handlers::parts::list_part_movements,
        crate::handlers::parts::record_movement,
        crate::handlers::stock_movements::list_movements,
        crate::handlers::stock_movements::get_movement,
        crate::handlers::stock_movements::delete_movement,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::ResponseMeta,
            crate::errors::ErrorResponse,
            crate::entities::OrderStatus,
            crate::entities::ItemType,
            crate::entities::MovementType,
            crate::entities::StockStatus,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::UpdateOrderRequest,
            crate::services::orders::CreateItemRequest,
            crate::services::orders::UpdateItemRequest,
            crate::services::orders::OrderResponse,
            crate::services::orders::ItemResponse,
            crate::services::orders::OrderTotalsResponse,
            crate::services::orders::ItemMutationResponse,
            crate::services::inventory::CreatePartRequest,
            crate::services::inventory::UpdatePartRequest,
            crate::services::inventory::RecordMovementRequest,
            crate::services::inventory::PartResponse,
            crate::services::inventory::MovementResponse,
            crate::services::inventory::MovementRecordedResponse,
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        for path in [
            "/api/v1/orders/{id}/recalculate",
            "/api/v1/items/{id}",
            "/api/v1/parts/low-stock",
            "/api/v1/parts/{id}/movements",
            "/api/v1/stock-movements/{id}",
        ] {
            assert!(json.contains(path), "missing {path}");
        }
        assert!(json.contains("Oficina API"));
    }
}
