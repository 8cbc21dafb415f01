use crate::{
    config::DiscountPolicy,
    db::{DbPool, WriteGate},
    entities::item_servico::{self, Entity as ItemEntity, ItemType},
    entities::ordem_servico::{self, Entity as OrderEntity, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::SHOP_METRICS,
    services::totals::{
        compute_totals, line_total, truncate_money, validate_non_negative_money, OrderTotals,
        MONEY_SCALE,
    },
    PaginatedResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, max = 255, message = "descricao is required"))]
    pub descricao: String,
    #[serde(default)]
    pub tipo_item: ItemType,
    pub tipo_servico_id: Option<Uuid>,
    pub peca_id: Option<Uuid>,
    #[validate(range(min = 1, message = "quantidade must be at least 1"))]
    pub quantidade: i32,
    #[validate(custom = "validate_non_negative_money")]
    #[schema(value_type = String, example = "49.90")]
    pub valor_unitario: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 255, message = "descricao cannot be empty"))]
    pub descricao: Option<String>,
    #[validate(range(min = 1, message = "quantidade must be at least 1"))]
    pub quantidade: Option<i32>,
    #[validate(custom = "validate_non_negative_money")]
    #[schema(value_type = Option<String>, example = "49.90")]
    pub valor_unitario: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    /// Human order number; generated as `OS-XXXXXXXX` when omitted
    #[validate(length(min = 1, max = 50, message = "numero must have 1 to 50 characters"))]
    pub numero: Option<String>,
    pub cliente_id: Option<Uuid>,
    pub veiculo_id: Option<Uuid>,
    #[validate(length(max = 2000))]
    pub descricao: Option<String>,
    pub status: Option<OrderStatus>,
    #[validate(custom = "validate_non_negative_money")]
    #[schema(value_type = Option<String>, example = "10.00")]
    pub desconto: Option<Decimal>,
    #[serde(default)]
    #[validate]
    pub itens: Vec<CreateItemRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderRequest {
    pub cliente_id: Option<Uuid>,
    pub veiculo_id: Option<Uuid>,
    #[validate(length(max = 2000))]
    pub descricao: Option<String>,
    pub status: Option<OrderStatus>,
    #[validate(custom = "validate_non_negative_money")]
    #[schema(value_type = Option<String>, example = "10.00")]
    pub desconto: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemResponse {
    pub id: Uuid,
    pub ordem_servico_id: Uuid,
    pub descricao: String,
    pub tipo_item: String,
    pub tipo_servico_id: Option<Uuid>,
    pub peca_id: Option<Uuid>,
    pub quantidade: i32,
    #[schema(value_type = String)]
    pub valor_unitario: Decimal,
    #[schema(value_type = String)]
    pub valor_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<item_servico::Model> for ItemResponse {
    fn from(model: item_servico::Model) -> Self {
        Self {
            id: model.id,
            ordem_servico_id: model.ordem_servico_id,
            descricao: model.descricao,
            tipo_item: model.tipo_item,
            tipo_servico_id: model.tipo_servico_id,
            peca_id: model.peca_id,
            quantidade: model.quantidade,
            valor_unitario: model.valor_unitario,
            valor_total: model.valor_total,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub numero: String,
    pub cliente_id: Option<Uuid>,
    pub veiculo_id: Option<Uuid>,
    pub descricao: Option<String>,
    pub status: String,
    #[schema(value_type = String)]
    pub desconto: Decimal,
    /// Gross total
    #[schema(value_type = String)]
    pub valor_total: Decimal,
    /// Net total
    #[schema(value_type = String)]
    pub valor_final: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub itens: Option<Vec<ItemResponse>>,
}

impl From<ordem_servico::Model> for OrderResponse {
    fn from(model: ordem_servico::Model) -> Self {
        Self {
            id: model.id,
            numero: model.numero,
            cliente_id: model.cliente_id,
            veiculo_id: model.veiculo_id,
            descricao: model.descricao,
            status: model.status,
            desconto: model.desconto,
            valor_total: model.valor_total,
            valor_final: model.valor_final,
            created_at: model.created_at,
            updated_at: model.updated_at,
            itens: None,
        }
    }
}

/// Refreshed aggregate returned with every line-item mutation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderTotalsResponse {
    pub ordem_servico_id: Uuid,
    #[schema(value_type = String)]
    pub desconto: Decimal,
    #[schema(value_type = String)]
    pub valor_total: Decimal,
    #[schema(value_type = String)]
    pub valor_final: Decimal,
}

impl From<&ordem_servico::Model> for OrderTotalsResponse {
    fn from(model: &ordem_servico::Model) -> Self {
        Self {
            ordem_servico_id: model.id,
            desconto: model.desconto,
            valor_total: model.valor_total,
            valor_final: model.valor_final,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemMutationResponse {
    /// The affected item; absent after a removal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemResponse>,
    pub totals: OrderTotalsResponse,
}

pub(crate) fn generate_order_number() -> String {
    let simple = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("OS-{}", &simple[..8])
}

async fn find_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<ordem_servico::Model, ServiceError> {
    OrderEntity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))
}

/// Reads an order and takes its row lock on backends that have one. Every
/// item mutation goes through this first, so concurrent writers to the same
/// order queue up before the items are summed.
async fn find_order_for_update<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<ordem_servico::Model, ServiceError> {
    let mut query = OrderEntity::find_by_id(order_id);
    if conn.get_database_backend() != DbBackend::Sqlite {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<item_servico::Model>, ServiceError> {
    Ok(ItemEntity::find()
        .filter(item_servico::Column::OrdemServicoId.eq(order_id))
        .order_by_asc(item_servico::Column::CreatedAt)
        .order_by_asc(item_servico::Column::Id)
        .all(conn)
        .await?)
}

/// Re-derives and persists an order's gross and net totals from its items.
///
/// Runs on whatever connection the caller holds, so line-item writes and the
/// aggregate write commit or roll back together. A missing order aborts with
/// `NotFound`.
pub async fn recalculate_totals<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    policy: DiscountPolicy,
) -> Result<ordem_servico::Model, ServiceError> {
    let order = find_order_for_update(conn, order_id).await?;
    let items = load_items(conn, order_id).await?;

    let OrderTotals {
        valor_total,
        valor_final,
    } = compute_totals(
        // SQLite hands decimals back through f64; stored amounts are whole cents.
        items
            .iter()
            .map(|i| (i.quantidade, i.valor_unitario.round_dp(MONEY_SCALE))),
        order.desconto.round_dp(MONEY_SCALE),
        policy,
    )?;
    SHOP_METRICS.recalculations.inc();

    if order.valor_total == valor_total && order.valor_final == valor_final {
        return Ok(order);
    }

    let mut active: ordem_servico::ActiveModel = order.into();
    active.valor_total = Set(valor_total);
    active.valor_final = Set(valor_final);
    Ok(active.update(conn).await?)
}

async fn insert_item<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    request: CreateItemRequest,
) -> Result<item_servico::Model, ServiceError> {
    let valor_unitario = truncate_money(request.valor_unitario);
    let valor_total = line_total(request.quantidade, valor_unitario)?;
    let now = Utc::now();

    let item = item_servico::ActiveModel {
        id: Set(Uuid::new_v4()),
        ordem_servico_id: Set(order_id),
        descricao: Set(request.descricao),
        tipo_item: Set(request.tipo_item.to_string()),
        tipo_servico_id: Set(request.tipo_servico_id),
        peca_id: Set(request.peca_id),
        quantidade: Set(request.quantidade),
        valor_unitario: Set(valor_unitario),
        valor_total: Set(valor_total),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Ok(item.insert(conn).await?)
}

/// Work orders and their line items. Every mutation re-derives the order
/// totals inside the same transaction.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    discount_policy: DiscountPolicy,
    write_gate: WriteGate,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        discount_policy: DiscountPolicy,
        write_gate: WriteGate,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            discount_policy,
            write_gate,
        }
    }

    async fn begin(&self) -> Result<sea_orm::DatabaseTransaction, ServiceError> {
        self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction");
            ServiceError::DatabaseError(e)
        })
    }

    async fn commit(&self, txn: sea_orm::DatabaseTransaction) -> Result<(), ServiceError> {
        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit transaction");
            ServiceError::DatabaseError(e)
        })
    }

    async fn publish_totals(&self, order: &ordem_servico::Model) {
        self.event_sender
            .send_or_log(Event::OrderTotalsRecalculated {
                order_id: order.id,
                valor_total: order.valor_total,
                valor_final: order.valor_final,
            })
            .await;
    }

    /// Creates an order, its initial items and its totals in one transaction
    #[instrument(skip(self, request), fields(numero = ?request.numero))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;

        let numero = match request.numero.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => generate_order_number(),
        };
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let _gate = self.write_gate.enter().await;
        let txn = self.begin().await?;

        let taken = OrderEntity::find()
            .filter(ordem_servico::Column::Numero.eq(numero.as_str()))
            .count(&txn)
            .await?;
        if taken > 0 {
            return Err(ServiceError::Conflict(format!(
                "order number {} already exists",
                numero
            )));
        }

        let order = ordem_servico::ActiveModel {
            id: Set(order_id),
            numero: Set(numero),
            cliente_id: Set(request.cliente_id),
            veiculo_id: Set(request.veiculo_id),
            descricao: Set(request.descricao),
            status: Set(request.status.unwrap_or_default().to_string()),
            desconto: Set(truncate_money(request.desconto.unwrap_or(Decimal::ZERO))),
            valor_total: Set(Decimal::ZERO),
            valor_final: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        };
        order.insert(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        let mut itens = Vec::with_capacity(request.itens.len());
        for item in request.itens {
            itens.push(insert_item(&txn, order_id, item).await?);
        }

        let order = recalculate_totals(&txn, order_id, self.discount_policy).await?;
        self.commit(txn).await?;

        info!(order_id = %order_id, numero = %order.numero, items = itens.len(), "Order created");
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;
        self.publish_totals(&order).await;

        let mut response = OrderResponse::from(order);
        response.itens = Some(itens.into_iter().map(ItemResponse::from).collect());
        Ok(response)
    }

    /// Retrieves an order together with its items
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let order = find_order(db, order_id).await?;
        let itens = load_items(db, order_id).await?;

        let mut response = OrderResponse::from(order);
        response.itens = Some(itens.into_iter().map(ItemResponse::from).collect());
        Ok(response)
    }

    /// Resolves a human order number (`OS-...`) to its id
    pub async fn find_order_id_by_numero(&self, numero: &str) -> Result<Option<Uuid>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(ordem_servico::Column::Numero.eq(numero))
            .one(&*self.db_pool)
            .await?
            .map(|order| order.id))
    }

    /// Lists orders newest first, optionally filtered by status
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        limit: u64,
        status: Option<OrderStatus>,
    ) -> Result<PaginatedResponse<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = OrderEntity::find();
        if let Some(status) = status {
            query = query.filter(ordem_servico::Column::Status.eq(status.to_string()));
        }

        let paginator = query
            .order_by_desc(ordem_servico::Column::CreatedAt)
            .order_by_asc(ordem_servico::Column::Id)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(PaginatedResponse::new(
            orders.into_iter().map(OrderResponse::from).collect(),
            total,
            page,
            limit,
        ))
    }

    /// Updates header fields; a discount change re-derives the net total
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn update_order(
        &self,
        order_id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;

        let _gate = self.write_gate.enter().await;
        let txn = self.begin().await?;
        let existing = find_order_for_update(&txn, order_id).await?;
        let old_status = existing.status.clone();
        let old_desconto = existing.desconto;

        let mut active: ordem_servico::ActiveModel = existing.into();
        if let Some(cliente_id) = request.cliente_id {
            active.cliente_id = Set(Some(cliente_id));
        }
        if let Some(veiculo_id) = request.veiculo_id {
            active.veiculo_id = Set(Some(veiculo_id));
        }
        if let Some(descricao) = request.descricao {
            active.descricao = Set(Some(descricao));
        }
        let new_status = request.status.map(|s| s.to_string());
        if let Some(status) = &new_status {
            active.status = Set(status.clone());
        }
        let new_desconto = request.desconto.map(truncate_money);
        if let Some(desconto) = new_desconto {
            active.desconto = Set(desconto);
        }
        active.update(&txn).await?;

        let discount_changed = new_desconto.is_some_and(|d| d != old_desconto);
        let order = if discount_changed {
            recalculate_totals(&txn, order_id, self.discount_policy).await?
        } else {
            find_order(&txn, order_id).await?
        };
        self.commit(txn).await?;

        info!(order_id = %order_id, discount_changed, "Order updated");
        self.event_sender
            .send_or_log(Event::OrderUpdated(order_id))
            .await;
        if let Some(status) = new_status.filter(|s| *s != old_status) {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status: status,
                })
                .await;
        }
        if discount_changed {
            self.publish_totals(&order).await;
        }

        Ok(OrderResponse::from(order))
    }

    /// Deletes an order and all of its items
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn delete_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let _gate = self.write_gate.enter().await;
        let txn = self.begin().await?;
        find_order_for_update(&txn, order_id).await?;

        let removed = ItemEntity::delete_many()
            .filter(item_servico::Column::OrdemServicoId.eq(order_id))
            .exec(&txn)
            .await?
            .rows_affected;
        OrderEntity::delete_by_id(order_id).exec(&txn).await?;
        self.commit(txn).await?;

        info!(order_id = %order_id, items_removed = removed, "Order deleted");
        self.event_sender
            .send_or_log(Event::OrderDeleted(order_id))
            .await;
        Ok(())
    }

    /// Explicitly re-derives an order's totals
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn recalculate(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let _gate = self.write_gate.enter().await;
        let txn = self.begin().await?;
        let order = recalculate_totals(&txn, order_id, self.discount_policy).await?;
        self.commit(txn).await?;

        self.publish_totals(&order).await;
        self.get_order(order_id).await
    }

    /// Lists the items of an order
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_items(&self, order_id: Uuid) -> Result<Vec<ItemResponse>, ServiceError> {
        let db = &*self.db_pool;
        find_order(db, order_id).await?;
        Ok(load_items(db, order_id)
            .await?
            .into_iter()
            .map(ItemResponse::from)
            .collect())
    }

    /// Adds a line item and refreshes the order totals atomically
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn add_item(
        &self,
        order_id: Uuid,
        request: CreateItemRequest,
    ) -> Result<ItemMutationResponse, ServiceError> {
        request.validate()?;

        let _gate = self.write_gate.enter().await;
        let txn = self.begin().await?;
        find_order_for_update(&txn, order_id).await?;
        let item = insert_item(&txn, order_id, request).await?;
        let order = recalculate_totals(&txn, order_id, self.discount_policy).await?;
        self.commit(txn).await?;

        SHOP_METRICS.line_item_mutations.inc();
        info!(order_id = %order_id, item_id = %item.id, "Line item added");
        self.event_sender
            .send_or_log(Event::LineItemAdded {
                order_id,
                item_id: item.id,
            })
            .await;
        self.publish_totals(&order).await;

        Ok(ItemMutationResponse {
            item: Some(item.into()),
            totals: OrderTotalsResponse::from(&order),
        })
    }

    /// Updates a line item and refreshes the order totals atomically
    #[instrument(skip(self, request), fields(item_id = %item_id))]
    pub async fn update_item(
        &self,
        item_id: Uuid,
        request: UpdateItemRequest,
    ) -> Result<ItemMutationResponse, ServiceError> {
        request.validate()?;

        let _gate = self.write_gate.enter().await;
        let txn = self.begin().await?;
        let existing = ItemEntity::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("item {}", item_id)))?;
        let order_id = existing.ordem_servico_id;
        find_order_for_update(&txn, order_id).await?;

        let quantidade = request.quantidade.unwrap_or(existing.quantidade);
        let valor_unitario = request
            .valor_unitario
            .map(truncate_money)
            .unwrap_or_else(|| existing.valor_unitario.round_dp(MONEY_SCALE));

        let mut active: item_servico::ActiveModel = existing.into();
        if let Some(descricao) = request.descricao {
            active.descricao = Set(descricao);
        }
        active.quantidade = Set(quantidade);
        active.valor_unitario = Set(valor_unitario);
        active.valor_total = Set(line_total(quantidade, valor_unitario)?);
        let item = active.update(&txn).await?;

        let order = recalculate_totals(&txn, order_id, self.discount_policy).await?;
        self.commit(txn).await?;

        SHOP_METRICS.line_item_mutations.inc();
        info!(order_id = %order_id, item_id = %item_id, "Line item updated");
        self.event_sender
            .send_or_log(Event::LineItemUpdated { order_id, item_id })
            .await;
        self.publish_totals(&order).await;

        Ok(ItemMutationResponse {
            item: Some(item.into()),
            totals: OrderTotalsResponse::from(&order),
        })
    }

    /// Removes a line item and refreshes the order totals atomically
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn remove_item(&self, item_id: Uuid) -> Result<ItemMutationResponse, ServiceError> {
        let _gate = self.write_gate.enter().await;
        let txn = self.begin().await?;
        let existing = ItemEntity::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("item {}", item_id)))?;
        let order_id = existing.ordem_servico_id;
        find_order_for_update(&txn, order_id).await?;

        ItemEntity::delete_by_id(item_id).exec(&txn).await?;
        let order = match recalculate_totals(&txn, order_id, self.discount_policy).await {
            Ok(order) => order,
            Err(e) => {
                warn!(order_id = %order_id, item_id = %item_id, error = %e, "Rolling back item removal");
                return Err(e);
            }
        };
        self.commit(txn).await?;

        SHOP_METRICS.line_item_mutations.inc();
        info!(order_id = %order_id, item_id = %item_id, "Line item removed");
        self.event_sender
            .send_or_log(Event::LineItemRemoved { order_id, item_id })
            .await;
        self.publish_totals(&order).await;

        Ok(ItemMutationResponse {
            item: None,
            totals: OrderTotalsResponse::from(&order),
        })
    }
}
