use crate::{
    db::DbPool,
    entities::movimentacao_estoque::{self, Entity as MovementEntity, MovementType},
    entities::peca::{self, Entity as PartEntity, StockStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_ledger::{apply_movement_in, MovementInput, StockLedger},
    services::totals::{truncate_money, validate_non_negative_money},
    PaginatedResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const INITIAL_STOCK_REASON: &str = "Estoque inicial";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreatePartRequest {
    #[validate(length(min = 1, max = 64, message = "codigo must have 1 to 64 characters"))]
    pub codigo: String,
    #[validate(length(min = 1, max = 255, message = "nome is required"))]
    pub nome: String,
    #[validate(length(max = 2000))]
    pub descricao: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "quantidade_minima cannot be negative"))]
    pub quantidade_minima: i32,
    #[validate(range(min = 0, message = "quantidade_maxima cannot be negative"))]
    pub quantidade_maxima: Option<i32>,
    #[validate(custom = "validate_non_negative_money")]
    #[schema(value_type = Option<String>, example = "25.00")]
    pub preco_custo: Option<Decimal>,
    #[validate(custom = "validate_non_negative_money")]
    #[schema(value_type = Option<String>, example = "39.90")]
    pub preco_venda: Option<Decimal>,
    /// Opening balance, booked as an `entrada` movement
    #[validate(range(min = 0, message = "quantidade_inicial cannot be negative"))]
    pub quantidade_inicial: Option<i32>,
}

/// Catalog fields only. The quantity changes exclusively through movements.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdatePartRequest {
    #[validate(length(min = 1, max = 64, message = "codigo must have 1 to 64 characters"))]
    pub codigo: Option<String>,
    #[validate(length(min = 1, max = 255, message = "nome cannot be empty"))]
    pub nome: Option<String>,
    #[validate(length(max = 2000))]
    pub descricao: Option<String>,
    #[validate(range(min = 0, message = "quantidade_minima cannot be negative"))]
    pub quantidade_minima: Option<i32>,
    #[validate(range(min = 0, message = "quantidade_maxima cannot be negative"))]
    pub quantidade_maxima: Option<i32>,
    #[validate(custom = "validate_non_negative_money")]
    #[schema(value_type = Option<String>)]
    pub preco_custo: Option<Decimal>,
    #[validate(custom = "validate_non_negative_money")]
    #[schema(value_type = Option<String>)]
    pub preco_venda: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RecordMovementRequest {
    pub tipo_movimentacao: MovementType,
    #[validate(range(min = 0, message = "quantidade cannot be negative"))]
    pub quantidade: i32,
    #[validate(length(max = 500))]
    pub motivo: Option<String>,
    pub ordem_servico_id: Option<Uuid>,
}

impl From<RecordMovementRequest> for MovementInput {
    fn from(request: RecordMovementRequest) -> Self {
        Self {
            tipo: request.tipo_movimentacao,
            quantidade: request.quantidade,
            motivo: request.motivo,
            ordem_servico_id: request.ordem_servico_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PartResponse {
    pub id: Uuid,
    pub codigo: String,
    pub nome: String,
    pub descricao: Option<String>,
    pub quantidade_atual: i32,
    pub quantidade_minima: i32,
    pub quantidade_maxima: Option<i32>,
    #[schema(value_type = Option<String>)]
    pub preco_custo: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub preco_venda: Option<Decimal>,
    pub stock_status: StockStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<peca::Model> for PartResponse {
    fn from(model: peca::Model) -> Self {
        let stock_status = model.stock_status();
        Self {
            id: model.id,
            codigo: model.codigo,
            nome: model.nome,
            descricao: model.descricao,
            quantidade_atual: model.quantidade_atual,
            quantidade_minima: model.quantidade_minima,
            quantidade_maxima: model.quantidade_maxima,
            preco_custo: model.preco_custo,
            preco_venda: model.preco_venda,
            stock_status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MovementResponse {
    pub id: Uuid,
    pub peca_id: Uuid,
    pub tipo_movimentacao: String,
    pub quantidade: i32,
    pub quantidade_anterior: i32,
    pub quantidade_nova: i32,
    pub motivo: Option<String>,
    pub ordem_servico_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<movimentacao_estoque::Model> for MovementResponse {
    fn from(model: movimentacao_estoque::Model) -> Self {
        Self {
            id: model.id,
            peca_id: model.peca_id,
            tipo_movimentacao: model.tipo_movimentacao,
            quantidade: model.quantidade,
            quantidade_anterior: model.quantidade_anterior,
            quantidade_nova: model.quantidade_nova,
            motivo: model.motivo,
            ordem_servico_id: model.ordem_servico_id,
            created_at: model.created_at,
        }
    }
}

/// Movement plus the part as it stands afterwards
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MovementRecordedResponse {
    pub movement: MovementResponse,
    pub part: PartResponse,
}

fn ensure_thresholds(minima: i32, maxima: Option<i32>) -> Result<(), ServiceError> {
    match maxima {
        Some(max) if max < minima => Err(ServiceError::ValidationError(format!(
            "quantidade_maxima ({}) cannot be lower than quantidade_minima ({})",
            max, minima
        ))),
        _ => Ok(()),
    }
}

/// Parts catalog and the read side of the stock ledger
#[derive(Clone)]
pub struct PartService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    ledger: Arc<StockLedger>,
}

impl PartService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        ledger: Arc<StockLedger>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            ledger,
        }
    }

    async fn codigo_taken(&self, codigo: &str, except: Option<Uuid>) -> Result<bool, ServiceError> {
        let mut query = PartEntity::find().filter(peca::Column::Codigo.eq(codigo));
        if let Some(id) = except {
            query = query.filter(peca::Column::Id.ne(id));
        }
        Ok(query.count(&*self.db_pool).await? > 0)
    }

    /// Creates a part; a positive opening balance is booked as an `entrada`
    /// in the same transaction
    #[instrument(skip(self, request), fields(codigo = %request.codigo))]
    pub async fn create_part(&self, request: CreatePartRequest) -> Result<PartResponse, ServiceError> {
        request.validate()?;
        ensure_thresholds(request.quantidade_minima, request.quantidade_maxima)?;

        let codigo = request.codigo.trim().to_string();
        if self.codigo_taken(&codigo, None).await? {
            return Err(ServiceError::Conflict(format!(
                "part code {} already exists",
                codigo
            )));
        }

        let part_id = Uuid::new_v4();
        let now = Utc::now();
        let _gate = self.ledger.write_gate().enter().await;
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for part creation");
            ServiceError::DatabaseError(e)
        })?;

        let mut part = peca::ActiveModel {
            id: Set(part_id),
            codigo: Set(codigo),
            nome: Set(request.nome),
            descricao: Set(request.descricao),
            quantidade_atual: Set(0),
            quantidade_minima: Set(request.quantidade_minima),
            quantidade_maxima: Set(request.quantidade_maxima),
            preco_custo: Set(request.preco_custo.map(truncate_money)),
            preco_venda: Set(request.preco_venda.map(truncate_money)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut opening = None;
        if let Some(inicial) = request.quantidade_inicial.filter(|q| *q > 0) {
            let input = MovementInput {
                tipo: MovementType::Entrada,
                quantidade: inicial,
                motivo: Some(INITIAL_STOCK_REASON.to_string()),
                ordem_servico_id: None,
            };
            let outcome = apply_movement_in(&txn, part_id, &input)
                .await?
                .ok_or(ServiceError::ConcurrentModification(part_id))?;
            part = outcome.part.clone();
            opening = Some(outcome);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, part_id = %part_id, "Failed to commit part creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(part_id = %part_id, quantidade_atual = part.quantidade_atual, "Part created");
        self.event_sender
            .send_or_log(Event::PartCreated(part_id))
            .await;
        if let Some(outcome) = &opening {
            self.ledger.publish_movement(outcome).await;
        }

        Ok(part.into())
    }

    #[instrument(skip(self), fields(part_id = %part_id))]
    pub async fn get_part(&self, part_id: Uuid) -> Result<PartResponse, ServiceError> {
        PartEntity::find_by_id(part_id)
            .one(&*self.db_pool)
            .await?
            .map(PartResponse::from)
            .ok_or_else(|| ServiceError::NotFound(format!("part {}", part_id)))
    }

    /// Lists parts by code, optionally matching `search` against code or name
    #[instrument(skip(self))]
    pub async fn list_parts(
        &self,
        page: u64,
        limit: u64,
        search: Option<String>,
    ) -> Result<PaginatedResponse<PartResponse>, ServiceError> {
        let mut query = PartEntity::find();
        if let Some(term) = search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(peca::Column::Codigo.contains(term.as_str()))
                    .add(peca::Column::Nome.contains(term.as_str())),
            );
        }

        let paginator = query
            .order_by_asc(peca::Column::Codigo)
            .paginate(&*self.db_pool, limit);
        let total = paginator.num_items().await?;
        let parts = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(PaginatedResponse::new(
            parts.into_iter().map(PartResponse::from).collect(),
            total,
            page,
            limit,
        ))
    }

    /// Parts at or below their minimum quantity
    #[instrument(skip(self))]
    pub async fn list_low_stock(&self) -> Result<Vec<PartResponse>, ServiceError> {
        let parts = PartEntity::find()
            .filter(
                Expr::col(peca::Column::QuantidadeAtual)
                    .lte(Expr::col(peca::Column::QuantidadeMinima)),
            )
            .order_by_asc(peca::Column::QuantidadeAtual)
            .order_by_asc(peca::Column::Codigo)
            .all(&*self.db_pool)
            .await?;

        crate::metrics::set_gauge("oficina_stock_low_parts", parts.len() as f64);
        Ok(parts.into_iter().map(PartResponse::from).collect())
    }

    #[instrument(skip(self, request), fields(part_id = %part_id))]
    pub async fn update_part(
        &self,
        part_id: Uuid,
        request: UpdatePartRequest,
    ) -> Result<PartResponse, ServiceError> {
        request.validate()?;

        let existing = PartEntity::find_by_id(part_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("part {}", part_id)))?;

        let minima = request.quantidade_minima.unwrap_or(existing.quantidade_minima);
        let maxima = request.quantidade_maxima.or(existing.quantidade_maxima);
        ensure_thresholds(minima, maxima)?;

        let mut active: peca::ActiveModel = existing.into();
        if let Some(codigo) = request.codigo.map(|c| c.trim().to_string()) {
            if self.codigo_taken(&codigo, Some(part_id)).await? {
                return Err(ServiceError::Conflict(format!(
                    "part code {} already exists",
                    codigo
                )));
            }
            active.codigo = Set(codigo);
        }
        if let Some(nome) = request.nome {
            active.nome = Set(nome);
        }
        if let Some(descricao) = request.descricao {
            active.descricao = Set(Some(descricao));
        }
        active.quantidade_minima = Set(minima);
        active.quantidade_maxima = Set(maxima);
        if let Some(preco) = request.preco_custo {
            active.preco_custo = Set(Some(truncate_money(preco)));
        }
        if let Some(preco) = request.preco_venda {
            active.preco_venda = Set(Some(truncate_money(preco)));
        }

        let updated = {
            let _gate = self.ledger.write_gate().enter().await;
            active.update(&*self.db_pool).await?
        };
        info!(part_id = %part_id, "Part updated");
        self.event_sender
            .send_or_log(Event::PartUpdated(part_id))
            .await;
        Ok(updated.into())
    }

    /// Deletes a part that has no ledger history
    #[instrument(skip(self), fields(part_id = %part_id))]
    pub async fn delete_part(&self, part_id: Uuid) -> Result<(), ServiceError> {
        let _gate = self.ledger.write_gate().enter().await;
        let txn = self.db_pool.begin().await?;
        PartEntity::find_by_id(part_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("part {}", part_id)))?;

        let movements = MovementEntity::find()
            .filter(movimentacao_estoque::Column::PecaId.eq(part_id))
            .count(&txn)
            .await?;
        if movements > 0 {
            return Err(ServiceError::Conflict(format!(
                "part {} has {} stock movements and cannot be deleted",
                part_id, movements
            )));
        }

        PartEntity::delete_by_id(part_id).exec(&txn).await?;
        txn.commit().await?;

        info!(part_id = %part_id, "Part deleted");
        self.event_sender
            .send_or_log(Event::PartDeleted(part_id))
            .await;
        Ok(())
    }

    /// Applies a movement through the ledger
    pub async fn record_movement(
        &self,
        part_id: Uuid,
        request: RecordMovementRequest,
    ) -> Result<MovementRecordedResponse, ServiceError> {
        request.validate()?;
        let outcome = self.ledger.apply_movement(part_id, request.into()).await?;
        Ok(MovementRecordedResponse {
            movement: outcome.movement.into(),
            part: outcome.part.into(),
        })
    }

    /// Movements newest first, for one part or across all parts
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        part_id: Option<Uuid>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<MovementResponse>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = MovementEntity::find();
        if let Some(part_id) = part_id {
            PartEntity::find_by_id(part_id)
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("part {}", part_id)))?;
            query = query.filter(movimentacao_estoque::Column::PecaId.eq(part_id));
        }

        let paginator = query
            .order_by_desc(movimentacao_estoque::Column::CreatedAt)
            .order_by_desc(movimentacao_estoque::Column::Id)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let movements = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(PaginatedResponse::new(
            movements.into_iter().map(MovementResponse::from).collect(),
            total,
            page,
            limit,
        ))
    }

    #[instrument(skip(self), fields(movement_id = %movement_id))]
    pub async fn get_movement(&self, movement_id: Uuid) -> Result<MovementResponse, ServiceError> {
        MovementEntity::find_by_id(movement_id)
            .one(&*self.db_pool)
            .await?
            .map(MovementResponse::from)
            .ok_or_else(|| ServiceError::NotFound(format!("stock movement {}", movement_id)))
    }

    /// Deletes a movement, compensating the part's quantity
    pub async fn delete_movement(&self, movement_id: Uuid) -> Result<PartResponse, ServiceError> {
        Ok(self.ledger.reverse_movement(movement_id).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn thresholds_must_be_ordered() {
        assert!(ensure_thresholds(2, Some(10)).is_ok());
        assert!(ensure_thresholds(2, None).is_ok());
        assert_matches!(
            ensure_thresholds(5, Some(3)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn movement_request_parses_accented_saida() {
        let request: RecordMovementRequest = serde_json::from_str(
            r#"{"tipo_movimentacao":"saída","quantidade":2,"motivo":"OS-1"}"#,
        )
        .unwrap();
        let input = MovementInput::from(request);
        assert_eq!(input.tipo, MovementType::Saida);
        assert_eq!(input.quantidade, 2);
    }

    #[test]
    fn create_request_rejects_negative_opening_balance() {
        let request = CreatePartRequest {
            codigo: "FLT-001".into(),
            nome: "Filtro".into(),
            quantidade_inicial: Some(-1),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }
}
