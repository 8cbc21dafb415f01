//! Stock ledger writer.
//!
//! Every change to a part's `quantidade_atual` goes through here: the part
//! row is read (locked where the backend supports it), the new quantity is
//! derived with the pure rules in [`crate::services::stock`], and the write
//! is a compare-and-set on the value that was read. A lost race rolls the
//! transaction back and retries with a fresh read. On SQLite the write
//! transactions also pass through the pool's [`WriteGate`].

use crate::{
    db::{is_write_contention, DbPool, WriteGate},
    entities::movimentacao_estoque::{self, Entity as MovementEntity, MovementType},
    entities::peca::{self, Entity as PartEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::SHOP_METRICS,
    services::stock::{next_quantity, reversed_quantity, StockRuleError},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    DbBackend, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// A movement to apply to one part
#[derive(Debug, Clone)]
pub struct MovementInput {
    pub tipo: MovementType,
    pub quantidade: i32,
    pub motivo: Option<String>,
    pub ordem_servico_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct MovementOutcome {
    pub movement: movimentacao_estoque::Model,
    pub part: peca::Model,
}

/// Reads a part, taking a row lock on backends that have one.
pub(crate) async fn read_part_for_update<C: ConnectionTrait>(
    conn: &C,
    part_id: Uuid,
) -> Result<peca::Model, ServiceError> {
    let mut query = PartEntity::find_by_id(part_id);
    if conn.get_database_backend() != DbBackend::Sqlite {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("part {}", part_id)))
}

/// `UPDATE pecas SET quantidade_atual = :new WHERE id = :id AND quantidade_atual = :expected`.
/// Returns false when another writer got there first.
pub(crate) async fn compare_and_set_quantity<C: ConnectionTrait>(
    conn: &C,
    part_id: Uuid,
    expected: i32,
    new_quantity: i32,
) -> Result<bool, ServiceError> {
    let result = PartEntity::update_many()
        .col_expr(peca::Column::QuantidadeAtual, Expr::value(new_quantity))
        .col_expr(peca::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(peca::Column::Id.eq(part_id))
        .filter(peca::Column::QuantidadeAtual.eq(expected))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Applies one movement on an open transaction.
///
/// `Ok(None)` means the compare-and-set lost; the caller must roll back.
pub(crate) async fn apply_movement_in<C: ConnectionTrait>(
    conn: &C,
    part_id: Uuid,
    input: &MovementInput,
) -> Result<Option<MovementOutcome>, ServiceError> {
    let part = read_part_for_update(conn, part_id).await?;
    let anterior = part.quantidade_atual;
    let nova = next_quantity(anterior, input.tipo, input.quantidade).map_err(|e| {
        if matches!(e, StockRuleError::Insufficient { .. }) {
            SHOP_METRICS.stock_rejections.inc();
        }
        e.for_part(&part.codigo)
    })?;

    if !compare_and_set_quantity(conn, part_id, anterior, nova).await? {
        return Ok(None);
    }

    let movement = movimentacao_estoque::ActiveModel {
        id: Set(Uuid::new_v4()),
        peca_id: Set(part_id),
        tipo_movimentacao: Set(input.tipo.to_string()),
        quantidade: Set(input.quantidade),
        quantidade_anterior: Set(anterior),
        quantidade_nova: Set(nova),
        motivo: Set(input.motivo.clone()),
        ordem_servico_id: Set(input.ordem_servico_id),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    let part = peca::Model {
        quantidade_atual: nova,
        ..part
    };
    Ok(Some(MovementOutcome { movement, part }))
}

/// Runs `attempt` until it yields a value, at most `max_retries` times.
///
/// `Ok(None)` is a lost compare-and-set and a busy or deadlocked database is
/// a lost race too; both go around again. Any other error is returned as is.
pub(crate) async fn with_cas_retries<T, F, Fut>(
    max_retries: u32,
    id: Uuid,
    mut attempt: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ServiceError>>,
{
    for n in 1..=max_retries {
        match attempt().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                SHOP_METRICS.stock_cas_retries.inc();
                debug!(attempt = n, "Stock compare-and-set lost, retrying");
            }
            Err(ServiceError::DatabaseError(e)) if is_write_contention(&e) => {
                SHOP_METRICS.stock_cas_retries.inc();
                debug!(attempt = n, error = %e, "Stock write contended, retrying");
                tokio::time::sleep(Duration::from_millis(5 * u64::from(n))).await;
            }
            Err(e) => return Err(e),
        }
    }

    SHOP_METRICS.stock_conflicts.inc();
    warn!(retries = max_retries, id = %id, "Giving up on contended stock update");
    Err(ServiceError::ConcurrentModification(id))
}

/// Single writer of the stock ledger
#[derive(Clone)]
pub struct StockLedger {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    write_gate: WriteGate,
    max_retries: u32,
}

impl StockLedger {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        write_gate: WriteGate,
        max_retries: u32,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            write_gate,
            max_retries: max_retries.max(1),
        }
    }

    async fn begin(&self) -> Result<DatabaseTransaction, ServiceError> {
        self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start stock transaction");
            ServiceError::DatabaseError(e)
        })
    }

    async fn commit(&self, txn: DatabaseTransaction) -> Result<(), ServiceError> {
        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit stock transaction");
            ServiceError::DatabaseError(e)
        })
    }

    /// One gated transaction around [`apply_movement_in`].
    async fn try_apply(
        &self,
        part_id: Uuid,
        input: &MovementInput,
    ) -> Result<Option<MovementOutcome>, ServiceError> {
        let _gate = self.write_gate.enter().await;
        let txn = self.begin().await?;
        match apply_movement_in(&txn, part_id, input).await? {
            Some(outcome) => {
                self.commit(txn).await?;
                Ok(Some(outcome))
            }
            None => {
                txn.rollback().await?;
                Ok(None)
            }
        }
    }

    /// One gated transaction deleting a movement and restoring its part.
    /// Yields the part as read and the restored quantity.
    async fn try_reverse(
        &self,
        movement_id: Uuid,
    ) -> Result<Option<(peca::Model, i32)>, ServiceError> {
        let _gate = self.write_gate.enter().await;
        let txn = self.begin().await?;

        let movement = MovementEntity::find_by_id(movement_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("stock movement {}", movement_id)))?;
        let tipo = movement.movement_type()?;
        let part = read_part_for_update(&txn, movement.peca_id).await?;

        let restored = reversed_quantity(
            part.quantidade_atual,
            tipo,
            movement.quantidade,
            movement.quantidade_anterior,
            movement.quantidade_nova,
        )
        .map_err(|e| e.for_part(&part.codigo))?;

        if !compare_and_set_quantity(&txn, part.id, part.quantidade_atual, restored).await? {
            txn.rollback().await?;
            return Ok(None);
        }
        MovementEntity::delete_by_id(movement_id).exec(&txn).await?;
        self.commit(txn).await?;
        Ok(Some((part, restored)))
    }

    /// Applies a movement (`entrada`, `saida` or `ajuste`) and records it,
    /// atomically.
    #[instrument(skip(self, input), fields(part_id = %part_id, tipo = %input.tipo, quantidade = input.quantidade))]
    pub async fn apply_movement(
        &self,
        part_id: Uuid,
        input: MovementInput,
    ) -> Result<MovementOutcome, ServiceError> {
        let input = &input;
        let outcome = with_cas_retries(self.max_retries, part_id, move || {
            self.try_apply(part_id, input)
        })
        .await?;

        SHOP_METRICS.record_movement(input.tipo);
        info!(
            movement_id = %outcome.movement.id,
            quantidade_anterior = outcome.movement.quantidade_anterior,
            quantidade_nova = outcome.movement.quantidade_nova,
            "Stock movement applied"
        );
        self.publish_movement(&outcome).await;
        Ok(outcome)
    }

    /// Deletes a movement and posts the compensating change to its part.
    #[instrument(skip(self), fields(movement_id = %movement_id))]
    pub async fn reverse_movement(&self, movement_id: Uuid) -> Result<peca::Model, ServiceError> {
        let (part, restored) = with_cas_retries(self.max_retries, movement_id, move || {
            self.try_reverse(movement_id)
        })
        .await?;

        SHOP_METRICS.stock_movements_reversed.inc();
        info!(
            part_id = %part.id,
            quantidade_anterior = part.quantidade_atual,
            quantidade_nova = restored,
            "Stock movement reversed"
        );
        self.event_sender
            .send_or_log(Event::StockMovementReversed {
                movement_id,
                part_id: part.id,
                quantidade_anterior: part.quantidade_atual,
                quantidade_nova: restored,
            })
            .await;

        let part = peca::Model {
            quantidade_atual: restored,
            ..part
        };
        self.publish_low_stock(&part).await;
        Ok(part)
    }

    /// Gate shared with the catalog writes in `PartService`.
    pub(crate) fn write_gate(&self) -> &WriteGate {
        &self.write_gate
    }

    pub(crate) async fn publish_movement(&self, outcome: &MovementOutcome) {
        let movement = &outcome.movement;
        if let Ok(tipo) = movement.movement_type() {
            self.event_sender
                .send_or_log(Event::StockMovementRecorded {
                    movement_id: movement.id,
                    part_id: movement.peca_id,
                    tipo,
                    quantidade: movement.quantidade,
                    quantidade_anterior: movement.quantidade_anterior,
                    quantidade_nova: movement.quantidade_nova,
                })
                .await;
        }
        self.publish_low_stock(&outcome.part).await;
    }

    async fn publish_low_stock(&self, part: &peca::Model) {
        if part.quantidade_atual <= part.quantidade_minima {
            self.event_sender
                .send_or_log(Event::LowStockDetected {
                    part_id: part.id,
                    codigo: part.codigo.clone(),
                    quantidade_atual: part.quantidade_atual,
                    quantidade_minima: part.quantidade_minima,
                })
                .await;
        }
    }
}
