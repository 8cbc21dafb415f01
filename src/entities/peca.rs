use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use utoipa::ToSchema;
use uuid::Uuid;

/// Badge shown next to a part's quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StockStatus {
    Baixo,
    Normal,
    Excesso,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pecas")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub codigo: String,
    pub nome: String,
    pub descricao: Option<String>,
    /// Denormalized cache of the stock ledger; written only by the ledger.
    pub quantidade_atual: i32,
    pub quantidade_minima: i32,
    pub quantidade_maxima: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub preco_custo: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub preco_venda: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Threshold badge. Thresholds never block a movement.
    pub fn stock_status(&self) -> StockStatus {
        if self.quantidade_atual <= self.quantidade_minima {
            StockStatus::Baixo
        } else if matches!(self.quantidade_maxima, Some(max) if self.quantidade_atual > max) {
            StockStatus::Excesso
        } else {
            StockStatus::Normal
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::movimentacao_estoque::Entity")]
    Movimentacoes,
}

impl Related<super::movimentacao_estoque::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movimentacoes.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }
        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(atual: i32, minima: i32, maxima: Option<i32>) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            codigo: "FLT-001".into(),
            nome: "Filtro de oleo".into(),
            descricao: None,
            quantidade_atual: atual,
            quantidade_minima: minima,
            quantidade_maxima: maxima,
            preco_custo: None,
            preco_venda: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stock_status_badges() {
        assert_eq!(part(2, 2, None).stock_status(), StockStatus::Baixo);
        assert_eq!(part(0, 0, Some(10)).stock_status(), StockStatus::Baixo);
        assert_eq!(part(5, 2, None).stock_status(), StockStatus::Normal);
        assert_eq!(part(10, 2, Some(10)).stock_status(), StockStatus::Normal);
        assert_eq!(part(11, 2, Some(10)).stock_status(), StockStatus::Excesso);
    }
}
