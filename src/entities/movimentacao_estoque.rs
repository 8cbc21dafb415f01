use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Kind of stock movement
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MovementType {
    /// Stock received: adds to the current quantity
    Entrada,
    /// Stock consumed: subtracts, never below zero
    #[serde(alias = "saída")]
    #[strum(to_string = "saida", serialize = "saída")]
    Saida,
    /// Physical count: overwrites the current quantity
    Ajuste,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "movimentacoes_estoque")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
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

impl Model {
    pub fn movement_type(&self) -> Result<MovementType, DbErr> {
        self.tipo_movimentacao.parse().map_err(|_| {
            DbErr::Type(format!(
                "unknown tipo_movimentacao '{}' on movement {}",
                self.tipo_movimentacao, self.id
            ))
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::peca::Entity",
        from = "Column::PecaId",
        to = "super::peca::Column::Id"
    )]
    Peca,
}

impl Related<super::peca::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Peca.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
