use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Catalog origin of a line item (labor or part).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ItemType {
    #[default]
    Servico,
    Peca,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "itens_servico")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub ordem_servico_id: Uuid,
    pub descricao: String,
    pub tipo_item: String,
    pub tipo_servico_id: Option<Uuid>,
    pub peca_id: Option<Uuid>,
    pub quantidade: i32,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub valor_unitario: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub valor_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ordem_servico::Entity",
        from = "Column::OrdemServicoId",
        to = "super::ordem_servico::Column::Id",
        on_delete = "Cascade"
    )]
    OrdemServico,
}

impl Related<super::ordem_servico::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrdemServico.def()
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
