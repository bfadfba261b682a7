//! `SeaORM` Entity for lots table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "lots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_variant_id: Uuid,
    pub batch_id: Uuid,
    pub quantity_on_hand: Decimal,
    pub cost_price: Decimal,
    pub mrp: Decimal,
    pub selling_price: Decimal,
    pub wholesale_price: Decimal,
    pub manufactured_on: Option<Date>,
    pub expires_on: Option<Date>,
    pub supplier_id: Option<Uuid>,
    pub grn_id: Option<Uuid>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::batches::Entity",
        from = "Column::BatchId",
        to = "super::batches::Column::Id"
    )]
    Batches,
    #[sea_orm(
        belongs_to = "super::carriers::Entity",
        from = "Column::GrnId",
        to = "super::carriers::Column::Id"
    )]
    Carriers,
}

impl Related<super::batches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batches.def()
    }
}

impl Related<super::carriers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Carriers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
