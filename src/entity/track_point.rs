use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "track_point")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub lat_matched: Option<f64>,
    pub lon_matched: Option<f64>,
    pub roughness: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
