use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TrackPoint::Table)
                    .if_not_exists()
                    .col(pk_auto(TrackPoint::Id))
                    .col(double_null(TrackPoint::LatMatched))
                    .col(double_null(TrackPoint::LonMatched))
                    .col(string_null(TrackPoint::Roughness))
                    .to_owned(),
            )
            .await?;

        // Bounding box lookups from the road state endpoint
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_track_point_lat_lon")
                    .table(TrackPoint::Table)
                    .col(TrackPoint::LatMatched)
                    .col(TrackPoint::LonMatched)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .if_exists()
                    .name("idx_track_point_lat_lon")
                    .table(TrackPoint::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(TrackPoint::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TrackPoint {
    Table,
    Id,
    LatMatched,
    LonMatched,
    Roughness,
}
