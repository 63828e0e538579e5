use std::time::Duration;

use anyhow::Result;
use geo_types::Point;
use log::{debug, info};
use ordered_float::OrderedFloat;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};

use crate::entity::track_point;
use crate::geometry::{DegreeBox, haversine_m, radius_bbox};
use crate::io::MatchedRow;
use crate::state::RoadState;
use crate::track::TrackPoint;

const INSERT_CHUNK: usize = 1000;

/// Row to insert into `track_point`
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub roughness: Option<String>,
}

impl NewTrackPoint {
    fn into_active_model(self) -> track_point::ActiveModel {
        track_point::ActiveModel {
            id: NotSet,
            lat_matched: Set(Some(self.lat)),
            lon_matched: Set(Some(self.lon)),
            roughness: Set(self.roughness),
        }
    }
}

/// Outcome of a nearest-point lookup
#[derive(Debug, Clone, PartialEq)]
pub enum NearestLookup {
    Found { state: RoadState, distance_m: f64 },
    /// Nothing in the bounding box around the query
    NoPointsNear,
    /// Closest point lies outside the radius
    OutOfRadius { distance_m: f64 },
}

/// Repository over the `track_point` table
#[derive(Debug, Clone)]
pub struct TrackPointStore {
    db: DatabaseConnection,
}

impl TrackPointStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let mut options = ConnectOptions::new(url.to_string());
        options
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);
        let db = Database::connect(options).await?;
        info!("Connected to database");
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// All measured points with coordinates and a roughness label
    pub async fn load_points(&self) -> Result<Vec<TrackPoint>> {
        let rows = track_point::Entity::find()
            .filter(track_point::Column::LatMatched.is_not_null())
            .filter(track_point::Column::LonMatched.is_not_null())
            .filter(track_point::Column::Roughness.is_not_null())
            .all(&self.db)
            .await?;

        let points: Vec<TrackPoint> = rows.iter().filter_map(to_track_point).collect();
        info!("Loaded {} points with state from the database", points.len());
        Ok(points)
    }

    /// Rows with coordinates, roughness may be missing
    pub async fn all_rows(&self) -> Result<Vec<track_point::Model>> {
        Ok(track_point::Entity::find()
            .filter(track_point::Column::LatMatched.is_not_null())
            .filter(track_point::Column::LonMatched.is_not_null())
            .order_by_asc(track_point::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn points_in_bbox(&self, bbox: &DegreeBox) -> Result<Vec<track_point::Model>> {
        Ok(track_point::Entity::find()
            .filter(track_point::Column::LatMatched.between(bbox.min_lat, bbox.max_lat))
            .filter(track_point::Column::LonMatched.between(bbox.min_lon, bbox.max_lon))
            .all(&self.db)
            .await?)
    }

    /// State of the closest measured point within `radius_m` of `center`
    pub async fn nearest_state(&self, center: Point<f64>, radius_m: f64) -> Result<NearestLookup> {
        let rows = self.points_in_bbox(&radius_bbox(center, radius_m)).await?;
        if rows.is_empty() {
            return Ok(NearestLookup::NoPointsNear);
        }

        let nearest = rows
            .iter()
            .filter_map(|row| {
                let p = Point::new(row.lon_matched?, row.lat_matched?);
                Some((haversine_m(center, p), row))
            })
            .min_by_key(|(d, _)| OrderedFloat(*d));

        Ok(match nearest {
            None => NearestLookup::NoPointsNear,
            Some((distance_m, _)) if distance_m > radius_m => {
                NearestLookup::OutOfRadius { distance_m }
            }
            Some((distance_m, row)) => NearestLookup::Found {
                state: row
                    .roughness
                    .as_deref()
                    .map(RoadState::parse)
                    .unwrap_or(RoadState::NotMeasured),
                distance_m,
            },
        })
    }

    pub async fn insert(&self, point: NewTrackPoint) -> Result<i32> {
        let result = track_point::Entity::insert(point.into_active_model())
            .exec(&self.db)
            .await?;
        Ok(result.last_insert_id)
    }

    pub async fn insert_many(&self, points: Vec<NewTrackPoint>) -> Result<usize> {
        let total = points.len();
        let mut models = points.into_iter().map(NewTrackPoint::into_active_model);

        loop {
            let chunk: Vec<track_point::ActiveModel> = models.by_ref().take(INSERT_CHUNK).collect();
            if chunk.is_empty() {
                break;
            }
            debug!("Inserting chunk of {} track points", chunk.len());
            track_point::Entity::insert_many(chunk).exec(&self.db).await?;
        }

        Ok(total)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let result = track_point::Entity::delete_many().exec(&self.db).await?;
        info!("Deleted {} track points", result.rows_affected);
        Ok(result.rows_affected)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(track_point::Entity::find().count(&self.db).await?)
    }

    pub async fn sample(&self, limit: u64) -> Result<Vec<track_point::Model>> {
        Ok(track_point::Entity::find()
            .order_by_asc(track_point::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    /// Row count per roughness label, ordered by label
    pub async fn roughness_distribution(&self) -> Result<Vec<(Option<String>, i64)>> {
        Ok(track_point::Entity::find()
            .select_only()
            .column(track_point::Column::Roughness)
            .column_as(Expr::col(track_point::Column::Id).count(), "count")
            .group_by(track_point::Column::Roughness)
            .order_by_asc(track_point::Column::Roughness)
            .into_tuple::<(Option<String>, i64)>()
            .all(&self.db)
            .await?)
    }
}

fn to_track_point(row: &track_point::Model) -> Option<TrackPoint> {
    Some(TrackPoint::new(
        row.lat_matched?,
        row.lon_matched?,
        RoadState::parse(row.roughness.as_deref()?),
    ))
}

/// Replace the table contents with the rows of a matched CSV.
///
/// Rows without coordinates are skipped and blank roughness is stored as null.
/// Returns the number of inserted rows.
pub async fn import_matched_csv(store: &TrackPointStore, rows: &[MatchedRow]) -> Result<usize> {
    let deleted = store.delete_all().await?;
    info!("Cleared {} existing rows before import", deleted);

    let points: Vec<NewTrackPoint> = rows
        .iter()
        .filter_map(|row| {
            let p = row.matched?;
            Some(NewTrackPoint {
                lat: p.y(),
                lon: p.x(),
                roughness: row
                    .roughness
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string),
            })
        })
        .collect();

    let inserted = store.insert_many(points).await?;
    info!("Imported {} rows", inserted);
    Ok(inserted)
}
