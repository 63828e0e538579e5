//! Road state HTTP API.

use actix_web::middleware::Logger;
use actix_web::{App, HttpResponse, HttpServer, web};
use anyhow::Result;
use geo_types::Point;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::store::{NearestLookup, NewTrackPoint, TrackPointStore};

pub const DEFAULT_RADIUS_M: f64 = 50.0;

#[derive(Debug, Deserialize)]
pub struct RoadStateQuery {
    pub lat: f64,
    pub lon: f64,
    pub radius_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPointPayload {
    pub lat_matched: Option<f64>,
    pub lon_matched: Option<f64>,
    pub roughness: Option<String>,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// State of the nearest measured point
async fn road_state(
    store: web::Data<TrackPointStore>,
    query: web::Query<RoadStateQuery>,
) -> ApiResult<HttpResponse> {
    let radius_m = query.radius_m.unwrap_or(DEFAULT_RADIUS_M);
    if !(radius_m.is_finite() && radius_m > 0.0) {
        return Err(ApiError::Unprocessable(format!(
            "radius_m must be positive, got {}",
            radius_m
        )));
    }

    match store
        .nearest_state(Point::new(query.lon, query.lat), radius_m)
        .await?
    {
        NearestLookup::Found { state, .. } => {
            Ok(HttpResponse::Ok().json(json!({ "state": state.as_str() })))
        }
        NearestLookup::NoPointsNear => {
            Err(ApiError::NotFound("No points near this location".to_string()))
        }
        NearestLookup::OutOfRadius { .. } => {
            Err(ApiError::NotFound("No points within radius".to_string()))
        }
    }
}

async fn db_points(store: web::Data<TrackPointStore>) -> ApiResult<HttpResponse> {
    let rows: Vec<TrackPointPayload> = store
        .all_rows()
        .await?
        .into_iter()
        .map(|row| TrackPointPayload {
            lat_matched: row.lat_matched,
            lon_matched: row.lon_matched,
            roughness: row.roughness,
        })
        .collect();
    Ok(HttpResponse::Ok().json(rows))
}

async fn create_track_point(
    store: web::Data<TrackPointStore>,
    payload: web::Json<TrackPointPayload>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    let (Some(lat), Some(lon)) = (payload.lat_matched, payload.lon_matched) else {
        return Err(ApiError::Unprocessable(
            "lat_matched and lon_matched are required".to_string(),
        ));
    };

    let id = store
        .insert(NewTrackPoint {
            lat,
            lon,
            roughness: payload.roughness.filter(|r| !r.trim().is_empty()),
        })
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "ok", "id": id })))
}

async fn delete_track_points(store: web::Data<TrackPointStore>) -> ApiResult<HttpResponse> {
    let deleted = store.delete_all().await?;
    Ok(HttpResponse::Ok().json(json!({ "deleted": deleted })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/road_state", web::get().to(road_state))
        .route("/db_points", web::get().to(db_points))
        .service(
            web::resource("/track_points")
                .route(web::post().to(create_track_point))
                .route(web::delete().to(delete_track_points)),
        );
}

pub async fn serve(store: TrackPointStore, host: &str, port: u16) -> Result<()> {
    let data = web::Data::new(store);
    info!("Starting road state API at {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await?;

    Ok(())
}
