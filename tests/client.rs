use std::fs;

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpServer, web};
use migration::{Migrator, MigratorTrait};
use roadstate::client::RoadStateClient;
use roadstate::server::configure;
use roadstate::state::RoadState;
use roadstate::store::TrackPointStore;
use sea_orm::{ConnectOptions, Database};
use serde_json::{Value, json};
use tempfile::tempdir;

async fn memory_store() -> TrackPointStore {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    TrackPointStore::new(db)
}

/// Serve the API on an ephemeral port, returns its base URL
async fn spawn_api() -> (String, ServerHandle) {
    let data = web::Data::new(memory_store().await);
    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(configure))
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
    let addr = server.addrs()[0];
    let server = server.run();
    let handle = server.handle();
    actix_web::rt::spawn(server);
    (format!("http://{}/", addr), handle)
}

#[actix_web::test]
async fn test_restore_backup_and_delete() {
    let (base_url, handle) = spawn_api().await;
    let client = RoadStateClient::new(&base_url).unwrap();
    let dir = tempdir().unwrap();

    let backup_in = dir.path().join("in.json");
    fs::write(
        &backup_in,
        json!([
            { "lat_matched": 50.0, "lon_matched": 8.0, "roughness": "GOOD" },
            { "lat": 50.001, "lon": 8.001, "state": "POOR" },
            { "roughness": "FAIR" }
        ])
        .to_string(),
    )
    .unwrap();

    // The row without coordinates is rejected and skipped
    assert_eq!(client.restore(&backup_in).await.unwrap(), 2);

    let points = client.db_points().await.unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].state, RoadState::Good);
    assert_eq!(points[1].state, RoadState::Poor);

    let backup_out = dir.path().join("out.json");
    assert_eq!(client.backup(&backup_out).await.unwrap(), 2);
    let text = fs::read_to_string(&backup_out).unwrap();
    assert!(text.contains("\n  "), "not pretty printed: {}", text);
    let rows: Vec<Value> = serde_json::from_str(&text).unwrap();
    assert_eq!(rows[1]["roughness"], "POOR");

    assert_eq!(client.delete_all().await.unwrap(), json!({ "deleted": 2 }));
    assert!(client.db_points().await.unwrap().is_empty());

    handle.stop(true).await;
}

#[actix_web::test]
async fn test_unreachable_api() {
    // Nothing listens on the discard port
    let client = RoadStateClient::new("http://127.0.0.1:9").unwrap();

    assert!(client.db_points().await.is_err());
    assert!(client.db_points_or_empty().await.is_empty());
    assert!(client.delete_all().await.is_err());

    let dir = tempdir().unwrap();
    let path = dir.path().join("backup.json");
    fs::write(&path, json!([{ "lat": 50.0, "lon": 8.0, "state": "GOOD" }]).to_string()).unwrap();
    assert_eq!(client.restore(&path).await.unwrap(), 0);
}
