use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tracker_frontend::shared::{
    DatetimeLookupResponse, Direction, PageResponse, SearchResponse, TelemetryRow,
};
use tracker_frontend::telemetry_table::error::SourceError;
use tracker_frontend::telemetry_table::source::{DatetimeQuery, PageQuery, SearchQuery};
use tracker_frontend::telemetry_table::{
    DataSource, HttpDataSource, LoadOutcome, NullSink, TableOptions, VirtualTable,
};

type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

fn row(id: u64) -> TelemetryRow {
    TelemetryRow {
        id,
        module_id: "0A1F".into(),
        module_name: Some("rover".into()),
        datetime_unix: Some(1_756_000_000 + id as i64),
        lat: None,
        lon: None,
        alt: None,
        rssi: Some(-80),
        snr: None,
        source: None,
        jumps: None,
    }
}

async fn page(
    State(seen): State<Seen>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<PageResponse> {
    let offset: u64 = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit: u64 = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(50);
    seen.lock().unwrap().push(params);
    Json(PageResponse {
        data: (offset + 1..=offset + limit).map(row).collect(),
        total_count: Some(500),
        total_visible_count: Some(450),
        has_more: Some(true),
    })
}

async fn datetime(Query(params): Query<HashMap<String, String>>) -> Json<DatetimeLookupResponse> {
    let target = params
        .get("datetime")
        .and_then(|v| v.parse::<i64>().ok())
        .map(|t| (t - 1_756_000_000) as u64);
    Json(DatetimeLookupResponse {
        success: target.is_some(),
        target_id: target,
        data: target.map(|id| vec![row(id)]).unwrap_or_default(),
    })
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<SearchResponse> {
    let found = params.get("value").map(String::as_str) == Some("rover");
    Json(SearchResponse {
        success: found,
        target_id: found.then_some(42),
        message: (!found).then(|| "not found".to_string()),
    })
}

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}/api/table/users")
}

async fn table_server() -> (String, Seen) {
    let seen: Seen = Arc::default();
    let router = Router::new()
        .route("/api/table/users", get(page))
        .route("/api/table/users/datetime", get(datetime))
        .route("/api/table/users/search", get(search))
        .with_state(seen.clone());
    (spawn_server(router).await, seen)
}

fn source_for(api_url: &str) -> HttpDataSource {
    HttpDataSource::new(&TableOptions {
        api_url: api_url.to_string(),
        ..TableOptions::default()
    })
    .expect("client")
}

#[tokio::test]
async fn fetches_pages_with_session_filter() {
    let (api_url, seen) = table_server().await;
    let source = source_for(&api_url);

    let page = source
        .fetch_page(PageQuery::window(Some(9), vec![3, 4], 51, 25, Direction::Down))
        .await
        .expect("page");
    assert_eq!(page.data.len(), 25);
    assert_eq!(page.data[0].id, 51);
    assert_eq!(page.total_visible_count, Some(450));

    let params = seen.lock().unwrap()[0].clone();
    assert_eq!(params["id_session"], "9");
    assert_eq!(params["modules"], "3,4");
    assert_eq!(params["offset"], "50");
    assert_eq!(params["direction"], "down");
}

#[tokio::test]
async fn lookup_and_search_routes() {
    let (api_url, _seen) = table_server().await;
    let source = source_for(&api_url);

    let found = source
        .lookup_datetime(DatetimeQuery {
            session_id: None,
            modules: Vec::new(),
            limit: 50,
            datetime_unix: 1_756_000_120,
        })
        .await
        .expect("lookup");
    assert!(found.success);
    assert_eq!(found.target_id, Some(120));
    assert_eq!(found.data[0].module_id, "0A1F");

    let hit = source
        .search(SearchQuery {
            field: "module_name".into(),
            value: "rover".into(),
        })
        .await
        .expect("search");
    assert_eq!(hit.target_id, Some(42));

    let miss = source
        .search(SearchQuery {
            field: "module_name".into(),
            value: "lander".into(),
        })
        .await
        .expect("search");
    assert!(!miss.success);
    assert_eq!(miss.message.as_deref(), Some("not found"));
}

#[tokio::test]
async fn server_errors_surface_as_status() {
    let router = Router::new().route(
        "/api/table/users",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let api_url = spawn_server(router).await;
    let source = source_for(&api_url);

    let err = source
        .fetch_page(PageQuery::window(None, Vec::new(), 1, 50, Direction::Down))
        .await
        .expect_err("500");
    assert!(matches!(err, SourceError::Status(500)));

    let table = VirtualTable::new(
        TableOptions {
            api_url,
            ..TableOptions::default()
        },
        Arc::new(source),
        Arc::new(NullSink),
    )
    .expect("valid options");
    assert_eq!(table.load_data(1, Direction::Down).await, LoadOutcome::Failed);
    assert!(!table.is_loading());
}

#[tokio::test]
async fn table_loads_over_http() {
    let (api_url, seen) = table_server().await;
    let source = source_for(&api_url);
    let table = VirtualTable::new(
        TableOptions {
            api_url,
            placeholder_self_heal: false,
            ..TableOptions::default()
        },
        Arc::new(source),
        Arc::new(NullSink),
    )
    .expect("valid options");

    assert!(matches!(
        table.load_initial_data().await,
        LoadOutcome::Loaded { inserted: 50, .. }
    ));
    let stats = table.stats();
    assert_eq!(stats.total_count, 500);
    assert_eq!(stats.total_visible_count, 450);
    assert!(!seen.lock().unwrap()[0].contains_key("id_session"));
    table.destroy();
}
