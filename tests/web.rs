use std::sync::Arc;

use almacen::app::{AppState, router};
use almacen::config::{Backend, Config, Edition};
use almacen::connector::{self, Connection};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app(edition: Edition) -> Router {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        edition,
        backend: Backend::Memory,
        secrets_path: dir.path().join("missing.json"),
        ..Config::default()
    };
    let connection = connector::establish(&config);
    assert!(connection.document.is_some());
    router(Arc::new(AppState::new(config, connection)))
}

/// Drives one app, carrying the session cookie between requests like a browser.
struct Browser {
    app: Router,
    cookie: Option<String>,
}

impl Browser {
    fn new(app: Router) -> Self {
        Browser { app, cookie: None }
    }

    async fn send(&mut self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        if let Some(set) = response.headers().get(header::SET_COOKIE) {
            let pair = set.to_str().unwrap().split(';').next().unwrap().to_string();
            self.cookie = Some(pair);
        }
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn json(&mut self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.send(method, uri, body).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

#[tokio::test]
async fn status_reports_the_edition() {
    let mut browser = Browser::new(app(Edition::V2));
    let (status, body) = browser.json("GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["edition"], "v2");
    assert_eq!(body["online"], true);
    assert_eq!(body["document"], "Inventario_Ricardo");
}

#[tokio::test]
async fn index_serves_the_edition_page() {
    let mut browser = Browser::new(app(Edition::V1));
    let (status, bytes) = browser.send("GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(bytes).unwrap().contains("Recargar Datos"));

    let mut browser = Browser::new(app(Edition::V3));
    let (_, bytes) = browser.send("GET", "/", None).await;
    assert!(String::from_utf8(bytes).unwrap().contains("Descargar CSV"));
}

#[tokio::test]
async fn ledger_stock_in_and_out() {
    let mut browser = Browser::new(app(Edition::V1));

    let (status, body) = browser
        .json("POST", "/api/inbound", Some(json!({"product": "tomato", "quantity": 10})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["movement"]["quantity"], 10);
    assert_eq!(body["movement"]["upsert"]["kind"], "appended");

    let (status, body) = browser
        .json("POST", "/api/outbound", Some(json!({"product": "TOMATO", "quantity": 3})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["movement"]["upsert"], json!({"kind": "updated", "row": 2}));

    let (_, body) = browser.json("GET", "/api/inventory", None).await;
    assert_eq!(body["items"], json!([{"product": "TOMATO", "quantity": 7}]));

    let (status, body) = browser
        .json("POST", "/api/outbound", Some(json!({"product": "TOMATO", "quantity": 8})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (_, body) = browser.json("GET", "/api/history", None).await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].as_str().unwrap().ends_with("INBOUND: +10 of TOMATO"));
    assert!(entries[1].as_str().unwrap().ends_with("OUTBOUND: -3 of TOMATO"));

    let (_, body) = browser.json("POST", "/api/reload", None).await;
    assert_eq!(body["items"], json!([{"product": "TOMATO", "quantity": 7}]));
}

#[tokio::test]
async fn unreadable_bodies_get_the_error_shape() {
    let mut browser = Browser::new(app(Edition::V1));
    let (status, body) = browser
        .json("POST", "/api/inbound", Some(json!({"product": "TOMATO", "quantity": "3"})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("quantity"));

    let request = Request::builder()
        .method("POST")
        .uri("/api/outbound")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"product\": "))
        .unwrap();
    let response = browser.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "error");

    let mut grid = Browser::new(app(Edition::V2));
    let (status, body) = grid
        .json("PUT", "/api/table", Some(json!({"rows": "none"})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");

    // nothing was recorded
    let (_, body) = browser.json("GET", "/api/inventory", None).await;
    assert_eq!(body["items"], json!([]));
}

#[tokio::test]
async fn sessions_keep_their_own_history() {
    let app = app(Edition::V1);
    let mut alice = Browser::new(app.clone());
    let mut bob = Browser::new(app);

    alice
        .json("POST", "/api/inbound", Some(json!({"product": "ONION", "quantity": 2})))
        .await;
    let (_, body) = bob.json("GET", "/api/history", None).await;
    assert_eq!(body["entries"], json!([]));

    // the sheet is shared, so bob sees the stock
    let (_, body) = bob.json("GET", "/api/inventory", None).await;
    assert_eq!(body["items"], json!([{"product": "ONION", "quantity": 2}]));
}

#[tokio::test]
async fn grid_select_edit_save_and_export() {
    let mut browser = Browser::new(app(Edition::V2));

    let (_, body) = browser.json("GET", "/api/table", None).await;
    assert_eq!(body["state"], "unloaded");

    let (status, body) = browser
        .json("POST", "/api/clients/select", Some(json!({"name": "Veggie"})))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["notice"], "created_new");
    assert_eq!(body["rows"], json!([]));
    assert_eq!(body["columns"].as_array().unwrap().len(), 9);

    let rows = json!([
        {"Date": "2024-05-01", "Lot#": "L1", "Initial": "5", "Product": "Kale", "Balance": 3},
        {"Product": "Leek", "Initial": "abc"}
    ]);
    let (status, body) = browser
        .json("PUT", "/api/table", Some(json!({ "rows": rows })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["state"], "dirty");
    assert_eq!(body["totals"]["initial"], 5.0);
    assert_eq!(body["rows"][1]["Initial"], 0.0);

    let (status, body) = browser.json("POST", "/api/table/save", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["state"], "saved");

    // selecting again reads back what was saved
    let (_, body) = browser
        .json("POST", "/api/clients/select", Some(json!({"name": "Veggie"})))
        .await;
    assert_eq!(body["notice"], "opened_existing");
    assert_eq!(body["rows"][0]["Product"], "Kale");
    assert_eq!(body["rows"][0]["Balance"], 3.0);

    let (_, body) = browser.json("GET", "/api/clients", None).await;
    assert_eq!(body["selected"], "Veggie");
    assert!(body["clients"].as_array().unwrap().contains(&json!("General")));

    let request = Request::builder()
        .uri("/api/table/export?format=csv")
        .header(header::COOKIE, browser.cookie.clone().unwrap())
        .body(Body::empty())
        .unwrap();
    let response = browser.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"Veggie_"));
    assert!(disposition.ends_with(".csv\""));
    let csv = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(csv.to_vec()).unwrap();
    assert!(csv.starts_with("Date,Lot#,Initial,Product,Balance"));
    assert!(csv.contains("2024-05-01,L1,5,Kale,3,,,,"));

    let (status, bytes) = browser
        .send("GET", "/api/table/export?format=xlsx", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(b"PK"));

    let (status, _) = browser
        .json("GET", "/api/table/export?format=pdf", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn grid_needs_a_selected_client() {
    let mut browser = Browser::new(app(Edition::V3));
    let (status, body) = browser.json("POST", "/api/table/save", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "no client selected");

    let (status, _) = browser
        .json("POST", "/api/clients/select", Some(json!({"name": "  "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn edition_routes_do_not_mix() {
    let mut ledger = Browser::new(app(Edition::V1));
    let (status, _) = ledger.send("GET", "/api/table", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut grid = Browser::new(app(Edition::V2));
    let (status, _) = grid.send("GET", "/api/inventory", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn degraded_mode_serves_empty_data() {
    let config = Config {
        edition: Edition::V2,
        backend: Backend::Memory,
        ..Config::default()
    };
    let state = AppState::new(config, Connection::degraded("Error connecting to Google: down"));
    let mut browser = Browser::new(router(Arc::new(state)));

    let (_, body) = browser.json("GET", "/api/status", None).await;
    assert_eq!(body["online"], false);
    assert_eq!(body["problem"], "Error connecting to Google: down");

    let (status, body) = browser
        .json("POST", "/api/clients/select", Some(json!({"name": "Veggie"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], json!([]));

    let (status, _) = browser.json("POST", "/api/table/save", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
