use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Local;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::connector::Connection;
use crate::downloader;
use crate::error::{InventoryError, Result};
use crate::ledger::Direction;
use crate::session::{GridTab, Session, SessionStore, TabState};
use crate::table::{InventoryRow, InventoryTable};

const SESSION_COOKIE: &str = "session";

/// Everything a request handler can reach.
pub struct AppState {
    pub config: Config,
    pub connection: Connection,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config, connection: Connection) -> Self {
        let sessions = SessionStore::new(config.session_ttl);
        AppState {
            config,
            connection,
            sessions,
        }
    }
}

#[derive(Deserialize)]
struct MovementRequest {
    product: String,
    quantity: i64,
}

#[derive(Deserialize)]
struct SelectRequest {
    name: String,
}

#[derive(Deserialize)]
struct TableUpdate {
    rows: Vec<InventoryRow>,
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

#[derive(Serialize)]
struct SaveResponse {
    status: String,
    message: Option<String>,
}

/// A failed request, rendered as `{status: "error", message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        let status = match &err {
            InventoryError::Validation(_) => StatusCode::BAD_REQUEST,
            InventoryError::StaleWrite { .. } => StatusCode::CONFLICT,
            InventoryError::Offline | InventoryError::Connection(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            InventoryError::TabResolution { .. } | InventoryError::Remote(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("{err}");
        }
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = SaveResponse {
            status: "error".to_string(),
            message: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// A JSON request body, or the error response explaining why it could not be read.
type Payload<T> = std::result::Result<Json<T>, JsonRejection>;

/// Build the router for the configured edition.
///
/// Both editions serve `/`, `/api/status` and the `/static` directory. The ledger
/// edition adds the stock in/out endpoints; the grid editions add client selection,
/// table editing, saving and export.
pub fn router(state: Arc<AppState>) -> Router {
    let common = Router::new()
        .route("/", get(serve_index))
        .route("/api/status", get(get_status))
        .nest_service("/static", ServeDir::new("static"));

    let edition = if state.config.edition.is_grid() {
        Router::new()
            .route("/api/clients", get(list_clients))
            .route("/api/clients/select", post(select_client))
            .route("/api/table", get(get_table).put(edit_table))
            .route("/api/table/save", post(save_table))
            .route("/api/table/export", get(export_table))
    } else {
        Router::new()
            .route("/api/inbound", post(stock_in))
            .route("/api/outbound", post(stock_out))
            .route("/api/inventory", get(get_inventory))
            .route("/api/reload", post(reload_inventory))
            .route("/api/history", get(get_history))
    };

    common.merge(edition).with_state(state)
}

/// Bind the configured address and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let addr = state.config.bind_addr.clone();
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "Listening on http://{addr} ({} edition)",
        state.config.edition.as_str()
    );
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Run `work` against the caller's session on the blocking pool.
///
/// The session is taken from the `session` cookie, or started (and the cookie set) when
/// the cookie is missing or stale.
async fn with_session<T, F>(
    state: Arc<AppState>,
    jar: CookieJar,
    work: F,
) -> (CookieJar, ApiResult<T>)
where
    T: Send + 'static,
    F: FnOnce(&AppState, &mut Session) -> Result<T> + Send + 'static,
{
    let presented = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let (id, handle) = state.sessions.open(presented.as_deref());
    let jar = if presented.as_deref() == Some(id.as_str()) {
        jar
    } else {
        let mut cookie = Cookie::new(SESSION_COOKIE, id);
        cookie.set_path("/");
        cookie.set_http_only(true);
        jar.add(cookie)
    };

    let outcome = tokio::task::spawn_blocking(move || {
        let mut session = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        work(&*state, &mut *session)
    })
    .await;

    let result = match outcome {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            error!("request worker failed: {e}");
            Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "internal error".to_string(),
            })
        }
    };
    (jar, result)
}

async fn serve_index(State(state): State<Arc<AppState>>) -> Html<&'static str> {
    if state.config.edition.is_grid() {
        Html(include_str!("./static/grid.html"))
    } else {
        Html(include_str!("./static/ledger.html"))
    }
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let connection = &state.connection;
    Json(json!({
        "status": "ok",
        "edition": state.config.edition.as_str(),
        "document": state.config.document_name,
        "online": connection.document.is_some(),
        "problem": connection.problem,
        "url": connection.document.as_ref().and_then(|d| d.url()),
    }))
}

fn inventory_json(state: &AppState, session: &mut Session) -> Result<Value> {
    let ledger = session.ledger(&state.connection)?;
    let items: Vec<Value> = ledger
        .products()
        .map(|(product, quantity)| json!({ "product": product, "quantity": quantity }))
        .collect();
    Ok(json!({ "status": "ok", "items": items }))
}

async fn move_stock(
    state: Arc<AppState>,
    jar: CookieJar,
    payload: Payload<MovementRequest>,
    direction: Direction,
) -> (CookieJar, ApiResult<Json<Value>>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return (jar, Err(ApiError::from(rejection))),
    };
    let (jar, result) = with_session(state, jar, move |state, session| {
        let movement = session.move_stock(
            &state.connection,
            &request.product,
            request.quantity,
            direction,
        )?;
        let message = format!(
            "{} of {} recorded, {} in stock",
            movement.delta, movement.product, movement.quantity
        );
        Ok(json!({ "status": "ok", "message": message, "movement": movement }))
    })
    .await;
    (jar, result.map(Json))
}

async fn stock_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Payload<MovementRequest>,
) -> impl IntoResponse {
    move_stock(state, jar, payload, Direction::Inbound).await
}

async fn stock_out(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Payload<MovementRequest>,
) -> impl IntoResponse {
    move_stock(state, jar, payload, Direction::Outbound).await
}

async fn get_inventory(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, result) = with_session(state, jar, inventory_json).await;
    (jar, result.map(Json))
}

async fn reload_inventory(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> impl IntoResponse {
    let (jar, result) = with_session(state, jar, |state, session| {
        session.reload_ledger(&state.connection)?;
        inventory_json(state, session)
    })
    .await;
    (jar, result.map(Json))
}

async fn get_history(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, result) = with_session(state, jar, |_, session| {
        Ok(json!({ "status": "ok", "entries": session.history().entries() }))
    })
    .await;
    (jar, result.map(Json))
}

fn table_json(grid: Option<&GridTab>) -> Value {
    let empty = InventoryTable::default();
    let table = grid.map_or(&empty, |g| &g.table);
    json!({
        "status": "ok",
        "client": grid.map(|g| g.client.as_str()),
        "state": grid.map_or(TabState::Unloaded, |g| g.state),
        "columns": InventoryTable::columns(),
        "rows": table.rows,
        "totals": table.totals(),
    })
}

async fn list_clients(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, result) = with_session(state, jar, |state, session| {
        let clients = session.clients(&state.config.clients, &state.connection);
        let selected = session.grid().map(|g| g.client.clone());
        Ok(json!({ "status": "ok", "clients": clients, "selected": selected }))
    })
    .await;
    (jar, result.map(Json))
}

async fn select_client(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Payload<SelectRequest>,
) -> impl IntoResponse {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return (jar, Err(ApiError::from(rejection))),
    };
    let (jar, result) = with_session(state, jar, move |state, session| {
        let notice =
            session.select_client(&state.config.clients, &state.connection, &request.name)?;
        let mut body = table_json(session.grid());
        body["notice"] = json!(notice);
        body["message"] = match notice {
            Some(notice) => json!(notice.message(request.name.trim())),
            None => json!(state.connection.problem),
        };
        Ok(body)
    })
    .await;
    (jar, result.map(Json))
}

async fn get_table(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, result) = with_session(state, jar, |_, session| Ok(table_json(session.grid()))).await;
    (jar, result.map(Json))
}

async fn edit_table(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Payload<TableUpdate>,
) -> impl IntoResponse {
    let update = match payload {
        Ok(Json(update)) => update,
        Err(rejection) => return (jar, Err(ApiError::from(rejection))),
    };
    let (jar, result) = with_session(state, jar, move |_, session| {
        let grid = session.edit_table(update.rows)?;
        Ok(table_json(Some(grid)))
    })
    .await;
    (jar, result.map(Json))
}

async fn save_table(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, result) = with_session(state, jar, |state, session| {
        let grid = session.save(state.config.guard_stale_writes)?;
        let message = format!("Saved {} rows to {}", grid.table.len(), grid.client);
        let mut body = table_json(Some(grid));
        body["message"] = json!(message);
        Ok(body)
    })
    .await;
    (jar, result.map(Json))
}

async fn export_table(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<ExportQuery>,
) -> impl IntoResponse {
    let format = query.format.unwrap_or_else(|| "csv".to_string());
    let (jar, result) = with_session(state, jar, move |_, session| {
        let grid = session
            .grid()
            .ok_or_else(|| InventoryError::Validation("no client selected".to_string()))?;
        let now = Local::now().naive_local();
        let (content_type, body) = match format.as_str() {
            "csv" => (
                "text/csv; charset=utf-8",
                downloader::to_csv(&grid.table)?.into_bytes(),
            ),
            "xlsx" => (
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                downloader::to_xlsx(&grid.table, &grid.client)?,
            ),
            other => {
                return Err(InventoryError::Validation(format!(
                    "unknown export format {other}"
                )));
            }
        };
        let file_name = downloader::export_file_name(&grid.client, now, &format);
        Ok((content_type, file_name, body))
    })
    .await;

    let response = result.map(|(content_type, file_name, body)| {
        (
            [
                (header::CONTENT_TYPE, content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{file_name}\""),
                ),
            ],
            body,
        )
    });
    (jar, response)
}
