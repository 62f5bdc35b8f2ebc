use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rowsheet_common::{FieldValue, Record, RowError, RowObject, Sheet, SheetId};
use rowsheet_core::{
    parse_stable_id_str, QuerySpec, ReconcileReport, Reconciler, RepairOutcome, RowOrchestrator,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::STATE_TOKEN;
use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/login", get(login))
        .route("/redirect", get(redirect))
        .route("/logout", get(logout))
        .route("/sheet/{id}", get(list_sheets))
        .route("/sheet/{id}/", get(list_sheets))
        .route("/sheet/{id}/raw/{range}", get(read_raw).put(write_raw))
        .route("/sheet/{id}/{sheet_id}", get(list_items).post(create_item))
        .route("/sheet/{id}/{sheet_id}/keys", get(sheet_keys))
        .route("/sheet/{id}/{sheet_id}/search", get(search_items))
        .route(
            "/sheet/{id}/{sheet_id}/reconcile",
            get(scan_sheet).post(repair_sheet),
        )
        .route(
            "/sheet/{id}/{sheet_id}/id/{item_id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .with_state(state)
}

fn parse_sheet_id(text: &str) -> Result<SheetId, RowError> {
    text.trim()
        .parse()
        .map_err(|_| RowError::invalid(format!("sheet id {text:?} is not an integer")))
}

/// A JSON object payload with scalar fields only.
fn record_from_body(body: Result<Json<Value>, JsonRejection>) -> Result<Record, RowError> {
    let Json(value) = body.map_err(|e| RowError::invalid(e.body_text()))?;
    let Value::Object(object) = value else {
        return Err(RowError::invalid("body must be a JSON object"));
    };
    Record::from_json_object(&object).map_err(|field| {
        RowError::invalid(format!(
            "field {field:?} must be a string, number, boolean or null"
        ))
    })
}

/* ───────────────────────────── sheets ───────────────────────────── */

async fn list_sheets(
    State(state): State<AppState>,
    Path(doc): Path<String>,
) -> ApiResult<Json<Vec<Sheet>>> {
    state
        .run(move |gw| RowOrchestrator::new(gw, doc).sheets())
        .await
        .map(Json)
}

async fn sheet_keys(
    State(state): State<AppState>,
    Path((doc, sheet)): Path<(String, String)>,
) -> ApiResult<Json<Vec<String>>> {
    let sheet_id = parse_sheet_id(&sheet)?;
    state
        .run(move |gw| RowOrchestrator::new(gw, doc).keys(sheet_id))
        .await
        .map(Json)
}

/* ───────────────────────────── rows ─────────────────────────────── */

async fn list_items(
    State(state): State<AppState>,
    Path((doc, sheet)): Path<(String, String)>,
) -> ApiResult<Json<Vec<RowObject>>> {
    let sheet_id = parse_sheet_id(&sheet)?;
    state
        .run(move |gw| RowOrchestrator::new(gw, doc).list_items(sheet_id))
        .await
        .map(Json)
}

async fn search_items(
    State(state): State<AppState>,
    Path((doc, sheet)): Path<(String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Vec<RowObject>>> {
    let sheet_id = parse_sheet_id(&sheet)?;
    let query = QuerySpec::from_pairs(pairs);
    state
        .run(move |gw| RowOrchestrator::new(gw, doc).search_items(sheet_id, &query))
        .await
        .map(Json)
}

async fn get_item(
    State(state): State<AppState>,
    Path((doc, sheet, item)): Path<(String, String, String)>,
) -> ApiResult<Json<RowObject>> {
    let sheet_id = parse_sheet_id(&sheet)?;
    let stable_id = parse_stable_id_str(&item)?;
    state
        .run(move |gw| RowOrchestrator::new(gw, doc).get_item(sheet_id, stable_id))
        .await
        .map(Json)
}

async fn create_item(
    State(state): State<AppState>,
    Path((doc, sheet)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let sheet_id = parse_sheet_id(&sheet)?;
    let record = record_from_body(body)?;
    let tag = state
        .run(move |gw| RowOrchestrator::new(gw, doc).create_or_update(sheet_id, &record))
        .await?;
    tracing::debug!(sheet_id, stable_id = tag.stable_id, row = tag.row(), "row written");
    Ok(StatusCode::OK)
}

async fn update_item(
    State(state): State<AppState>,
    Path((doc, sheet, item)): Path<(String, String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let sheet_id = parse_sheet_id(&sheet)?;
    let stable_id = parse_stable_id_str(&item)?;
    let record = record_from_body(body)?;
    state
        .run(move |gw| RowOrchestrator::new(gw, doc).update_item(sheet_id, stable_id, &record))
        .await?;
    Ok(StatusCode::OK)
}

async fn delete_item(
    State(state): State<AppState>,
    Path((doc, sheet, item)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    let sheet_id = parse_sheet_id(&sheet)?;
    let stable_id = parse_stable_id_str(&item)?;
    state
        .run(move |gw| RowOrchestrator::new(gw, doc).delete_item(sheet_id, stable_id))
        .await?;
    Ok(StatusCode::OK)
}

/* ─────────────────────────── reconcile ──────────────────────────── */

async fn scan_sheet(
    State(state): State<AppState>,
    Path((doc, sheet)): Path<(String, String)>,
) -> ApiResult<Json<ReconcileReport>> {
    let sheet_id = parse_sheet_id(&sheet)?;
    state
        .run(move |gw| Reconciler::new(gw, &doc).scan(sheet_id))
        .await
        .map(Json)
}

async fn repair_sheet(
    State(state): State<AppState>,
    Path((doc, sheet)): Path<(String, String)>,
) -> ApiResult<Json<RepairOutcome>> {
    let sheet_id = parse_sheet_id(&sheet)?;
    state
        .run(move |gw| Reconciler::new(gw, &doc).repair(sheet_id))
        .await
        .map(Json)
}

/* ───────────────────────────── raw ──────────────────────────────── */

#[derive(Serialize)]
struct RawValues {
    range: String,
    values: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct RawBody {
    #[serde(alias = "Values")]
    values: Vec<Vec<Value>>,
}

async fn read_raw(
    State(state): State<AppState>,
    Path((doc, range)): Path<(String, String)>,
) -> ApiResult<Json<RawValues>> {
    let read = state
        .run(move |gw| RowOrchestrator::new(gw, doc).read_raw(&range))
        .await?;
    Ok(Json(RawValues {
        range: read.range,
        values: read.values,
    }))
}

async fn write_raw(
    State(state): State<AppState>,
    Path((doc, range)): Path<(String, String)>,
    body: Result<Json<RawBody>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(body) = body.map_err(|e| RowError::invalid(e.body_text()))?;
    let values = body
        .values
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| {
                    FieldValue::from_json(cell)
                        .map(|v| v.to_cell())
                        .ok_or_else(|| RowError::invalid("cells must be scalar values"))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    state
        .run(move |gw| RowOrchestrator::new(gw, doc).write_raw(&range, values))
        .await?;
    Ok(StatusCode::OK)
}

/* ───────────────────────────── auth ─────────────────────────────── */

async fn login(State(state): State<AppState>) -> ApiResult<String> {
    let auth = state.auth().clone();
    state
        .blocking(move || auth.auth_url().map_err(RowError::from))
        .await
}

#[derive(Deserialize)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
}

async fn redirect(
    State(state): State<AppState>,
    Query(params): Query<RedirectParams>,
) -> ApiResult<StatusCode> {
    if params.state.as_deref().is_some_and(|s| s != STATE_TOKEN) {
        return Err(RowError::invalid("unexpected state parameter").into());
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| RowError::missing_field("code"))?;
    let auth = state.auth().clone();
    state
        .blocking(move || auth.exchange(&code).map_err(RowError::from))
        .await?;
    tracing::info!("stored new OAuth token");
    Ok(StatusCode::OK)
}

async fn logout(State(state): State<AppState>) -> ApiResult<StatusCode> {
    let auth = state.auth().clone();
    state
        .blocking(move || auth.logout().map_err(RowError::from))
        .await?;
    Ok(StatusCode::OK)
}
