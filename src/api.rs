// 🌐 REST API - axum router over the persistence layer
//
// Brazilian-formatted numbers and dates are accepted on every write; all of
// them go through the locale normalizer before any arithmetic or storage.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post, put},
    Router,
};
use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::access::{AccessPolicy, Operation, Role, RolePolicy};
use crate::dashboard::DashboardStats;
use crate::db;
use crate::entities::{
    Action, ActionStatus, Checkpoint, CheckpointStatus, HierarchyFilter, KeyResult,
    KeyResultSummary, Objective, OrgUnit,
};
use crate::error::OkrError;
use crate::locale::{
    format_br, format_br_date, format_compact, parse_br_date, parse_decimal, to_canonical,
    IntoDecimal,
};
use crate::progress::{rollup_progress, Tier};
use crate::schedule::Frequency;

pub const ROLE_HEADER: &str = "x-user-role";
pub const USER_HEADER: &str = "x-user-name";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub policy: Arc<dyn AccessPolicy>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            policy: Arc::new(RolePolicy),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError(anyhow::anyhow!("database lock poisoned")))
    }
}

// ============================================================================
// RESPONSES & ERRORS
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Any failure; typed `OkrError`s pick the status code
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<OkrError>() {
            Some(OkrError::Validation { .. }) | Some(OkrError::Schedule(_)) => {
                StatusCode::BAD_REQUEST
            }
            Some(OkrError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Some(OkrError::Forbidden(_)) => StatusCode::FORBIDDEN,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {:#}", self.0);
        } else {
            warn!(status = status.as_u16(), "request rejected: {}", self.0);
        }

        (status, Json(ApiResponse::err(format!("{:#}", self.0)))).into_response()
    }
}

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::ok(data))))
}

fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(data))))
}

// ============================================================================
// CALLER
// ============================================================================

/// Who is calling. Authentication happens upstream; we only read the headers.
struct Caller {
    role: Role,
    name: String,
}

fn caller(headers: &HeaderMap) -> Result<Caller, ApiError> {
    let role = match headers.get(ROLE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(raw) => raw.parse::<Role>()?,
        None => Role::Operacional,
    };

    let name = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(role.as_str())
        .to_string();

    Ok(Caller { role, name })
}

impl Caller {
    fn require(&self, state: &AppState, operation: Operation) -> Result<(), ApiError> {
        state.policy.check(self.role, operation)?;
        Ok(())
    }
}

// ============================================================================
// REQUEST SCHEMAS
// ============================================================================

/// A number as the form sent it: "1.234,56" or a JSON number
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
}

impl NumericInput {
    /// Text form for the persistence gateway
    fn raw(&self) -> String {
        match self {
            NumericInput::Number(n) => to_canonical(*n),
            NumericInput::Text(s) => s.clone(),
        }
    }
}

impl IntoDecimal for &NumericInput {
    fn into_decimal(self) -> f64 {
        match self {
            NumericInput::Number(n) => parse_decimal(*n),
            NumericInput::Text(s) => parse_decimal(s.as_str()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateObjectiveRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub region: String,
    #[serde(default)]
    pub sub_region: Option<String>,
    #[serde(default)]
    pub service_line: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyResultRequest {
    pub objective_id: String,
    pub title: String,
    #[serde(default)]
    pub unit: Option<String>,
    pub total_target: NumericInput,
    pub frequency: String,
    /// "dd/mm/yyyy" or "yyyy-mm-dd"
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub frequency: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordCheckpointRequest {
    pub actual_value: NumericInput,
}

#[derive(Debug, Deserialize)]
pub struct CreateActionRequest {
    pub key_result_id: String,
    pub title: String,
    #[serde(default)]
    pub responsible: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateActionRequest {
    pub status: String,
}

/// Hierarchy filter + optional tier, for the key result list
#[derive(Debug, Default, Deserialize)]
pub struct KeyResultQuery {
    pub region: Option<String>,
    pub sub_region: Option<String>,
    pub service_line: Option<String>,
    pub service: Option<String>,
    pub tier: Option<Tier>,
}

impl KeyResultQuery {
    fn hierarchy(&self) -> HierarchyFilter {
        HierarchyFilter {
            region: self.region.clone(),
            sub_region: self.sub_region.clone(),
            service_line: self.service_line.clone(),
            service: self.service.clone(),
        }
    }
}

fn parse_date_field(field: &str, raw: &str) -> Result<NaiveDate, OkrError> {
    parse_br_date(raw).ok_or_else(|| OkrError::validation(field, format!("invalid date '{}'", raw)))
}

fn parse_frequency(raw: &str) -> Result<Frequency, OkrError> {
    Ok(raw.parse::<Frequency>()?)
}

// ============================================================================
// RESPONSE SCHEMAS
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CheckpointResponse {
    pub id: String,
    pub period_index: u32,
    pub period_label: String,
    pub target_value: f64,
    pub target_value_display: String,
    pub actual_value: Option<f64>,
    pub actual_value_display: Option<String>,
    pub due_date: NaiveDate,
    pub due_date_display: String,
    pub status: CheckpointStatus,
    pub progress: f64,
    pub tier: Tier,
    pub tier_label: String,
}

impl CheckpointResponse {
    fn build(mut checkpoint: Checkpoint, today: NaiveDate) -> Self {
        // Overdue is a function of today, not of the last write
        checkpoint.refresh_status(today);
        let tier = checkpoint.tier_on(today);

        Self {
            progress: checkpoint.progress(),
            target_value_display: format_br(checkpoint.target_value),
            actual_value_display: checkpoint.actual_value.map(format_br),
            due_date_display: format_br_date(checkpoint.due_date),
            tier_label: tier.label().to_string(),
            tier,
            id: checkpoint.id,
            period_index: checkpoint.period_index,
            period_label: checkpoint.period_label,
            target_value: checkpoint.target_value,
            actual_value: checkpoint.actual_value,
            due_date: checkpoint.due_date,
            status: checkpoint.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    #[serde(flatten)]
    pub action: Action,
    /// Not done and past its due date
    pub late: bool,
}

impl ActionResponse {
    fn build(action: Action, today: NaiveDate) -> Self {
        Self {
            late: action.is_late(today),
            action,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KeyResultDetail {
    #[serde(flatten)]
    pub summary: KeyResultSummary,
    pub start_date: NaiveDate,
    pub start_date_display: String,
    pub checkpoints: Vec<CheckpointResponse>,
}

impl KeyResultDetail {
    fn build(key_result: &KeyResult, checkpoints: Vec<Checkpoint>, today: NaiveDate) -> Self {
        Self {
            summary: key_result.summary_on(today),
            start_date: key_result.start_date,
            start_date_display: format_br_date(key_result.start_date),
            checkpoints: checkpoints
                .into_iter()
                .map(|cp| CheckpointResponse::build(cp, today))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ObjectiveDetail {
    #[serde(flatten)]
    pub objective: Objective,
    pub progress: f64,
    pub progress_display: String,
    pub key_results: Vec<KeyResultSummary>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/objectives - Objectives under a hierarchy filter
async fn list_objectives(
    State(state): State<AppState>,
    Query(filter): Query<HierarchyFilter>,
) -> ApiResult<Vec<Objective>> {
    let conn = state.conn()?;
    ok(db::get_objectives(&conn, &filter)?)
}

/// POST /api/objectives
async fn create_objective(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateObjectiveRequest>,
) -> ApiResult<Objective> {
    let caller = caller(&headers)?;
    caller.require(&state, Operation::ManageObjectives)?;

    let unit = OrgUnit::new(&req.region)
        .with_sub_region(req.sub_region.as_deref().unwrap_or(""))
        .with_service_line(req.service_line.as_deref().unwrap_or(""))
        .with_service(req.service.as_deref().unwrap_or(""));

    let objective = Objective::new(&req.title, unit)?
        .with_description(req.description.as_deref().unwrap_or(""))
        .with_owner(req.owner.as_deref().unwrap_or(&caller.name));

    let conn = state.conn()?;
    db::insert_objective(&conn, &objective)?;

    created(objective)
}

/// GET /api/objectives/:id - Objective with its key results and rollup
async fn get_objective(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ObjectiveDetail> {
    let conn = state.conn()?;
    let objective = db::get_objective(&conn, &id)?;
    let today = today();

    let key_results: Vec<KeyResultSummary> = db::get_key_results_for_objective(&conn, &id)?
        .iter()
        .map(|kr| kr.summary_on(today))
        .collect();

    let progress = rollup_progress(&key_results.iter().map(|s| s.progress).collect::<Vec<_>>());

    ok(ObjectiveDetail {
        objective,
        progress,
        progress_display: format!("{}%", format_compact(progress, 1)),
        key_results,
    })
}

/// GET /api/key-results - Dashboard rows, filterable by hierarchy and tier
async fn list_key_results(
    State(state): State<AppState>,
    Query(query): Query<KeyResultQuery>,
) -> ApiResult<Vec<KeyResultSummary>> {
    let conn = state.conn()?;
    let today = today();

    let summaries = db::get_key_results(&conn, &query.hierarchy())?
        .iter()
        .map(|kr| kr.summary_on(today))
        .filter(|s| query.tier.map(|t| t == s.tier).unwrap_or(true))
        .collect();

    ok(summaries)
}

/// POST /api/key-results - Create and generate the checkpoint batch
async fn create_key_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateKeyResultRequest>,
) -> ApiResult<KeyResultDetail> {
    let caller = caller(&headers)?;
    caller.require(&state, Operation::ManageKeyResults)?;

    let key_result = KeyResult::new(
        &req.objective_id,
        &req.title,
        req.unit.as_deref().unwrap_or(""),
        parse_decimal(&req.total_target),
        parse_frequency(&req.frequency)?,
        parse_date_field("start_date", &req.start_date)?,
        parse_date_field("end_date", &req.end_date)?,
    )?;

    let conn = state.conn()?;
    let checkpoints = db::create_key_result(&conn, &key_result, &caller.name)?;

    created(KeyResultDetail::build(&key_result, checkpoints, today()))
}

/// GET /api/key-results/:id - Key result with checkpoints
async fn get_key_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<KeyResultDetail> {
    let conn = state.conn()?;
    let key_result = db::get_key_result(&conn, &id)?;
    let checkpoints = db::get_checkpoints(&conn, &id)?;

    ok(KeyResultDetail::build(&key_result, checkpoints, today()))
}

/// PUT /api/key-results/:id/schedule - New frequency / range, new checkpoint batch
async fn reschedule_key_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RescheduleRequest>,
) -> ApiResult<KeyResultDetail> {
    let caller = caller(&headers)?;
    caller.require(&state, Operation::RescheduleKeyResult)?;

    let frequency = parse_frequency(&req.frequency)?;
    let start = parse_date_field("start_date", &req.start_date)?;
    let end = parse_date_field("end_date", &req.end_date)?;

    let conn = state.conn()?;
    let (key_result, checkpoints) =
        db::reschedule_key_result(&conn, &id, frequency, start, end, &caller.name)?;

    ok(KeyResultDetail::build(&key_result, checkpoints, today()))
}

/// PATCH /api/checkpoints/:id - Record a measured value
async fn record_checkpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RecordCheckpointRequest>,
) -> ApiResult<CheckpointResponse> {
    let caller = caller(&headers)?;
    caller.require(&state, Operation::RecordCheckpoint)?;

    let today = today();
    let conn = state.conn()?;
    let raw = req.actual_value.raw();
    let checkpoint = db::record_checkpoint_value(&conn, &id, &raw, today, &caller.name)?;

    ok(CheckpointResponse::build(checkpoint, today))
}

/// GET /api/key-results/:id/actions
async fn list_actions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<ActionResponse>> {
    let conn = state.conn()?;
    db::get_key_result(&conn, &id)?;

    let today = today();
    ok(db::get_actions(&conn, &id)?
        .into_iter()
        .map(|a| ActionResponse::build(a, today))
        .collect())
}

/// POST /api/actions
async fn create_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateActionRequest>,
) -> ApiResult<ActionResponse> {
    let caller = caller(&headers)?;
    caller.require(&state, Operation::ManageActions)?;

    let mut action = Action::new(&req.key_result_id, &req.title)?
        .with_responsible(req.responsible.as_deref().unwrap_or(""));

    if let Some(raw) = req.due_date.as_deref().filter(|s| !s.trim().is_empty()) {
        action = action.with_due_date(parse_date_field("due_date", raw)?);
    }

    let conn = state.conn()?;
    db::insert_action(&conn, &action, &caller.name)?;

    created(ActionResponse::build(action, today()))
}

/// PATCH /api/actions/:id - Status change
async fn update_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateActionRequest>,
) -> ApiResult<ActionResponse> {
    let caller = caller(&headers)?;
    caller.require(&state, Operation::UpdateActionStatus)?;

    let status = req.status.parse::<ActionStatus>()?;
    let conn = state.conn()?;

    let action = db::update_action_status(&conn, &id, status, &caller.name)?;
    ok(ActionResponse::build(action, today()))
}

/// GET /api/dashboard - Tier counts and rollups for a hierarchy slice
async fn dashboard(
    State(state): State<AppState>,
    Query(filter): Query<HierarchyFilter>,
) -> ApiResult<DashboardStats> {
    let conn = state.conn()?;
    let objectives = db::get_objectives(&conn, &filter)?;
    let key_results = db::get_key_results(&conn, &filter)?;

    ok(DashboardStats::build(&objectives, &key_results, today()))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/objectives", get(list_objectives).post(create_objective))
        .route("/objectives/:id", get(get_objective))
        .route("/key-results", get(list_key_results).post(create_key_result))
        .route("/key-results/:id", get(get_key_result))
        .route("/key-results/:id/schedule", put(reschedule_key_result))
        .route("/key-results/:id/actions", get(list_actions))
        .route("/checkpoints/:id", patch(record_checkpoint))
        .route("/actions", post(create_action))
        .route("/actions/:id", patch(update_action))
        .route("/dashboard", get(dashboard))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
