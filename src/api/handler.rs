use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    Json,
};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::models::*;
use crate::{
    auth::AuthService,
    cache::SessionCache,
    error::{AppError, AppResult, AuthError, BatchError},
    ledger::models::SessionRef,
    ledger::LedgerClient,
    payroll::SettlementEngine,
    policy::{self, Actor, Operation, Role},
    tracker::SessionTracker,
};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerClient>,
    pub cache: Arc<SessionCache>,
    pub tracker: Arc<SessionTracker>,
    pub engine: Arc<SettlementEngine>,
    pub auth: Arc<AuthService>,
}

fn parse_wallet(raw: &str) -> AppResult<Pubkey> {
    Pubkey::from_str(raw)
        .map_err(|_| AppError::InvalidInput(format!("invalid wallet address: {}", raw)))
}

fn validated<T: Validate>(request: T) -> AppResult<T> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    Ok(request)
}

/// Resolve the bearer token to an actor. Every role-gated handler goes
/// through here before touching the engine.
async fn current_actor(state: &AppState, headers: &HeaderMap) -> AppResult<Actor> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::InvalidToken)?;
    let token = raw.strip_prefix("Bearer ").ok_or(AuthError::InvalidToken)?;
    let token = Uuid::parse_str(token.trim()).map_err(|_| AuthError::InvalidToken)?;
    state.auth.authenticate(token).await
}

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ========== AUTH ==========

/// POST /auth/challenge
pub async fn create_challenge(
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> AppResult<Json<ChallengeResponse>> {
    let wallet = parse_wallet(&request.wallet)?;
    let challenge = state.auth.challenge(wallet, request.role).await;
    Ok(Json(ChallengeResponse {
        expires_in_seconds: (challenge.expires_at - challenge.created_at).num_seconds(),
        message: challenge.message,
        nonce: challenge.nonce,
    }))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let wallet = parse_wallet(&request.wallet)?;
    let session = state
        .auth
        .login(wallet, &request.nonce, &request.signature)
        .await?;
    Ok(Json(LoginResponse {
        token: session.token,
        wallet: session.wallet.to_string(),
        role: session.role,
        expires_at: session.expires_at,
    }))
}

// ========== EMPLOYEES ==========

/// GET /employees
///
/// Employers see the whole roster; employees only their own record.
pub async fn list_employees(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<EmployeeResponse>>> {
    let actor = current_actor(&state, &headers).await?;

    let employees = match actor.role {
        Role::Employer => {
            policy::authorize(&actor, &Operation::ReadEmployees)?;
            state.cache.employees().await?
        }
        Role::Employee => {
            policy::authorize(&actor, &Operation::ReadEmployee(actor.wallet))?;
            state
                .cache
                .employee(&actor.wallet)
                .await?
                .into_iter()
                .collect()
        }
    };

    Ok(Json(employees.into_iter().map(Into::into).collect()))
}

/// POST /employees
pub async fn register_employee(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterEmployeeRequest>,
) -> AppResult<Json<EmployeeMutationResponse>> {
    let actor = current_actor(&state, &headers).await?;
    policy::authorize(&actor, &Operation::RegisterEmployee)?;
    let request = validated(request)?;
    let wallet = parse_wallet(&request.wallet)?;

    if state.cache.employee(&wallet).await?.is_some() {
        return Err(AppError::InvalidInput(format!(
            "employee {} is already registered",
            wallet
        )));
    }

    let signature = state
        .ledger
        .register_employee(wallet, &request.name, &request.position, request.hourly_rate)
        .await?;

    let employee = crate::ledger::models::Employee {
        wallet,
        name: request.name,
        position: request.position,
        hourly_rate: request.hourly_rate,
        total_seconds_worked: 0,
        total_paid: 0,
        authority: state.ledger.authority(),
        is_active: true,
    };
    state.cache.put_employee(employee.clone()).await;

    info!("👤 employee {} registered", wallet);
    Ok(Json(EmployeeMutationResponse {
        employee: employee.into(),
        signature,
    }))
}

/// PUT /employees/:wallet
pub async fn update_employee(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(wallet): Path<String>,
    Json(request): Json<UpdateEmployeeRequest>,
) -> AppResult<Json<EmployeeMutationResponse>> {
    let actor = current_actor(&state, &headers).await?;
    let wallet = parse_wallet(&wallet)?;
    policy::authorize(&actor, &Operation::UpdateEmployee(wallet))?;
    let request = validated(request)?;

    let mut employee = state
        .cache
        .employee(&wallet)
        .await?
        .ok_or(AppError::EmployeeNotFound(wallet))?;

    let signature = state
        .ledger
        .update_employee(
            wallet,
            &request.name,
            &request.position,
            request.hourly_rate,
            request.is_active,
        )
        .await?;

    employee.name = request.name;
    employee.position = request.position;
    employee.hourly_rate = request.hourly_rate;
    employee.is_active = request.is_active;
    state.cache.put_employee(employee.clone()).await;

    Ok(Json(EmployeeMutationResponse {
        employee: employee.into(),
        signature,
    }))
}

// ========== WORK SESSIONS ==========

/// GET /sessions?employee=&paid=
pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SessionsQuery>,
) -> AppResult<Json<Vec<SessionResponse>>> {
    let actor = current_actor(&state, &headers).await?;
    let filter = match &query.employee {
        Some(raw) => Some(parse_wallet(raw)?),
        None => None,
    };
    policy::authorize(&actor, &Operation::ReadSessions(filter))?;

    let employees = state.cache.employees().await?;
    let rate_of = |wallet: &Pubkey| {
        employees
            .iter()
            .find(|e| e.wallet == *wallet)
            .map(|e| e.hourly_rate)
            .unwrap_or(0)
    };

    let sessions = state
        .cache
        .work_sessions()
        .await?
        .into_iter()
        .filter(|s| filter.map_or(true, |wallet| s.employee == wallet))
        .filter(|s| query.paid.map_or(true, |paid| s.is_paid == paid))
        .map(|s| {
            let rate = rate_of(&s.employee);
            SessionResponse::from_session(&s, rate)
        })
        .collect();

    Ok(Json(sessions))
}

/// POST /sessions/check-in
pub async fn check_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckInRequest>,
) -> AppResult<Json<SessionResponse>> {
    let actor = current_actor(&state, &headers).await?;
    let wallet = parse_wallet(&request.employee)?;
    policy::authorize(&actor, &Operation::CheckIn(wallet))?;

    let session = state.tracker.check_in(wallet).await?;
    let rate = state
        .cache
        .employee(&wallet)
        .await?
        .map(|e| e.hourly_rate)
        .unwrap_or(0);
    Ok(Json(SessionResponse::from_session(&session, rate)))
}

/// POST /sessions/check-out
pub async fn check_out(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckOutRequest>,
) -> AppResult<Json<SessionResponse>> {
    let actor = current_actor(&state, &headers).await?;
    let wallet = parse_wallet(&request.employee)?;
    policy::authorize(&actor, &Operation::CheckOut(wallet))?;

    let session = state.tracker.check_out(wallet, request.session_id).await?;
    let rate = state
        .cache
        .employee(&wallet)
        .await?
        .map(|e| e.hourly_rate)
        .unwrap_or(0);
    Ok(Json(SessionResponse::from_session(&session, rate)))
}

// ========== PAYROLL BATCHES ==========

/// GET /batches
pub async fn list_batches(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<BatchResponse>>> {
    let actor = current_actor(&state, &headers).await?;
    policy::authorize(&actor, &Operation::ReadBatches)?;

    let batches = state.cache.payroll_batches().await?;
    Ok(Json(batches.into_iter().map(Into::into).collect()))
}

/// GET /batches/:batch_id
pub async fn get_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(batch_id): Path<u64>,
) -> AppResult<Json<BatchResponse>> {
    let actor = current_actor(&state, &headers).await?;
    policy::authorize(&actor, &Operation::ReadBatches)?;

    let batch = state
        .cache
        .batch(batch_id)
        .await?
        .ok_or(BatchError::BatchNotFound(batch_id))?;
    Ok(Json(batch.into()))
}

/// POST /batches
pub async fn create_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateBatchRequest>,
) -> AppResult<Json<BatchResponse>> {
    let actor = current_actor(&state, &headers).await?;
    policy::authorize(&actor, &Operation::CreateBatch)?;
    let request = validated(request)?;

    let mut selection = Vec::with_capacity(request.sessions.len());
    for reference in &request.sessions {
        selection.push(SessionRef {
            employee: parse_wallet(&reference.employee)?,
            session_id: reference.session_id,
        });
    }

    let batch = state.engine.create_batch(&selection).await?;
    Ok(Json(batch.into()))
}

/// POST /batches/:batch_id/process
///
/// Returns the per-line report; a partially failed batch is still a 200.
pub async fn process_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(batch_id): Path<u64>,
) -> AppResult<Json<BatchReportResponse>> {
    let actor = current_actor(&state, &headers).await?;
    policy::authorize(&actor, &Operation::ProcessBatch)?;

    let report = state.engine.process_batch(batch_id).await?;
    Ok(Json(report.into()))
}
