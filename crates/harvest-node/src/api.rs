//! Dashboard gateway: a read-mostly HTTP surface over the orchestrator
//! and the stores. It never drives a browser; commands only signal the
//! orchestrator. Config writes are refused outright so hand-maintained,
//! comment-bearing files stay intact.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::logbuf::LogBuffer;
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub logs: LogBuffer,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct DaysQuery {
    days: Option<i64>,
}

#[derive(Deserialize)]
struct RunSingleRequest {
    email: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/accounts", get(get_accounts))
        .route("/api/logs", get(get_logs).delete(delete_logs))
        .route("/api/history", get(get_history))
        .route("/api/metrics", get(get_metrics))
        .route("/api/memory", get(get_memory))
        .route("/api/account-history", get(get_history))
        .route("/api/account-history/:email", get(get_account_history))
        .route("/api/account-stats/:email", get(get_account_stats))
        .route("/api/stats/historical", get(get_stats_historical))
        .route("/api/stats/activity-breakdown", get(get_activity_breakdown))
        .route("/api/stats/global", get(get_stats_global))
        .route("/api/start", post(post_start))
        .route("/api/stop", post(post_stop))
        .route("/api/restart", post(post_restart))
        .route("/api/run-single", post(post_run_single))
        .route("/api/account/:email/reset", post(post_account_reset))
        .route("/api/reset-state", post(post_reset_state))
        .route("/api/config", get(config_read_only).post(config_read_only).put(config_read_only))
        .route("/api/config/*rest", post(config_read_only).put(config_read_only))
        .route("/api/accounts/edit", post(config_read_only))
        .with_state(Arc::new(state))
}

pub fn start_api_server(state: AppState, host: String, port: u16) -> JoinHandle<anyhow::Result<()>> {
    let app = router(state);
    tokio::spawn(async move {
        let addr = format!("{host}:{port}");
        info!(%addr, "dashboard gateway listening");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    })
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let statuses = state.orchestrator.statuses().await;
    Json(serde_json::json!({
        "running": state.orchestrator.is_running(),
        "standby": state.orchestrator.is_standby(),
        "accounts": statuses,
    }))
}

async fn get_accounts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let accounts = state.orchestrator.accounts().map_err(internal)?;
    let masked: Vec<serde_json::Value> = accounts
        .iter()
        .map(|a| {
            serde_json::json!({
                "email": a.masked_email(),
                "enabled": a.enabled,
                "hasTotp": a.totp.is_some(),
                "hasProxy": a.proxy.is_some(),
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "accounts": masked })))
}

async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Json<serde_json::Value> {
    let limit = query.limit.unwrap_or(200).min(1000);
    Json(serde_json::json!({ "logs": state.logs.tail(limit) }))
}

async fn delete_logs(State(state): State<Arc<AppState>>) -> StatusCode {
    state.logs.clear();
    StatusCode::NO_CONTENT
}

async fn get_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let history = &state.orchestrator.history;
    let mut by_account = HashMap::new();
    for stored in history.known_accounts().map_err(internal)? {
        let entries = history.read(&stored).map_err(internal)?;
        by_account.insert(harvest_types::account::mask_email(&stored), entries);
    }
    Ok(Json(serde_json::json!({ "history": by_account })))
}

async fn get_account_history(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let entries = state.orchestrator.history.read(&email).map_err(internal)?;
    Ok(Json(serde_json::json!({
        "account": harvest_types::account::mask_email(&email),
        "entries": entries,
    })))
}

async fn get_account_stats(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let stats = state.orchestrator.history.account_stats(&email).map_err(internal)?;
    Ok(Json(serde_json::to_value(stats).map_err(internal)?))
}

async fn get_stats_historical(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let days = query.days.unwrap_or(30).clamp(1, 90);
    let totals = state.orchestrator.history.daily_totals(days).map_err(internal)?;
    Ok(Json(serde_json::json!({ "days": totals })))
}

async fn get_activity_breakdown(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let days = query.days.unwrap_or(30).clamp(1, 90);
    let history = &state.orchestrator.history;
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(days);

    let mut by_day: HashMap<chrono::NaiveDate, (u32, u32)> = HashMap::new();
    for stored in history.known_accounts().map_err(internal)? {
        for entry in history.read(&stored).map_err(internal)? {
            if entry.date < cutoff {
                continue;
            }
            let slot = by_day.entry(entry.date).or_insert((0, 0));
            slot.0 += entry.completed;
            slot.1 += entry.failed;
        }
    }
    let mut breakdown: Vec<serde_json::Value> = by_day
        .into_iter()
        .map(|(date, (completed, failed))| {
            serde_json::json!({ "date": date, "completed": completed, "failed": failed })
        })
        .collect();
    breakdown.sort_by_key(|v| v["date"].as_str().map(String::from));
    Ok(Json(serde_json::json!({ "days": breakdown })))
}

async fn get_stats_global(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let stats = state.orchestrator.history.global_stats().map_err(internal)?;
    Ok(Json(serde_json::to_value(stats).map_err(internal)?))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> String {
    state.orchestrator.metrics.gather()
}

async fn get_memory() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "rss_bytes": rss_bytes().unwrap_or(0) }))
}

/// Resident set size from procfs; zero where unavailable.
fn rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

async fn post_start(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    if state.orchestrator.is_running() {
        return Err(conflict("a run is already in progress"));
    }
    if state.orchestrator.is_standby() {
        return Err(conflict("global standby engaged; restart the process"));
    }
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        if let Err(err) = orchestrator.run_all().await {
            tracing::error!(%err, "dashboard-triggered run failed");
        }
    });
    Ok(Json(serde_json::json!({ "started": true })))
}

async fn post_stop(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.orchestrator.stop().await;
    Json(serde_json::json!({ "stopping": true }))
}

async fn post_restart(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    state.orchestrator.stop().await;
    if state.orchestrator.is_standby() {
        return Err(conflict("global standby engaged; restart the process"));
    }
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        // Let the current run drain before the fresh one begins.
        while orchestrator.is_running() {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
        if let Err(err) = orchestrator.run_all().await {
            tracing::error!(%err, "restart run failed");
        }
    });
    Ok(Json(serde_json::json!({ "restarting": true })))
}

async fn post_run_single(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunSingleRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    if state.orchestrator.is_running() {
        return Err(conflict("a run is already in progress"));
    }
    let orchestrator = Arc::clone(&state.orchestrator);
    let email = request.email;
    tokio::spawn(async move {
        if let Err(err) = orchestrator.run_single(&email).await {
            tracing::error!(%err, "single-account run failed");
        }
    });
    Ok(Json(serde_json::json!({ "started": true })))
}

async fn post_account_reset(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let today = chrono::Local::now().date_naive();
    state.orchestrator.job_state.reset(&email, today).await.map_err(internal)?;
    Ok(Json(serde_json::json!({ "reset": true })))
}

async fn post_reset_state(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let cleared = state.orchestrator.job_state.reset_all_today().await.map_err(internal)?;
    Ok(Json(serde_json::json!({ "cleared": cleared })))
}

/// Config writes would destroy operator comments; refuse them all.
async fn config_read_only() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "configuration is file-managed; edit the config/accounts files by hand \
                    and restart"
                .to_string(),
        }),
    )
}

fn internal<E: std::fmt::Display>(err: E) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: err.to_string() }),
    )
}

fn conflict(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::CONFLICT, Json(ErrorResponse { error: message.to_string() }))
}
