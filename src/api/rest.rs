// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Public endpoints (health) require no
// authentication. All other endpoints require a valid Bearer token checked via
// the `AuthBearer` extractor.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::types::{AccountMode, TradingMode};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/positions", get(positions))
        .route("/api/v1/regime", get(regime))
        .route("/api/v1/decisions", get(decisions))
        .route("/api/v1/settings", get(get_settings))
        .route("/api/v1/settings", post(set_settings))
        .route("/api/v1/control/pause", post(control_pause))
        .route("/api/v1/control/resume", post(control_resume))
        .route("/api/v1/control/kill", post(control_kill))
        .route("/api/v1/control/account-mode", post(control_account_mode))
        .route("/api/v1/heartbeat", post(heartbeat))
        .route("/api/v1/trade-journal", get(trade_journal))
        .route("/api/v1/trade-journal/stats", get(trade_journal_stats))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Full state snapshot (authenticated)
// =============================================================================

async fn full_state(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let snapshot = state.build_snapshot();
    Json(snapshot)
}

// =============================================================================
// Positions (authenticated)
// =============================================================================

async fn positions(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let positions = state.position_manager.get_open_positions();
    Json(positions)
}

// =============================================================================
// Regime (authenticated)
// =============================================================================

async fn regime(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let regime_state = state.regime_detector.current_regime();
    match regime_state {
        Some(rs) => {
            let snapshot = serde_json::json!({
                "regime": rs.regime.to_string(),
                "adx": rs.adx,
                "bb_width": rs.bb_width,
                "bb_width_avg": rs.bb_width_avg,
                "regime_age_seconds": rs.regime_age_secs,
            });
            Json(snapshot).into_response()
        }
        None => {
            let body = serde_json::json!({ "regime": null, "message": "No regime data available yet" });
            Json(body).into_response()
        }
    }
}

// =============================================================================
// Decisions (authenticated)
// =============================================================================

async fn decisions(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let decisions = state.recent_decisions.read().clone();
    Json(decisions)
}

// =============================================================================
// Settings — HYDRA/VIPER tunables (authenticated)
// =============================================================================

async fn get_settings(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let config = state.runtime_config.read();
    Json(serde_json::json!({
        "hydra": config.hydra,
        "viper": config.viper,
    }))
}

#[derive(Deserialize)]
struct SettingsUpdate {
    #[serde(default)]
    hydra_entry_threshold: Option<f64>,
    #[serde(default)]
    hydra_auto_calibrate: Option<bool>,
    #[serde(default)]
    viper_enabled: Option<bool>,
    #[serde(default)]
    viper_ratchet_enabled: Option<bool>,
    #[serde(default)]
    viper_capital_split_pct: Option<f64>,
}

async fn set_settings(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> impl IntoResponse {
    let mut config = state.runtime_config.write();
    let mut changes = Vec::new();

    if let Some(val) = update.hydra_entry_threshold {
        if (config.hydra.entry_threshold - val).abs() > f64::EPSILON {
            changes.push(format!("hydra.entry_threshold: {} -> {val}", config.hydra.entry_threshold));
            config.hydra.entry_threshold = val;
        }
    }
    if let Some(val) = update.hydra_auto_calibrate {
        if config.hydra.auto_calibrate != val {
            changes.push(format!("hydra.auto_calibrate: {} -> {val}", config.hydra.auto_calibrate));
            config.hydra.auto_calibrate = val;
        }
    }
    if let Some(val) = update.viper_enabled {
        if config.viper.enabled != val {
            changes.push(format!("viper.enabled: {} -> {val}", config.viper.enabled));
            config.viper.enabled = val;
        }
    }
    if let Some(val) = update.viper_ratchet_enabled {
        if config.viper.ratchet_enabled != val {
            changes.push(format!("viper.ratchet_enabled: {} -> {val}", config.viper.ratchet_enabled));
            config.viper.ratchet_enabled = val;
        }
    }
    if let Some(val) = update.viper_capital_split_pct {
        if (config.viper.capital_split_pct - val).abs() > f64::EPSILON {
            changes.push(format!("viper.capital_split_pct: {} -> {val}", config.viper.capital_split_pct));
            config.viper.capital_split_pct = val;
        }
    }

    if !changes.is_empty() {
        info!(changes = ?changes, "Runtime settings updated");

        let config_clone = config.clone();
        drop(config);

        if let Err(e) = config_clone.save("runtime_config.json") {
            warn!(error = %e, "Failed to save runtime settings to disk");
        }

        state.increment_version();

        Json(serde_json::json!({
            "hydra": config_clone.hydra,
            "viper": config_clone.viper,
            "changes": changes,
        }))
        .into_response()
    } else {
        let snapshot = serde_json::json!({
            "hydra": config.hydra,
            "viper": config.viper,
            "changes": Vec::<String>::new(),
        });
        drop(config);
        Json(snapshot).into_response()
    }
}

// =============================================================================
// Control endpoints (authenticated)
// =============================================================================

#[derive(Serialize)]
struct ControlResponse {
    trading_mode: String,
    message: String,
}

async fn control_pause(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    {
        let mut config = state.runtime_config.write();
        config.trading_mode = TradingMode::Paused;
    }
    state.increment_version();
    info!("Trading PAUSED via API");

    Json(ControlResponse {
        trading_mode: "Paused".to_string(),
        message: "Trading paused".to_string(),
    })
}

async fn control_resume(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    {
        let mut config = state.runtime_config.write();
        config.trading_mode = TradingMode::Live;
    }
    state.increment_version();
    info!("Trading RESUMED via API");

    Json(ControlResponse {
        trading_mode: "Live".to_string(),
        message: "Trading resumed".to_string(),
    })
}

async fn control_kill(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    {
        let mut config = state.runtime_config.write();
        config.trading_mode = TradingMode::Killed;
    }
    state.increment_version();
    warn!("Trading KILLED via API");

    Json(ControlResponse {
        trading_mode: "Killed".to_string(),
        message: "Trading killed — manual restart required".to_string(),
    })
}

#[derive(Deserialize)]
struct AccountModeRequest {
    account_mode: String,
    #[serde(default)]
    confirm_live: bool,
}

#[derive(Serialize)]
struct AccountModeResponse {
    account_mode: String,
}

async fn control_account_mode(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<AccountModeRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let mode = match req.account_mode.to_lowercase().as_str() {
        "demo" => AccountMode::Demo,
        "live" => {
            if !req.confirm_live {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Switching to Live mode requires confirm_live: true",
                    })),
                ));
            }
            warn!("Switching to LIVE account mode via API");
            AccountMode::Live
        }
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": format!("Invalid account mode: '{}'. Use 'demo' or 'live'.", req.account_mode),
                })),
            ));
        }
    };

    {
        let mut config = state.runtime_config.write();
        config.account_mode = mode;
    }
    state.increment_version();
    info!(account_mode = %mode, "Account mode changed via API");

    Ok(Json(AccountModeResponse {
        account_mode: mode.to_string(),
    }))
}

// =============================================================================
// Heartbeat (authenticated)
// =============================================================================

async fn heartbeat(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    *state.last_ws_user_event.write() = std::time::Instant::now();
    state.increment_version();

    Json(serde_json::json!({
        "status": "ok",
        "server_time": chrono::Utc::now().timestamp_millis(),
    }))
}

// =============================================================================
// Trade Journal (authenticated)
// =============================================================================

async fn trade_journal(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let closed = state.position_manager.get_closed_positions(500);
    Json(closed)
}

async fn trade_journal_stats(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let closed = state.position_manager.get_closed_positions(500);
    let total_trades = closed.len();
    if total_trades == 0 {
        return Json(serde_json::json!({
            "total_trades": 0,
            "win_rate": 0.0,
            "total_net_pnl": 0.0,
            "profit_factor": 0.0,
        }));
    }
    let wins = closed.iter().filter(|p| p.net_pnl > 0.0).count();
    let win_rate = wins as f64 / total_trades as f64;
    let total_net_pnl: f64 = closed.iter().map(|p| p.net_pnl).sum();
    let gross_profit: f64 = closed
        .iter()
        .filter(|p| p.net_pnl > 0.0)
        .map(|p| p.net_pnl)
        .sum();
    let gross_loss: f64 = closed
        .iter()
        .filter(|p| p.net_pnl < 0.0)
        .map(|p| p.net_pnl.abs())
        .sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };
    Json(serde_json::json!({
        "total_trades": total_trades,
        "win_rate": win_rate,
        "total_net_pnl": total_net_pnl,
        "profit_factor": profit_factor,
    }))
}
