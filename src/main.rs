// =============================================================================
// Aurora Spot Nexus — Main Entry Point
// =============================================================================
//
// The engine starts in Demo + Paused mode for safety. Users must explicitly
// switch to Live mode via the dashboard or API.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod binance;
mod decision_envelope;
mod execution;
mod hydra;
mod indicators;
mod market_data;
mod position_engine;
mod reconcile;
mod regime;
mod risk;
mod risk_gate;
mod runtime_config;
mod self_calibrator;
mod strategy;
mod types;
mod viper;

use std::sync::Arc;

use chrono::Timelike;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::execution::{ExecutionEngine, ExecutionResult};
use crate::market_data::candle_buffer::CandleKey;
use crate::position_engine::TickOutcome;
use crate::runtime_config::RuntimeConfig;
use crate::strategy::{StrategyEngine, TradeProposal};
use crate::types::{now_ms, AccountMode, Position, PositionStatus, Regime, StrategyTag, Timeframe, ViperMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Aurora Spot Nexus — Starting Up                  ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load("runtime_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // SAFETY: Force Demo + Paused on startup.
    config.trading_mode = types::TradingMode::Paused;
    config.account_mode = AccountMode::Demo;

    // Override symbols from env if available.
    if let Ok(syms) = std::env::var("AURORA_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if config.symbols.is_empty() {
        config.symbols = vec![
            "BTCUSDT".into(),
            "ETHUSDT".into(),
            "BNBUSDT".into(),
            "XRPUSDT".into(),
            "SOLUSDT".into(),
        ];
    }

    info!(symbols = ?config.symbols, "Configured trading pairs");
    info!(
        trading_mode = %config.trading_mode,
        account_mode = %config.account_mode,
        "Engine starting in SAFE mode (Demo + Paused)"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Build Binance client ──────────────────────────────────────────
    let api_key = std::env::var("BINANCE_API_KEY").unwrap_or_default();
    let api_secret = std::env::var("BINANCE_API_SECRET").unwrap_or_default();
    let binance_client = Arc::new(binance::client::BinanceClient::new(api_key, api_secret));

    // ── 4. Spawn market data streams ─────────────────────────────────────
    //
    // Only the 1m kline stream is subscribed per symbol; 5m/15m/1h/4h
    // series are derived in-process from sealed 1m candles (see
    // `CandleBuffer::aggregate_sealed_1m`), so no separate WS subscription
    // is needed for them.
    let symbols = state.runtime_config.read().symbols.clone();

    for symbol in &symbols {
        // Kline 1m stream
        let cb = state.candle_buffer.clone();
        let sym = symbol.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) =
                    market_data::candle_buffer::run_kline_stream(&sym, "1m", &cb).await
                {
                    error!(symbol = %sym, error = %e, "Kline 1m stream error — reconnecting in 5s");
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        });

        // Trade stream
        {
            let procs = state.trade_processors.read();
            if let Some(tp) = procs.get(symbol) {
                let processor = tp.clone();
                let sym = symbol.clone();
                tokio::spawn(async move {
                    loop {
                        if let Err(e) =
                            market_data::trade_stream::run_trade_stream(&sym, &processor).await
                        {
                            error!(symbol = %sym, error = %e, "Trade stream error — reconnecting in 5s");
                        }
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                    }
                });
            }
        }

        // Orderbook stream
        let ob = state.orderbook_manager.clone();
        let sym = symbol.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = market_data::orderbook::run_depth_stream(&sym, &ob).await {
                    error!(symbol = %sym, error = %e, "Depth stream error — reconnecting in 5s");
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        });
    }

    info!(count = symbols.len(), "Market data streams launched");

    // ── 5. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("AURORA_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let bind_addr_clone = bind_addr.clone();

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr_clone)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr_clone, "API server listening");
        axum::serve(listener, app)
            .await
            .expect("API server failed");
    });

    // ── 6. Execution engine ──────────────────────────────────────────────
    let exec_engine = Arc::new(ExecutionEngine::new(
        binance_client.clone(),
        state.position_manager.clone(),
        state.risk_engine.clone(),
    ));

    // ── 7. Strategy loop (HYDRA every tick, VIPER re-elected periodically) ─
    let strat_state = state.clone();
    let strat_exec = exec_engine.clone();
    tokio::spawn(async move {
        let engine = StrategyEngine::new();

        // Wait for initial data.
        tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
        info!("Strategy loop starting");

        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(5));
        loop {
            interval.tick().await;

            if strat_state.runtime_config.read().trading_mode != types::TradingMode::Live {
                continue;
            }

            let syms = strat_state.runtime_config.read().symbols.clone();
            let is_demo =
                strat_state.runtime_config.read().account_mode == AccountMode::Demo;

            for symbol in &syms {
                let (envelope, proposal) = engine.evaluate_hydra(&strat_state, symbol);
                strat_state.push_decision(envelope);
                if let Some(prop) = proposal {
                    execute_and_open(&strat_exec, &strat_state, prop, is_demo).await;
                }
            }

            let regime = strat_state
                .regime_detector
                .current_regime()
                .map(|rs| rs.regime)
                .unwrap_or(Regime::Choppy);

            if let Some(mode) = engine.maybe_elect_viper_mode(&strat_state, regime) {
                for symbol in &syms {
                    let (envelope, proposal) = engine.evaluate_viper(&strat_state, symbol, mode);
                    if let Some(env) = envelope {
                        strat_state.push_decision(env);
                    }
                    if let Some(prop) = proposal {
                        execute_and_open(&strat_exec, &strat_state, prop, is_demo).await;
                    }
                }
            }
        }
    });

    // ── 8. Position lifecycle loop ───────────────────────────────────────
    let pos_state = state.clone();
    tokio::spawn(async move {
        let engine = StrategyEngine::new();
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3));
        loop {
            interval.tick().await;

            let open = pos_state.position_manager.get_open_positions();
            if open.is_empty() {
                continue;
            }
            let config = pos_state.runtime_config.read().clone();

            for pos in &open {
                let price = {
                    let procs = pos_state.trade_processors.read();
                    procs.get(&pos.pair).map(|tp| tp.last_price()).unwrap_or(0.0)
                };
                if price <= 0.0 {
                    continue;
                }
                pos_state.position_manager.update_price(&pos.pair, price);

                let (exit_score, exit_score_threshold) = if pos.strategy == StrategyTag::Hydra {
                    (engine.hydra_exit_score(&pos_state, &pos.pair), config.hydra.exit_score_threshold)
                } else {
                    (None, 0.0)
                };

                let lunge_emergency = if pos.mode == Some(ViperMode::Lunge) {
                    let candles_15m = pos_state
                        .candle_buffer
                        .get_closed_candles(&CandleKey::new(&pos.pair, Timeframe::M15), 60);
                    viper::lunge::emergency_exit(&candles_15m)
                } else {
                    false
                };

                match pos_state.position_manager.tick(&pos.id, price, exit_score, exit_score_threshold, lunge_emergency) {
                    TickOutcome::NoAction => {}
                    TickOutcome::Partial { exit_type, quantity, price } => {
                        let net = pos_state.position_manager.apply_partial(&pos.id, quantity, price);
                        pos_state.increment_version();
                        info!(position_id = %pos.id, ?exit_type, quantity, price, net, "position partially closed");
                    }
                    TickOutcome::Closed(trade) => {
                        pos_state.risk_engine.record_trade_result(trade.net_pnl);
                        let won = trade.net_pnl > 0.0;

                        let entry_hour_utc = chrono::DateTime::from_timestamp_millis(trade.entry_ts)
                            .map(|dt| dt.hour())
                            .unwrap_or(0);
                        if trade.strategy == StrategyTag::Hydra {
                            pos_state.record_calibration(&trade.pair, entry_hour_utc, won);
                            pos_state.record_hydra_trade_result(won, now_ms());
                        }
                        if trade.mode == Some(ViperMode::Strike) {
                            let mut cadence = pos_state.strike_cadence.write();
                            cadence
                                .entry(trade.pair.clone())
                                .or_default()
                                .record_close(won, trade.closed_ts);
                        }

                        let risk_state = pos_state.risk_engine.get_state();
                        {
                            let mut ratchet = pos_state.ratchet_state.write();
                            viper::ratchet::evaluate(
                                &mut ratchet,
                                risk_state.daily_pnl_pct,
                                risk_state.daily_pnl,
                                now_ms(),
                                config.viper.overnight_cutoff_hour_utc,
                            );
                        }

                        pos_state.increment_version();
                        info!(position_id = %trade.id, pair = %trade.pair, net_pnl = trade.net_pnl, ?trade.exit_type, "position closed");
                    }
                }
            }
        }
    });

    // ── 9. Reconciliation loop ───────────────────────────────────────────
    let recon_state = state.clone();
    let recon_client = binance_client.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            interval.tick().await;

            if recon_state.runtime_config.read().account_mode == AccountMode::Demo {
                continue;
            }

            match recon_client.get_account().await {
                Ok(account_info) => {
                    if let Some(balances) =
                        account_info.get("balances").and_then(|v| v.as_array())
                    {
                        let mut new_balances = Vec::new();
                        for b in balances {
                            let asset =
                                b.get("asset").and_then(|v| v.as_str()).unwrap_or("");
                            let free: f64 = b
                                .get("free")
                                .and_then(|v| v.as_str())
                                .and_then(|s| s.parse().ok())
                                .unwrap_or(0.0);
                            let locked: f64 = b
                                .get("locked")
                                .and_then(|v| v.as_str())
                                .and_then(|s| s.parse().ok())
                                .unwrap_or(0.0);
                            if free > 0.0 || locked > 0.0 {
                                new_balances.push(types::BalanceInfo {
                                    asset: asset.to_string(),
                                    free,
                                    locked,
                                });
                            }
                        }
                        *recon_state.balances.write() = new_balances;
                        *recon_state.last_reconcile_ok.write() =
                            Some(std::time::Instant::now());
                        *recon_state.last_reconcile_error.write() = None;
                        recon_state.increment_version();
                    }
                }
                Err(e) => {
                    *recon_state.last_reconcile_error.write() = Some(format!("{e}"));
                    warn!(error = %e, "reconciliation failed");
                }
            }
        }
    });

    // ── 10. Regime detection loop ────────────────────────────────────────
    let regime_state = state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            let syms = regime_state.runtime_config.read().symbols.clone();
            if let Some(symbol) = syms.first() {
                let key = CandleKey::new(symbol.as_str(), Timeframe::M5);
                let candles = regime_state.candle_buffer.get_closed_candles(&key, 100);
                if candles.len() >= 50 {
                    regime_state.regime_detector.detect(&candles);
                    regime_state.increment_version();
                }
            }
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 11. Graceful shutdown ────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    if let Err(e) = state.runtime_config.read().save("runtime_config.json") {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Aurora Spot Nexus shut down complete.");
    Ok(())
}

/// Place (or simulate) an admitted `TradeProposal` and, on a confirmed
/// fill, open the full `Position` it describes.
async fn execute_and_open(
    exec: &ExecutionEngine,
    state: &AppState,
    prop: TradeProposal,
    is_demo: bool,
) {
    if prop.entry_price <= 0.0 || prop.size_usd <= 0.0 {
        return;
    }
    let quantity = prop.size_usd / prop.entry_price;

    let result = exec
        .execute_proposal(&prop.symbol, prop.side, prop.entry_price, quantity, is_demo)
        .await;
    info!(symbol = %prop.symbol, side = prop.side, strategy = %prop.strategy, result = %result, "trade execution result");

    if !matches!(result, ExecutionResult::Simulated(_) | ExecutionResult::Placed(_)) {
        return;
    }

    let now = now_ms();
    let position = Position {
        id: Uuid::new_v4().to_string(),
        pair: prop.symbol.clone(),
        strategy: prop.strategy,
        mode: prop.mode,
        entry_price: prop.entry_price,
        quantity,
        cost: prop.entry_price * quantity,
        entry_ts: now,
        stop_loss: prop.stop_loss,
        tp1: prop.tp1,
        tp2: prop.tp2,
        tp1_close_pct: prop.tp1_close_pct,
        tp2_close_pct: prop.tp2_close_pct,
        tp1_hit: false,
        tp2_hit: false,
        trail_distance: prop.trail_distance,
        high_since_tp1: 0.0,
        range_support: prop.range_support,
        range_resistance: prop.range_resistance,
        max_hold_ms: prop.max_hold_ms,
        exit_reason: None,
        dimension_scores: prop.dimension_scores,
        status: PositionStatus::Open,
        realized_pnl: 0.0,
        current_price: prop.entry_price,
    };

    info!(position_id = %position.id, symbol = %prop.symbol, strategy = %prop.strategy, "position opened");
    state.position_manager.open(position);
    state.increment_version();
}
