use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use common::{Config, MarketData, OrderExecution, Result, TradingMode};
use engine::{Analyzer, Backtester, BinanceClient, Engine, ModelRegistry, OrderExecutor, TradingCycle};
use paper::PaperClient;
use predictor::{ensemble_factory, EnsembleConfig, FileModelStore, ModelStore, Predictor};
use risk::RiskConfig;
use strategy::{IndicatorConfig, SignalAggregator};

/// Candles replayed by `tradebot backtest <SYMBOL>`.
const BACKTEST_CANDLES: usize = 1000;

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    cfg.validate()?;
    let indicators = match &cfg.strategy_config_path {
        Some(path) => IndicatorConfig::load(path)?,
        None => IndicatorConfig::default(),
    };
    let analyzer = Analyzer::new(indicators, SignalAggregator::default());
    info!(mode = %cfg.trading_mode, pairs = ?cfg.trading_pairs, "TradeBot starting");

    // ── Exchange ──────────────────────────────────────────────────────────────
    let binance = Arc::new(BinanceClient::new(cfg.binance_api_key.clone(), cfg.binance_secret.clone())?);
    let market: Arc<dyn MarketData> = binance.clone();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [cmd, symbol] = args.as_slice() {
        if cmd == "backtest" {
            return backtest(&cfg, analyzer, market.as_ref(), symbol).await;
        }
    }

    let execution: Arc<dyn OrderExecution> = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode, orders go to Binance");
            binance
        }
        TradingMode::Paper => {
            info!(slippage_bps = cfg.paper_slippage_bps, "Paper trading mode, fills are simulated");
            Arc::new(PaperClient::new(market.clone(), cfg.paper_slippage_bps))
        }
    };

    // ── Engine ────────────────────────────────────────────────────────────────
    let store: Arc<dyn ModelStore> = Arc::new(FileModelStore::new(&cfg.model_dir));
    let models = ModelRegistry::new(ensemble_factory(EnsembleConfig::default()), store, cfg.model_retrain_hours);
    let executor = OrderExecutor::new(execution, cfg.trading_mode);
    let cycle = TradingCycle::new(&cfg, market, executor, analyzer, models);
    let (engine, handle) = Engine::new(cfg.clone(), cycle);
    let engine_task = tokio::spawn(engine.run());

    // ── Dashboard API ─────────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let api_state = api::AppState { engine: handle.clone(), dashboard_token: cfg.dashboard_token.clone() };
    let api_shutdown = shutdown.clone();
    let api_task = tokio::spawn(api::serve(api_state, cfg.dashboard_port, async move {
        api_shutdown.cancelled().await
    }));

    handle.start().await;
    info!("All subsystems started. Waiting for shutdown signal.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping worker");
    handle.stop().await;
    shutdown.cancel();
    drop(handle);

    match api_task.await {
        Ok(Err(e)) => error!(error = %e, "Dashboard API failed"),
        Err(e) => error!(error = %e, "Dashboard API task panicked"),
        Ok(Ok(())) => {}
    }
    if let Err(e) = engine_task.await {
        error!(error = %e, "Engine task panicked");
    }
    info!("Shutdown complete");
    Ok(())
}

/// Replay the most recent primary-timeframe candles for `symbol` with the
/// stored model, if there is one.
async fn backtest(cfg: &Config, analyzer: Analyzer, market: &dyn MarketData, symbol: &str) -> Result<()> {
    let candles = market.get_candles(symbol, &cfg.primary_timeframe, BACKTEST_CANDLES).await;
    let store = FileModelStore::new(&cfg.model_dir);
    let mut model = ensemble_factory(EnsembleConfig::default())();
    let predictor: Option<&dyn Predictor> = if model.load(&store, symbol)? {
        Some(model.as_ref())
    } else {
        info!(%symbol, "No saved model, backtesting without the predictor");
        None
    };

    let report = Backtester::new(analyzer, RiskConfig::from_config(cfg)).run(symbol, &candles, predictor)?;
    info!(
        %symbol,
        candles = candles.len(),
        initial_capital = report.initial_capital,
        final_equity = report.final_equity,
        total_return_pct = report.total_return_pct,
        win_rate = report.stats.win_rate,
        profit_factor = report.stats.profit_factor,
        sharpe = report.sharpe_ratio,
        max_drawdown = report.max_drawdown,
        avg_duration_hours = report.stats.avg_duration_hours,
        "Backtest report"
    );
    Ok(())
}
