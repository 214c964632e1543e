use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::{
    BotStatus, ClosedTrade, Config, EngineCommand, EngineState, Error, PositionSnapshot, TradingMode,
};
use risk::{PerformanceStats, PortfolioSummary, RiskManager};

use crate::cycle::TradingCycle;

type Heartbeat = Arc<RwLock<Option<DateTime<Utc>>>>;

/// Cloneable handle passed to the host surface (API, binary).
///
/// Reads take a consistent snapshot under the risk lock. The only way to
/// change anything is through a command.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    risk: Arc<RwLock<RiskManager>>,
    heartbeat: Heartbeat,
    mode: TradingMode,
    stale_after: chrono::Duration,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!("Engine is gone, command dropped");
        }
    }

    pub async fn start(&self) {
        self.send(EngineCommand::Start).await;
    }

    pub async fn stop(&self) {
        self.send(EngineCommand::Stop).await;
    }

    /// Flag position `id` to be closed on the next monitoring pass.
    pub async fn request_exit(&self, id: impl Into<String>) {
        self.send(EngineCommand::ClosePosition(id.into())).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    pub async fn status(&self) -> BotStatus {
        let running = self.state().await == EngineState::Running;
        let last_heartbeat = *self.heartbeat.read().await;
        let is_healthy = last_heartbeat.is_some_and(|at| Utc::now().signed_duration_since(at) < self.stale_after);

        let risk = self.risk.read().await;
        let summary = risk.portfolio_summary();
        BotStatus {
            running,
            mode: self.mode,
            capital: risk.capital(),
            total_value: summary.equity,
            unrealized_pnl: summary.unrealized_pnl,
            daily_pnl: summary.daily_pnl,
            open_position_count: summary.open_positions,
            total_trade_count: summary.total_trades,
            last_heartbeat,
            is_healthy,
        }
    }

    pub async fn positions(&self) -> Vec<PositionSnapshot> {
        self.risk.read().await.position_snapshots()
    }

    /// Most recent `limit` closed trades, newest first.
    pub async fn trades(&self, limit: usize) -> Vec<ClosedTrade> {
        self.risk.read().await.recent_trades(limit)
    }

    pub async fn summary(&self) -> PortfolioSummary {
        self.risk.read().await.portfolio_summary()
    }

    pub async fn performance(&self) -> PerformanceStats {
        self.risk.read().await.performance()
    }
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<TradingCycle>,
}

enum Event {
    Command(Option<EngineCommand>),
    WorkerExited(std::result::Result<TradingCycle, JoinError>),
}

/// Owns the trading cycle and runs it on a background worker while started.
///
/// Lifecycle: `Engine::new` → `run` (spawned) → `Start`/`Stop` commands →
/// command channel closed. One engine serves one mode for one run.
pub struct Engine {
    config: Config,
    state: Arc<RwLock<EngineState>>,
    risk: Arc<RwLock<RiskManager>>,
    heartbeat: Heartbeat,
    command_rx: mpsc::Receiver<EngineCommand>,
    /// Present while stopped; moved into the worker while running.
    cycle: Option<TradingCycle>,
    worker: Option<Worker>,
}

impl Engine {
    pub fn new(config: Config, cycle: TradingCycle) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(EngineState::Stopped));
        let heartbeat: Heartbeat = Arc::new(RwLock::new(None));
        let risk = cycle.risk();

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
            risk: risk.clone(),
            heartbeat: heartbeat.clone(),
            mode: config.trading_mode,
            stale_after: chrono::Duration::seconds(config.heartbeat_stale_secs),
        };

        let engine = Engine { config, state, risk, heartbeat, command_rx, cycle: Some(cycle), worker: None };
        (engine, handle)
    }

    /// Process commands until every handle is dropped. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("Engine initialized in Stopped state. Waiting for Start command.");

        loop {
            let event = match self.worker.as_mut() {
                Some(worker) => tokio::select! {
                    cmd = self.command_rx.recv() => Event::Command(cmd),
                    joined = &mut worker.handle => Event::WorkerExited(joined),
                },
                None => Event::Command(self.command_rx.recv().await),
            };

            match event {
                Event::WorkerExited(joined) => self.reap(joined).await,
                Event::Command(Some(EngineCommand::Start)) => self.start().await,
                Event::Command(Some(EngineCommand::Stop)) => self.stop().await,
                Event::Command(Some(EngineCommand::ClosePosition(id))) => {
                    if let Err(e) = self.risk.write().await.request_exit(&id) {
                        warn!(%id, error = %e, "Close request ignored");
                    }
                }
                Event::Command(None) => {
                    info!("Engine command channel closed, shutting down");
                    self.stop().await;
                    break;
                }
            }
        }
    }

    /// The worker ended without being cancelled.
    async fn reap(&mut self, joined: std::result::Result<TradingCycle, JoinError>) {
        self.worker = None;
        *self.state.write().await = EngineState::Stopped;
        match joined {
            Ok(cycle) => {
                warn!("Trading worker exited on its own");
                self.cycle = Some(cycle);
            }
            Err(e) => error!(error = %e, "Trading worker failed, engine stopped"),
        }
    }

    async fn start(&mut self) {
        if let Some(worker) = &self.worker {
            if !worker.handle.is_finished() {
                info!("Engine already running");
                return;
            }
            // the previous worker died; reap it before starting again
            self.stop().await;
        }
        if let Err(e) = self.config.validate() {
            error!(error = %e, "Refusing to start with an invalid configuration");
            return;
        }
        let Some(cycle) = self.cycle.take() else {
            error!("Trading cycle was lost by a failed worker, cannot start");
            return;
        };

        let token = CancellationToken::new();
        let handle = tokio::spawn(work(
            cycle,
            token.clone(),
            self.heartbeat.clone(),
            self.config.cycle_interval(),
            self.config.cycle_timeout(),
        ));
        self.worker = Some(Worker { token, handle });
        *self.state.write().await = EngineState::Running;
        info!(
            pairs = ?self.config.trading_pairs,
            interval_mins = self.config.trading_cycle_minutes,
            "Trading worker started"
        );
    }

    /// Cancel the worker and wait for its current cycle to finish.
    async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            debug!("Engine already stopped");
            return;
        };
        *self.state.write().await = EngineState::Stopped;
        worker.token.cancel();
        match worker.handle.await {
            Ok(cycle) => self.cycle = Some(cycle),
            Err(e) => error!(error = %e, "Trading worker failed"),
        }
        info!("Trading worker stopped");
    }
}

/// Run cycles back to back until cancelled. A cycle that overruns `budget`
/// is abandoned and the next one is scheduled as usual.
async fn work(
    mut cycle: TradingCycle,
    token: CancellationToken,
    heartbeat: Heartbeat,
    interval: Duration,
    budget: Duration,
) -> TradingCycle {
    while !token.is_cancelled() {
        match tokio::time::timeout(budget, cycle.run_once()).await {
            Ok(report) => {
                *heartbeat.write().await = Some(Utc::now());
                debug!(
                    closed = report.closed.len(),
                    opened = report.opened.len(),
                    skipped = report.skipped.len(),
                    "Cycle report"
                );
            }
            Err(_) => error!(error = %Error::CycleTimeout(budget.as_secs()), "Trading cycle aborted"),
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    cycle
}
