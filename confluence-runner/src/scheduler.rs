//! The trading loop.
//!
//! One cycle, in order:
//! 1. Reconcile positions that closed since the last cycle (journal, agent
//!    loss streak, daily P&L)
//! 2. Lifecycle pass over every open position, with the regime of each
//!    position's symbol reclassified from fresh bars first
//! 3. Pre-flight: session window, portfolio gate, open-position ceiling
//! 4. Phase 1, sequential: quote, pre-scan gate and bar fetch per instrument.
//!    The terminal is never called from two tasks at once.
//! 5. Phase 2, parallel: features, provider calls and scoring on a bounded
//!    worker pool. Reads only the bars fetched in phase 1.
//! 6. Rank, authorize in rank order, threshold check, size, place, journal
//!
//! A candle is marked analyzed only once it is settled: an order confirmed,
//! or the top candidate below threshold. Rejected and untried candidates are
//! scored again next cycle.
//!
//! At most one order per cycle. Recoverable failures end up in the
//! [`CycleReport`]; only fatal terminal errors stop the loop.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use confluence_core::agent::{InstrumentAgent, ScanOutcome};
use confluence_core::cache::DataCache;
use confluence_core::clock::{Clock, SystemClock};
use confluence_core::config::BotConfig;
use confluence_core::domain::{Candidate, ConfigFingerprint, OpenPosition, Ticket};
use confluence_core::error::{DataError, ExecutionError};
use confluence_core::features::TimeframeBars;
use confluence_core::lifecycle::{LifecycleAction, PositionLifecycleManager};
use confluence_core::regime::{AdxEmaRegime, RegimeDetector};
use confluence_core::risk::{GateReason, RiskManager};
use confluence_core::scoring::rank_candidates;
use confluence_core::session::SessionSchedule;
use confluence_core::signals::ProviderSet;
use confluence_core::terminal::{
    AccountInfo, EntryRecord, ExecutionClient, ExitRecord, Journal, MarketDataSource, OrderRequest,
};

use crate::error::{BuildError, SchedulerError};
use crate::gateway::ProviderGateway;
use crate::report::{CandidateSummary, CycleOutcome, CycleReport, ExecutedOrder, NoTradeReason, SymbolNote};
use crate::ticker::{ShutdownSignal, Ticker};

/// Run a terminal or journal call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, SchedulerError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}

// ─── Builder ────────────────────────────────────────────────────────

/// Single assembly point for a [`Scheduler`].
pub struct SchedulerBuilder {
    config: BotConfig,
    market: Option<Arc<dyn MarketDataSource>>,
    execution: Option<Arc<dyn ExecutionClient>>,
    journal: Option<Arc<dyn Journal>>,
    providers: Arc<ProviderSet>,
    clock: Arc<dyn Clock>,
    regime: Arc<dyn RegimeDetector>,
}

impl SchedulerBuilder {
    pub fn new(config: BotConfig) -> Self {
        Self {
            config,
            market: None,
            execution: None,
            journal: None,
            providers: Arc::new(ProviderSet::default()),
            clock: Arc::new(SystemClock),
            regime: Arc::new(AdxEmaRegime::default()),
        }
    }

    pub fn market(mut self, market: Arc<dyn MarketDataSource>) -> Self {
        self.market = Some(market);
        self
    }

    pub fn execution(mut self, execution: Arc<dyn ExecutionClient>) -> Self {
        self.execution = Some(execution);
        self
    }

    /// One object serving both market data and execution.
    pub fn terminal<T>(self, terminal: Arc<T>) -> Self
    where
        T: MarketDataSource + ExecutionClient + 'static,
    {
        self.market(terminal.clone()).execution(terminal)
    }

    pub fn journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn providers(mut self, providers: Arc<ProviderSet>) -> Self {
        self.providers = providers;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn regime(mut self, regime: Arc<dyn RegimeDetector>) -> Self {
        self.regime = regime;
        self
    }

    pub fn build(self) -> Result<Scheduler, BuildError> {
        if self.config.instruments.is_empty() {
            return Err(BuildError::NoInstruments);
        }
        self.config.validate()?;
        let market = self.market.ok_or(BuildError::Missing("market data source"))?;
        let execution = self.execution.ok_or(BuildError::Missing("execution client"))?;
        let journal = self.journal.ok_or(BuildError::Missing("journal"))?;

        let cfg = self.config;
        let now = self.clock.now();
        let agents = cfg
            .instruments
            .iter()
            .map(|inst| Arc::new(InstrumentAgent::from_config(inst.clone(), &cfg, self.regime.clone())))
            .collect();
        let fingerprint = cfg.fingerprint();
        info!(
            fingerprint = fingerprint.short(),
            instruments = cfg.instruments.len(),
            workers = cfg.scheduler.max_workers,
            "scheduler: assembled"
        );

        Ok(Scheduler {
            fingerprint,
            market,
            execution,
            journal,
            providers: self.providers,
            clock: self.clock,
            risk: Arc::new(RiskManager::from_config(&cfg, now)),
            agents,
            cache: Arc::new(DataCache::new(cfg.scheduler.cache_ttl())),
            lifecycle: Arc::new(PositionLifecycleManager::new(cfg.lifecycle.clone())),
            sessions: SessionSchedule::new(cfg.sessions.clone()),
            gateway: ProviderGateway::new(cfg.scheduler.provider_timeout()),
            workers: Arc::new(Semaphore::new(cfg.scheduler.max_workers)),
            known: HashSet::new(),
            cycle: 0,
            config: cfg,
        })
    }
}

// ─── Scheduler ──────────────────────────────────────────────────────

pub struct Scheduler {
    config: BotConfig,
    fingerprint: ConfigFingerprint,
    market: Arc<dyn MarketDataSource>,
    execution: Arc<dyn ExecutionClient>,
    journal: Arc<dyn Journal>,
    providers: Arc<ProviderSet>,
    clock: Arc<dyn Clock>,
    risk: Arc<RiskManager>,
    agents: Vec<Arc<InstrumentAgent>>,
    cache: Arc<DataCache>,
    lifecycle: Arc<PositionLifecycleManager>,
    sessions: SessionSchedule,
    gateway: ProviderGateway,
    workers: Arc<Semaphore>,
    /// Tickets seen open, so a disappearance can be reconciled.
    known: HashSet<Ticket>,
    cycle: u64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("fingerprint", &self.fingerprint.short())
            .field("agents", &self.agents.len())
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

/// Symbol plus what its scoring task produced.
type TaskResult = (String, Result<ScanOutcome, String>);

impl Scheduler {
    pub fn builder(config: BotConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn fingerprint(&self) -> &ConfigFingerprint {
        &self.fingerprint
    }

    pub fn risk(&self) -> &Arc<RiskManager> {
        &self.risk
    }

    pub fn cache(&self) -> &Arc<DataCache> {
        &self.cache
    }

    /// Live provider slots; swapping one affects the next scoring task.
    pub fn providers(&self) -> &Arc<ProviderSet> {
        &self.providers
    }

    pub fn agents(&self) -> &[Arc<InstrumentAgent>] {
        &self.agents
    }

    pub fn agent(&self, symbol: &str) -> Option<&Arc<InstrumentAgent>> {
        self.agents.iter().find(|a| a.symbol() == symbol)
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycle
    }

    /// Run cycles on the configured interval until shutdown or `max_cycles`.
    ///
    /// Shutdown is checked between cycles only. Returns the number of cycles run.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal, max_cycles: Option<u64>) -> Result<u64, SchedulerError> {
        let mut ticker = Ticker::new(self.config.scheduler.cycle_interval());
        let mut completed = 0u64;
        info!(
            fingerprint = self.fingerprint.short(),
            interval_secs = self.config.scheduler.cycle_interval_secs,
            "scheduler: starting"
        );

        while ticker.tick(&mut shutdown).await {
            if let Err(e) = self.run_cycle().await {
                error!(error = %e, cycle = self.cycle, "scheduler: halting");
                return Err(e);
            }
            completed += 1;
            if max_cycles.is_some_and(|max| completed >= max) {
                break;
            }
        }
        info!(cycles = completed, "scheduler: stopped");
        Ok(completed)
    }

    /// One full cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, SchedulerError> {
        self.cycle += 1;
        let now = self.clock.now();
        self.risk.roll_day(now);
        let evicted = self.cache.evict_expired(now);
        if evicted > 0 {
            debug!(evicted, "scheduler: cache entries expired");
        }

        let threshold = self.sessions.adaptive_threshold(self.config.scoring.base_threshold, now);
        let mut report = CycleReport::new(self.cycle, now, self.sessions.phase(now), threshold);

        let (positions, account) = match self.snapshot().await? {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "scheduler: terminal snapshot failed, skipping cycle");
                report.outcome = CycleOutcome::NoTrade(NoTradeReason::SnapshotFailed { error: e.to_string() });
                return Ok(finish(report));
            }
        };

        self.reconcile(&positions, account.equity, now, &mut report).await?;
        self.manage(&positions, account.equity, now, &mut report).await?;

        if let Some(reason) = self.preflight(&positions, &report, now) {
            report.outcome = CycleOutcome::NoTrade(reason);
            return Ok(finish(report));
        }

        let jobs = self.fetch_phase(now, &mut report).await?;
        let mut candidates = self.score_phase(jobs, now, &mut report).await;
        rank_candidates(&mut candidates);
        report.candidates = candidates.iter().map(summary).collect();

        let outcome = if candidates.is_empty() {
            CycleOutcome::NoTrade(NoTradeReason::NoCandidates)
        } else {
            self.execute(&candidates, account, threshold, now, &mut report).await?
        };
        report.outcome = outcome;
        Ok(finish(report))
    }

    async fn snapshot(&self) -> Result<Result<(Vec<OpenPosition>, AccountInfo), ExecutionError>, SchedulerError> {
        let exec = self.execution.clone();
        let snapshot = blocking(move || -> Result<_, ExecutionError> { Ok((exec.all_positions()?, exec.account()?)) })
            .await?;
        match snapshot {
            Err(e) if e.is_fatal() => Err(e.into()),
            other => Ok(other),
        }
    }

    /// Journal and book every known ticket missing from `positions`; start
    /// tracking any open ticket not seen before.
    async fn reconcile(
        &mut self,
        positions: &[OpenPosition],
        equity: f64,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<(), SchedulerError> {
        let open: HashSet<Ticket> = positions.iter().map(|p| p.ticket).collect();
        let mut vanished: Vec<Ticket> = self.known.difference(&open).copied().collect();
        vanished.sort();

        for ticket in vanished {
            let exec = self.execution.clone();
            match blocking(move || exec.closed_trade(ticket)).await? {
                Ok(Some(trade)) => {
                    let exit = ExitRecord::from(&trade);
                    self.log_exit(&exit).await?;
                    if let Some(agent) = self.agent(&trade.symbol) {
                        agent.update_performance(trade.profit, now);
                    }
                    self.risk.record_realized(trade.profit, equity, now);
                    info!(symbol = %trade.symbol, %ticket, profit = trade.profit, "scheduler: position closed");
                    report.closed.push(exit);
                    self.known.remove(&ticket);
                }
                Ok(None) => {
                    warn!(%ticket, "scheduler: position gone but terminal has no close record");
                    self.known.remove(&ticket);
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => warn!(%ticket, error = %e, "scheduler: close lookup failed, retrying next cycle"),
            }
        }

        self.known.extend(open);
        Ok(())
    }

    async fn log_exit(&self, exit: &ExitRecord) -> Result<(), SchedulerError> {
        let (journal, record) = (self.journal.clone(), exit.clone());
        if let Err(e) = blocking(move || journal.log_exit(&record)).await? {
            error!(ticket = %exit.ticket, error = %e, "scheduler: journal exit write failed");
        }
        Ok(())
    }

    /// Lifecycle pass. Partial-close profit is booked at once; a forced exit
    /// is booked when reconciliation sees the ticket gone.
    async fn manage(
        &self,
        positions: &[OpenPosition],
        equity: f64,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<(), SchedulerError> {
        self.refresh_regimes(positions, now).await?;

        for pos in positions {
            let Some(agent) = self.agent(&pos.symbol) else {
                debug!(symbol = %pos.symbol, ticket = %pos.ticket, "scheduler: no agent for position, not managed");
                continue;
            };
            report.managed += 1;

            let (lifecycle, risk, exec) = (self.lifecycle.clone(), self.risk.clone(), self.execution.clone());
            let (instrument, regime, position) = (agent.instrument().clone(), agent.last_regime(), pos.clone());
            let actions =
                blocking(move || lifecycle.manage(&position, &instrument, regime, &risk, exec.as_ref())).await??;

            for action in &actions {
                if let LifecycleAction::PartialClose { profit, .. } = action {
                    self.risk.record_realized(*profit, equity, now);
                }
            }
            report.actions.extend(actions);
        }
        Ok(())
    }

    /// Classify the regime of every symbol with open positions, paused agents
    /// included. Sequential; the bars land in the cache for phase 1. On a data
    /// failure the previous regime stays in place.
    async fn refresh_regimes(&self, positions: &[OpenPosition], now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let mut symbols: Vec<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();

        for symbol in symbols {
            let Some(agent) = self.agent(symbol).cloned() else {
                continue;
            };
            let bars = match self.fetch_bars(symbol, now).await? {
                Ok(bars) => bars,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "scheduler: bars unavailable, keeping last regime");
                    continue;
                }
            };
            match blocking(move || agent.refresh_regime(&bars)).await? {
                Ok(view) => debug!(symbol = %symbol, regime = %view.regime, "scheduler: regime refreshed"),
                Err(e) => warn!(symbol = %symbol, error = %e, "scheduler: regime refresh failed, keeping last regime"),
            }
        }
        Ok(())
    }

    fn preflight(&self, positions: &[OpenPosition], report: &CycleReport, now: DateTime<Utc>) -> Option<NoTradeReason> {
        if !self.sessions.is_trading_time(now) {
            return Some(NoTradeReason::OutsideSession);
        }
        let gate = self.risk.portfolio_gate(now);
        if !gate.allowed {
            return Some(NoTradeReason::Portfolio { reason: gate.reason });
        }
        let exited = report
            .actions
            .iter()
            .filter(|a| matches!(a, LifecycleAction::ForcedExit { .. }))
            .count();
        let open = positions.len().saturating_sub(exited);
        let max = self.config.scheduler.max_open_positions;
        if open >= max {
            return Some(NoTradeReason::MaxOpenPositions { open, max });
        }
        None
    }

    /// Phase 1. One terminal call at a time.
    async fn fetch_phase(
        &self,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<Vec<(Arc<InstrumentAgent>, TimeframeBars)>, SchedulerError> {
        let mut jobs = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            let symbol = agent.symbol().to_string();

            let paused = agent.pre_scan(now);
            if !paused.allowed {
                report.skipped.push(SymbolNote::new(&symbol, &paused.reason));
                continue;
            }

            let (market, sym) = (self.market.clone(), symbol.clone());
            let quote = match blocking(move || market.quote(&sym)).await? {
                Ok(quote) => quote,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    report.failed.push(SymbolNote::new(&symbol, &e));
                    continue;
                }
            };

            let gate = self.risk.pre_scan_gate(agent.instrument(), &quote, now);
            if !gate.allowed {
                debug!(symbol = %symbol, reason = %gate.reason, "scheduler: pre-scan gate");
                report.skipped.push(SymbolNote::new(&symbol, &gate.reason));
                continue;
            }

            match self.fetch_bars(&symbol, now).await? {
                Ok(bars) => {
                    report.scanned.push(symbol);
                    jobs.push((agent.clone(), bars));
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "scheduler: bars unavailable");
                    report.failed.push(SymbolNote::new(&symbol, &e));
                }
            }
        }
        Ok(jobs)
    }

    async fn fetch_bars(&self, symbol: &str, now: DateTime<Utc>) -> Result<Result<TimeframeBars, DataError>, SchedulerError> {
        let sched = &self.config.scheduler;
        let mut series = Vec::with_capacity(3);
        for timeframe in sched.timeframes() {
            let (cache, market, sym, count) = (self.cache.clone(), self.market.clone(), symbol.to_string(), sched.bar_count);
            let fetched =
                blocking(move || cache.get_or_fetch(&sym, timeframe, now, || market.get_bars(&sym, timeframe, count)))
                    .await?;
            match fetched {
                Ok(bars) => series.push(bars),
                Err(e) => return Ok(Err(e)),
            }
        }
        let mut series = series.into_iter();
        match (series.next(), series.next(), series.next()) {
            (Some(entry), Some(intermediate), Some(higher)) => Ok(Ok(TimeframeBars {
                entry_timeframe: sched.entry_timeframe,
                entry,
                intermediate,
                higher,
            })),
            _ => Ok(Err(DataError::Unavailable { symbol: symbol.to_string(), timeframe: sched.entry_timeframe })),
        }
    }

    /// Phase 2. Each task takes one worker slot for features, provider calls
    /// and scoring. Provider set is snapshotted per task.
    async fn score_phase(
        &self,
        jobs: Vec<(Arc<InstrumentAgent>, TimeframeBars)>,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Vec<Candidate> {
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        for (agent, bars) in jobs {
            let (workers, gateway, providers) = (self.workers.clone(), self.gateway, self.providers.snapshot());
            tasks.spawn(async move {
                let symbol = agent.symbol().to_string();
                let Ok(_slot) = workers.acquire_owned().await else {
                    return (symbol, Err("worker pool closed".to_string()));
                };

                let prep = agent.clone();
                let prepared = match tokio::task::spawn_blocking(move || prep.prepare(&bars, now)).await {
                    Ok(Ok(prepared)) => prepared,
                    Ok(Err(e)) => return (symbol, Err(e.to_string())),
                    Err(join) => return (symbol, Err(format!("feature task failed: {join}"))),
                };
                let outcome = match prepared {
                    Err(skip) => ScanOutcome::Skipped(skip),
                    Ok(prepared) => {
                        let signals = gateway.gather(providers, Arc::new(prepared.features.clone())).await;
                        agent.evaluate(&prepared, &signals)
                    }
                };
                (symbol, Ok(outcome))
            });
        }

        let mut candidates = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(ScanOutcome::Candidate(c)))) => candidates.push(c),
                Ok((symbol, Ok(ScanOutcome::Skipped(reason)))) => report.skipped.push(SymbolNote::new(symbol, reason)),
                Ok((symbol, Err(e))) => {
                    warn!(symbol = %symbol, error = %e, "scheduler: scoring failed, dropping cached bars");
                    self.cache.invalidate(&symbol);
                    report.failed.push(SymbolNote::new(symbol, e));
                }
                Err(join) => error!(error = %join, "scheduler: scoring task died"),
            }
        }
        candidates
    }

    /// Authorize in rank order, then threshold, size, place and journal the
    /// first survivor.
    async fn execute(
        &mut self,
        ranked: &[Candidate],
        account: AccountInfo,
        threshold: u8,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<CycleOutcome, SchedulerError> {
        let exec = self.execution.clone();
        let live = match blocking(move || exec.all_positions()).await? {
            Ok(live) => live,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                return Ok(CycleOutcome::NoTrade(NoTradeReason::SnapshotFailed { error: e.to_string() }));
            }
        };

        let risk = self.risk.clone();
        let mut chosen = None;
        for candidate in ranked {
            match risk.authorize(candidate, &live, now) {
                Ok(permit) => {
                    chosen = Some((candidate, permit));
                    break;
                }
                Err(denied) => match denied.reason {
                    GateReason::CircuitBreaker { .. } | GateReason::DailyCapReached { .. } => {
                        return Ok(CycleOutcome::NoTrade(NoTradeReason::Portfolio { reason: denied.reason }));
                    }
                    reason => {
                        debug!(symbol = %candidate.symbol, %reason, "scheduler: candidate gated");
                        report.skipped.push(SymbolNote::new(&candidate.symbol, reason));
                    }
                },
            }
        }
        let Some((candidate, permit)) = chosen else {
            return Ok(CycleOutcome::NoTrade(NoTradeReason::AllGated));
        };
        let Some(agent) = self.agent(&candidate.symbol).cloned() else {
            return Ok(CycleOutcome::NoTrade(NoTradeReason::AllGated));
        };

        let Some(basis) = agent.scorer().setup_basis(candidate.confluence, candidate.probability, threshold) else {
            agent.mark_analyzed(candidate.candle_time);
            return Ok(CycleOutcome::NoTrade(NoTradeReason::BelowThreshold {
                symbol: candidate.symbol.clone(),
                confluence: candidate.confluence,
                threshold,
            }));
        };

        let size = risk.size(candidate, agent.instrument(), account.equity);
        if !size.is_tradeable() {
            return Ok(CycleOutcome::NoTrade(NoTradeReason::ZeroVolume { symbol: candidate.symbol.clone() }));
        }

        let (market, sym) = (self.market.clone(), candidate.symbol.clone());
        let quote = match blocking(move || market.quote(&sym)).await? {
            Ok(quote) => quote,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => return Ok(failed(candidate, e)),
        };
        let entry = quote.entry_price(candidate.direction);
        let request = OrderRequest {
            symbol: candidate.symbol.clone(),
            direction: candidate.direction,
            volume: size.volume,
            stop_loss: candidate.stop_price(entry),
            take_profit: candidate.target_price(entry),
            comment: format!("cf{} {}", candidate.confluence, self.fingerprint.short()),
        };

        let (exec, req) = (self.execution.clone(), request.clone());
        let receipt = match blocking(move || exec.place_order(&req)).await? {
            Ok(receipt) => receipt,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!(symbol = %candidate.symbol, error = %e, "scheduler: order rejected");
                return Ok(failed(candidate, e));
            }
        };

        let entry_record = EntryRecord {
            ticket: receipt.ticket,
            symbol: candidate.symbol.clone(),
            direction: candidate.direction,
            volume: receipt.volume,
            entry_price: receipt.fill_price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            confluence: candidate.confluence,
            ensemble: candidate.ensemble,
            probability: candidate.probability,
            regime: candidate.regime,
            factors: candidate.factors.clone(),
            config_fingerprint: self.fingerprint.to_string(),
            opened_at: receipt.time,
        };
        let journal = self.journal.clone();
        if let Err(e) = blocking(move || journal.log_entry(&entry_record)).await? {
            error!(ticket = %receipt.ticket, error = %e, "scheduler: journal entry write failed");
        }

        permit.confirm(now);
        agent.record_trade(now);
        agent.mark_analyzed(candidate.candle_time);
        self.known.insert(receipt.ticket);

        info!(
            symbol = %candidate.symbol,
            ticket = %receipt.ticket,
            direction = %candidate.direction,
            volume = receipt.volume,
            fill = receipt.fill_price,
            confluence = candidate.confluence,
            threshold,
            ?basis,
            risk_pct = size.risk_pct,
            "scheduler: order placed"
        );
        Ok(CycleOutcome::Executed(ExecutedOrder {
            ticket: receipt.ticket,
            symbol: candidate.symbol.clone(),
            direction: candidate.direction,
            volume: receipt.volume,
            entry_price: receipt.fill_price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            confluence: candidate.confluence,
            threshold,
        }))
    }
}

fn failed(candidate: &Candidate, err: impl std::fmt::Display) -> CycleOutcome {
    CycleOutcome::NoTrade(NoTradeReason::ExecutionFailed { symbol: candidate.symbol.clone(), error: err.to_string() })
}

fn summary(c: &Candidate) -> CandidateSummary {
    CandidateSummary {
        symbol: c.symbol.clone(),
        direction: c.direction,
        confluence: c.confluence,
        ensemble: c.ensemble,
        probability: c.probability,
    }
}

fn finish(report: CycleReport) -> CycleReport {
    info!(
        cycle = report.cycle,
        phase = %report.phase,
        threshold = report.threshold,
        managed = report.managed,
        actions = report.actions.len(),
        closed = report.closed.len(),
        scanned = report.scanned.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        candidates = report.candidates.len(),
        outcome = %report.outcome,
        "scheduler: cycle complete"
    );
    report
}
