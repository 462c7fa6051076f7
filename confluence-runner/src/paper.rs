//! Paper terminal: synthetic market data and an in-memory order book.
//!
//! - Prices follow a seeded random walk with a per-symbol drift, so some
//!   symbols trend and the scorer has something to find.
//! - Bar history is regenerated from the current mid whenever a new candle
//!   opens; within one candle repeated fetches return identical bars.
//! - Every `quote` advances the walk one step and marks that symbol's
//!   positions to market. Stops and targets fill at their own price.
//!
//! Single-threaded by contract like a real terminal, but `Sync` so it can be
//! shared behind an `Arc`.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use confluence_core::clock::Clock;
use confluence_core::domain::{AssetClass, Bar, ClosedTrade, Direction, Instrument, OpenPosition, Ticket, Timeframe};
use confluence_core::error::{DataError, ExecutionError};
use confluence_core::terminal::{
    AccountInfo, CloseReceipt, ExecutionClient, MarketDataSource, OrderReceipt, OrderRequest, Quote,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PaperConfig {
    pub seed: u64,
    pub initial_balance: f64,
    /// Typical size of one random-walk step, in pips.
    pub step_pips: f64,
    /// Largest per-bar drift assigned to a symbol, in pips.
    pub max_drift_pips: f64,
    /// Starting mid prices; symbols not listed start at 10 000 pips.
    pub start_prices: BTreeMap<String, f64>,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            initial_balance: 10_000.0,
            step_pips: 2.0,
            max_drift_pips: 0.8,
            start_prices: BTreeMap::new(),
        }
    }
}

/// Quoted spread per asset class, in pips.
fn spread_pips(class: AssetClass) -> f64 {
    match class {
        AssetClass::Forex => 1.2,
        AssetClass::Metal => 25.0,
        AssetClass::Index => 10.0,
        AssetClass::Energy => 4.0,
        AssetClass::Crypto => 80.0,
    }
}

#[derive(Debug, Clone)]
struct Market {
    instrument: Instrument,
    mid: f64,
    /// Per-bar drift in price units.
    drift: f64,
}

impl Market {
    fn quote(&self, time: DateTime<Utc>) -> Quote {
        let half = self.instrument.pips(spread_pips(self.instrument.asset_class)) / 2.0;
        Quote { bid: self.mid - half, ask: self.mid + half, time }
    }

    fn profit(&self, direction: Direction, entry: f64, price: f64, volume: f64) -> f64 {
        let pips = self.instrument.to_pips(direction.favorable_move(entry, price));
        pips * self.instrument.pip_value_per_lot * volume
    }
}

#[derive(Debug)]
struct PaperState {
    rng: StdRng,
    markets: HashMap<String, Market>,
    positions: BTreeMap<Ticket, OpenPosition>,
    closed: HashMap<Ticket, ClosedTrade>,
    next_ticket: u64,
    balance: f64,
}

pub struct PaperTerminal {
    cfg: PaperConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<PaperState>,
}

impl std::fmt::Debug for PaperTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PaperTerminal")
            .field("seed", &self.cfg.seed)
            .field("balance", &state.balance)
            .field("open", &state.positions.len())
            .finish_non_exhaustive()
    }
}

impl PaperTerminal {
    pub fn new(instruments: &[Instrument], cfg: PaperConfig, clock: Arc<dyn Clock>) -> Self {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let markets = instruments
            .iter()
            .map(|inst| {
                let mid = cfg
                    .start_prices
                    .get(&inst.symbol)
                    .copied()
                    .unwrap_or_else(|| inst.pips(10_000.0));
                let drift = inst.pips(rng.gen_range(-cfg.max_drift_pips..=cfg.max_drift_pips));
                (inst.symbol.clone(), Market { instrument: inst.clone(), mid, drift })
            })
            .collect();
        let balance = cfg.initial_balance;
        Self {
            cfg,
            clock,
            state: Mutex::new(PaperState {
                rng,
                markets,
                positions: BTreeMap::new(),
                closed: HashMap::new(),
                next_ticket: 1,
                balance,
            }),
        }
    }

    /// Move a symbol's mid and mark its positions. Used to script scenarios.
    pub fn set_mid(&self, symbol: &str, mid: f64) -> Result<(), DataError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let market = state.markets.get_mut(symbol).ok_or_else(|| no_quote(symbol))?;
        market.mid = mid;
        mark_to_market(&mut state, symbol, now);
        Ok(())
    }

    pub fn balance(&self) -> f64 {
        self.state.lock().balance
    }

    fn unknown_symbol(symbol: &str) -> ExecutionError {
        ExecutionError::Rejected { reason: format!("unknown symbol {symbol}") }
    }
}

fn no_quote(symbol: &str) -> DataError {
    DataError::NoQuote { symbol: symbol.to_string() }
}

/// Reprice `symbol`'s positions at the current mid; fill any stop or target hit.
fn mark_to_market(state: &mut PaperState, symbol: &str, now: DateTime<Utc>) {
    let Some(market) = state.markets.get(symbol).cloned() else {
        return;
    };
    let quote = market.quote(now);
    let mut hits = Vec::new();

    for pos in state.positions.values_mut().filter(|p| p.symbol == symbol) {
        let price = quote.exit_price(pos.direction);
        pos.current_price = price;
        pos.profit = market.profit(pos.direction, pos.entry_price, price, pos.volume);

        let stopped = pos.stop_loss.filter(|&sl| pos.direction.favorable_move(sl, price) <= 0.0);
        let targeted = pos.take_profit.filter(|&tp| pos.direction.favorable_move(tp, price) >= 0.0);
        if let Some(fill) = stopped.or(targeted) {
            hits.push((pos.ticket, fill));
        }
    }

    for (ticket, fill) in hits {
        if let Some(pos) = state.positions.remove(&ticket) {
            let profit = market.profit(pos.direction, pos.entry_price, fill, pos.volume);
            state.balance += profit;
            debug!(symbol, %ticket, fill, profit, "paper: stop/target filled");
            state.closed.insert(
                ticket,
                ClosedTrade {
                    ticket,
                    symbol: pos.symbol,
                    direction: pos.direction,
                    exit_price: fill,
                    profit,
                    closed_at: now,
                },
            );
        }
    }
}

/// Open time of the candle containing `now`.
fn candle_open(now: DateTime<Utc>, timeframe: Timeframe) -> Option<DateTime<Utc>> {
    let secs = timeframe.minutes() * 60;
    let ts = now.timestamp();
    Utc.timestamp_opt(ts - ts.rem_euclid(secs), 0).single()
}

fn series_seed(seed: u64, symbol: &str, timeframe: Timeframe, candle: DateTime<Utc>) -> u64 {
    let base = symbol
        .bytes()
        .fold(seed ^ 0x9E37_79B9_7F4A_7C15, |h, b| h.wrapping_mul(0x100_0000_01B3).wrapping_add(u64::from(b)));
    base.wrapping_mul(31)
        .wrapping_add(timeframe.minutes() as u64)
        .wrapping_mul(31)
        .wrapping_add(candle.timestamp() as u64)
}

impl MarketDataSource for PaperTerminal {
    fn get_bars(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Result<Vec<Bar>, DataError> {
        let now = self.clock.now();
        let market = self
            .state
            .lock()
            .markets
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataError::Unavailable { symbol: symbol.to_string(), timeframe })?;
        let last_open = candle_open(now, timeframe).ok_or_else(|| DataError::Invalid {
            symbol: symbol.to_string(),
            reason: format!("clock out of range: {now}"),
        })?;
        if count == 0 {
            return Err(DataError::Unavailable { symbol: symbol.to_string(), timeframe });
        }

        let mut rng = StdRng::seed_from_u64(series_seed(self.cfg.seed, symbol, timeframe, last_open));
        let scale = (timeframe.minutes() as f64 / 15.0).sqrt();
        let step = market.instrument.pips(self.cfg.step_pips) * scale;
        let drift = market.drift * scale;
        let floor = market.instrument.pips(10.0);

        // Walk backwards from the live mid so the newest close matches the quote.
        let mut bars = Vec::with_capacity(count);
        let mut close = market.mid;
        for k in 0..count {
            let open = (close - drift - step * rng.gen_range(-1.0..1.0)).max(floor);
            let wick_up = step * rng.gen_range(0.0..0.6);
            let wick_down = step * rng.gen_range(0.0..0.6);
            let time = last_open - timeframe.duration() * k as i32;
            bars.push(Bar::new(
                time,
                open,
                open.max(close) + wick_up,
                (open.min(close) - wick_down).max(floor / 2.0),
                close,
                rng.gen_range(500.0..1_500.0),
            ));
            close = open;
        }
        bars.reverse();
        Ok(bars)
    }

    fn quote(&self, symbol: &str) -> Result<Quote, DataError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let noise: f64 = state.rng.gen_range(-1.0..1.0);
        let market = state.markets.get_mut(symbol).ok_or_else(|| no_quote(symbol))?;
        let floor = market.instrument.pips(10.0);
        let step = market.instrument.pips(self.cfg.step_pips);
        market.mid = (market.mid + market.drift / 4.0 + step * noise).max(floor);
        let quote = market.quote(now);
        mark_to_market(&mut state, symbol, now);
        Ok(quote)
    }
}

impl ExecutionClient for PaperTerminal {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderReceipt, ExecutionError> {
        if !(request.volume.is_finite() && request.volume > 0.0) {
            return Err(ExecutionError::InvalidVolume(request.volume));
        }
        let now = self.clock.now();
        let mut state = self.state.lock();
        let market = state
            .markets
            .get(&request.symbol)
            .cloned()
            .ok_or_else(|| Self::unknown_symbol(&request.symbol))?;
        let fill = market.quote(now).entry_price(request.direction);

        let dir = request.direction;
        if dir.favorable_move(request.stop_loss, fill) <= 0.0 || dir.favorable_move(fill, request.take_profit) <= 0.0 {
            return Err(ExecutionError::Rejected {
                reason: format!("invalid stops sl={} tp={} fill={fill}", request.stop_loss, request.take_profit),
            });
        }

        let ticket = Ticket(state.next_ticket);
        state.next_ticket += 1;
        let spread_cost = market.profit(dir, fill, market.quote(now).exit_price(dir), request.volume);
        state.positions.insert(
            ticket,
            OpenPosition {
                ticket,
                symbol: request.symbol.clone(),
                direction: dir,
                entry_price: fill,
                stop_loss: Some(request.stop_loss),
                take_profit: Some(request.take_profit),
                volume: request.volume,
                opened_at: now,
                current_price: fill,
                profit: spread_cost,
            },
        );
        info!(symbol = %request.symbol, %ticket, direction = %dir, volume = request.volume, fill, "paper: order filled");
        Ok(OrderReceipt { ticket, fill_price: fill, volume: request.volume, time: now })
    }

    fn modify_position(
        &self,
        ticket: Ticket,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<(), ExecutionError> {
        let mut state = self.state.lock();
        let pos = state.positions.get_mut(&ticket).ok_or(ExecutionError::UnknownTicket(ticket))?;
        if let Some(sl) = stop_loss {
            if pos.direction.favorable_move(sl, pos.current_price) <= 0.0 {
                return Err(ExecutionError::Rejected { reason: format!("stop {sl} is through the market") });
            }
            pos.stop_loss = Some(sl);
        }
        if let Some(tp) = take_profit {
            pos.take_profit = Some(tp);
        }
        Ok(())
    }

    fn partial_close(&self, ticket: Ticket, fraction: f64) -> Result<CloseReceipt, ExecutionError> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ExecutionError::Rejected { reason: format!("partial fraction {fraction} outside (0, 1)") });
        }
        let mut state = self.state.lock();
        let pos = state.positions.get(&ticket).cloned().ok_or(ExecutionError::UnknownTicket(ticket))?;
        let market = state.markets.get(&pos.symbol).cloned().ok_or_else(|| Self::unknown_symbol(&pos.symbol))?;

        let closed = market.instrument.normalize_volume(pos.volume * fraction);
        if closed <= 0.0 || closed >= pos.volume {
            return Err(ExecutionError::InvalidVolume(closed));
        }
        let profit = market.profit(pos.direction, pos.entry_price, pos.current_price, closed);
        state.balance += profit;
        if let Some(open) = state.positions.get_mut(&ticket) {
            open.volume = ((open.volume - closed) / market.instrument.volume_step).round() * market.instrument.volume_step;
            open.profit = market.profit(open.direction, open.entry_price, open.current_price, open.volume);
        }
        Ok(CloseReceipt { ticket, price: pos.current_price, volume_closed: closed, profit })
    }

    fn close_position(&self, ticket: Ticket) -> Result<CloseReceipt, ExecutionError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let pos = state.positions.remove(&ticket).ok_or(ExecutionError::UnknownTicket(ticket))?;
        let profit = pos.profit;
        state.balance += profit;
        state.closed.insert(
            ticket,
            ClosedTrade {
                ticket,
                symbol: pos.symbol.clone(),
                direction: pos.direction,
                exit_price: pos.current_price,
                profit,
                closed_at: now,
            },
        );
        Ok(CloseReceipt { ticket, price: pos.current_price, volume_closed: pos.volume, profit })
    }

    fn get_positions(&self, symbol: &str) -> Result<Vec<OpenPosition>, ExecutionError> {
        Ok(self.state.lock().positions.values().filter(|p| p.symbol == symbol).cloned().collect())
    }

    fn all_positions(&self) -> Result<Vec<OpenPosition>, ExecutionError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let symbols: Vec<String> = state.positions.values().map(|p| p.symbol.clone()).collect();
        for symbol in symbols {
            mark_to_market(&mut state, &symbol, now);
        }
        Ok(state.positions.values().cloned().collect())
    }

    fn account(&self) -> Result<AccountInfo, ExecutionError> {
        let state = self.state.lock();
        let floating: f64 = state.positions.values().map(|p| p.profit).sum();
        Ok(AccountInfo { balance: state.balance, equity: state.balance + floating })
    }

    fn closed_trade(&self, ticket: Ticket) -> Result<Option<ClosedTrade>, ExecutionError> {
        Ok(self.state.lock().closed.get(&ticket).cloned())
    }
}
