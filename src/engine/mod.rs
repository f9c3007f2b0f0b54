//! Per-instrument reconstruction engine.
//!
//! One `Engine` owns the full book state of a single instrument and replays
//! the incremental feed message by message. Handling one message is an
//! indivisible unit that may emit zero, one or two rebuilt snapshots (two
//! when a held order is flushed at its own timestamp first). Rebuilt
//! snapshots are reconciled against exchange snapshots in the embedded
//! matcher.

mod cage;
mod exec;
mod matcher;
mod orders;
mod persist;
mod synth;

pub use matcher::SnapMatcher;
pub use persist::{EngineState, PersistError, StatePackage, STATE_FORMAT_VERSION};

use crate::book::Ladder;
use crate::normalize::TICK_BITS;
use crate::types::{
    Board, Exchange, InstrumentKind, Msg, OrdKind, PhaseSignal, Side, Tpm,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Channel number before the first constants-bearing snapshot arrives.
pub const CHANNELNO_INIT: i32 = -1;

/// An order as the engine keeps it: internal precision, 32-bit sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub seq: u32,
    pub price: u32,
    pub qty: u64,
    pub side: Side,
    pub kind: OrdKind,
    /// Market orders flip this once an execution fixes their price.
    pub traded: bool,
    pub transact_time: u64,
}

/// Internal form of a cancel, whichever stream it arrived on.
#[derive(Debug, Clone)]
pub(crate) struct Cancel {
    pub seq: u32,
    pub qty: u64,
    pub side: Side,
    pub transact_time: u64,
}

/// Internal form of a trade execution.
#[derive(Debug, Clone)]
pub(crate) struct Trade {
    pub bid_seq: u32,
    pub offer_seq: u32,
    pub last_px: u32,
    pub last_qty: u64,
    pub transact_time: u64,
    pub phase: Tpm,
}

/// ChiNext price-cage state: both reference prices, the single hidden level
/// closest to each band edge, and the "reference may have moved" flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CageState {
    /// Reference anchoring the bid band; follows best ask, then best bid,
    /// then last trade, then previous close.
    pub bid_ref_px: u32,
    /// Reference anchoring the ask band; symmetric.
    pub ask_ref_px: u32,
    /// Lowest bid level above the bid band (hidden), zero qty when none.
    pub bid_outside_px: u32,
    pub bid_outside_qty: u64,
    /// Highest ask level below the ask band (hidden), zero qty when none.
    pub ask_outside_px: u32,
    pub ask_outside_qty: u64,
    /// A best-price change may have made hidden bids admissible.
    pub bid_waiting: bool,
    pub ask_waiting: bool,
}

/// High-water marks over the run, for capacity sizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub order_map_max: usize,
    pub level_count_max: usize,
    pub bid_level_count_max: usize,
    pub ask_level_count_max: usize,
    pub bid_weight_size_max: u64,
    pub bid_weight_value_max: u128,
    pub ask_weight_size_max: u64,
    pub ask_weight_value_max: u128,
}

/// Single-instrument order book reconstruction engine.
pub struct Engine {
    pub(crate) security_id: u32,
    pub(crate) exchange: Exchange,
    pub(crate) kind: InstrumentKind,
    pub(crate) board: Board,

    /// Live orders by sequence number.
    pub(crate) orders: DashMap<u32, Order>,
    /// Orders rejected by the ChiNext no-limit envelope but still
    /// cancelable by sequence number.
    pub(crate) illegal_orders: DashMap<u32, Order>,
    pub(crate) bids: Ladder,
    pub(crate) asks: Ladder,

    // Cached best prices; the hot-path alternative to querying the ladders.
    pub(crate) bid_best_px: u32,
    pub(crate) bid_best_qty: u64,
    pub(crate) ask_best_px: u32,
    pub(crate) ask_best_qty: u64,

    pub(crate) num_trades: u64,
    pub(crate) last_px: u32,
    pub(crate) open_px: u32,
    pub(crate) high_px: u32,
    pub(crate) low_px: u32,
    pub(crate) total_volume_trade: u64,
    pub(crate) total_value_trade: u64,

    /// The close price is final: either produced by the close call or
    /// adopted from the exchange's closing snapshot.
    pub(crate) close_px_ready: bool,
    /// Set once the first `Starting` snapshot delivered the day constants.
    pub(crate) constants_ready: bool,

    pub(crate) channel_no: i32,
    /// Previous close at internal precision.
    pub(crate) prev_close_px: u32,
    /// Daily limits as published (wire precision; overflow sentinel when the
    /// instrument has no limit).
    pub(crate) up_limit_px: u64,
    pub(crate) dn_limit_px: u64,
    /// Daily limits at internal precision.
    pub(crate) up_limit_price: u32,
    pub(crate) dn_limit_price: u32,
    /// Trade date as `YYYYMMDD` (SZ stamps carry it; SSE stamps do not).
    pub(crate) trade_date: u64,
    /// Intraday tick of the latest incremental message.
    pub(crate) current_inc_tick: u32,

    pub(crate) bid_weight_size: u64,
    pub(crate) bid_weight_value: u128,
    pub(crate) ask_weight_size: u64,
    pub(crate) ask_weight_value: u128,
    /// Open-call ask contributions above the ChiNext envelope, excluded from
    /// the published aggregates until continuous trading begins.
    pub(crate) ask_weight_size_ex: u64,
    pub(crate) ask_weight_value_ex: u128,

    /// The one order whose insertion is deferred: a market order, or a limit
    /// that crossed the spread and awaits its execution.
    pub(crate) holding: Option<Order>,

    pub(crate) phase: Tpm,
    pub(crate) ask_weight_px_uncertain: bool,

    pub(crate) cage: CageState,

    pub(crate) profile: ProfileStats,

    pub(crate) msg_nb: u64,
    pub(crate) matcher: SnapMatcher,
    /// Duplicate/out-of-order guard for the strictly sequenced SZ feed.
    pub(crate) last_inc_seq: u64,
}

impl Engine {
    /// A fresh engine for one instrument. Day constants arrive with the
    /// first `Starting` snapshot; incremental messages before that are a
    /// feed-ordering bug and assert.
    pub fn new(security_id: u32, exchange: Exchange, kind: InstrumentKind) -> Self {
        Engine {
            security_id,
            exchange,
            kind,
            board: Board::classify(exchange, security_id),
            orders: DashMap::new(),
            illegal_orders: DashMap::new(),
            bids: Ladder::new(),
            asks: Ladder::new(),
            bid_best_px: 0,
            bid_best_qty: 0,
            ask_best_px: 0,
            ask_best_qty: 0,
            num_trades: 0,
            last_px: 0,
            open_px: 0,
            high_px: 0,
            low_px: 0,
            total_volume_trade: 0,
            total_value_trade: 0,
            close_px_ready: false,
            constants_ready: false,
            channel_no: CHANNELNO_INIT,
            prev_close_px: 0,
            up_limit_px: 0,
            dn_limit_px: 0,
            up_limit_price: 0,
            dn_limit_price: 0,
            trade_date: 0,
            current_inc_tick: 0,
            bid_weight_size: 0,
            bid_weight_value: 0,
            ask_weight_size: 0,
            ask_weight_value: 0,
            ask_weight_size_ex: 0,
            ask_weight_value_ex: 0,
            holding: None,
            phase: Tpm::Starting,
            ask_weight_px_uncertain: false,
            cage: CageState::default(),
            profile: ProfileStats::default(),
            msg_nb: 0,
            matcher: SnapMatcher::new(),
            last_inc_seq: 0,
        }
    }

    pub fn security_id(&self) -> u32 {
        self.security_id
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn phase(&self) -> Tpm {
        self.phase
    }

    /// Best bid `(price, qty)` at internal precision, when one exists.
    pub fn best_bid(&self) -> Option<(u32, u64)> {
        (self.bid_best_qty != 0).then_some((self.bid_best_px, self.bid_best_qty))
    }

    /// Best ask `(price, qty)` at internal precision, when one exists.
    pub fn best_ask(&self) -> Option<(u32, u64)> {
        (self.ask_best_qty != 0).then_some((self.ask_best_px, self.ask_best_qty))
    }

    pub fn num_trades(&self) -> u64 {
        self.num_trades
    }

    pub fn last_px(&self) -> u32 {
        self.last_px
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// The order currently parked in the holding slot, if any.
    pub fn holding(&self) -> Option<&Order> {
        self.holding.as_ref()
    }

    /// True while `seq` has a live booked order.
    pub fn contains_order(&self, seq: u32) -> bool {
        self.orders.contains_key(&seq)
    }

    /// Aggregated quantity resting at `(side, price)`.
    pub fn level_qty(&self, side: Side, price: u32) -> Option<u64> {
        match side {
            Side::Bid => self.bids.qty_at(price),
            Side::Ask => self.asks.qty_at(price),
            Side::Unknown => None,
        }
    }

    pub fn cage_state(&self) -> &CageState {
        &self.cage
    }

    /// `(size, value)` of the bid-side weighted aggregates.
    pub fn bid_weight(&self) -> (u64, u128) {
        (self.bid_weight_size, self.bid_weight_value)
    }

    /// `(size, value)` of the ask-side weighted aggregates.
    pub fn ask_weight(&self) -> (u64, u128) {
        (self.ask_weight_size, self.ask_weight_value)
    }

    pub fn total_volume_trade(&self) -> u64 {
        self.total_volume_trade
    }

    pub fn total_value_trade(&self) -> u64 {
        self.total_value_trade
    }

    pub fn msg_nb(&self) -> u64 {
        self.msg_nb
    }

    pub fn profile(&self) -> ProfileStats {
        self.profile
    }

    pub fn matcher(&self) -> &SnapMatcher {
        &self.matcher
    }

    /// Healthy iff every exchange snapshot seen so far found a rebuilt twin.
    pub fn are_you_ok(&self) -> bool {
        if self.matcher.unmatched_market_count() == 0 {
            return true;
        }
        error!(
            security_id = self.security_id,
            unmatched = self.matcher.unmatched_market_count(),
            "unmatched exchange snapshots remain"
        );
        for (num_trades, stamps) in self.matcher.unmatched_summary(3) {
            error!(security_id = self.security_id, num_trades, ?stamps, "unmatched bucket");
        }
        false
    }

    /// Feed one decoded message. Messages for other instruments are ignored.
    pub fn on_msg(&mut self, msg: Msg) {
        if let Some(id) = msg.security_id() {
            if id != self.security_id {
                return;
            }
        }

        match msg {
            Msg::Order(m) => {
                if self.drop_out_of_order(m.seq) {
                    return;
                }
                assert!(
                    self.constants_ready,
                    "{:06} incremental message before day constants",
                    self.security_id
                );
                self.use_timestamp(m.transact_time);
                self.adopt_phase(m.phase);
                let seq = m.seq;
                self.on_order(&m);
                self.note_inc_seq(seq);
            }
            Msg::Exec(m) => {
                if self.drop_out_of_order(m.seq) {
                    return;
                }
                assert!(
                    self.constants_ready,
                    "{:06} incremental message before day constants",
                    self.security_id
                );
                self.use_timestamp(m.transact_time);
                self.adopt_phase(m.phase);
                let seq = m.seq;
                self.on_exec(&m);
                self.note_inc_seq(seq);
            }
            Msg::Snap(s) => self.on_snapshot(s),
            Msg::Signal(sig) => self.on_signal(sig),
        }

        self.msg_nb += 1;
        self.update_profile();
        #[cfg(debug_assertions)]
        self.check_invariants();
    }

    /// SZ feeds are strictly sequenced per channel; repeats and reordering
    /// are dropped. SSE feeds reorder legally and are taken as they come.
    fn drop_out_of_order(&self, seq: u64) -> bool {
        if self.exchange == Exchange::Szse && seq <= self.last_inc_seq {
            error!(
                security_id = self.security_id,
                seq,
                last = self.last_inc_seq,
                "repeated or out-of-order message dropped"
            );
            return true;
        }
        false
    }

    fn note_inc_seq(&mut self, seq: u64) {
        if self.exchange == Exchange::Szse {
            self.last_inc_seq = seq;
        }
    }

    /// Phase hints ride on every incremental message. While in volatility
    /// breaking the hint is ignored; the exit is driven by the execution
    /// batch that leaves the books uncrossed.
    fn adopt_phase(&mut self, hint: Tpm) {
        if self.phase != Tpm::VolatilityBreaking {
            self.phase = hint;
        }
    }

    /// Adopt an incremental timestamp as the engine clock.
    pub(crate) fn use_timestamp(&mut self, transact_time: u64) {
        let tick = match self.exchange {
            // YYYYMMDDHHMMSSmmm -> HHMMSSms/10 (10 ms granularity).
            Exchange::Szse => (transact_time / 10) % 100_000_000,
            // HHMMSSmmm as-is (1 ms granularity).
            Exchange::Sse => transact_time,
        };
        let max = (1u64 << TICK_BITS) - 1;
        if tick > max {
            error!(
                security_id = self.security_id,
                transact_time, "timestamp overflows the tick width"
            );
        }
        self.current_inc_tick = tick.min(max) as u32;
    }

    /// Session-boundary signal from the multiplexer.
    fn on_signal(&mut self, signal: PhaseSignal) {
        match signal {
            PhaseSignal::OpenCallEnd => {
                // No cross at the open: no executions will come, so force the
                // post-auction break and publish the book.
                if self.bid_best_px < self.ask_best_px && self.phase == Tpm::OpenCall {
                    self.phase = Tpm::PreTradingBreaking;
                    self.gen_snap();
                }
            }
            PhaseSignal::AmTradingBgn => {
                if self.phase == Tpm::PreTradingBreaking {
                    self.phase = Tpm::AmTrading;
                    // The envelope-excluded ask contributions count from now on.
                    self.ask_weight_size += self.ask_weight_size_ex;
                    self.ask_weight_value += self.ask_weight_value_ex;
                    self.gen_snap();
                }
            }
            PhaseSignal::AmTradingEnd => {
                if self.phase == Tpm::AmTrading {
                    self.flush_held_market_order();
                    if self.holding.is_none() {
                        self.phase = Tpm::Breaking;
                        self.gen_snap();
                    }
                }
            }
            PhaseSignal::PmTradingEnd => {
                if self.phase == Tpm::PmTrading {
                    self.flush_held_market_order();
                    if self.holding.is_none() {
                        // Last continuous snapshot, then the close call with
                        // the cage opened.
                        self.gen_snap();
                        self.phase = Tpm::CloseCall;
                        self.open_cage();
                        self.gen_snap();
                    }
                }
            }
            PhaseSignal::AllEnd => match self.exchange {
                Exchange::Szse => {
                    if self.bid_best_px < self.ask_best_px && self.phase == Tpm::CloseCall {
                        // The close call cannot produce a price; wait for the
                        // exchange's closing snapshot to supply it.
                        self.phase = Tpm::Ending;
                        self.close_px_ready = false;
                    } else {
                        self.close_px_ready = true;
                        self.gen_snap();
                    }
                }
                Exchange::Sse => {
                    if self.bid_best_px < self.ask_best_px && self.phase == Tpm::CloseCall {
                        self.phase = Tpm::Ending;
                    }
                    // SSE closes on a volume-weighted average the feed cannot
                    // reproduce; always taken from the snapshot.
                    self.close_px_ready = false;
                }
            },
            PhaseSignal::OpenCallBgn | PhaseSignal::PmTradingBgn => {}
        }
    }

    /// Insert a held market order into the book at a phase boundary.
    fn flush_held_market_order(&mut self) {
        if self
            .holding
            .as_ref()
            .is_some_and(|h| h.kind == OrdKind::Market)
        {
            let held = self.holding.take().expect("holding checked above");
            self.insert_order(&held, false);
        }
    }

    pub(crate) fn is_chinext(&self) -> bool {
        self.board == Board::SzChiNext
    }

    fn update_profile(&mut self) {
        let p = &mut self.profile;
        p.order_map_max = p.order_map_max.max(self.orders.len());
        p.level_count_max = p.level_count_max.max(self.bids.len() + self.asks.len());
        p.bid_level_count_max = p.bid_level_count_max.max(self.bids.len());
        p.ask_level_count_max = p.ask_level_count_max.max(self.asks.len());
        p.bid_weight_size_max = p.bid_weight_size_max.max(self.bid_weight_size);
        p.bid_weight_value_max = p.bid_weight_value_max.max(self.bid_weight_value);
        p.ask_weight_size_max = p.ask_weight_size_max.max(self.ask_weight_size);
        p.ask_weight_value_max = p.ask_weight_value_max.max(self.ask_weight_value);
    }

    /// Structural invariants, swept after every message in debug builds.
    /// A failure here is an engine bug, not a feed anomaly.
    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        use crate::normalize::LEVEL_QTY_BITS;

        if !self.asks.is_empty() {
            if self.is_chinext() && self.cage.ask_outside_qty != 0 {
                debug_assert!(
                    self.ask_best_px > self.cage.ask_outside_px,
                    "{:06} cached ask best not above the hidden region",
                    self.security_id
                );
            } else {
                let (min_px, min_qty) = self.asks.min().expect("non-empty");
                debug_assert_eq!(
                    self.ask_best_px, min_px,
                    "{:06} cached ask best price stale",
                    self.security_id
                );
                debug_assert_eq!(
                    self.ask_best_qty, min_qty,
                    "{:06} cached ask best qty stale",
                    self.security_id
                );
            }
        }
        if !self.bids.is_empty() {
            if self.is_chinext() && self.cage.bid_outside_qty != 0 {
                debug_assert!(
                    self.bid_best_px < self.cage.bid_outside_px,
                    "{:06} cached bid best not below the hidden region",
                    self.security_id
                );
            } else {
                let (max_px, max_qty) = self.bids.max().expect("non-empty");
                debug_assert_eq!(
                    self.bid_best_px, max_px,
                    "{:06} cached bid best price stale",
                    self.security_id
                );
                debug_assert_eq!(
                    self.bid_best_qty, max_qty,
                    "{:06} cached bid best qty stale",
                    self.security_id
                );
            }
        }

        if self.phase.is_continuous() && self.bid_best_qty != 0 && self.ask_best_qty != 0 {
            debug_assert!(
                self.bid_best_px < self.ask_best_px,
                "{:06} crossed book in continuous trading: bid {} / ask {} @{}",
                self.security_id,
                self.bid_best_px,
                self.ask_best_px,
                self.current_inc_tick
            );
        }

        let mut ask_size: u64 = 0;
        let mut ask_value: u128 = 0;
        for (p, q) in self.asks.iter_asc() {
            debug_assert!(
                q < (1u64 << LEVEL_QTY_BITS),
                "{:06} ask level qty overflows",
                self.security_id
            );
            if self.cage.ask_outside_qty == 0 || p > self.cage.ask_outside_px {
                ask_size += q;
                ask_value += p as u128 * q as u128;
            }
        }
        if self.phase >= Tpm::AmTrading {
            debug_assert_eq!(ask_size, self.ask_weight_size, "{:06} ask weight size drifted", self.security_id);
            debug_assert_eq!(ask_value, self.ask_weight_value, "{:06} ask weight value drifted", self.security_id);
        } else {
            debug_assert_eq!(
                ask_size,
                self.ask_weight_size + self.ask_weight_size_ex,
                "{:06} ask weight size (incl. excluded) drifted",
                self.security_id
            );
            debug_assert_eq!(
                ask_value,
                self.ask_weight_value + self.ask_weight_value_ex,
                "{:06} ask weight value (incl. excluded) drifted",
                self.security_id
            );
        }

        let mut bid_size: u64 = 0;
        let mut bid_value: u128 = 0;
        for (p, q) in self.bids.iter_asc() {
            debug_assert!(
                q < (1u64 << LEVEL_QTY_BITS),
                "{:06} bid level qty overflows",
                self.security_id
            );
            if self.cage.bid_outside_qty == 0 || p < self.cage.bid_outside_px {
                bid_size += q;
                bid_value += p as u128 * q as u128;
            }
        }
        debug_assert_eq!(bid_size, self.bid_weight_size, "{:06} bid weight size drifted", self.security_id);
        debug_assert_eq!(bid_value, self.bid_weight_value, "{:06} bid weight value drifted", self.security_id);

        debug_assert!(
            self.matcher.no_empty_market_buckets(),
            "{:06} empty exchange-snapshot bucket not pruned",
            self.security_id
        );
    }
}
