//! Engine save/load: a plain serde mirror of the whole object graph, and a
//! versioned, checksummed JSON package around it.
//!
//! Collections are written in sorted order so a `save -> load -> save`
//! round-trip is byte-identical.

use super::{CageState, Engine, Order, ProfileStats, SnapMatcher};
use crate::book::Ladder;
use crate::types::{Board, Exchange, InstrumentKind, Tpm};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Format version of [`StatePackage`].
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Errors from saving or loading engine state.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("deserialization failed: {0}")]
    Deserialization(String),
    #[error("unsupported state version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// The full engine object graph in a serializable shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub security_id: u32,
    pub exchange: Exchange,
    pub kind: InstrumentKind,
    pub board: Board,

    /// Live orders, ascending by sequence number.
    pub orders: Vec<Order>,
    /// Envelope-rejected orders, ascending by sequence number.
    pub illegal_orders: Vec<Order>,
    /// Bid levels as `(price, qty)`, ascending by price.
    pub bids: Vec<(u32, u64)>,
    /// Ask levels as `(price, qty)`, ascending by price.
    pub asks: Vec<(u32, u64)>,

    pub bid_best_px: u32,
    pub bid_best_qty: u64,
    pub ask_best_px: u32,
    pub ask_best_qty: u64,

    pub num_trades: u64,
    pub last_px: u32,
    pub open_px: u32,
    pub high_px: u32,
    pub low_px: u32,
    pub total_volume_trade: u64,
    pub total_value_trade: u64,

    pub close_px_ready: bool,
    pub constants_ready: bool,

    pub channel_no: i32,
    pub prev_close_px: u32,
    pub up_limit_px: u64,
    pub dn_limit_px: u64,
    pub up_limit_price: u32,
    pub dn_limit_price: u32,
    pub trade_date: u64,
    pub current_inc_tick: u32,

    pub bid_weight_size: u64,
    pub bid_weight_value: u128,
    pub ask_weight_size: u64,
    pub ask_weight_value: u128,
    pub ask_weight_size_ex: u64,
    pub ask_weight_value_ex: u128,

    pub holding: Option<Order>,

    pub phase: Tpm,
    pub ask_weight_px_uncertain: bool,

    pub cage: CageState,
    pub profile: ProfileStats,

    pub msg_nb: u64,
    pub matcher: SnapMatcher,
    pub last_inc_seq: u64,
}

impl Engine {
    /// Capture the engine's entire state.
    pub fn save(&self) -> EngineState {
        let mut orders: Vec<Order> = self.orders.iter().map(|e| e.value().clone()).collect();
        orders.sort_by_key(|o| o.seq);
        let mut illegal_orders: Vec<Order> =
            self.illegal_orders.iter().map(|e| e.value().clone()).collect();
        illegal_orders.sort_by_key(|o| o.seq);

        EngineState {
            security_id: self.security_id,
            exchange: self.exchange,
            kind: self.kind,
            board: self.board,
            orders,
            illegal_orders,
            bids: self.bids.iter_asc().collect(),
            asks: self.asks.iter_asc().collect(),
            bid_best_px: self.bid_best_px,
            bid_best_qty: self.bid_best_qty,
            ask_best_px: self.ask_best_px,
            ask_best_qty: self.ask_best_qty,
            num_trades: self.num_trades,
            last_px: self.last_px,
            open_px: self.open_px,
            high_px: self.high_px,
            low_px: self.low_px,
            total_volume_trade: self.total_volume_trade,
            total_value_trade: self.total_value_trade,
            close_px_ready: self.close_px_ready,
            constants_ready: self.constants_ready,
            channel_no: self.channel_no,
            prev_close_px: self.prev_close_px,
            up_limit_px: self.up_limit_px,
            dn_limit_px: self.dn_limit_px,
            up_limit_price: self.up_limit_price,
            dn_limit_price: self.dn_limit_price,
            trade_date: self.trade_date,
            current_inc_tick: self.current_inc_tick,
            bid_weight_size: self.bid_weight_size,
            bid_weight_value: self.bid_weight_value,
            ask_weight_size: self.ask_weight_size,
            ask_weight_value: self.ask_weight_value,
            ask_weight_size_ex: self.ask_weight_size_ex,
            ask_weight_value_ex: self.ask_weight_value_ex,
            holding: self.holding.clone(),
            phase: self.phase,
            ask_weight_px_uncertain: self.ask_weight_px_uncertain,
            cage: self.cage.clone(),
            profile: self.profile,
            msg_nb: self.msg_nb,
            matcher: self.matcher.clone(),
            last_inc_seq: self.last_inc_seq,
        }
    }

    /// Rebuild an engine from a captured state.
    pub fn restore(state: EngineState) -> Engine {
        let orders = DashMap::new();
        for order in state.orders {
            orders.insert(order.seq, order);
        }
        let illegal_orders = DashMap::new();
        for order in state.illegal_orders {
            illegal_orders.insert(order.seq, order);
        }
        let bids = Ladder::new();
        for (p, q) in state.bids {
            bids.add(p, q);
        }
        let asks = Ladder::new();
        for (p, q) in state.asks {
            asks.add(p, q);
        }

        Engine {
            security_id: state.security_id,
            exchange: state.exchange,
            kind: state.kind,
            board: state.board,
            orders,
            illegal_orders,
            bids,
            asks,
            bid_best_px: state.bid_best_px,
            bid_best_qty: state.bid_best_qty,
            ask_best_px: state.ask_best_px,
            ask_best_qty: state.ask_best_qty,
            num_trades: state.num_trades,
            last_px: state.last_px,
            open_px: state.open_px,
            high_px: state.high_px,
            low_px: state.low_px,
            total_volume_trade: state.total_volume_trade,
            total_value_trade: state.total_value_trade,
            close_px_ready: state.close_px_ready,
            constants_ready: state.constants_ready,
            channel_no: state.channel_no,
            prev_close_px: state.prev_close_px,
            up_limit_px: state.up_limit_px,
            dn_limit_px: state.dn_limit_px,
            up_limit_price: state.up_limit_price,
            dn_limit_price: state.dn_limit_price,
            trade_date: state.trade_date,
            current_inc_tick: state.current_inc_tick,
            bid_weight_size: state.bid_weight_size,
            bid_weight_value: state.bid_weight_value,
            ask_weight_size: state.ask_weight_size,
            ask_weight_value: state.ask_weight_value,
            ask_weight_size_ex: state.ask_weight_size_ex,
            ask_weight_value_ex: state.ask_weight_value_ex,
            holding: state.holding,
            phase: state.phase,
            ask_weight_px_uncertain: state.ask_weight_px_uncertain,
            cage: state.cage,
            profile: state.profile,
            msg_nb: state.msg_nb,
            matcher: state.matcher,
            last_inc_seq: state.last_inc_seq,
        }
    }
}

/// Versioned wrapper with an integrity checksum over the canonical JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePackage {
    pub version: u32,
    pub state: EngineState,
    /// Hex SHA-256 of the serialized state.
    pub checksum: String,
}

impl StatePackage {
    /// Wrap a state, computing its checksum.
    pub fn new(state: EngineState) -> Result<Self, PersistError> {
        let checksum = Self::compute_checksum(&state)?;
        Ok(StatePackage {
            version: STATE_FORMAT_VERSION,
            state,
            checksum,
        })
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, PersistError> {
        serde_json::to_string(self).map_err(|e| PersistError::Serialization(e.to_string()))
    }

    /// Deserialize from JSON. Call [`StatePackage::validate`] (or
    /// [`StatePackage::into_state`]) before trusting the contents.
    pub fn from_json(data: &str) -> Result<Self, PersistError> {
        serde_json::from_str(data).map_err(|e| PersistError::Deserialization(e.to_string()))
    }

    /// Check the version and checksum.
    pub fn validate(&self) -> Result<(), PersistError> {
        if self.version != STATE_FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion {
                found: self.version,
                expected: STATE_FORMAT_VERSION,
            });
        }
        let actual = Self::compute_checksum(&self.state)?;
        if actual != self.checksum {
            return Err(PersistError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Validate and unwrap.
    pub fn into_state(self) -> Result<EngineState, PersistError> {
        self.validate()?;
        Ok(self.state)
    }

    fn compute_checksum(state: &EngineState) -> Result<String, PersistError> {
        let payload =
            serde_json::to_vec(state).map_err(|e| PersistError::Serialization(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(payload);
        Ok(format!("{:x}", hasher.finalize()))
    }
}
