//! Typed incremental feed records as handed over by the wire decoders.
//!
//! The decoders (out of crate) parse the SBE streams into these records;
//! prices and quantities are still at exchange precision here. The engine
//! normalizes them on ingress.

use super::enums::{Exchange, OrdKind, PhaseSignal, Side, Tpm};
use super::snapshot::MarketSnapshot;
use serde::{Deserialize, Serialize};

/// Wire sentinel for an out-of-range price. Also the Up/DnLimitPx value
/// published when the instrument has no daily price limit.
pub const ORDER_PRICE_OVERFLOW: u64 = 0x7fff_ffff;

/// A new-order record (SZ) or order record (SH; `ord_type = b'D'` is a
/// cancel carried on the order stream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMsg {
    pub security_id: u32,
    pub exchange: Exchange,
    pub channel_no: i32,
    /// Per-channel sequence number (`ApplSeqNum`; SSE bond stream `OrderNo`).
    pub seq: u64,
    /// Wire side byte: SZ `'1'`/`'2'`, SSE `'B'`/`'S'`.
    pub side: u8,
    /// Wire type byte: SZ `'1'` market / `'2'` limit / `'U'` side-optimal;
    /// SSE `'A'` add / `'D'` delete.
    pub ord_type: u8,
    /// Price at exchange precision (SZ 4 dp, SSE 3 dp).
    pub price: u64,
    /// Quantity at exchange precision (SZ 2 dp, SSE 3 dp).
    pub qty: u64,
    pub transact_time: u64,
    /// Market phase the decoder attributed to this record.
    pub phase: Tpm,
}

impl OrderMsg {
    /// Decode the wire side byte for this venue.
    pub fn side(&self) -> Side {
        match (self.exchange, self.side) {
            (Exchange::Szse, b'1') | (Exchange::Sse, b'B') => Side::Bid,
            (Exchange::Szse, b'2') | (Exchange::Sse, b'S') => Side::Ask,
            _ => Side::Unknown,
        }
    }

    /// Decode the wire order-type byte for this venue. SSE add records are
    /// plain limits; deletes are routed to cancel handling before this is
    /// consulted.
    pub fn kind(&self) -> OrdKind {
        match (self.exchange, self.ord_type) {
            (Exchange::Szse, b'1') => OrdKind::Market,
            (Exchange::Szse, b'2') => OrdKind::Limit,
            (Exchange::Szse, b'U') => OrdKind::SideOptimal,
            (Exchange::Sse, b'A') => OrdKind::Limit,
            _ => OrdKind::Unknown,
        }
    }

    /// True when this SSE order record is a cancel.
    pub fn is_delete(&self) -> bool {
        self.exchange == Exchange::Sse && self.ord_type == b'D'
    }
}

/// SZ execution exec-type byte: a trade.
pub const EXEC_TYPE_TRADE: u8 = b'F';
/// SZ execution exec-type byte: a cancel carried on the execution stream.
pub const EXEC_TYPE_CANCEL: u8 = b'4';

/// An execution record: a trade on either venue, or a cancel on SZ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecMsg {
    pub security_id: u32,
    pub exchange: Exchange,
    pub channel_no: i32,
    pub seq: u64,
    /// Buy-side order sequence; zero on an SZ ask-cancel.
    pub bid_seq: u64,
    /// Sell-side order sequence; zero on an SZ bid-cancel.
    pub offer_seq: u64,
    /// Trade price at exchange precision.
    pub last_px: u64,
    /// Trade (or canceled) quantity at exchange precision.
    pub last_qty: u64,
    /// SZ: `'F'` trade / `'4'` cancel. SSE: the inner/outer side flag
    /// (`'B'`/`'S'`/`'N'`); every SSE record on this stream is a trade.
    pub exec_type: u8,
    pub transact_time: u64,
    pub phase: Tpm,
}

impl ExecMsg {
    /// True when this record removes an order instead of trading it.
    pub fn is_cancel(&self) -> bool {
        self.exchange == Exchange::Szse && self.exec_type == EXEC_TYPE_CANCEL
    }
}

/// Anything an engine can be fed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Msg {
    Order(OrderMsg),
    Exec(ExecMsg),
    Snap(MarketSnapshot),
    Signal(PhaseSignal),
}

impl Msg {
    /// Security this message addresses; signals are broadcast.
    pub fn security_id(&self) -> Option<u32> {
        match self {
            Msg::Order(m) => Some(m.security_id),
            Msg::Exec(m) => Some(m.security_id),
            Msg::Snap(s) => Some(s.security_id),
            Msg::Signal(_) => None,
        }
    }

    /// Exchange-format timestamp, when the message carries one.
    pub fn transact_time(&self) -> Option<u64> {
        match self {
            Msg::Order(m) => Some(m.transact_time),
            Msg::Exec(m) => Some(m.transact_time),
            Msg::Snap(s) => Some(s.transact_time),
            Msg::Signal(_) => None,
        }
    }
}
