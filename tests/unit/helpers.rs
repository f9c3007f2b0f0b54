//! Builders for SZ-format test messages. Prices are passed at internal
//! precision (2 dp for stocks) and expanded to the wire scales here.

use orderbook_recon::prelude::*;
use orderbook_recon::types::{EXEC_TYPE_CANCEL, EXEC_TYPE_TRADE};

/// Shenzhen main-board stock used by most tests.
pub const MAIN: u32 = 1;
/// ChiNext stock, gets the price cage.
pub const GEM: u32 = 300_750;

pub const CHANNEL: i32 = 2011;

/// 09:30:00.000 on the test trade date, SZ wire format.
pub const T0930: u64 = 20220426_093000_000;
/// 09:20:00.000, inside the open call.
pub const T0920: u64 = 20220426_092000_000;

/// A `Starting` snapshot carrying the session constants. `prev_close` is at
/// internal precision; limits are derived as +/-10% unless overridden.
pub fn sz_starting_snap(security_id: u32, prev_close: u64) -> Msg {
    sz_starting_snap_limits(security_id, prev_close, prev_close * 11 / 10, prev_close * 9 / 10)
}

/// Same, with explicit internal-precision limit prices.
pub fn sz_starting_snap_limits(security_id: u32, prev_close: u64, up: u64, dn: u64) -> Msg {
    let mut snap = MarketSnapshot::empty(Exchange::Szse, security_id, SnapSource::Market);
    snap.channel_no = CHANNEL;
    snap.transact_time = 20220426_083000_000;
    snap.prev_close_px = prev_close * 100; // 4 dp wire
    snap.up_limit_px = up * 10_000; // 6 dp wire
    snap.dn_limit_px = dn * 10_000;
    snap.set_phase(Tpm::Starting, Tpi::Normal);
    Msg::Snap(snap)
}

/// A `Starting` snapshot for an instrument with no daily price limit (the
/// limits carry the wire overflow sentinel).
pub fn sz_starting_snap_no_limit(security_id: u32, prev_close: u64) -> Msg {
    let mut snap = MarketSnapshot::empty(Exchange::Szse, security_id, SnapSource::Market);
    snap.channel_no = CHANNEL;
    snap.transact_time = 20220426_083000_000;
    snap.prev_close_px = prev_close * 100;
    snap.up_limit_px = ORDER_PRICE_OVERFLOW;
    snap.dn_limit_px = ORDER_PRICE_OVERFLOW;
    snap.set_phase(Tpm::Starting, Tpi::Normal);
    Msg::Snap(snap)
}

/// A fresh SZ stock engine with the session constants already adopted.
pub fn engine_with_consts(security_id: u32, prev_close: u64) -> Engine {
    let mut engine = Engine::new(security_id, Exchange::Szse, InstrumentKind::Stock);
    engine.on_msg(sz_starting_snap(security_id, prev_close));
    engine
}

/// SZ limit order; `price` at internal precision.
pub fn sz_limit(
    security_id: u32,
    seq: u64,
    side: Side,
    price: u64,
    qty: u64,
    transact_time: u64,
    phase: Tpm,
) -> Msg {
    Msg::Order(OrderMsg {
        security_id,
        exchange: Exchange::Szse,
        channel_no: CHANNEL,
        seq,
        side: wire_side(side),
        ord_type: b'2',
        price: price * 100, // 4 dp wire
        qty,
        transact_time,
        phase,
    })
}

/// SZ market order (no price on the wire).
pub fn sz_market(
    security_id: u32,
    seq: u64,
    side: Side,
    qty: u64,
    transact_time: u64,
    phase: Tpm,
) -> Msg {
    Msg::Order(OrderMsg {
        security_id,
        exchange: Exchange::Szse,
        channel_no: CHANNEL,
        seq,
        side: wire_side(side),
        ord_type: b'1',
        price: 0,
        qty,
        transact_time,
        phase,
    })
}

/// SZ trade execution; `last_px` at internal precision.
#[allow(clippy::too_many_arguments)]
pub fn sz_trade(
    security_id: u32,
    seq: u64,
    bid_seq: u64,
    offer_seq: u64,
    last_px: u64,
    last_qty: u64,
    transact_time: u64,
    phase: Tpm,
) -> Msg {
    Msg::Exec(ExecMsg {
        security_id,
        exchange: Exchange::Szse,
        channel_no: CHANNEL,
        seq,
        bid_seq,
        offer_seq,
        last_px: last_px * 100,
        last_qty,
        exec_type: EXEC_TYPE_TRADE,
        transact_time,
        phase,
    })
}

/// SZ cancel, carried on the execution stream.
pub fn sz_cancel(
    security_id: u32,
    seq: u64,
    target_seq: u64,
    side: Side,
    qty: u64,
    transact_time: u64,
    phase: Tpm,
) -> Msg {
    let (bid_seq, offer_seq) = match side {
        Side::Bid => (target_seq, 0),
        _ => (0, target_seq),
    };
    Msg::Exec(ExecMsg {
        security_id,
        exchange: Exchange::Szse,
        channel_no: CHANNEL,
        seq,
        bid_seq,
        offer_seq,
        last_px: 0,
        last_qty: qty,
        exec_type: EXEC_TYPE_CANCEL,
        transact_time,
        phase,
    })
}

fn wire_side(side: Side) -> u8 {
    match side {
        Side::Bid => b'1',
        Side::Ask => b'2',
        Side::Unknown => b'G',
    }
}

/// Snapshot wire price for an internal SZ stock price.
pub fn px6(price: u64) -> u64 {
    price * 10_000
}

/// Route engine logs into the test harness output. Safe to call repeatedly.
pub fn capture_logs() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
