//! Feed-level guards: SZ sequencing, precision residue, width overflow.

use crate::helpers::*;
use orderbook_recon::prelude::*;

#[test]
fn out_of_order_szse_message_is_dropped() {
    capture_logs();
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 100, Side::Bid, 10_000, 100, T0930, Tpm::AmTrading));
    let msg_nb = engine.msg_nb();

    // Arrives late: lower sequence than the last applied message.
    engine.on_msg(sz_limit(MAIN, 99, Side::Bid, 10_050, 999, T0930 + 1000, Tpm::AmTrading));

    assert_eq!(engine.order_count(), 1);
    assert_eq!(engine.level_qty(Side::Bid, 10_050), None);
    assert_eq!(engine.best_bid(), Some((10_000, 100)));
    // Dropped before accounting.
    assert_eq!(engine.msg_nb(), msg_nb);

    // A repeat of the same sequence is dropped too.
    engine.on_msg(sz_limit(MAIN, 100, Side::Bid, 10_000, 100, T0930 + 2000, Tpm::AmTrading));
    assert_eq!(engine.level_qty(Side::Bid, 10_000), Some(100));
}

#[test]
fn messages_for_other_instruments_are_ignored() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(GEM, 1, Side::Bid, 10_000, 100, T0930, Tpm::AmTrading));
    assert_eq!(engine.order_count(), 0);
}

#[test]
fn off_grid_price_is_floored_and_accepted() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    // 100.0150 yuan on a 2 dp instrument: the residue is logged, the floor
    // is applied deterministically.
    engine.on_msg(Msg::Order(OrderMsg {
        security_id: MAIN,
        exchange: Exchange::Szse,
        channel_no: CHANNEL,
        seq: 1,
        side: b'1',
        ord_type: b'2',
        price: 1_000_150,
        qty: 10,
        transact_time: T0930,
        phase: Tpm::AmTrading,
    }));

    assert_eq!(engine.level_qty(Side::Bid, 10_001), Some(10));
}

#[test]
fn overflow_ask_poisons_the_weighted_average_until_it_drains() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_000, 100, T0930, Tpm::AmTrading));

    // An ask at the wire overflow sentinel.
    engine.on_msg(Msg::Order(OrderMsg {
        security_id: MAIN,
        exchange: Exchange::Szse,
        channel_no: CHANNEL,
        seq: 2,
        side: b'2',
        ord_type: b'2',
        price: 0x7fff_ffff,
        qty: 5,
        transact_time: T0930 + 1000,
        phase: Tpm::AmTrading,
    }));

    let snap = engine.matcher().last_snapshot().expect("snapshot");
    assert!(snap.ask_weight_px_uncertain);
    // Clipped to the signed 32-bit ceiling rather than published raw.
    assert!(snap.ask_weight_px <= i32::MAX as u64);

    // Cancel it: the flag clears with the level.
    engine.on_msg(sz_cancel(MAIN, 3, 2, Side::Ask, 5, T0930 + 2000, Tpm::AmTrading));
    let snap = engine.matcher().last_snapshot().expect("snapshot");
    assert!(!snap.ask_weight_px_uncertain);
}

#[test]
fn sse_feed_accepts_reordered_sequences_and_order_stream_cancels() {
    let mut engine = Engine::new(600_000, Exchange::Sse, InstrumentKind::Stock);

    // SSE constants snapshot: 3 dp prices, second-granular stamp.
    let mut snap = MarketSnapshot::empty(Exchange::Sse, 600_000, SnapSource::Market);
    snap.channel_no = 6;
    snap.transact_time = 83_000; // 08:30:00
    snap.prev_close_px = 10_005 * 10;
    snap.set_phase(Tpm::Starting, Tpi::Normal);
    engine.on_msg(Msg::Snap(snap));

    let sse_order = |seq: u64, ord_type: u8, price: u64, qty: u64, t: u64| {
        Msg::Order(OrderMsg {
            security_id: 600_000,
            exchange: Exchange::Sse,
            channel_no: 6,
            seq,
            side: b'B',
            ord_type,
            price: price * 10, // 3 dp wire, 2 dp internal
            qty,
            transact_time: t,
            phase: Tpm::AmTrading,
        })
    };

    // Per-channel reordering is legal on SSE: both orders apply.
    engine.on_msg(sse_order(100, b'A', 10_000, 100, 93_000_000));
    engine.on_msg(sse_order(99, b'A', 9_990, 50, 93_000_500));
    assert_eq!(engine.level_qty(Side::Bid, 10_000), Some(100));
    assert_eq!(engine.level_qty(Side::Bid, 9_990), Some(50));

    // The rebuilt stamp drops the two fine sub-second digits for SSE stock.
    let snap = engine.matcher().last_snapshot().expect("snapshot");
    assert_eq!(snap.transact_time, 930_000);
    assert_eq!(snap.bid[0], PxQty::new(10_000 * 10, 100));

    // SSE cancels ride on the order stream, keyed by the original order
    // number.
    engine.on_msg(sse_order(100, b'D', 10_000, 100, 93_001_000));
    assert_eq!(engine.level_qty(Side::Bid, 10_000), None);
    assert_eq!(engine.best_bid(), Some((9_990, 50)));
}

#[test]
fn unknown_side_is_rejected_from_the_ladders() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(Msg::Order(OrderMsg {
        security_id: MAIN,
        exchange: Exchange::Szse,
        channel_no: CHANNEL,
        seq: 1,
        side: b'G',
        ord_type: b'2',
        price: 1_000_000,
        qty: 10,
        transact_time: T0930,
        phase: Tpm::AmTrading,
    }));

    assert_eq!(engine.best_bid(), None);
    assert_eq!(engine.best_ask(), None);
    assert_eq!(engine.bid_weight(), (0, 0));
}
