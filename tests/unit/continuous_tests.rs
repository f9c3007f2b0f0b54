//! Continuous-trading behavior: the holding slot for market and crossing
//! orders, execution application, cancels, and the tape aggregates.

use crate::helpers::*;
use orderbook_recon::prelude::*;

#[test]
fn market_order_holds_until_its_execution() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 1, Side::Ask, 10_100, 50, T0930, Tpm::AmTrading));
    let snaps_after_ask = engine.matcher().rebuilt_count();

    engine.on_msg(sz_market(MAIN, 2, Side::Bid, 30, T0930 + 1000, Tpm::AmTrading));
    // Held, not booked, and no snapshot in between.
    assert!(engine.holding().is_some());
    assert_eq!(engine.matcher().rebuilt_count(), snaps_after_ask);

    engine.on_msg(sz_trade(MAIN, 3, 2, 1, 10_100, 30, T0930 + 2000, Tpm::AmTrading));

    assert!(engine.holding().is_none());
    assert_eq!(engine.last_px(), 10_100);
    assert_eq!(engine.num_trades(), 1);
    assert_eq!(engine.level_qty(Side::Ask, 10_100), Some(20));
    assert_eq!(engine.best_ask(), Some((10_100, 20)));
    assert_eq!(engine.matcher().rebuilt_count(), snaps_after_ask + 1);

    let snap = engine.matcher().last_snapshot().expect("post-exec snapshot");
    assert_eq!(snap.ask[0], PxQty::new(px6(10_100), 20));
    assert_eq!(snap.num_trades, 1);
    assert_eq!(snap.total_volume_trade, 30);
    assert_eq!(snap.total_value_trade, 30 * 10_100);
}

#[test]
fn partially_filled_market_order_is_booked_at_the_trade_price() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 1, Side::Ask, 10_100, 50, T0930, Tpm::AmTrading));
    engine.on_msg(sz_market(MAIN, 2, Side::Bid, 80, T0930 + 1000, Tpm::AmTrading));
    // Fills the whole resting ask; 30 remain on the market order.
    engine.on_msg(sz_trade(MAIN, 3, 2, 1, 10_100, 50, T0930 + 2000, Tpm::AmTrading));

    // Still held: its price is now fixed at the last trade.
    let held = engine.holding().expect("market order still held");
    assert_eq!(held.qty, 30);
    assert_eq!(held.price, 10_100);
    assert!(held.traded);
    assert_eq!(engine.best_ask(), None);

    // The next order flushes it into the book, snapshotting at the market
    // order's own timestamp first.
    let snaps_before = engine.matcher().rebuilt_count();
    engine.on_msg(sz_limit(MAIN, 4, Side::Ask, 10_200, 10, T0930 + 5000, Tpm::AmTrading));

    assert!(engine.holding().is_none());
    assert_eq!(engine.level_qty(Side::Bid, 10_100), Some(30));
    assert_eq!(engine.best_bid(), Some((10_100, 30)));
    // One snapshot for the flush, one for the new order.
    assert_eq!(engine.matcher().rebuilt_count(), snaps_before + 2);
}

#[test]
fn crossing_limit_holds_and_books_its_remainder() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 1, Side::Ask, 10_100, 50, T0930, Tpm::AmTrading));
    // Crosses the spread: held while the executions arrive.
    engine.on_msg(sz_limit(MAIN, 2, Side::Bid, 10_150, 80, T0930 + 1000, Tpm::AmTrading));
    assert!(engine.holding().is_some());

    engine.on_msg(sz_trade(MAIN, 3, 2, 1, 10_100, 50, T0930 + 2000, Tpm::AmTrading));

    // The opposite side is exhausted; the remainder rests at its own limit.
    assert!(engine.holding().is_none());
    assert_eq!(engine.best_bid(), Some((10_150, 30)));
    assert_eq!(engine.best_ask(), None);
    assert_eq!(engine.last_px(), 10_100);
}

#[test]
fn cancel_of_the_held_order_books_then_removes_it() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 1, Side::Ask, 10_100, 50, T0930, Tpm::AmTrading));
    let snaps_before = engine.matcher().rebuilt_count();

    engine.on_msg(sz_market(MAIN, 2, Side::Bid, 40, T0930 + 1000, Tpm::AmTrading));
    engine.on_msg(sz_cancel(MAIN, 3, 2, Side::Bid, 40, T0930 + 2000, Tpm::AmTrading));

    // Booked at its (never-traded) zero price, snapshotted, then canceled;
    // no trace remains.
    assert!(engine.holding().is_none());
    assert!(!engine.contains_order(2));
    assert_eq!(engine.level_qty(Side::Bid, 0), None);
    assert_eq!(engine.best_bid(), None);
    assert_eq!(engine.matcher().rebuilt_count(), snaps_before + 2);
}

#[test]
fn cancel_removes_quantity_and_the_emptied_level() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_000, 100, T0930, Tpm::AmTrading));
    engine.on_msg(sz_limit(MAIN, 2, Side::Bid, 9_990, 60, T0930 + 1000, Tpm::AmTrading));
    assert_eq!(engine.best_bid(), Some((10_000, 100)));

    engine.on_msg(sz_cancel(MAIN, 3, 1, Side::Bid, 100, T0930 + 2000, Tpm::AmTrading));

    assert!(!engine.contains_order(1));
    assert_eq!(engine.level_qty(Side::Bid, 10_000), None);
    // The next level down takes over as best.
    assert_eq!(engine.best_bid(), Some((9_990, 60)));
    assert_eq!(engine.bid_weight(), (60, 9_990 * 60));

    let snap = engine.matcher().last_snapshot().expect("snapshot");
    assert_eq!(snap.bid[0], PxQty::new(px6(9_990), 60));
    assert_eq!(snap.bid[1], PxQty::new(0, 0));
}

#[test]
fn dangling_cancel_changes_nothing() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_000, 100, T0930, Tpm::AmTrading));
    let snaps_before = engine.matcher().rebuilt_count();

    engine.on_msg(sz_cancel(MAIN, 4, 99, Side::Bid, 10, T0930 + 1000, Tpm::AmTrading));

    assert_eq!(engine.level_qty(Side::Bid, 10_000), Some(100));
    assert_eq!(engine.order_count(), 1);
    // No snapshot for a cancel that touched nothing.
    assert_eq!(engine.matcher().rebuilt_count(), snaps_before);
}

#[test]
fn side_optimal_order_joins_the_own_side_best() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_000, 100, T0930, Tpm::AmTrading));

    let mut msg = sz_limit(MAIN, 2, Side::Bid, 0, 50, T0930 + 1000, Tpm::AmTrading);
    if let Msg::Order(m) = &mut msg {
        m.ord_type = b'U';
    }
    engine.on_msg(msg);

    assert_eq!(engine.best_bid(), Some((10_000, 150)));
}

#[test]
fn ohlc_tracks_the_trade_sequence() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    let fills = [(10_100u64, 10u64), (10_200, 10), (10_050, 10)];
    let mut seq = 1u64;
    for (i, &(px, qty)) in fills.iter().enumerate() {
        let t = T0930 + i as u64 * 10_000;
        engine.on_msg(sz_limit(MAIN, seq, Side::Ask, px, qty, t, Tpm::AmTrading));
        engine.on_msg(sz_limit(MAIN, seq + 1, Side::Bid, px, qty, t + 1000, Tpm::AmTrading));
        engine.on_msg(sz_trade(MAIN, seq + 2, seq + 1, seq, px, qty, t + 2000, Tpm::AmTrading));
        seq += 3;
    }

    let snap = engine.matcher().last_snapshot().expect("snapshot");
    assert_eq!(snap.open_px, px6(10_100));
    assert_eq!(snap.high_px, px6(10_200));
    assert_eq!(snap.low_px, px6(10_050));
    assert_eq!(snap.last_px, px6(10_050));
    assert_eq!(snap.num_trades, 3);
    assert_eq!(snap.total_volume_trade, 30);
}
