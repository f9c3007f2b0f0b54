//! Open-call behavior: booking without matching, the sealed-auction
//! simulation, and the forced transition when nothing can cross.

use crate::helpers::*;
use orderbook_recon::prelude::*;

#[test]
fn open_call_without_cross_transitions_on_signal() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_000, 100, T0920, Tpm::OpenCall));
    engine.on_msg(sz_limit(MAIN, 2, Side::Ask, 10_010, 200, T0920 + 1000, Tpm::OpenCall));
    engine.on_msg(Msg::Signal(PhaseSignal::OpenCallEnd));

    assert_eq!(engine.phase(), Tpm::PreTradingBreaking);
    assert_eq!(engine.num_trades(), 0);
    assert_eq!(engine.last_px(), 0);

    let snap = engine.matcher().last_snapshot().expect("snapshot after signal");
    assert_eq!(snap.bid[0], PxQty::new(px6(10_000), 100));
    assert_eq!(snap.ask[0], PxQty::new(px6(10_010), 200));
    assert_eq!(snap.num_trades, 0);
    assert_eq!(snap.last_px, 0);
}

#[test]
fn call_snapshot_prices_at_reference_when_residues_balance() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    // 200 x 200 across the spread: both sides exhaust together, so the
    // indicative price is free inside [10000, 10010] and lands on the
    // reference (the previous close, nothing traded yet).
    engine.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_010, 200, T0920, Tpm::OpenCall));
    engine.on_msg(sz_limit(MAIN, 2, Side::Ask, 10_000, 200, T0920 + 1000, Tpm::OpenCall));

    let snap = engine.matcher().last_snapshot().expect("call snapshot");
    assert_eq!(snap.ask[0], PxQty::new(px6(10_005), 200));
    assert_eq!(snap.bid[0], PxQty::new(px6(10_005), 200));
    assert_eq!(snap.bid[1], PxQty::new(0, 0));
    assert_eq!(snap.ask[1], PxQty::new(0, 0));
    // Weighted aggregates stay zero on SZ while the auction forms.
    assert_eq!(snap.bid_weight_size, 0);
    assert_eq!(snap.ask_weight_size, 0);
}

#[test]
fn call_snapshot_anchors_at_the_partially_filled_side() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    // Bid 300 against ask 200: the bid level is left with 100 unmatched and
    // pins the indicative price.
    engine.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_010, 300, T0920, Tpm::OpenCall));
    engine.on_msg(sz_limit(MAIN, 2, Side::Ask, 10_000, 200, T0920 + 1000, Tpm::OpenCall));

    let snap = engine.matcher().last_snapshot().expect("call snapshot");
    assert_eq!(snap.ask[0], PxQty::new(px6(10_010), 200));
    assert_eq!(snap.bid[0], PxQty::new(px6(10_010), 200));
    assert_eq!(snap.bid[1], PxQty::new(0, 100));
    assert_eq!(snap.ask[1], PxQty::new(0, 0));
}

#[test]
fn call_snapshot_zero_levels_when_uncrossed() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_000, 100, T0920, Tpm::OpenCall));
    engine.on_msg(sz_limit(MAIN, 2, Side::Ask, 10_020, 100, T0920 + 1000, Tpm::OpenCall));

    let snap = engine.matcher().last_snapshot().expect("call snapshot");
    for lv in 0..10 {
        assert_eq!(snap.bid[lv], PxQty::new(0, 0));
        assert_eq!(snap.ask[lv], PxQty::new(0, 0));
    }

    // The potential view reveals the live depth instead.
    let potential = engine.call_snapshot(10, true);
    assert_eq!(potential.bid[0], PxQty::new(px6(10_000), 100));
    assert_eq!(potential.ask[0], PxQty::new(px6(10_020), 100));
    assert_eq!(potential.bid[1], PxQty::new(0, 0));
}

#[test]
fn auction_clearing_burst_applies_and_publishes() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    engine.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_010, 300, T0920, Tpm::OpenCall));
    engine.on_msg(sz_limit(MAIN, 2, Side::Ask, 10_000, 200, T0920 + 1000, Tpm::OpenCall));

    // The exchange clears the auction at 09:25:00 with one execution and
    // the books stop crossing.
    let t_clear = 20220426_092500_000;
    engine.on_msg(sz_trade(MAIN, 3, 1, 2, 10_010, 200, t_clear, Tpm::AmTrading));

    assert_eq!(engine.phase(), Tpm::AmTrading);
    assert_eq!(engine.num_trades(), 1);
    assert_eq!(engine.last_px(), 10_010);
    assert_eq!(engine.level_qty(Side::Bid, 10_010), Some(100));
    assert_eq!(engine.level_qty(Side::Ask, 10_000), None);
    assert_eq!(engine.best_bid(), Some((10_010, 100)));
    assert_eq!(engine.best_ask(), None);

    let snap = engine.matcher().last_snapshot().expect("post-clear snapshot");
    assert_eq!(snap.bid[0], PxQty::new(px6(10_010), 100));
    assert_eq!(snap.num_trades, 1);
    assert_eq!(snap.total_volume_trade, 200);
}

#[test]
fn close_call_after_pm_end_signal() {
    let mut engine = engine_with_consts(MAIN, 10_005);

    // A quiet afternoon book, then the 14:57 boundary.
    let t_pm = 20220426_145000_000;
    engine.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_000, 100, t_pm, Tpm::PmTrading));
    engine.on_msg(sz_limit(MAIN, 2, Side::Ask, 10_010, 200, t_pm + 1000, Tpm::PmTrading));
    engine.on_msg(Msg::Signal(PhaseSignal::PmTradingEnd));

    assert_eq!(engine.phase(), Tpm::CloseCall);
    // The close call cannot cross this book either; AllEnd defers the close
    // price to the exchange snapshot.
    engine.on_msg(Msg::Signal(PhaseSignal::AllEnd));
    assert_eq!(engine.phase(), Tpm::Ending);
}
