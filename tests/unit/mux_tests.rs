//! Multiplexer routing, session-boundary signals and state capture.

use crate::helpers::*;
use orderbook_recon::prelude::*;

fn seeded_mux() -> Mux {
    let mut mux = Mux::new(Exchange::Szse, InstrumentKind::Stock, &[MAIN, GEM]);
    mux.on_msg(sz_starting_snap(MAIN, 10_005));
    mux.on_msg(sz_starting_snap(GEM, 20_000));
    mux
}

#[test]
fn messages_route_by_security_id() {
    let mut mux = seeded_mux();

    mux.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_000, 100, T0920, Tpm::OpenCall));
    mux.on_msg(sz_limit(GEM, 1, Side::Bid, 19_900, 30, T0920 + 1000, Tpm::OpenCall));

    assert_eq!(
        mux.with_engine(MAIN, |e| e.best_bid()).unwrap(),
        Some((10_000, 100))
    );
    assert_eq!(
        mux.with_engine(GEM, |e| e.best_bid()).unwrap(),
        Some((19_900, 30))
    );
}

#[test]
fn unsubscribed_instruments_are_dropped() {
    let mut mux = seeded_mux();
    let before = mux.msg_nb();

    mux.on_msg(sz_limit(999_999, 1, Side::Bid, 10_000, 100, T0920, Tpm::OpenCall));

    assert_eq!(mux.msg_nb(), before);
    assert_eq!(mux.engine_count(), 2);
}

#[test]
fn session_boundaries_fire_in_order_for_every_engine() {
    let mut mux = seeded_mux();

    // Uncrossed open-call books on both instruments.
    mux.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_000, 100, T0920, Tpm::OpenCall));
    mux.on_msg(sz_limit(MAIN, 2, Side::Ask, 10_010, 200, T0920 + 1000, Tpm::OpenCall));
    mux.on_msg(sz_limit(GEM, 1, Side::Bid, 19_900, 30, T0920 + 2000, Tpm::OpenCall));
    mux.on_msg(sz_limit(GEM, 2, Side::Ask, 20_100, 40, T0920 + 3000, Tpm::OpenCall));

    assert_eq!(mux.with_engine(MAIN, |e| e.phase()).unwrap(), Tpm::OpenCall);

    // The first message past 09:30 replays the missed boundaries (open-call
    // end, morning session begin) before it is dispatched.
    mux.on_msg(sz_limit(MAIN, 3, Side::Bid, 9_990, 10, 20220426_093100_000, Tpm::AmTrading));

    assert_eq!(mux.with_engine(MAIN, |e| e.phase()).unwrap(), Tpm::AmTrading);
    // The quiet instrument went through the same transitions.
    assert_eq!(mux.with_engine(GEM, |e| e.phase()).unwrap(), Tpm::AmTrading);
}

#[test]
fn mux_state_roundtrip_is_byte_identical() {
    let mut mux = seeded_mux();
    mux.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_000, 100, T0920, Tpm::OpenCall));
    mux.on_msg(sz_limit(GEM, 1, Side::Ask, 20_100, 40, T0920 + 1000, Tpm::OpenCall));

    let json = serde_json::to_string(&mux.save()).expect("json");
    let restored = Mux::restore(serde_json::from_str(&json).expect("state"));
    let json_again = serde_json::to_string(&restored.save()).expect("json");

    assert_eq!(json, json_again);
}

#[test]
fn restored_mux_continues_the_schedule() {
    let mut mux = seeded_mux();
    mux.on_msg(sz_limit(MAIN, 1, Side::Bid, 10_000, 100, T0920, Tpm::OpenCall));
    mux.on_msg(sz_limit(MAIN, 2, Side::Ask, 10_010, 200, T0920 + 1000, Tpm::OpenCall));

    let mut restored = Mux::restore(mux.save());
    restored.on_msg(sz_limit(
        MAIN,
        3,
        Side::Bid,
        9_990,
        10,
        20220426_093100_000,
        Tpm::AmTrading,
    ));

    assert_eq!(restored.with_engine(MAIN, |e| e.phase()).unwrap(), Tpm::AmTrading);
    assert!(restored.are_you_ok());
}
