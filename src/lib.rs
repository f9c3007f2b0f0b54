//! # Limit Order Book Reconstruction Engine
//!
//! A deterministic, per-instrument limit order book reconstruction engine
//! for Chinese equity-style markets (Shenzhen and Shanghai; stocks, funds,
//! convertible bonds). Given the time-ordered incremental stream of order,
//! execution and cancel records plus the exchange's periodic snapshots, the
//! engine maintains a local book and emits rebuilt 10-level snapshots that
//! must match the exchange's published ones field for field.
//!
//! ## Key pieces
//!
//! - **[`Engine`]** — the per-instrument state machine: phase transitions,
//!   order ingress with a single-slot holding buffer for market and
//!   cross-spread orders, execution and cancel application, and the ChiNext
//!   *price cage* (out-of-band levels kept hidden until the reference
//!   prices move).
//! - **Snapshot synthesis** — continuous-trading top-10 snapshots and
//!   sealed call-auction snapshots with the minimal-residue clearing-price
//!   rule, at exchange precision and timestamp formats.
//! - **Snapshot matcher** — reconciles rebuilt snapshots against exchange
//!   snapshots by trade count, tolerating the rebuild leading by up to a
//!   second; an unmatched exchange snapshot at end of day flags the engine
//!   unhealthy.
//! - **[`Mux`]** — fans one venue's stream out to the subscribed engines
//!   and injects session-boundary signals (open-call end, session begin and
//!   end) that the feed alone cannot supply.
//! - **Persistence** — the whole engine graph saves to a versioned,
//!   checksummed JSON package and restores byte-identically.
//!
//! ## Numeric discipline
//!
//! All internal arithmetic is integer: prices carry 2 decimals for stocks
//! and 3 for funds and convertible bonds regardless of venue, quantities and
//! value accumulators use the venue's native scales, and every quantity is
//! checked against its fixed bit width (25-bit prices, 30-bit order
//! quantities, 38-bit level aggregates, 32-bit sequence numbers). Overflow
//! clips and logs rather than aborting; the one lossy case (an unbounded
//! ask poisoning the ask-side weighted average) is tracked explicitly and
//! excluded from snapshot comparison.
//!
//! ## Determinism
//!
//! Processing is single-threaded and synchronous: one message in, zero, one
//! or two snapshots out, no suspension points. Identical input streams
//! produce identical snapshot streams, which is the property the snapshot
//! matcher leans on.

pub mod book;
pub mod engine;
pub mod mux;
pub mod normalize;
pub mod types;

pub mod prelude;

pub use engine::{
    CageState, Engine, EngineState, Order, PersistError, ProfileStats, STATE_FORMAT_VERSION,
    SnapMatcher, StatePackage,
};
pub use mux::{Mux, MuxState};
pub use types::{
    Board, ExecMsg, Exchange, InstrumentKind, MarketSnapshot, Msg, ORDER_PRICE_OVERFLOW, OrdKind,
    OrderMsg, PhaseSignal, PxQty, Side, SnapSource, Tpi, Tpm,
};
