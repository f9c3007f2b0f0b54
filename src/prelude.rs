//! Convenience re-exports for typical use: build a [`Mux`] (or a bare
//! [`Engine`]), feed it [`Msg`]s, inspect the rebuilt snapshots.

pub use crate::book::{Ladder, Level};
pub use crate::engine::{
    CageState, Engine, EngineState, Order, PersistError, ProfileStats, SnapMatcher, StatePackage,
};
pub use crate::mux::{Mux, MuxState};
pub use crate::types::{
    Board, ExecMsg, Exchange, InstrumentKind, MarketSnapshot, Msg, ORDER_PRICE_OVERFLOW, OrdKind,
    OrderMsg, PhaseSignal, PxQty, Side, SnapSource, Tpi, Tpm,
};
