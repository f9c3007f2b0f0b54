//! Shared value types: enums, feed records and the 10-level snapshot.

mod enums;
mod messages;
mod snapshot;

pub use enums::{Board, Exchange, InstrumentKind, OrdKind, PhaseSignal, Side, Tpi, Tpm};
pub use messages::{
    EXEC_TYPE_CANCEL, EXEC_TYPE_TRADE, ExecMsg, Msg, ORDER_PRICE_OVERFLOW, OrderMsg,
};
pub use snapshot::{MarketSnapshot, PxQty, SnapSource};
