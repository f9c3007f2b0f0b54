//! Numeric normalization between exchange wire precision and the engine's
//! internal integer precision, plus the fixed bit-width envelope.
//!
//! Everything downstream works on integers: internal prices are 2 dp for
//! stocks and 3 dp for funds and convertible bonds, regardless of venue.
//! Values outside the fixed bit widths are clipped and reported; the engine
//! keeps running on the clipped value.

use crate::types::{Exchange, InstrumentKind};

/// Sequence numbers are per-channel and fit 32 bits.
pub const SEQ_BITS: u32 = 32;
/// Internal price width.
pub const PRICE_BITS: u32 = 25;
/// Single-order quantity width.
pub const QTY_BITS: u32 = 30;
/// Aggregated per-level quantity width.
pub const LEVEL_QTY_BITS: u32 = QTY_BITS + 8;
/// Intraday tick width (10 ms granularity on SZ, 1 ms on SSE).
pub const TICK_BITS: u32 = 28;

/// Internal overflow-price sentinel; doubles as "priced beyond any limit".
pub const PRICE_MAXIMUM: u32 = (1 << PRICE_BITS) - 1;

/// ChiNext call-auction envelope: bids above `PrevClosePx * 9` are rejected
/// while the instrument has no daily price limit.
pub const CYB_ORDER_ENVALUE_MAX_RATE: u64 = 9;

/// SZ incremental prices: 4 dp.
pub const PRICE_SZSE_INCR_PRECISION: u64 = 10_000;
/// SZ snapshot prices: 6 dp.
pub const PRICE_SZSE_SNAP_PRECISION: u64 = 1_000_000;
/// SZ snapshot `PrevClosePx`: 4 dp, unlike every other snapshot price.
pub const PRICE_SZSE_SNAP_PRECLOSE_PRECISION: u64 = 10_000;
/// SSE prices: 3 dp on both the incremental and snapshot streams.
pub const PRICE_SSE_PRECISION: u64 = 1_000;

/// Internal price precision: stocks 2 dp.
pub const PRICE_INTER_STOCK_PRECISION: u64 = 100;
/// Internal price precision: funds 3 dp.
pub const PRICE_INTER_FUND_PRECISION: u64 = 1_000;
/// Internal price precision: convertible bonds 3 dp.
pub const PRICE_INTER_KZZ_PRECISION: u64 = 1_000;

/// SZ quantities: 2 dp.
pub const QTY_SZSE_PRECISION: u64 = 100;
/// SSE quantities: 3 dp.
pub const QTY_SSE_PRECISION: u64 = 1_000;

/// SZ `TotalValueTrade`: 4 dp.
pub const VALUE_SZSE_PRECISION: u64 = 10_000;
/// SSE `TotalValueTrade`: 5 dp.
pub const VALUE_SSE_PRECISION: u64 = 100_000;

/// Internal price precision for this instrument.
pub fn internal_price_precision(kind: InstrumentKind) -> Option<u64> {
    match kind {
        InstrumentKind::Stock => Some(PRICE_INTER_STOCK_PRECISION),
        InstrumentKind::Fund => Some(PRICE_INTER_FUND_PRECISION),
        InstrumentKind::ConvBond => Some(PRICE_INTER_KZZ_PRECISION),
        // SSE bonds stay at their native 3 dp.
        InstrumentKind::Bond | InstrumentKind::Repo => Some(PRICE_SSE_PRECISION),
        InstrumentKind::Unknown => None,
    }
}

/// Divisor taking an incremental-stream price down to internal precision.
pub fn incr_price_divisor(exchange: Exchange, kind: InstrumentKind) -> Option<u64> {
    let wire = match exchange {
        Exchange::Szse => PRICE_SZSE_INCR_PRECISION,
        Exchange::Sse => PRICE_SSE_PRECISION,
    };
    internal_price_precision(kind).map(|inter| wire / inter)
}

/// Multiplier expanding an internal price to snapshot precision.
pub fn snap_price_multiplier(exchange: Exchange, kind: InstrumentKind) -> Option<u64> {
    let wire = match exchange {
        Exchange::Szse => PRICE_SZSE_SNAP_PRECISION,
        Exchange::Sse => PRICE_SSE_PRECISION,
    };
    internal_price_precision(kind).map(|inter| wire / inter)
}

/// Divisor taking a snapshot `PrevClosePx` down to internal precision.
pub fn preclose_divisor(exchange: Exchange, kind: InstrumentKind) -> Option<u64> {
    let wire = match exchange {
        Exchange::Szse => PRICE_SZSE_SNAP_PRECLOSE_PRECISION,
        Exchange::Sse => PRICE_SSE_PRECISION,
    };
    internal_price_precision(kind).map(|inter| wire / inter)
}

/// Divisor taking a snapshot price (limits, last) down to internal precision.
pub fn snap_price_divisor(exchange: Exchange, kind: InstrumentKind) -> Option<u64> {
    snap_price_multiplier(exchange, kind)
}

/// Divisor applied to `LastQty * LastPx` (both at internal precision) so the
/// product lands at the venue's `TotalValueTrade` precision.
pub fn trade_value_divisor(exchange: Exchange, kind: InstrumentKind) -> Option<u64> {
    let (qty, out) = match exchange {
        Exchange::Szse => (QTY_SZSE_PRECISION, VALUE_SZSE_PRECISION),
        Exchange::Sse => (QTY_SSE_PRECISION, VALUE_SSE_PRECISION),
    };
    internal_price_precision(kind).map(|px| qty * px / out)
}

/// Upper edge of the ChiNext continuous-trading price cage.
pub fn cyb_cage_upper(ref_px: u32) -> u32 {
    (ref_px as u64 * 102 / 100) as u32
}

/// Lower edge of the ChiNext continuous-trading price cage.
pub fn cyb_cage_lower(ref_px: u32) -> u32 {
    ((ref_px as u64 * 98).div_ceil(100)) as u32
}

/// Upper bound of the ChiNext no-limit auction matching band.
pub fn cyb_match_upper(last_px: u32) -> u32 {
    (last_px as u64 * 110 / 100) as u32
}

/// Lower bound of the ChiNext no-limit auction matching band.
pub fn cyb_match_lower(last_px: u32) -> u32 {
    ((last_px as u64 * 90).div_ceil(100)) as u32
}

/// Round-half-up integer division, `round(value / size)`.
pub fn weighted_round(value: u128, size: u128) -> u128 {
    ((value * 2 / size) + 1) >> 1
}

/// Clip to `i32::MAX`, for weighted prices that lost meaning to overflow.
pub fn clip_i32(x: u64) -> u64 {
    x.min(i32::MAX as u64)
}
