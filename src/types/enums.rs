//! Closed enums shared across the engine: sides, order kinds, venues,
//! instrument kinds, board subtypes and trading phases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy side.
    Bid,
    /// Sell side.
    Ask,
    /// Unrecognized wire value; the order is rejected but kept typed for logs.
    Unknown,
}

impl Side {
    /// The opposite side. `Unknown` maps to itself.
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
            Side::Unknown => Side::Unknown,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "BID"),
            Side::Ask => write!(f, "ASK"),
            Side::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Order pricing kind as submitted to the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrdKind {
    /// Plain limit order.
    Limit,
    /// Market order; its effective price is only known from the trailing
    /// executions.
    Market,
    /// "Best price on own side" order, converted to a limit on arrival.
    SideOptimal,
    /// Unrecognized wire value.
    Unknown,
}

/// Venue the instrument trades on, from `SecurityIDSource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exchange {
    /// Shanghai Stock Exchange (`SecurityIDSource` 101).
    Sse,
    /// Shenzhen Stock Exchange (`SecurityIDSource` 102).
    Szse,
}

/// Instrument family; drives the internal price precision and the value
/// accumulation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentKind {
    Stock,
    Fund,
    /// Convertible bond (KZZ).
    ConvBond,
    /// Plain bond (SSE incremental bond stream).
    Bond,
    /// Reverse repo.
    Repo,
    Unknown,
}

/// Market board subtype, derived from the security code range. Only
/// `SzChiNext` changes engine behavior (price cage, 9x envelope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Board {
    SzMain,
    SzChiNext,
    SseMain,
    SseStar,
    Other,
}

impl Board {
    /// Classify an instrument by venue and code range.
    ///
    /// ChiNext stocks live in 300000..=349999 on Shenzhen; STAR stocks in
    /// 688000..=689999 on Shanghai. Funds and bonds never get cage handling,
    /// so their ranges intentionally fall through to the main boards.
    pub fn classify(exchange: Exchange, security_id: u32) -> Board {
        match exchange {
            Exchange::Szse => {
                if (300_000..=349_999).contains(&security_id) {
                    Board::SzChiNext
                } else {
                    Board::SzMain
                }
            }
            Exchange::Sse => {
                if (688_000..=689_999).contains(&security_id) {
                    Board::SseStar
                } else {
                    Board::SseMain
                }
            }
        }
    }
}

/// Market-wide trading phase.
///
/// The discriminants are ordered so that the usual range checks read
/// naturally: everything before `OpenCall` is pre-market, everything from
/// `Ending` on is post-market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Tpm {
    Starting = 0,
    OpenCall = 1,
    PreTradingBreaking = 2,
    AmTrading = 3,
    Breaking = 4,
    PmTrading = 5,
    VolatilityBreaking = 6,
    CloseCall = 7,
    Ending = 8,
    HangingUp = 9,
    AfterCloseTrading = 10,
}

impl Tpm {
    /// True during the morning or afternoon continuous session.
    pub fn is_continuous(self) -> bool {
        self == Tpm::AmTrading || self == Tpm::PmTrading
    }

    /// True during either call auction.
    pub fn is_call(self) -> bool {
        self == Tpm::OpenCall || self == Tpm::CloseCall
    }
}

/// Per-security trading state carried inside the snapshot phase code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tpi {
    Normal,
    NoTrade,
}

/// Session-boundary signals broadcast by the multiplexer when the feed alone
/// cannot drive a transition (no trade at the open, the silent midday pause).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseSignal {
    OpenCallBgn,
    OpenCallEnd,
    AmTradingBgn,
    AmTradingEnd,
    PmTradingBgn,
    PmTradingEnd,
    AllEnd,
}
