//! Ten-level market snapshot, shared between the exchange feed and the
//! rebuilt output, with the venue-specific phase-code packing.

use super::enums::{Exchange, Tpi, Tpm};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// One displayed price level. Prices are at snapshot (wire) precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PxQty {
    pub price: u64,
    pub qty: u64,
}

impl PxQty {
    pub fn new(price: u64, qty: u64) -> Self {
        PxQty { price, qty }
    }
}

impl fmt::Display for PxQty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} * {}", self.price, self.qty)
    }
}

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapSource {
    /// Published by the exchange.
    Market,
    /// Rebuilt from the incremental feed (continuous phases).
    Rebuilt,
    /// Rebuilt by the call-auction simulation.
    RebuiltCall,
}

/// A full 10-level snapshot in exchange wire precision.
///
/// The same type carries exchange-published snapshots and rebuilt ones; the
/// reconciliation in the matcher compares them with [`MarketSnapshot::matches`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub exchange: Exchange,
    pub security_id: u32,
    pub channel_no: i32,
    /// SZ: `YYYYMMDDHHMMSSmmm`. SSE stock/fund: `HHMMSS`. SSE bond family:
    /// `HHMMSSmmm`.
    pub transact_time: u64,
    /// SZ: low nibble market phase, high nibble security state.
    /// SSE: the market phase code byte.
    pub phase_code: u8,
    /// SSE stock/fund only: packed per-security state bits.
    pub phase_code_pack: u8,
    pub num_trades: u64,
    pub total_volume_trade: u64,
    pub total_value_trade: u64,
    /// SZ snapshots publish this at 4 dp (all other prices at 6 dp).
    pub prev_close_px: u64,
    pub last_px: u64,
    pub open_px: u64,
    pub high_px: u64,
    pub low_px: u64,
    pub bid_weight_px: u64,
    pub bid_weight_size: u64,
    pub ask_weight_px: u64,
    pub ask_weight_size: u64,
    pub up_limit_px: u64,
    pub dn_limit_px: u64,
    pub bid: [PxQty; 10],
    pub ask: [PxQty; 10],
    /// Set when an overflow-priced ask makes the ask weighted average
    /// meaningless; comparison then skips `ask_weight_px`.
    pub ask_weight_px_uncertain: bool,
    /// Ordinal of the message that produced this snapshot (diagnostics only).
    pub seq: u64,
    pub source: SnapSource,
}

impl MarketSnapshot {
    /// An all-zero snapshot shell for the given venue and security.
    pub fn empty(exchange: Exchange, security_id: u32, source: SnapSource) -> Self {
        MarketSnapshot {
            exchange,
            security_id,
            channel_no: 0,
            transact_time: 0,
            phase_code: 0,
            phase_code_pack: 0,
            num_trades: 0,
            total_volume_trade: 0,
            total_value_trade: 0,
            prev_close_px: 0,
            last_px: 0,
            open_px: 0,
            high_px: 0,
            low_px: 0,
            bid_weight_px: 0,
            bid_weight_size: 0,
            ask_weight_px: 0,
            ask_weight_size: 0,
            up_limit_px: 0,
            dn_limit_px: 0,
            bid: [PxQty::default(); 10],
            ask: [PxQty::default(); 10],
            ask_weight_px_uncertain: false,
            seq: 0,
            source,
        }
    }

    /// Intraday time as `HHMMSSmmm`, regardless of the venue's stamp format.
    pub fn hhmmss_ms(&self) -> u64 {
        match self.exchange {
            Exchange::Szse => self.transact_time % 1_000_000_000,
            Exchange::Sse => {
                // Exchange stock/fund stamps are six-digit `HHMMSS`; rebuilt
                // ones keep one extra 100 ms digit; the bond family carries
                // full milliseconds.
                if self.transact_time <= 160_000 {
                    self.transact_time * 1000
                } else if self.transact_time < 10_000_000 {
                    self.transact_time * 100
                } else {
                    self.transact_time
                }
            }
        }
    }

    /// Decode the market phase from the code byte. Codes that need an
    /// intraday disambiguation (AM vs PM, the two breaks) use the stamp.
    pub fn phase(&self) -> Option<Tpm> {
        let t = self.hhmmss_ms();
        match self.exchange {
            Exchange::Szse => match self.phase_code & 0xf {
                0 => Some(Tpm::Starting),
                1 => Some(Tpm::OpenCall),
                2 => Some(if t < 120_000_000 { Tpm::AmTrading } else { Tpm::PmTrading }),
                3 => Some(if t < 93_100_000 { Tpm::PreTradingBreaking } else { Tpm::Breaking }),
                4 => Some(Tpm::CloseCall),
                5 => Some(Tpm::Ending),
                6 => Some(Tpm::HangingUp),
                7 => Some(Tpm::AfterCloseTrading),
                8 => Some(Tpm::VolatilityBreaking),
                code => {
                    error!(security_id = self.security_id, code, "unknown SZSE phase code");
                    None
                }
            },
            Exchange::Sse => match self.phase_code {
                0 => Some(Tpm::Starting),
                1 => Some(Tpm::OpenCall),
                2 => Some(if t < 93_000_000 {
                    Tpm::PreTradingBreaking
                } else if t < 113_000_000 {
                    Tpm::AmTrading
                } else if t < 130_000_000 {
                    Tpm::Breaking
                } else {
                    Tpm::PmTrading
                }),
                4 => Some(Tpm::CloseCall),
                5 | 12 => Some(Tpm::Ending),
                // 11 is the bond stream's "not listed" state.
                6 | 11 => Some(Tpm::HangingUp),
                code => {
                    error!(security_id = self.security_id, code, "unknown SSE phase code");
                    None
                }
            },
        }
    }

    /// Decode the per-security state.
    pub fn security_phase(&self) -> Tpi {
        match self.exchange {
            Exchange::Szse => {
                if self.phase_code >> 4 == 0 {
                    Tpi::Normal
                } else {
                    Tpi::NoTrade
                }
            }
            Exchange::Sse => {
                if self.phase_code_pack == 0 {
                    // Bond-family snapshots have no pack byte; off-market and
                    // hung instruments carry it in the phase code instead.
                    if self.phase_code == 11 || self.phase_code == 6 {
                        Tpi::NoTrade
                    } else {
                        Tpi::Normal
                    }
                } else {
                    let on_market = (self.phase_code_pack >> 2) & 0xf;
                    let tradable = self.phase_code_pack >> 6;
                    let accepting = self.phase_code_pack & 0x3;
                    if tradable == 1 && on_market == 1 && accepting == 1 {
                        Tpi::Normal
                    } else {
                        Tpi::NoTrade
                    }
                }
            }
        }
    }

    /// Encode the phase code byte(s) for this venue.
    pub fn set_phase(&mut self, tpm: Tpm, tpi: Tpi) {
        match self.exchange {
            Exchange::Szse => {
                let code0: u8 = match tpm {
                    Tpm::Starting => 0,
                    Tpm::OpenCall => 1,
                    Tpm::AmTrading | Tpm::PmTrading => 2,
                    Tpm::PreTradingBreaking | Tpm::Breaking => 3,
                    Tpm::CloseCall => 4,
                    Tpm::Ending => 5,
                    Tpm::HangingUp => 6,
                    Tpm::AfterCloseTrading => 7,
                    Tpm::VolatilityBreaking => 8,
                };
                let code1: u8 = match tpi {
                    Tpi::Normal => 0,
                    Tpi::NoTrade => 1,
                };
                self.phase_code = (code1 << 4) | code0;
            }
            Exchange::Sse => {
                self.phase_code = match tpm {
                    Tpm::Starting => 0,
                    Tpm::OpenCall => 1,
                    Tpm::PreTradingBreaking
                    | Tpm::AmTrading
                    | Tpm::Breaking
                    | Tpm::PmTrading => 2,
                    Tpm::CloseCall => 4,
                    Tpm::Ending | Tpm::AfterCloseTrading => 5,
                    Tpm::HangingUp => 6,
                    Tpm::VolatilityBreaking => 0xff,
                };
                // tradable / on-market / accepting-orders bits.
                let code1: u8 = match tpi {
                    Tpi::Normal => 1,
                    Tpi::NoTrade => 0,
                };
                self.phase_code_pack = (code1 << 6) | (1 << 2) | 1;
            }
        }
    }

    /// Value comparison between a rebuilt and an exchange snapshot.
    ///
    /// `transact_time` is never compared (the matcher applies its own
    /// timestamp rule), and `ask_weight_px` is skipped when either side
    /// flagged it uncertain.
    pub fn matches(&self, other: &MarketSnapshot) -> bool {
        let ask_weight_px_ok = if self.ask_weight_px_uncertain || other.ask_weight_px_uncertain {
            true
        } else {
            self.ask_weight_px == other.ask_weight_px
        };

        self.exchange == other.exchange
            && self.security_id == other.security_id
            && self.channel_no == other.channel_no
            && self.phase_code == other.phase_code
            && self.num_trades == other.num_trades
            && self.total_volume_trade == other.total_volume_trade
            && self.total_value_trade == other.total_value_trade
            && self.prev_close_px == other.prev_close_px
            && self.last_px == other.last_px
            && self.open_px == other.open_px
            && self.high_px == other.high_px
            && self.low_px == other.low_px
            && self.bid_weight_px == other.bid_weight_px
            && self.bid_weight_size == other.bid_weight_size
            && ask_weight_px_ok
            && self.ask_weight_size == other.ask_weight_size
            && self.up_limit_px == other.up_limit_px
            && self.dn_limit_px == other.dn_limit_px
            && self.bid == other.bid
            && self.ask == other.ask
    }
}
