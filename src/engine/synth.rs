//! Rebuilt snapshot synthesis: the continuous-trading top-10 view and the
//! sealed call-auction simulation.

use super::Engine;
use crate::normalize::{self, weighted_round};
use crate::types::{Exchange, InstrumentKind, MarketSnapshot, PxQty, SnapSource, Tpi, Tpm};
use tracing::error;

impl Engine {
    /// Synthesize and publish a snapshot for the current phase, if the phase
    /// calls for one. Must not run with a held order in flight (the book is
    /// mid-transition), except during volatility breaking where orders can
    /// legitimately wait.
    pub(crate) fn gen_snap(&mut self) {
        assert!(
            self.phase == Tpm::VolatilityBreaking || self.holding.is_none(),
            "{:06} snapshot requested with an order in the holding slot",
            self.security_id
        );

        let snap = if self.phase < Tpm::OpenCall || self.phase > Tpm::Ending {
            None
        } else if self.phase.is_call() {
            Some(self.call_snapshot(10, false))
        } else if self.phase == Tpm::VolatilityBreaking {
            Some(self.trading_snapshot(true, 10))
        } else if self.phase == Tpm::Ending {
            // Only once the close price is final.
            self.close_px_ready.then(|| self.trading_snapshot(false, 10))
        } else {
            Some(self.trading_snapshot(false, 10))
        };

        let Some(mut snap) = snap else { return };

        snap.ask_weight_px_uncertain = self.ask_weight_px_uncertain;
        // An unbounded ask makes the weighted price meaningless; pin it.
        snap.ask_weight_px = normalize::clip_i32(snap.ask_weight_px);
        snap.seq = self.msg_nb;

        #[cfg(debug_assertions)]
        if self.phase.is_continuous()
            && snap.ask[0].qty != 0
            && snap.bid[0].qty != 0
        {
            debug_assert!(
                snap.ask[0].price > snap.bid[0].price,
                "{:06} rebuilt snapshot shows a crossed book",
                self.security_id
            );
        }

        self.publish(snap);
    }

    /// Expand an internal price to snapshot wire precision.
    pub(crate) fn px_out(&self, price: u32) -> u64 {
        match normalize::snap_price_multiplier(self.exchange, self.kind) {
            Some(mult) => price as u64 * mult,
            None => {
                error!(
                    security_id = self.security_id,
                    kind = ?self.kind,
                    "no snapshot price rule for this instrument kind"
                );
                price as u64
            }
        }
    }

    fn weighted_px_out(&self, value: u128, size: u64) -> u64 {
        if size == 0 {
            return 0;
        }
        let w = weighted_round(value, size as u128);
        let mult = normalize::snap_price_multiplier(self.exchange, self.kind).unwrap_or(1) as u128;
        (w * mult).min(u64::MAX as u128) as u64
    }

    /// Day constants, identical in every snapshot of the session.
    fn set_fix_params(&self, snap: &mut MarketSnapshot) {
        snap.channel_no = self.channel_no;
        snap.prev_close_px = match normalize::preclose_divisor(self.exchange, self.kind) {
            Some(mult) => self.prev_close_px as u64 * mult,
            None => self.prev_close_px as u64,
        };
        snap.up_limit_px = self.up_limit_px;
        snap.dn_limit_px = self.dn_limit_px;
    }

    /// Stamp the snapshot with the engine clock in the venue's own format.
    fn set_snap_timestamp(&self, snap: &mut MarketSnapshot) {
        snap.transact_time = match self.exchange {
            Exchange::Szse => {
                self.trade_date * 1_000_000_000 + self.current_inc_tick as u64 * 10
            }
            Exchange::Sse => match self.kind {
                // Bond-family stamps keep milliseconds.
                InstrumentKind::Bond | InstrumentKind::ConvBond | InstrumentKind::Repo => {
                    self.current_inc_tick as u64
                }
                // Stock and fund stamps drop the two fine sub-second digits.
                _ => self.current_inc_tick as u64 / 100,
            },
        };
    }

    /// Continuous-trading snapshot: top levels inside the cage, aggregates,
    /// weighted prices. During volatility breaking everything book-derived
    /// is zeroed.
    pub fn trading_snapshot(
        &self,
        volatility_breaking: bool,
        level_nb: usize,
    ) -> MarketSnapshot {
        let level_nb = level_nb.min(10);
        let mut snap =
            MarketSnapshot::empty(self.exchange, self.security_id, SnapSource::Rebuilt);

        if !volatility_breaking {
            let mut lv = 0;
            for (p, q) in self.bids.iter_desc() {
                // Hidden bids sit above the outside extremum; skip the region.
                if self.cage.bid_outside_qty == 0 || p < self.cage.bid_outside_px {
                    snap.bid[lv] = PxQty::new(self.px_out(p), q);
                    lv += 1;
                    if lv >= level_nb {
                        break;
                    }
                }
            }
            let mut lv = 0;
            for (p, q) in self.asks.iter_asc() {
                if self.cage.ask_outside_qty == 0 || p > self.cage.ask_outside_px {
                    snap.ask[lv] = PxQty::new(self.px_out(p), q);
                    lv += 1;
                    if lv >= level_nb {
                        break;
                    }
                }
            }
        }

        self.set_fix_params(&mut snap);

        snap.num_trades = self.num_trades;
        snap.total_volume_trade = self.total_volume_trade;
        snap.total_value_trade = self.total_value_trade;
        snap.last_px = self.px_out(self.last_px);
        snap.high_px = self.px_out(self.high_px);
        snap.low_px = self.px_out(self.low_px);
        snap.open_px = self.px_out(self.open_px);

        if !volatility_breaking {
            snap.bid_weight_px = self.weighted_px_out(self.bid_weight_value, self.bid_weight_size);
            snap.bid_weight_size = self.bid_weight_size;
            snap.ask_weight_px = self.weighted_px_out(self.ask_weight_value, self.ask_weight_size);
            snap.ask_weight_size = self.ask_weight_size;
        }

        self.set_snap_timestamp(&mut snap);
        snap.set_phase(self.phase, Tpi::Normal);
        snap
    }

    /// Call-auction snapshot: run the sealed match over the current books
    /// and reveal the clearing price, matched volume and residue.
    ///
    /// `show_potential` reveals the live depth instead of zeros when the
    /// books cannot cross at all.
    pub fn call_snapshot(&self, level_nb: usize, show_potential: bool) -> MarketSnapshot {
        let mut bid_px = self.bid_best_px;
        let mut bid_level_qty = self.bid_best_qty;
        let mut ask_px = self.ask_best_px;
        let mut ask_level_qty = self.ask_best_qty;

        // Price anchor before any matching: the lone side when only one side
        // has depth, otherwise decided by the walk.
        let mut price: u32 = if bid_level_qty == 0 && ask_level_qty == 0 {
            0
        } else if bid_level_qty == 0 {
            ask_px
        } else if ask_level_qty == 0 {
            bid_px
        } else {
            0
        };

        let mut volume: u64 = 0;
        let mut bid_rem: u64 = 0;
        let mut ask_rem: u64 = 0;
        let ref_px = if self.num_trades == 0 {
            self.prev_close_px
        } else {
            self.last_px
        };

        loop {
            if bid_level_qty != 0 && ask_level_qty != 0 && bid_px >= ask_px {
                if bid_rem == 0 {
                    bid_rem = bid_level_qty;
                }
                if ask_rem == 0 {
                    ask_rem = ask_level_qty;
                }

                // The smaller side is consumed whole.
                if bid_rem >= ask_rem {
                    volume += ask_rem;
                    bid_rem -= ask_rem;
                    ask_rem = 0;
                } else {
                    volume += bid_rem;
                    ask_rem -= bid_rem;
                    bid_rem = 0;
                }

                // Both sides zeroing together leaves the price free inside
                // [ask, bid]; take the reference, or the closer bound.
                if bid_rem == 0 && ask_rem == 0 {
                    if bid_px >= ref_px && ask_px <= ref_px {
                        price = ref_px;
                    } else if bid_px.abs_diff(ref_px) < ask_px.abs_diff(ref_px) {
                        price = bid_px;
                    } else {
                        price = ask_px;
                    }
                }

                if bid_rem == 0 {
                    if ask_rem != 0 {
                        price = ask_px;
                    }
                    bid_level_qty = 0;
                    if let Some((p, q)) = self.bids.next_below(bid_px) {
                        bid_px = p;
                        bid_level_qty = q;
                    }
                }
                if ask_rem == 0 {
                    if bid_rem != 0 {
                        price = bid_px;
                    }
                    ask_level_qty = 0;
                    if let Some((p, q)) = self.asks.next_above(ask_px) {
                        ask_px = p;
                        ask_level_qty = q;
                    }
                }
            } else {
                // No more crossing. After a perfect match the provisional
                // price may sit on the wrong side of the next resting level;
                // pull it inside, preferring the smaller leftover when the
                // two sides are one tick apart (ask wins the tie on the high
                // side, bid on the low side).
                if ask_rem == 0 && bid_rem == 0 {
                    if ask_level_qty != 0 && price >= ask_px {
                        if bid_level_qty == 0 || bid_px + 1 < ask_px {
                            price = ask_px.saturating_sub(1);
                        } else if ask_level_qty <= bid_level_qty {
                            price = ask_px;
                            ask_rem = ask_level_qty;
                        } else {
                            price = bid_px;
                            bid_rem = bid_level_qty;
                        }
                    } else if bid_level_qty != 0 && price <= bid_px {
                        if ask_px > bid_px + 1 {
                            price = bid_px + 1;
                        } else if bid_level_qty <= ask_level_qty {
                            price = bid_px;
                            bid_rem = bid_level_qty;
                        } else {
                            price = ask_px;
                            ask_rem = ask_level_qty;
                        }
                    }
                }
                break;
            }
        }

        let price_out = self.px_out(price);
        let mut snap =
            MarketSnapshot::empty(self.exchange, self.security_id, SnapSource::RebuiltCall);

        if volume == 0 {
            if show_potential {
                self.fill_live_levels(&mut snap, level_nb);
            }
        } else {
            // Two-level reveal: the indicative price and matched volume on
            // top, the unmatched residue beneath.
            snap.ask[0] = PxQty::new(price_out, volume);
            snap.ask[1] = PxQty::new(0, ask_rem);
            snap.bid[0] = PxQty::new(price_out, volume);
            snap.bid[1] = PxQty::new(0, bid_rem);
        }

        self.set_fix_params(&mut snap);

        // Zero through the open call; populated during the close call.
        snap.num_trades = self.num_trades;
        snap.total_volume_trade = self.total_volume_trade;
        snap.total_value_trade = self.total_value_trade;
        snap.last_px = self.px_out(self.last_px);
        snap.high_px = self.px_out(self.high_px);
        snap.low_px = self.px_out(self.low_px);
        snap.open_px = self.px_out(self.open_px);

        match self.exchange {
            // SZ publishes no weighted aggregates while an auction is forming.
            Exchange::Szse => {
                snap.bid_weight_px = 0;
                snap.bid_weight_size = 0;
                snap.ask_weight_px = 0;
                snap.ask_weight_size = 0;
            }
            Exchange::Sse => {
                snap.bid_weight_px =
                    self.weighted_px_out(self.bid_weight_value, self.bid_weight_size);
                snap.bid_weight_size = self.bid_weight_size;
                snap.ask_weight_px =
                    self.weighted_px_out(self.ask_weight_value, self.ask_weight_size);
                snap.ask_weight_size = self.ask_weight_size;
            }
        }

        self.set_snap_timestamp(&mut snap);
        snap.set_phase(self.phase, Tpi::Normal);
        snap
    }

    /// Reveal both sides' best `level_nb` levels from the live books,
    /// starting at the cached bests (which already exclude hidden levels).
    fn fill_live_levels(&self, snap: &mut MarketSnapshot, level_nb: usize) {
        let mut ask_px = self.ask_best_px;
        let mut ask_qty = self.ask_best_qty;
        let mut bid_px = self.bid_best_px;
        let mut bid_qty = self.bid_best_qty;

        for nb in 0..level_nb.min(10) {
            if ask_qty != 0 {
                snap.ask[nb] = PxQty::new(self.px_out(ask_px), ask_qty);
                ask_qty = 0;
                if let Some((p, q)) = self.asks.next_above(ask_px) {
                    ask_px = p;
                    ask_qty = q;
                }
            }
            if bid_qty != 0 {
                snap.bid[nb] = PxQty::new(self.px_out(bid_px), bid_qty);
                bid_qty = 0;
                if let Some((p, q)) = self.bids.next_below(bid_px) {
                    bid_px = p;
                    bid_qty = q;
                }
            }
        }
    }
}
