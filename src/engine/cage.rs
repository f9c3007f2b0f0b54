//! ChiNext price-cage admission: hidden levels re-enter the visible book as
//! the reference prices move, and the whole region is released at the close
//! call.

use super::Engine;
use crate::normalize;
use crate::types::{ORDER_PRICE_OVERFLOW, Tpm};
use tracing::debug;

impl Engine {
    /// Fixed-point admission loop.
    ///
    /// Admitting a hidden bid raises the best bid, which moves the ask-side
    /// reference, which may admit a hidden ask, and so on. The loop runs the
    /// chain to quiescence. When an admissible level would cross the book it
    /// stops instead: the exchange will send the executions, and the trade
    /// handler resumes from there.
    pub(crate) fn enter_cage(&mut self) {
        loop {
            if self.cage.bid_outside_qty != 0
                && self.cage.bid_outside_px <= normalize::cyb_cage_upper(self.cage.bid_ref_px)
            {
                if self.ask_best_qty != 0
                    && self.cage.bid_outside_px >= self.ask_best_px
                    && self.phase != Tpm::VolatilityBreaking
                {
                    debug!(
                        security_id = self.security_id,
                        price = self.cage.bid_outside_px,
                        qty = self.cage.bid_outside_qty,
                        "hidden bid admissible but crossing; waiting for the execution"
                    );
                    break;
                }
                // Admit: the hidden level becomes the best bid.
                self.bid_best_px = self.cage.bid_outside_px;
                self.bid_best_qty = self.cage.bid_outside_qty;
                self.bid_weight_size += self.cage.bid_outside_qty;
                self.bid_weight_value +=
                    self.cage.bid_outside_px as u128 * self.cage.bid_outside_qty as u128;
                debug!(
                    security_id = self.security_id,
                    price = self.bid_best_px,
                    "hidden bid admitted as best"
                );

                self.cage.ask_ref_px = self.bid_best_px;
                if self.ask_best_qty == 0 {
                    self.cage.bid_ref_px = self.bid_best_px;
                }
                self.cage.ask_waiting = self.is_chinext();

                // Next hidden bid up, if any.
                let old = self.cage.bid_outside_px;
                self.cage.bid_outside_qty = 0;
                if let Some((p, q)) = self.bids.next_above(old) {
                    self.cage.bid_outside_px = p;
                    self.cage.bid_outside_qty = q;
                }
            } else {
                self.cage.bid_waiting = false;
            }

            if self.cage.ask_outside_qty != 0
                && self.cage.ask_outside_px >= normalize::cyb_cage_lower(self.cage.ask_ref_px)
            {
                if self.bid_best_qty != 0
                    && self.cage.ask_outside_px <= self.bid_best_px
                    && self.phase != Tpm::VolatilityBreaking
                {
                    debug!(
                        security_id = self.security_id,
                        price = self.cage.ask_outside_px,
                        qty = self.cage.ask_outside_qty,
                        "hidden ask admissible but crossing; waiting for the execution"
                    );
                    break;
                }
                self.ask_best_px = self.cage.ask_outside_px;
                self.ask_best_qty = self.cage.ask_outside_qty;
                self.ask_weight_size += self.cage.ask_outside_qty;
                self.ask_weight_value +=
                    self.cage.ask_outside_px as u128 * self.cage.ask_outside_qty as u128;
                debug!(
                    security_id = self.security_id,
                    price = self.ask_best_px,
                    "hidden ask admitted as best"
                );

                self.cage.bid_ref_px = self.ask_best_px;
                if self.bid_best_qty == 0 {
                    self.cage.ask_ref_px = self.ask_best_px;
                }
                self.cage.bid_waiting = self.is_chinext();

                let old = self.cage.ask_outside_px;
                self.cage.ask_outside_qty = 0;
                if let Some((p, q)) = self.asks.next_below(old) {
                    self.cage.ask_outside_px = p;
                    self.cage.ask_outside_qty = q;
                }
            } else {
                self.cage.ask_waiting = false;
            }

            if !self.cage.bid_waiting && !self.cage.ask_waiting {
                break;
            }
        }
    }

    /// Release the cage at the close call: fold the hidden regions back into
    /// the visible book and the weighted aggregates.
    ///
    /// Instruments still without a daily limit first shed every level outside
    /// the auction matching band around the last price; those orders cannot
    /// participate in the close.
    pub(crate) fn open_cage(&mut self) {
        debug!(security_id = self.security_id, "opening the cage");

        if self.up_limit_px == ORDER_PRICE_OVERFLOW {
            let upper = normalize::cyb_match_upper(self.last_px);
            let lower = normalize::cyb_match_lower(self.last_px);

            let purged: Vec<(u32, u64)> = self
                .asks
                .iter_asc()
                .filter(|&(p, _)| p > upper || p < lower)
                .collect();
            for &(p, q) in &purged {
                if self.cage.ask_outside_qty == 0 || p > self.cage.ask_outside_px {
                    self.ask_weight_size -= q;
                    self.ask_weight_value -= p as u128 * q as u128;
                }
            }
            for (p, _) in purged {
                self.asks.remove(p);
            }

            let purged: Vec<(u32, u64)> = self
                .bids
                .iter_desc()
                .filter(|&(p, _)| p > upper || p < lower)
                .collect();
            for &(p, q) in &purged {
                if self.cage.bid_outside_qty == 0 || p < self.cage.bid_outside_px {
                    self.bid_weight_size -= q;
                    self.bid_weight_value -= p as u128 * q as u128;
                }
            }
            for (p, _) in purged {
                self.bids.remove(p);
            }
        }

        if self.cage.ask_outside_qty != 0 {
            for (p, q) in self.asks.iter_asc() {
                if p > self.cage.ask_outside_px {
                    break;
                }
                self.ask_weight_size += q;
                self.ask_weight_value += p as u128 * q as u128;
            }
            self.cage.ask_outside_qty = 0;
            if let Some((p, q)) = self.asks.min() {
                self.ask_best_px = p;
                self.ask_best_qty = q;
            }
        }

        if self.cage.bid_outside_qty != 0 {
            for (p, q) in self.bids.iter_desc() {
                if p < self.cage.bid_outside_px {
                    break;
                }
                self.bid_weight_size += q;
                self.bid_weight_value += p as u128 * q as u128;
            }
            self.cage.bid_outside_qty = 0;
            if let Some((p, q)) = self.bids.max() {
                self.bid_best_px = p;
                self.bid_best_qty = q;
            }
        }
    }
}
