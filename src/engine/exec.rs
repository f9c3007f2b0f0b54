//! Execution and cancel handling, including the level dequeue that keeps
//! the cached bests and the cage extrema honest.

use super::{Cancel, Engine, Trade};
use crate::normalize::{self, CYB_ORDER_ENVALUE_MAX_RATE, PRICE_MAXIMUM};
use crate::types::{ExecMsg, Exchange, OrdKind, Side, Tpm};
use tracing::{debug, error, warn};

impl Engine {
    /// Execution record entry point: a trade, or on SZ possibly a cancel.
    pub(crate) fn on_exec(&mut self, msg: &ExecMsg) {
        if msg.is_cancel() {
            let (seq, side) = if msg.bid_seq != 0 {
                (msg.bid_seq, Side::Bid)
            } else {
                (msg.offer_seq, Side::Ask)
            };
            let cancel = Cancel {
                seq: self.clip_seq(seq),
                qty: msg.last_qty,
                side,
                transact_time: msg.transact_time,
            };
            self.on_cancel(&cancel);
            return;
        }

        let last_px = match normalize::incr_price_divisor(self.exchange, self.kind) {
            Some(div) => (msg.last_px / div) as u32,
            None => {
                error!(
                    security_id = self.security_id,
                    seq = msg.seq,
                    kind = ?self.kind,
                    "no price precision rule for this instrument kind"
                );
                0
            }
        };
        let trade = Trade {
            bid_seq: self.clip_seq(msg.bid_seq),
            offer_seq: self.clip_seq(msg.offer_seq),
            last_px,
            last_qty: msg.last_qty,
            transact_time: msg.transact_time,
            phase: msg.phase,
        };
        self.on_trade(&trade);
    }

    /// Apply one trade to the tape and the book.
    pub(crate) fn on_trade(&mut self, trade: &Trade) {
        self.num_trades += 1;
        self.total_volume_trade += trade.last_qty;
        match normalize::trade_value_divisor(self.exchange, self.kind) {
            Some(div) => {
                self.total_value_trade += trade.last_qty * trade.last_px as u64 / div;
            }
            None => error!(
                security_id = self.security_id,
                kind = ?self.kind,
                "no trade value precision rule for this instrument kind"
            ),
        }

        self.last_px = trade.last_px;
        if self.open_px == 0 {
            self.open_px = trade.last_px;
            self.high_px = trade.last_px;
            self.low_px = trade.last_px;
        } else {
            if self.high_px < trade.last_px {
                self.high_px = trade.last_px;
            }
            if self.low_px > trade.last_px {
                self.low_px = trade.last_px;
            }
        }

        // A held market order with leftover quantity can be overtaken by a
        // trade between two other orders (a hidden level entered the cage).
        // Treat the market order as fully placed at that point.
        if self
            .holding
            .as_ref()
            .is_some_and(|h| {
                h.kind == OrdKind::Market && h.seq != trade.bid_seq && h.seq != trade.offer_seq
            })
        {
            warn!(
                security_id = self.security_id,
                "market order followed by an unrelated execution; placed as traded out"
            );
            debug_assert!(self.is_chinext());
            let held = self.holding.take().expect("holding checked above");
            let held_time = held.transact_time;
            self.insert_order(&held, false);
            self.use_timestamp(held_time);
            self.gen_snap();
            self.use_timestamp(trade.transact_time);
        }

        if self.holding.is_some() {
            // This execution consumes the held order against the book.
            let (held_seq, consumed) = {
                let held = self.holding.as_mut().expect("holding checked above");
                assert!(
                    held.qty >= trade.last_qty,
                    "{:06} execution exceeds the held order's quantity",
                    self.security_id
                );
                let consumed = held.qty == trade.last_qty;
                if !consumed {
                    held.qty -= trade.last_qty;
                    if held.kind == OrdKind::Market {
                        // The first fill fixes the market order's price.
                        held.price = trade.last_px;
                        held.traded = true;
                    }
                }
                (held.seq, consumed)
            };
            if consumed {
                self.holding = None;
            }
            let counter_side = if trade.bid_seq == held_seq {
                Side::Ask
            } else {
                Side::Bid
            };

            if counter_side == Side::Ask {
                self.trade_limit(Side::Ask, trade.last_qty, trade.offer_seq);
            } else {
                self.trade_limit(Side::Bid, trade.last_qty, trade.bid_seq);
            }

            // A held limit with no crossing counterparty left goes straight
            // into the book.
            if self
                .holding
                .as_ref()
                .is_some_and(|h| h.kind == OrdKind::Limit)
            {
                let h = self.holding.as_ref().expect("holding checked above");
                let exhausted = match h.side {
                    Side::Bid => h.price < self.ask_best_px || self.ask_best_qty == 0,
                    Side::Ask => h.price > self.bid_best_px || self.bid_best_qty == 0,
                    Side::Unknown => false,
                };
                if exhausted {
                    let held = self.holding.take().expect("holding checked above");
                    self.insert_order(&held, false);
                }
            }

            if self.is_chinext() {
                self.enter_cage();
            }
            if self.holding.is_none() {
                self.gen_snap();
            }
        } else if self.cage.bid_waiting || self.cage.ask_waiting {
            // An admitted hidden order traded against the book.
            debug!(security_id = self.security_id, "cage admission resolved by execution");
            self.trade_limit(Side::Ask, trade.last_qty, trade.offer_seq);
            self.trade_limit(Side::Bid, trade.last_qty, trade.bid_seq);
            if self.is_chinext() {
                self.enter_cage();
            }
            self.gen_snap();
        } else {
            // Call-auction clearing bursts land here, as do the rare feed
            // reorderings that sequence a deep trade before its cancel.
            if !self.is_auction_clear_time(trade.transact_time)
                && self.phase != Tpm::VolatilityBreaking
            {
                warn!(
                    security_id = self.security_id,
                    transact_time = trade.transact_time,
                    "unexpected execution outside an auction window"
                );
            }
            self.trade_limit(Side::Ask, trade.last_qty, trade.offer_seq);
            self.trade_limit(Side::Bid, trade.last_qty, trade.bid_seq);

            if self.ask_best_qty == 0
                || self.bid_best_qty == 0
                || self.ask_best_px > self.bid_best_px
            {
                debug!(security_id = self.security_id, "auction batch cleared");
                if self.phase == Tpm::VolatilityBreaking {
                    // The interim call is done; fall back to the phase the
                    // execution itself was stamped with.
                    self.phase = trade.phase;
                }
                self.gen_snap();
            }
        }
    }

    /// True at the two fixed call-auction clearing instants, in each venue's
    /// own stamp magnitude.
    fn is_auction_clear_time(&self, transact_time: u64) -> bool {
        match self.exchange {
            Exchange::Szse => {
                let hhmmssms = transact_time % 1_000_000_000;
                hhmmssms == 92_500_000 || hhmmssms == 150_000_000
            }
            Exchange::Sse => transact_time == 9_250_000 || transact_time == 15_000_000,
        }
    }

    /// Consume `qty` of a resting order: decrement its remaining quantity
    /// (removing it once empty) and dequeue the level it rests at.
    pub(crate) fn trade_limit(&mut self, side: Side, qty: u64, seq: u32) {
        let (price, depleted) = {
            let Some(mut entry) = self.orders.get_mut(&seq) else {
                error!(
                    security_id = self.security_id,
                    seq, "traded order not found"
                );
                return;
            };
            let order = entry.value_mut();
            if order.qty < qty {
                error!(
                    security_id = self.security_id,
                    seq,
                    resting = order.qty,
                    traded = qty,
                    "execution exceeds the resting quantity"
                );
                return;
            }
            order.qty -= qty;
            (order.price, order.qty == 0)
        };
        if depleted {
            self.orders.remove(&seq);
        }
        self.level_dequeue(side, price, qty, seq);
    }

    /// Cancel entry point, whichever stream carried it.
    pub(crate) fn on_cancel(&mut self, cancel: &Cancel) {
        if let Some(held) = self.holding.take() {
            // The exchange snapshot may already include the held order, so
            // always book it first and publish at its own timestamp.
            let held_time = held.transact_time;
            self.insert_order(&held, false);
            if cancel.transact_time != held_time {
                self.use_timestamp(held_time);
                self.gen_snap();
                self.use_timestamp(cancel.transact_time);
            }
        }

        if let Some((_, order)) = self.orders.remove(&cancel.seq) {
            self.level_dequeue(cancel.side, order.price, cancel.qty, cancel.seq);
            if self.is_chinext() {
                self.enter_cage();
            }
            self.gen_snap();
        } else if self.illegal_orders.remove(&cancel.seq).is_some() {
            // Envelope-rejected order withdrawn; it never touched the book.
        } else {
            error!(
                security_id = self.security_id,
                seq = cancel.seq,
                "cancel references an unknown order"
            );
        }
    }

    /// Remove quantity from a level after a cancel or trade, maintaining the
    /// cached best, the hidden extremum, the weighted aggregates and the
    /// opposite cage reference. Replacement scans run before the emptied
    /// level is dropped so it can never nominate itself.
    pub(crate) fn level_dequeue(&mut self, side: Side, price: u32, qty: u64, seq: u32) {
        match side {
            Side::Bid => {
                let Some(remaining) = self.bids.sub(price, qty) else {
                    error!(
                        security_id = self.security_id,
                        seq, price, "dequeue from a missing bid level"
                    );
                    return;
                };
                if price == self.bid_best_px {
                    self.bid_best_qty -= qty;
                }

                if self.cage.bid_outside_qty == 0 || price < self.cage.bid_outside_px {
                    self.bid_weight_size -= qty;
                    self.bid_weight_value -= price as u128 * qty as u128;
                } else if price == self.cage.bid_outside_px {
                    self.cage.bid_outside_qty -= qty;
                    if self.cage.bid_outside_qty == 0 {
                        // Hidden extremum drained: the next hidden bid up.
                        if let Some((p, q)) = self.bids.next_above(self.cage.bid_outside_px) {
                            self.cage.bid_outside_px = p;
                            self.cage.bid_outside_qty = q;
                            debug!(
                                security_id = self.security_id,
                                price = p,
                                "hidden bid extremum moved up after drain"
                            );
                        }
                    }
                }

                if remaining == 0 {
                    if price == self.bid_best_px {
                        self.bid_best_qty = 0;
                        if let Some((p, q)) = self.bids.next_below(self.bid_best_px) {
                            self.bid_best_px = p;
                            self.bid_best_qty = q;
                        }

                        // Re-anchor the ask-side cage reference.
                        if self.bid_best_qty != 0 {
                            self.cage.ask_ref_px = self.bid_best_px;
                        } else if self.asks.contains(price) {
                            self.cage.ask_ref_px = price;
                        } else if self.ask_best_qty != 0 {
                            self.cage.ask_ref_px = self.ask_best_px;
                        } else {
                            self.cage.ask_ref_px = self.last_px;
                        }

                        self.cage.ask_waiting =
                            self.phase.is_continuous() && self.is_chinext();
                    }
                    self.bids.remove(price);
                }
            }
            Side::Ask => {
                let Some(remaining) = self.asks.sub(price, qty) else {
                    error!(
                        security_id = self.security_id,
                        seq, price, "dequeue from a missing ask level"
                    );
                    return;
                };
                if price == self.ask_best_px {
                    self.ask_best_qty -= qty;
                }

                if self.cage.ask_outside_qty == 0 || price > self.cage.ask_outside_px {
                    if self.phase == Tpm::OpenCall
                        && price as u64 > self.prev_close_px as u64 * CYB_ORDER_ENVALUE_MAX_RATE
                    {
                        self.ask_weight_size_ex -= qty;
                        self.ask_weight_value_ex -= price as u128 * qty as u128;
                    } else {
                        self.ask_weight_size -= qty;
                        self.ask_weight_value -= price as u128 * qty as u128;
                    }
                } else if price == self.cage.ask_outside_px {
                    self.cage.ask_outside_qty -= qty;
                    if self.cage.ask_outside_qty == 0 {
                        if let Some((p, q)) = self.asks.next_below(self.cage.ask_outside_px) {
                            self.cage.ask_outside_px = p;
                            self.cage.ask_outside_qty = q;
                            debug!(
                                security_id = self.security_id,
                                price = p,
                                "hidden ask extremum moved down after drain"
                            );
                        }
                    }
                }

                if remaining == 0 {
                    if price == PRICE_MAXIMUM {
                        // The unbounded ask level drained; the weighted
                        // average is meaningful again.
                        self.ask_weight_px_uncertain = false;
                    }

                    if price == self.ask_best_px {
                        self.ask_best_qty = 0;
                        if let Some((p, q)) = self.asks.next_above(self.ask_best_px) {
                            self.ask_best_px = p;
                            self.ask_best_qty = q;
                        }

                        // Re-anchor the bid-side cage reference.
                        if self.ask_best_qty != 0 {
                            self.cage.bid_ref_px = self.ask_best_px;
                        } else if self.bids.contains(price) {
                            self.cage.bid_ref_px = price;
                        } else if self.bid_best_qty != 0 {
                            self.cage.bid_ref_px = self.bid_best_px;
                        } else {
                            self.cage.bid_ref_px = self.last_px;
                        }

                        self.cage.bid_waiting =
                            self.phase.is_continuous() && self.is_chinext();
                    }
                    self.asks.remove(price);
                }
            }
            Side::Unknown => {
                error!(
                    security_id = self.security_id,
                    seq, "dequeue with unknown side ignored"
                );
            }
        }
    }
}
