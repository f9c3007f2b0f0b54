//! Order ingress: normalization to internal precision, the holding-slot
//! flush, market and side-optimal conversion, and limit-order routing.

use super::{Cancel, Engine, Order};
use crate::normalize::{
    self, CYB_ORDER_ENVALUE_MAX_RATE, PRICE_BITS, PRICE_MAXIMUM, QTY_BITS, SEQ_BITS,
};
use crate::types::{OrdKind, OrderMsg, ORDER_PRICE_OVERFLOW, Side, Tpm};
use tracing::{debug, error, warn};

impl Engine {
    /// Incremental order record entry point.
    pub(crate) fn on_order(&mut self, msg: &OrderMsg) {
        // A new order means the previous held order is done matching: insert
        // it and publish a snapshot stamped with *its* time, not ours.
        if let Some(held) = self.holding.take() {
            if held.kind == OrdKind::Market && !held.traded {
                error!(
                    security_id = self.security_id,
                    seq = held.seq,
                    "market order saw no execution before the next order"
                );
            }
            let held_time = held.transact_time;
            self.insert_order(&held, false);
            self.use_timestamp(held_time);
            self.gen_snap();
            self.use_timestamp(msg.transact_time);
        }

        // SSE carries cancels on the order stream.
        if msg.is_delete() {
            let cancel = Cancel {
                seq: self.clip_seq(msg.seq),
                qty: msg.qty,
                side: msg.side(),
                transact_time: msg.transact_time,
            };
            self.on_cancel(&cancel);
            return;
        }

        let mut order = self.order_from_msg(msg);
        match order.kind {
            OrdKind::Market => {
                if self.bid_best_qty == 0 && self.ask_best_qty == 0 {
                    error!(
                        security_id = self.security_id,
                        seq = order.seq,
                        "market order before any resting price; dropped"
                    );
                    return;
                }
            }
            OrdKind::SideOptimal => {
                // Becomes a limit at the own-side best; with no own-side
                // price it clamps to the far limit and will be canceled.
                if order.side == Side::Bid {
                    if self.bid_best_px != 0 && self.bid_best_qty != 0 {
                        order.price = self.bid_best_px;
                    } else {
                        order.price = self.dn_limit_price;
                        warn!(
                            security_id = self.security_id,
                            seq = order.seq,
                            "side-optimal bid with no resting bid price"
                        );
                    }
                } else if self.ask_best_px != 0 && self.ask_best_qty != 0 {
                    order.price = self.ask_best_px;
                } else {
                    order.price = self.up_limit_price;
                    warn!(
                        security_id = self.security_id,
                        seq = order.seq,
                        "side-optimal ask with no resting ask price"
                    );
                }
            }
            OrdKind::Limit | OrdKind::Unknown => {}
        }
        self.on_limit_order(order);
    }

    /// Normalize a wire order record into the internal form, reporting
    /// overflow and precision residue on the way.
    fn order_from_msg(&self, msg: &OrderMsg) -> Order {
        let side = msg.side();
        let kind = msg.kind();
        if side == Side::Unknown {
            error!(
                security_id = self.security_id,
                seq = msg.seq,
                wire = msg.side,
                "unknown order side"
            );
        }
        if kind == OrdKind::Unknown {
            error!(
                security_id = self.security_id,
                seq = msg.seq,
                wire = msg.ord_type,
                "unknown order type"
            );
        }

        let price: u32 = if msg.price == ORDER_PRICE_OVERFLOW {
            // The feed handler already clipped it; only the ask weighted
            // average is affected downstream.
            warn!(
                security_id = self.security_id,
                seq = msg.seq,
                "order price beyond the wire maximum"
            );
            if side == Side::Bid && kind == OrdKind::Limit {
                error!(
                    security_id = self.security_id,
                    seq = msg.seq,
                    "limit bid carries an overflow price"
                );
            }
            PRICE_MAXIMUM
        } else {
            match normalize::incr_price_divisor(self.exchange, self.kind) {
                Some(div) => {
                    if kind == OrdKind::Limit && msg.price % div != 0 {
                        // The original quantum was corrupted upstream; the
                        // floor division below is deterministic either way.
                        error!(
                            security_id = self.security_id,
                            seq = msg.seq,
                            price = msg.price,
                            "order price off the venue precision grid"
                        );
                    }
                    let p = msg.price / div;
                    if p >= (1u64 << PRICE_BITS) {
                        error!(
                            security_id = self.security_id,
                            seq = msg.seq,
                            price = msg.price,
                            "order price overflows the internal width"
                        );
                        PRICE_MAXIMUM
                    } else {
                        p as u32
                    }
                }
                None => {
                    error!(
                        security_id = self.security_id,
                        seq = msg.seq,
                        kind = ?self.kind,
                        "no price precision rule for this instrument kind"
                    );
                    0
                }
            }
        };

        let qty = if msg.qty >= (1u64 << QTY_BITS) {
            error!(
                security_id = self.security_id,
                seq = msg.seq,
                qty = msg.qty,
                "order quantity overflows the internal width"
            );
            (1u64 << QTY_BITS) - 1
        } else {
            msg.qty
        };

        Order {
            seq: self.clip_seq(msg.seq),
            price,
            qty,
            side,
            kind,
            traded: false,
            transact_time: msg.transact_time,
        }
    }

    /// Clip a wire sequence number to the internal 32-bit width.
    pub(crate) fn clip_seq(&self, seq: u64) -> u32 {
        if seq >= (1u64 << SEQ_BITS) && seq != u64::MAX {
            error!(
                security_id = self.security_id,
                seq, "sequence number overflows the internal width"
            );
        }
        seq as u32
    }

    /// Route an order that now has a definite limit price.
    pub(crate) fn on_limit_order(&mut self, order: Order) {
        if self.phase.is_call() {
            // Call auctions take everything straight into the book, except
            // ChiNext instruments still without a daily limit: those enforce
            // the envelope and park offenders in the illegal registry.
            let mut discard = false;
            if self.is_chinext() && self.up_limit_px == ORDER_PRICE_OVERFLOW {
                if self.phase == Tpm::OpenCall {
                    if order.side == Side::Bid
                        && order.price as u64
                            > self.prev_close_px as u64 * CYB_ORDER_ENVALUE_MAX_RATE
                    {
                        discard = true;
                    }
                } else if order.price > normalize::cyb_match_upper(self.last_px)
                    || order.price < normalize::cyb_match_lower(self.last_px)
                {
                    discard = true;
                }
            }

            if discard {
                self.illegal_orders.insert(order.seq, order);
            } else {
                self.insert_order(&order, false);
                // No admission games during an auction; every legal order is
                // already in play.
                self.cage.bid_waiting = false;
                self.cage.ask_waiting = false;
            }
            self.gen_snap();
            return;
        }

        // Continuous trading. ChiNext limit orders priced beyond the cage go
        // in hidden.
        let out_of_cage = self.is_chinext()
            && order.kind == OrdKind::Limit
            && match order.side {
                Side::Bid => order.price > normalize::cyb_cage_upper(self.cage.bid_ref_px),
                Side::Ask => order.price < normalize::cyb_cage_lower(self.cage.ask_ref_px),
                Side::Unknown => false,
            };

        if out_of_cage {
            self.insert_order(&order, true);
            self.gen_snap();
        } else if self.phase == Tpm::VolatilityBreaking {
            // The interim call auction: no immediate matching, book and show.
            self.insert_order(&order, false);
            self.gen_snap();
        } else if order.kind == OrdKind::Market {
            debug!(security_id = self.security_id, seq = order.seq, "holding market order");
            self.holding = Some(order);
        } else {
            let crossing = match order.side {
                Side::Bid => self.ask_best_qty > 0 && order.price >= self.ask_best_px,
                Side::Ask => self.bid_best_qty > 0 && order.price <= self.bid_best_px,
                Side::Unknown => false,
            };
            if crossing {
                // The matching executions are on their way; hold the order
                // and freeze cage admission until they land.
                debug!(security_id = self.security_id, seq = order.seq, "holding crossing limit order");
                self.holding = Some(order);
                self.cage.bid_waiting = false;
                self.cage.ask_waiting = false;
            } else {
                self.insert_order(&order, false);
                if self.is_chinext() {
                    self.enter_cage();
                }
                self.gen_snap();
            }
        }
    }

    /// Book an order: ladder point update, cached-best and cage maintenance,
    /// weighted aggregates. `out_of_cage` orders join the hidden region and
    /// stay out of the aggregates.
    pub(crate) fn insert_order(&mut self, order: &Order, out_of_cage: bool) {
        self.orders.insert(order.seq, order.clone());

        match order.side {
            Side::Bid => {
                if !self.bids.add(order.price, order.qty) {
                    // Existing level: keep the caches in step.
                    if order.price == self.bid_best_px {
                        self.bid_best_qty += order.qty;
                    }
                    if self.cage.bid_outside_qty != 0 && order.price == self.cage.bid_outside_px {
                        self.cage.bid_outside_qty += order.qty;
                    }
                } else if !out_of_cage {
                    if self.bid_best_qty == 0 || order.price > self.bid_best_px {
                        self.bid_best_px = order.price;
                        self.bid_best_qty = order.qty;
                        // A better bid moves the ask-side cage anchor; with
                        // no ask resting it anchors the bid side too.
                        self.cage.ask_ref_px = order.price;
                        if self.ask_best_qty == 0 {
                            self.cage.bid_ref_px = order.price;
                        }
                        self.cage.ask_waiting = self.is_chinext();
                    }
                } else if order.price > self.cage.bid_ref_px
                    && (self.cage.bid_outside_qty == 0
                        || order.price < self.cage.bid_outside_px)
                {
                    // New closest hidden bid above the band.
                    self.cage.bid_outside_px = order.price;
                    self.cage.bid_outside_qty = order.qty;
                    debug!(
                        security_id = self.security_id,
                        price = order.price,
                        "bid outside the cage becomes the hidden extremum"
                    );
                }

                if !out_of_cage {
                    self.bid_weight_size += order.qty;
                    self.bid_weight_value += order.price as u128 * order.qty as u128;
                }
            }
            Side::Ask => {
                if !self.asks.add(order.price, order.qty) {
                    if order.price == self.ask_best_px {
                        self.ask_best_qty += order.qty;
                    }
                    if self.cage.ask_outside_qty != 0 && order.price == self.cage.ask_outside_px {
                        self.cage.ask_outside_qty += order.qty;
                    }
                } else {
                    if order.price == PRICE_MAXIMUM {
                        // An unbounded ask poisons the weighted average until
                        // the level drains.
                        self.ask_weight_px_uncertain = true;
                    }
                    if !out_of_cage {
                        if self.ask_best_qty == 0 || order.price < self.ask_best_px {
                            self.ask_best_px = order.price;
                            self.ask_best_qty = order.qty;
                            self.cage.bid_ref_px = order.price;
                            if self.bid_best_qty == 0 {
                                self.cage.ask_ref_px = order.price;
                            }
                            self.cage.bid_waiting = self.is_chinext();
                        }
                    } else if order.price < self.cage.ask_ref_px
                        && (self.cage.ask_outside_qty == 0
                            || order.price > self.cage.ask_outside_px)
                    {
                        self.cage.ask_outside_px = order.price;
                        self.cage.ask_outside_qty = order.qty;
                        debug!(
                            security_id = self.security_id,
                            price = order.price,
                            "ask outside the cage becomes the hidden extremum"
                        );
                    }
                }

                if !out_of_cage {
                    if self.phase == Tpm::OpenCall
                        && order.price as u64
                            > self.prev_close_px as u64 * CYB_ORDER_ENVALUE_MAX_RATE
                    {
                        // The exchange keeps these out of the published
                        // aggregates until continuous trading starts.
                        self.ask_weight_size_ex += order.qty;
                        self.ask_weight_value_ex += order.price as u128 * order.qty as u128;
                    } else {
                        self.ask_weight_size += order.qty;
                        self.ask_weight_value += order.price as u128 * order.qty as u128;
                    }
                }
            }
            Side::Unknown => {
                error!(
                    security_id = self.security_id,
                    seq = order.seq,
                    "order with unknown side kept out of the ladders"
                );
            }
        }
    }
}
