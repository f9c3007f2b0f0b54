//! Reconciliation of rebuilt snapshots against exchange snapshots, plus the
//! exchange-snapshot ingestion path (day constants, close price, volatility
//! breaking entry).

use super::{CHANNELNO_INIT, Engine};
use crate::normalize;
use crate::types::{Exchange, MarketSnapshot, Tpi, Tpm};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Pending snapshots on both sides of the comparison, bucketed by trade
/// count. A rebuilt snapshot may legitimately precede its exchange twin (we
/// rebuild from the faster incremental stream), so unmatched entries wait in
/// their buckets until the other side catches up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapMatcher {
    /// Rebuilt snapshots not yet claimed by an exchange snapshot.
    rebuilt: BTreeMap<u64, Vec<MarketSnapshot>>,
    /// Exchange snapshots still missing a rebuilt twin. Never holds an empty
    /// bucket.
    market: BTreeMap<u64, Vec<MarketSnapshot>>,
    /// The most recently rebuilt snapshot; quiet stretches of the feed leave
    /// it matching several exchange snapshots in a row.
    last: Option<MarketSnapshot>,
}

impl SnapMatcher {
    pub fn new() -> Self {
        SnapMatcher::default()
    }

    /// Number of trade-count buckets still holding unmatched exchange
    /// snapshots.
    pub fn unmatched_market_count(&self) -> usize {
        self.market.len()
    }

    /// Up to `limit` unmatched buckets as `(num_trades, timestamps)`.
    pub fn unmatched_summary(&self, limit: usize) -> Vec<(u64, Vec<u64>)> {
        self.market
            .iter()
            .take(limit)
            .map(|(n, snaps)| (*n, snaps.iter().map(|s| s.transact_time).collect()))
            .collect()
    }

    /// The most recent rebuilt snapshot.
    pub fn last_snapshot(&self) -> Option<&MarketSnapshot> {
        self.last.as_ref()
    }

    /// Total rebuilt snapshots still waiting for an exchange twin.
    pub fn rebuilt_count(&self) -> usize {
        self.rebuilt.values().map(Vec::len).sum()
    }

    pub(crate) fn no_empty_market_buckets(&self) -> bool {
        self.market.values().all(|v| !v.is_empty())
    }

    /// Drop every bucket keyed below `num_trades` on the rebuilt side; those
    /// snapshots predate the exchange state just confirmed.
    fn prune_rebuilt_below(&mut self, num_trades: u64) {
        self.rebuilt = self.rebuilt.split_off(&num_trades);
    }
}

/// Timestamp sanity between an exchange snapshot and a rebuilt one. During
/// the breaks and after the close the books are frozen and stamps drift
/// apart legitimately; otherwise the rebuilt stamp may lead by at most one
/// second.
fn timestamps_consistent(
    exchange: Exchange,
    market: &MarketSnapshot,
    rebuilt: &MarketSnapshot,
) -> bool {
    if let (Some(mp), Some(rp)) = (market.phase(), rebuilt.phase()) {
        if mp == rp
            && (mp == Tpm::PreTradingBreaking || mp == Tpm::Breaking || mp >= Tpm::Ending)
        {
            return true;
        }
    }
    match exchange {
        Exchange::Szse => {
            rebuilt.transact_time / 1000 <= market.transact_time / 1000 + 1
        }
        Exchange::Sse => {
            // Exchange stock/fund stamps are `HHMMSS`, rebuilt ones keep one
            // extra 100 ms digit, and the bond family is full milliseconds;
            // compare everything at second granularity.
            let secs = |t: u64| {
                if t <= 160_000 {
                    t
                } else if t < 10_000_000 {
                    t / 10
                } else {
                    t / 1000
                }
            };
            secs(rebuilt.transact_time) <= secs(market.transact_time) + 1
        }
    }
}

impl Engine {
    /// Publish a freshly rebuilt snapshot: claim any waiting exchange twins,
    /// then park it for exchange snapshots still to come.
    pub(crate) fn publish(&mut self, snap: MarketSnapshot) {
        let exchange = self.exchange;
        let num_trades = snap.num_trades;

        if let Some(bucket) = self.matcher.market.get_mut(&num_trades) {
            bucket.retain(|rcv| {
                let matched = snap.matches(rcv) && timestamps_consistent(exchange, rcv, &snap);
                if matched {
                    // The exchange got there first; late rebuilds are worth
                    // flagging but are not a mismatch.
                    warn!(
                        security_id = snap.security_id,
                        rebuilt_time = snap.transact_time,
                        market_time = rcv.transact_time,
                        "rebuilt snapshot matches an earlier exchange snapshot"
                    );
                }
                !matched
            });
            if bucket.is_empty() {
                self.matcher.market.remove(&num_trades);
            }
        }

        self.matcher.last = Some(snap.clone());
        self.matcher
            .rebuilt
            .entry(num_trades)
            .or_default()
            .push(snap);
    }

    /// Exchange snapshot ingestion.
    pub(crate) fn on_snapshot(&mut self, mut snap: MarketSnapshot) {
        if snap.security_phase() != Tpi::Normal {
            match self.exchange {
                Exchange::Szse => {
                    // An SZ instrument in today's subscription is tradable
                    // all day; anything else is a feed defect.
                    error!(
                        security_id = self.security_id,
                        transact_time = snap.transact_time,
                        "snapshot reports the security as not trading"
                    );
                    return;
                }
                Exchange::Sse => {
                    // SSE stays NoTrade until shortly before the open call.
                    info!(
                        security_id = self.security_id,
                        transact_time = snap.transact_time,
                        "snapshot reports the security as not trading"
                    );
                }
            }
        }

        let Some(snap_phase) = snap.phase() else {
            error!(
                security_id = self.security_id,
                code = snap.phase_code,
                "snapshot with undecodable phase dropped"
            );
            return;
        };

        // The earliest snapshots of the day carry the session constants; the
        // very first batch lacks the limit prices, so keep re-reading until
        // the feed moves past `Starting`.
        if snap_phase == Tpm::Starting {
            self.adopt_constants(&snap);
        }

        if self.phase == Tpm::Ending && snap_phase == Tpm::Ending && !self.close_px_ready {
            // The close call produced no price; the exchange's closing
            // snapshot is authoritative.
            match normalize::snap_price_divisor(self.exchange, self.kind) {
                Some(div) => self.last_px = (snap.last_px / div) as u32,
                None => error!(
                    security_id = self.security_id,
                    kind = ?self.kind,
                    "no snapshot price rule for this instrument kind"
                ),
            }
            self.close_px_ready = true;
            self.gen_snap();
        }

        if snap_phase == Tpm::VolatilityBreaking && self.phase != Tpm::VolatilityBreaking {
            // Only snapshots announce the halt; the incremental stream goes
            // quiet until the interim call clears.
            warn!(
                security_id = self.security_id,
                transact_time = snap.transact_time,
                "entering volatility breaking"
            );
            self.phase = Tpm::VolatilityBreaking;
            self.gen_snap();
        }

        // Reconciliation starts where rebuilding starts: the open call on SZ,
        // the post-auction break on SSE.
        let before_rebuild_window = match self.exchange {
            Exchange::Szse => snap_phase < Tpm::OpenCall,
            Exchange::Sse => snap_phase < Tpm::PreTradingBreaking,
        };
        if before_rebuild_window {
            return;
        }

        snap.seq = self.msg_nb;
        let exchange = self.exchange;
        let num_trades = snap.num_trades;

        let matches_last = self
            .matcher
            .last
            .as_ref()
            .is_some_and(|last| snap.matches(last) && timestamps_consistent(exchange, &snap, last));

        if matches_last {
            debug!(
                security_id = self.security_id,
                num_trades, "exchange snapshot matches the latest rebuilt snapshot"
            );
            // Keep `last` itself: with no incremental traffic the next
            // exchange snapshot will be identical again.
            self.matcher.prune_rebuilt_below(num_trades);
            return;
        }

        let matched_history = self
            .matcher
            .rebuilt
            .get(&num_trades)
            .is_some_and(|bucket| {
                bucket
                    .iter()
                    .any(|cand| snap.matches(cand) && timestamps_consistent(exchange, &snap, cand))
            });

        if matched_history {
            debug!(
                security_id = self.security_id,
                num_trades, "exchange snapshot matches a rebuilt snapshot"
            );
            self.matcher.prune_rebuilt_below(num_trades);
        } else {
            self.matcher
                .market
                .entry(num_trades)
                .or_default()
                .push(snap);
        }
    }

    /// Read the session constants out of a `Starting` snapshot.
    fn adopt_constants(&mut self, snap: &MarketSnapshot) {
        self.constants_ready = true;
        if self.channel_no == CHANNELNO_INIT {
            debug!(
                security_id = self.security_id,
                channel_no = snap.channel_no,
                prev_close_px = snap.prev_close_px,
                up_limit_px = snap.up_limit_px,
                dn_limit_px = snap.dn_limit_px,
                "adopting session constants"
            );
        }

        self.channel_no = snap.channel_no;
        match normalize::preclose_divisor(self.exchange, self.kind) {
            Some(div) => self.prev_close_px = (snap.prev_close_px / div) as u32,
            None => {
                error!(
                    security_id = self.security_id,
                    kind = ?self.kind,
                    "no previous-close precision rule for this instrument kind"
                );
                self.prev_close_px = 0;
            }
        }

        match self.exchange {
            Exchange::Szse => {
                // Until anything trades, both cage bands anchor on the
                // previous close.
                self.cage.ask_ref_px = self.prev_close_px;
                self.cage.bid_ref_px = self.prev_close_px;

                self.up_limit_px = snap.up_limit_px;
                self.dn_limit_px = snap.dn_limit_px;
                if let Some(div) = normalize::snap_price_divisor(self.exchange, self.kind) {
                    self.up_limit_price = (snap.up_limit_px / div) as u32;
                    self.dn_limit_price = (snap.dn_limit_px / div) as u32;
                }

                self.trade_date = snap.transact_time / 1_000_000_000;
            }
            Exchange::Sse => {
                self.trade_date = 0;
            }
        }
    }
}
