//! Per-side price ladder: one aggregated quantity per price, ordered both
//! ways, with strictly-beyond neighbor scans for best-price replacement.

use crossbeam::atomic::AtomicCell;
use crossbeam_skiplist::SkipMap;
use std::ops::Bound;
use std::sync::Arc;

/// A single price level. The quantity lives in an `AtomicCell` so point
/// updates never re-insert the node.
#[derive(Debug)]
pub struct Level {
    price: u32,
    qty: AtomicCell<u64>,
}

impl Level {
    fn new(price: u32, qty: u64) -> Self {
        Level {
            price,
            qty: AtomicCell::new(qty),
        }
    }

    pub fn price(&self) -> u32 {
        self.price
    }

    pub fn qty(&self) -> u64 {
        self.qty.load()
    }
}

/// Ordered price -> quantity ladder for one book side.
///
/// Bid and ask sides both use ascending price order internally; the caller
/// picks the traversal direction (`front`/`back`, `next_above`/`next_below`).
#[derive(Debug, Default)]
pub struct Ladder {
    levels: SkipMap<u32, Arc<Level>>,
}

impl Ladder {
    pub fn new() -> Self {
        Ladder {
            levels: SkipMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn contains(&self, price: u32) -> bool {
        self.levels.contains_key(&price)
    }

    /// Aggregated quantity at `price`, if the level exists.
    pub fn qty_at(&self, price: u32) -> Option<u64> {
        self.levels.get(&price).map(|e| e.value().qty())
    }

    /// Add `qty` at `price`, creating the level if absent. Returns `true`
    /// when a new level was created.
    pub fn add(&self, price: u32, qty: u64) -> bool {
        if let Some(entry) = self.levels.get(&price) {
            entry.value().qty.fetch_add(qty);
            false
        } else {
            self.levels.insert(price, Arc::new(Level::new(price, qty)));
            true
        }
    }

    /// Subtract `qty` at `price` and return the remaining quantity. The
    /// level is *not* removed at zero; callers scan for replacements first
    /// and then call [`Ladder::remove`].
    pub fn sub(&self, price: u32, qty: u64) -> Option<u64> {
        let entry = self.levels.get(&price)?;
        let level = entry.value();
        let before = level.qty.fetch_sub(qty);
        debug_assert!(before >= qty, "level {price} dequeued below zero");
        Some(before - qty)
    }

    /// Drop the level at `price`.
    pub fn remove(&self, price: u32) {
        self.levels.remove(&price);
    }

    /// Lowest level.
    pub fn min(&self) -> Option<(u32, u64)> {
        self.levels.front().map(|e| (*e.key(), e.value().qty()))
    }

    /// Highest level.
    pub fn max(&self) -> Option<(u32, u64)> {
        self.levels.back().map(|e| (*e.key(), e.value().qty()))
    }

    /// Lowest level strictly above `price`.
    pub fn next_above(&self, price: u32) -> Option<(u32, u64)> {
        self.levels
            .range((Bound::Excluded(price), Bound::Unbounded))
            .next()
            .map(|e| (*e.key(), e.value().qty()))
    }

    /// Highest level strictly below `price`.
    pub fn next_below(&self, price: u32) -> Option<(u32, u64)> {
        self.levels
            .range((Bound::Unbounded, Bound::Excluded(price)))
            .next_back()
            .map(|e| (*e.key(), e.value().qty()))
    }

    /// Ascending `(price, qty)` iteration.
    pub fn iter_asc(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.levels.iter().map(|e| (*e.key(), e.value().qty()))
    }

    /// Descending `(price, qty)` iteration.
    pub fn iter_desc(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.levels.iter().rev().map(|e| (*e.key(), e.value().qty()))
    }
}
