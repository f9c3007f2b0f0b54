//! Aggregated price-level storage.

mod ladder;

pub use ladder::{Ladder, Level};
