//! Conversion chain construction — builds chains from the validated event
//! table, merges closely spaced purchases, and concatenates nearby chains.

pub mod builder;
pub mod concatenator;
pub mod events;
pub mod invariants;
pub mod merger;
mod partition;

pub use builder::ChainBuilder;
pub use concatenator::ChainConcatenator;
pub use events::{EventTable, InputProfile};
pub use merger::ChainMerger;
