//! Out-of-core spatial indexing.
//!
//! A [`SpatialIndex`] is an R-tree over keyed envelopes persisted to two
//! companion files, plus the mapper translating tree entries back into full
//! domain elements. The [`IndexRegistry`] shares one physical index between
//! any number of logical owners and closes it only when the last owner
//! releases its claim.

mod manager;
mod rtree;

pub use manager::{IndexRegistry, OwnerId};
pub use rtree::{ElementId, IndexElement, SpatialIndex};
