//! Chunk planning: splits a remote object into fixed-length, contiguous
//! half-open ranges.

mod range;

pub use range::{plan_chunks, Chunk};
