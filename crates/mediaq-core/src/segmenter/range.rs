//! Chunk type and range planning.

/// A single chunk of a remote object: byte range [offset, offset + length) (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Start offset (inclusive).
    pub offset: u64,
    /// Number of bytes in this chunk.
    pub length: u64,
}

impl Chunk {
    /// End offset (exclusive).
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Splits `[0, total_size)` into chunks of `chunk_size` bytes, ordered by offset.
///
/// Every chunk but the last is exactly `chunk_size` long; the last one takes
/// the remainder. Returns an empty vec if `total_size` or `chunk_size` is 0.
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<Chunk> {
    if total_size == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let count = total_size.div_ceil(chunk_size);
    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;

    while offset < total_size {
        let length = chunk_size.min(total_size - offset);
        out.push(Chunk { offset, length });
        offset += length;
    }

    out
}
