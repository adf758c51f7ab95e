//! Append-only growable byte buffer for mirrored response bodies.
//!
//! Growth allocates a fresh region and copies, rather than extending in
//! place: capacity after any append is the smallest `1024 * 2^k` covering
//! the total length, reached in a single step. The old region is dropped
//! whole, never reused. Transient peak memory during growth is therefore
//! about twice the final size.

use crate::pipeline::PipelineError;

/// Capacity of the first allocated region.
pub const INITIAL_CAPACITY: usize = 1024;

/// Contiguous append-only byte accumulator with doubling capacity.
#[derive(Debug, Default)]
pub struct GrowableBuffer {
    /// Backing region. Its reserved capacity is always at least `cap` once
    /// anything has been appended.
    storage: Vec<u8>,
    /// Logical capacity. Tracked separately from the allocator's view so the
    /// doubling policy is exact.
    cap: usize,
}

impl GrowableBuffer {
    /// Create an empty buffer. The first region is allocated lazily on the
    /// first non-empty append.
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
            cap: INITIAL_CAPACITY,
        }
    }

    /// Append a copy of `bytes` at the end, growing first if needed.
    ///
    /// Zero-length input is a no-op. On allocation failure the buffer is
    /// left untouched and the caller must fail the request.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), PipelineError> {
        if bytes.is_empty() {
            return Ok(());
        }

        let required = self
            .storage
            .len()
            .checked_add(bytes.len())
            .ok_or(PipelineError::BufferAlloc)?;

        if required > self.cap || self.storage.capacity() < self.cap {
            let mut cap = self.cap;
            while cap < required {
                cap = cap.checked_mul(2).ok_or(PipelineError::BufferAlloc)?;
            }

            // Fresh region, copy, abandon the old one.
            let mut fresh: Vec<u8> = Vec::new();
            fresh.try_reserve_exact(cap)?;
            fresh.extend_from_slice(&self.storage);
            self.storage = fresh;
            self.cap = cap;
        }

        self.storage.extend_from_slice(bytes);
        Ok(())
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Logical capacity. Only ever grows.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// View of the accumulated bytes, `[0, len)`.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }
}
