//! Time-domain ring buffer of raw ADC samples.
//!
//! One writer (the acquisition front-end) appends kept samples; any number of
//! readers snapshot the most recent history. The writer uses a non-blocking
//! lock attempt so the producer path can never stall behind a reader or a
//! resize: contended writes are skipped and counted, the stream moves on.
//!
//! `resize` swaps in fresh zeroed storage and discards the old contents; the
//! allocation is fallible and on failure the previous buffer stays in place.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

struct RingInner {
    data: Box<[u16]>,
    /// Next write position
    cursor: usize,
    /// Samples written so far, capped at the ring length
    collected: usize,
}

/// Circular store of the most recent raw samples.
pub struct TimeRing {
    inner: Mutex<RingInner>,
    /// Writes skipped because the buffer was locked (reader or resize)
    skipped_writes: AtomicU64,
}

impl TimeRing {
    /// Create a ring holding `len` samples, zero-filled.
    ///
    /// # Panics
    ///
    /// Panics if `len` is 0 (rejected earlier by config validation).
    #[must_use]
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "ring length must be > 0");
        Self {
            inner: Mutex::new(RingInner {
                data: vec![0u16; len].into_boxed_slice(),
                cursor: 0,
                collected: 0,
            }),
            skipped_writes: AtomicU64::new(0),
        }
    }

    /// Append samples at the cursor, wrapping modulo the ring length.
    ///
    /// Returns `false` without touching the buffer when the lock is held by a
    /// reader or an in-flight resize; the skipped write is counted. Chunks
    /// longer than the ring collapse to their trailing `len` samples, exactly
    /// as if each sample had been written in turn.
    pub fn write(&self, samples: &[u16]) -> bool {
        if samples.is_empty() {
            return true;
        }
        let Some(mut inner) = self.inner.try_lock() else {
            self.skipped_writes.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let len = inner.data.len();
        let n = samples.len();
        let (src, start) = if n >= len {
            (&samples[n - len..], (inner.cursor + (n - len)) % len)
        } else {
            (samples, inner.cursor)
        };
        copy_wrapping(&mut inner.data, start, src);
        inner.cursor = (inner.cursor + n) % len;
        inner.collected = (inner.collected + n).min(len);
        true
    }

    /// Copy the most recent samples into `dst` in chronological order.
    ///
    /// Fills at most `min(dst.len(), collected)` entries ending at the write
    /// cursor and returns how many were copied.
    pub fn read_into(&self, dst: &mut [u16]) -> usize {
        let inner = self.inner.lock();
        let len = inner.data.len();
        let count = dst.len().min(inner.collected);
        if count == 0 {
            return 0;
        }

        let start = (inner.cursor + len - count) % len;
        let first = (len - start).min(count);
        dst[..first].copy_from_slice(&inner.data[start..start + first]);
        if count > first {
            dst[first..count].copy_from_slice(&inner.data[..count - first]);
        }
        count
    }

    /// Number of samples collected, capped at the ring length.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.inner.lock().collected
    }

    /// Current ring capacity in samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    /// Whether no samples have been collected yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    /// Writes skipped because the buffer was busy.
    #[must_use]
    pub fn skipped_writes(&self) -> u64 {
        self.skipped_writes.load(Ordering::Relaxed)
    }

    /// Replace the storage with a fresh zeroed buffer of `new_len` samples.
    ///
    /// Holds the write lock for the whole swap, so concurrent writes are
    /// skipped rather than interleaved with it. On allocation failure the
    /// existing buffer and contents are retained.
    pub fn resize(&self, new_len: usize) -> Result<()> {
        if new_len == 0 {
            return Err(PipelineError::invalid_config("ring length must be > 0"));
        }

        let mut inner = self.inner.lock();

        let mut storage: Vec<u16> = Vec::new();
        if storage.try_reserve_exact(new_len).is_err() {
            return Err(PipelineError::Allocation { requested: new_len });
        }
        storage.resize(new_len, 0);

        let old_len = inner.data.len();
        inner.data = storage.into_boxed_slice();
        inner.cursor = 0;
        inner.collected = 0;
        drop(inner);

        if old_len != new_len {
            info!(old_len, new_len, "time ring resized");
        } else {
            debug!(len = new_len, "time ring cleared");
        }
        Ok(())
    }
}

/// Copy `src` into `data` starting at `start`, wrapping once at the end.
/// Caller guarantees `src.len() <= data.len()`.
fn copy_wrapping(data: &mut [u16], start: usize, src: &[u16]) {
    let first = (data.len() - start).min(src.len());
    data[start..start + first].copy_from_slice(&src[..first]);
    let rest = src.len() - first;
    if rest > 0 {
        data[..rest].copy_from_slice(&src[first..]);
    }
}
