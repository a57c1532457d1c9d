//! Fixed-size pool of reusable analysis windows.
//!
//! All window storage is allocated once at pool construction; the streaming
//! path only moves ownership. A window travels
//! filling (front-end) → queued → processing (one worker) → free (back here),
//! and the pool tracks that state per slot so ownership violations surface in
//! tests instead of as data races.
//!
//! Dropping a [`Window`] returns its storage to the pool automatically, which
//! also covers the shutdown path: windows left in the queue when the pipeline
//! stops drain back simply by being dropped.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use tracing::{error, info};

/// Ownership state of one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    /// In the pool's free list
    Free = 0,
    /// Held by the acquisition front-end
    Filling = 1,
    /// Sitting in the bounded queue
    Queued = 2,
    /// Held by exactly one transform worker
    Processing = 3,
}

impl SlotState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Filling,
            2 => Self::Queued,
            3 => Self::Processing,
            _ => Self::Free,
        }
    }
}

struct WindowPoolInner {
    /// Free list of (slot index, storage) pairs; capacity equals pool size
    free: ArrayQueue<(usize, Box<[f64]>)>,
    /// Per-slot ownership tags
    slot_states: Box<[AtomicU8]>,
    /// Length of every window in samples
    window_len: usize,
    /// Number of windows currently in the free list
    available: AtomicUsize,
    /// Metrics: total acquires
    total_acquires: AtomicU64,
    /// Metrics: total returns
    total_returns: AtomicU64,
}

impl WindowPoolInner {
    fn set_state(&self, slot: usize, expected: SlotState, next: SlotState) {
        let prev = self.slot_states[slot].swap(next as u8, Ordering::SeqCst);
        debug_assert_eq!(
            SlotState::from_u8(prev),
            expected,
            "slot {} changed owner out of order",
            slot
        );
    }
}

/// Pool of K preallocated analysis windows.
///
/// Clone is cheap (shared inner); every clone hands out windows from the same
/// free list.
#[derive(Clone)]
pub struct WindowPool {
    inner: Arc<WindowPoolInner>,
}

impl WindowPool {
    /// Create a pool of `pool_size` windows of `window_len` samples each.
    ///
    /// All storage is allocated here; the steady-state path never allocates.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` or `window_len` is 0 (rejected earlier by config
    /// validation).
    #[must_use]
    pub fn new(pool_size: usize, window_len: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        assert!(window_len > 0, "window_len must be > 0");

        let free = ArrayQueue::new(pool_size);
        for slot in 0..pool_size {
            let storage = vec![0.0f64; window_len].into_boxed_slice();
            // Fresh queue with matching capacity; push cannot fail here.
            let _ = free.push((slot, storage));
        }

        let slot_states = (0..pool_size)
            .map(|_| AtomicU8::new(SlotState::Free as u8))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        info!(
            pool_size,
            window_len,
            total_kb = (pool_size * window_len * std::mem::size_of::<f64>()) as f64 / 1024.0,
            "window pool created"
        );

        Self {
            inner: Arc::new(WindowPoolInner {
                free,
                slot_states,
                window_len,
                available: AtomicUsize::new(pool_size),
                total_acquires: AtomicU64::new(0),
                total_returns: AtomicU64::new(0),
            }),
        }
    }

    /// Take a free window for filling without blocking.
    ///
    /// Returns `None` when every window is in flight (backpressure indicator;
    /// the producer drops instead of waiting).
    #[must_use]
    pub fn try_acquire(&self) -> Option<Window> {
        let (slot, samples) = self.inner.free.pop()?;

        self.inner.available.fetch_sub(1, Ordering::Relaxed);
        self.inner.total_acquires.fetch_add(1, Ordering::Relaxed);
        self.inner.set_state(slot, SlotState::Free, SlotState::Filling);

        Some(Window {
            samples: Some(samples),
            slot,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Number of windows currently in the free list.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.available.load(Ordering::Relaxed)
    }

    /// Total number of windows the pool owns.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.slot_states.len()
    }

    /// Length of every window in samples.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.inner.window_len
    }

    /// Total acquires since pool creation.
    #[must_use]
    pub fn total_acquires(&self) -> u64 {
        self.inner.total_acquires.load(Ordering::Relaxed)
    }

    /// Total returns since pool creation.
    #[must_use]
    pub fn total_returns(&self) -> u64 {
        self.inner.total_returns.load(Ordering::Relaxed)
    }

    /// Current ownership tag of a slot.
    #[must_use]
    pub fn slot_state(&self, slot: usize) -> SlotState {
        SlotState::from_u8(self.inner.slot_states[slot].load(Ordering::SeqCst))
    }
}

/// One analysis window with exclusive ownership semantics.
///
/// The window returns to its pool on drop.
pub struct Window {
    /// Sample storage (Option so drop can move it back to the free list)
    samples: Option<Box<[f64]>>,
    slot: usize,
    pool: Arc<WindowPoolInner>,
}

impl Window {
    /// Pool slot this window occupies, for state inspection.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Window length in samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pool.window_len
    }

    /// Whether the window holds zero samples (never, for a pooled window).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Immutable view of the samples.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        match &self.samples {
            Some(samples) => samples,
            None => &[],
        }
    }

    /// Mutable view of the samples.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        match &mut self.samples {
            Some(samples) => samples,
            None => &mut [],
        }
    }

    /// Tag this window as handed to the queue (front-end side).
    pub fn mark_queued(&self) {
        self.pool
            .set_state(self.slot, SlotState::Filling, SlotState::Queued);
    }

    /// Tag this window as taken by a worker (consumer side).
    pub fn mark_processing(&self) {
        self.pool
            .set_state(self.slot, SlotState::Queued, SlotState::Processing);
    }

    /// Current ownership tag of this window's slot.
    #[must_use]
    pub fn slot_state(&self) -> SlotState {
        SlotState::from_u8(self.pool.slot_states[self.slot].load(Ordering::SeqCst))
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("slot", &self.slot)
            .field("len", &self.len())
            .field("state", &self.slot_state())
            .finish()
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if let Some(samples) = self.samples.take() {
            self.pool.slot_states[self.slot].store(SlotState::Free as u8, Ordering::SeqCst);
            self.pool.available.fetch_add(1, Ordering::Relaxed);
            self.pool.total_returns.fetch_add(1, Ordering::Relaxed);
            if self.pool.free.push((self.slot, samples)).is_err() {
                // Capacity equals pool size; a full free list here means the
                // slot accounting is corrupt.
                error!(slot = self.slot, "window pool free list overflow");
            }
        }
    }
}
