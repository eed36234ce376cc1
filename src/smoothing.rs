//! Smoothing and history
//!
//! A fixed round-robin of per-frame deviations feeds a bounded history of
//! smoothed values. The history is mirrored into a shared snapshot that a
//! display thread can read at its own pace.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::params::MAX_SLOTS;

/// Default number of smoothed values retained for display.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Which ring entries the smoothed average covers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SmoothingMode {
    /// Mean of ring slots `0..window_length` by array position, regardless of
    /// where the write cursor is. Matches the legacy behaviour.
    #[default]
    Positional,
    /// Mean of the `window_length` most recently written entries.
    Recent,
}

/// Round-robin accumulator of per-frame deviations.
#[derive(Debug, Clone)]
pub struct Smoother {
    slots: [f32; MAX_SLOTS],
    cursor: usize,
    written: usize,
    mode: SmoothingMode,
}

impl Smoother {
    /// A zeroed ring.
    pub fn new(mode: SmoothingMode) -> Self {
        Smoother {
            slots: [0.0; MAX_SLOTS],
            cursor: 0,
            written: 0,
            mode,
        }
    }

    /// Averaging mode in use.
    pub fn mode(&self) -> SmoothingMode {
        self.mode
    }

    /// Ring contents by array position.
    pub fn slots(&self) -> &[f32; MAX_SLOTS] {
        &self.slots
    }

    /// Write `value` at the cursor, advance it, and return the smoothed
    /// average over `window_length` entries (clamped to `1..=MAX_SLOTS`).
    pub fn push(&mut self, value: f32, window_length: usize) -> f32 {
        self.slots[self.cursor] = value;
        self.cursor = (self.cursor + 1) % MAX_SLOTS;
        self.written = (self.written + 1).min(MAX_SLOTS);
        self.average(window_length)
    }

    /// Smoothed average over `window_length` entries without writing.
    pub fn average(&self, window_length: usize) -> f32 {
        let len = window_length.clamp(1, MAX_SLOTS);
        match self.mode {
            SmoothingMode::Positional => self.slots[..len].iter().sum::<f32>() / len as f32,
            SmoothingMode::Recent => {
                // Before the ring has filled, unwritten slots are not averaged.
                let len = len.min(self.written.max(1));
                (1..=len)
                    .map(|back| self.slots[(self.cursor + MAX_SLOTS - back) % MAX_SLOTS])
                    .sum::<f32>()
                    / len as f32
            }
        }
    }

    /// Zero the ring and rewind the cursor.
    pub fn clear(&mut self) {
        self.slots = [0.0; MAX_SLOTS];
        self.cursor = 0;
        self.written = 0;
    }
}

/// Bounded FIFO of smoothed deviations, oldest first.
#[derive(Debug, Clone)]
pub struct History {
    values: VecDeque<f32>,
    capacity: usize,
}

impl History {
    /// Empty history holding at most `capacity` values (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        History {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of retained values.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of values currently held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append `value`, evicting the oldest entry first when full.
    pub fn push(&mut self, value: f32) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Most recent value.
    pub fn latest(&self) -> Option<f32> {
        self.values.back().copied()
    }

    /// Values oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().copied()
    }

    /// Drop all values.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[derive(Debug)]
struct Shared {
    latest_bits: AtomicU32,
    frames: AtomicU64,
    values: Mutex<VecDeque<f32>>,
}

/// Read side of the history for a display or control thread.
///
/// Cheap to clone. Reads never block the audio thread; the audio thread never
/// waits for a reader either, so a snapshot may lag by a frame.
#[derive(Debug, Clone)]
pub struct HistoryReader {
    shared: Arc<Shared>,
}

impl HistoryReader {
    /// Most recently committed smoothed deviation, in cents.
    pub fn latest(&self) -> f32 {
        f32::from_bits(self.shared.latest_bits.load(Ordering::Acquire))
    }

    /// Number of frames committed since the processor was built or last
    /// fully reset.
    pub fn frames(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    /// Copy of the history, oldest first.
    pub fn snapshot(&self) -> Vec<f32> {
        self.shared.values.lock().iter().copied().collect()
    }

    /// Copy the history into `out` (cleared first), oldest first.
    pub fn snapshot_into(&self, out: &mut Vec<f32>) {
        out.clear();
        out.extend(self.shared.values.lock().iter().copied());
    }
}

/// Write side, owned by the processor.
#[derive(Debug)]
pub(crate) struct HistoryPublisher {
    shared: Arc<Shared>,
}

impl HistoryPublisher {
    pub(crate) fn new(capacity: usize) -> Self {
        HistoryPublisher {
            shared: Arc::new(Shared {
                latest_bits: AtomicU32::new(0.0f32.to_bits()),
                frames: AtomicU64::new(0),
                values: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            }),
        }
    }

    pub(crate) fn reader(&self) -> HistoryReader {
        HistoryReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Mirror `history` for readers. The mirror copy is skipped if a reader
    /// holds the lock; it catches up on the next frame.
    pub(crate) fn publish(&self, history: &History) {
        if let Some(latest) = history.latest() {
            self.shared
                .latest_bits
                .store(latest.to_bits(), Ordering::Release);
        }
        if let Some(mut mirror) = self.shared.values.try_lock() {
            mirror.clear();
            mirror.extend(history.iter());
        }
        self.shared.frames.fetch_add(1, Ordering::Release);
    }

    /// Forget everything published so far. Never blocks: if a reader holds
    /// the mirror, it keeps the old values until the next publish rewrites it.
    pub(crate) fn clear(&self) {
        self.shared
            .latest_bits
            .store(0.0f32.to_bits(), Ordering::Release);
        self.shared.frames.store(0, Ordering::Release);
        if let Some(mut mirror) = self.shared.values.try_lock() {
            mirror.clear();
        }
    }
}
