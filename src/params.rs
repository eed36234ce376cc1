//! Shared parameters
//!
//! Single-word atomic handles written by a control thread (UI, host automation)
//! and read by the audio thread once per frame pass.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Capacity of the smoothing ring; also the upper bound for the peak count.
pub const MAX_SLOTS: usize = 20;

/// Default tuning reference (A4).
pub const DEFAULT_REFERENCE_HZ: f32 = 440.0;

/// Default number of spectral peaks analysed per frame.
pub const DEFAULT_PEAK_COUNT: usize = 20;

/// Default smoothing window length, in frames.
pub const DEFAULT_WINDOW_LENGTH: usize = 1;

/// Runtime-adjustable configuration shared between the control side and the
/// processing context.
///
/// Every field is an independent atomic word. Reads and writes use relaxed
/// ordering: a frame pass may see a mix of old and new values, but never a
/// torn value.
#[derive(Debug)]
pub struct TuningParams {
    reference_bits: AtomicU32,
    peak_count: AtomicUsize,
    window_length: AtomicUsize,
    bypassed: AtomicBool,
}

impl TuningParams {
    /// Parameters with default reference, peak count and window length.
    pub fn new() -> Self {
        TuningParams {
            reference_bits: AtomicU32::new(DEFAULT_REFERENCE_HZ.to_bits()),
            peak_count: AtomicUsize::new(DEFAULT_PEAK_COUNT),
            window_length: AtomicUsize::new(DEFAULT_WINDOW_LENGTH),
            bypassed: AtomicBool::new(false),
        }
    }

    /// Reference frequency in Hz that 0 cents is measured against.
    pub fn reference_hz(&self) -> f32 {
        f32::from_bits(self.reference_bits.load(Ordering::Relaxed))
    }

    /// Set the reference frequency. Non-finite or non-positive values are
    /// ignored and `false` is returned.
    pub fn set_reference_hz(&self, hz: f32) -> bool {
        if !hz.is_finite() || hz <= 0.0 {
            return false;
        }
        self.reference_bits.store(hz.to_bits(), Ordering::Relaxed);
        true
    }

    /// Number of peaks used by the pitch-class average, in `1..=MAX_SLOTS`.
    pub fn peak_count(&self) -> usize {
        self.peak_count.load(Ordering::Relaxed)
    }

    /// Set the peak count, clamped to `1..=MAX_SLOTS`.
    pub fn set_peak_count(&self, n: usize) {
        self.peak_count.store(n.clamp(1, MAX_SLOTS), Ordering::Relaxed);
    }

    /// Smoothing window length in frames, in `1..=MAX_SLOTS`.
    pub fn window_length(&self) -> usize {
        self.window_length.load(Ordering::Relaxed)
    }

    /// Set the smoothing window length, clamped to `1..=MAX_SLOTS`.
    pub fn set_window_length(&self, n: usize) {
        self.window_length.store(n.clamp(1, MAX_SLOTS), Ordering::Relaxed);
    }

    /// Whether spectral analysis is skipped (windowed pass-through).
    pub fn bypassed(&self) -> bool {
        self.bypassed.load(Ordering::Relaxed)
    }

    /// Enable or disable bypass.
    pub fn set_bypassed(&self, on: bool) {
        self.bypassed.store(on, Ordering::Relaxed);
    }

    /// Copy of the current values, taken once per frame pass.
    pub(crate) fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            reference_hz: self.reference_hz(),
            peak_count: self.peak_count(),
            window_length: self.window_length(),
            bypassed: self.bypassed(),
        }
    }
}

impl Default for TuningParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameter values as seen by a single frame pass.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct ParamSnapshot {
    pub reference_hz: f32,
    pub peak_count: usize,
    pub window_length: usize,
    pub bypassed: bool,
}
