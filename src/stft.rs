//! STFT framing
//!
//! Circular-buffer overlap-add analysis/resynthesis with a periodic Hann window
//! and 75% overlap. Every buffer the frame pass touches is allocated here, once,
//! so that pushing samples and processing frames never allocates.

use std::{f32::consts::PI, sync::Arc};

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Frames overlap by `1 - 1/OVERLAP` (75%).
pub const OVERLAP: usize = 4;

/// Smallest supported transform order (256-sample frames).
pub const MIN_ORDER: u32 = 8;

/// Largest supported transform order (16384-sample frames).
pub const MAX_ORDER: u32 = 14;

/// Default transform order (8192-sample frames).
pub const DEFAULT_ORDER: u32 = 13;

/// Periodic Hann window of length `len`.
///
/// The periodic form (denominator `len`, not `len - 1`) is the one that sums to
/// a constant under overlap-add.
pub fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / len as f32).cos())
        .collect()
}

/// Gain that undoes analysis+synthesis Hann windowing summed over `overlap`
/// frames. The squared Hann window sums to `3 * overlap / 8`.
pub fn window_correction(overlap: usize) -> f32 {
    8.0 / (3.0 * overlap as f32)
}

/// All frame-length-dependent state for one channel.
///
/// Rebuilt as a whole when the transform order changes.
pub(crate) struct FrameBuffers {
    order: u32,
    frame_len: usize,
    num_bins: usize,
    hop_size: usize,
    correction: f32,
    window: Vec<f32>,
    input_ring: Vec<f32>,
    output_ring: Vec<f32>,
    /// Position of the next write in `input_ring` and read in `output_ring`.
    pos: usize,
    /// Samples pushed since the last frame pass.
    count: usize,
    frame: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    magnitudes: Vec<f32>,
    /// Bin indices, reordered by the peak picker each frame.
    bin_scratch: Vec<usize>,
}

impl FrameBuffers {
    /// Allocate buffers for frames of `2^order` samples. The caller validates
    /// `order`.
    pub(crate) fn new(order: u32) -> Self {
        let frame_len = 1usize << order;
        let num_bins = frame_len / 2 + 1;

        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(frame_len);
        let inverse = planner.plan_fft_inverse(frame_len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        FrameBuffers {
            order,
            frame_len,
            num_bins,
            hop_size: frame_len / OVERLAP,
            correction: window_correction(OVERLAP),
            window: hann_window(frame_len),
            input_ring: vec![0.0; frame_len],
            output_ring: vec![0.0; frame_len],
            pos: 0,
            count: 0,
            frame: vec![Complex { re: 0.0, im: 0.0 }; frame_len],
            fft_scratch: vec![Complex { re: 0.0, im: 0.0 }; scratch_len],
            forward,
            inverse,
            magnitudes: vec![0.0; num_bins],
            bin_scratch: (0..num_bins).collect(),
        }
    }

    pub(crate) fn order(&self) -> u32 {
        self.order
    }

    pub(crate) fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub(crate) fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// True when the next pushed sample is the first of a new hop.
    pub(crate) fn at_hop_boundary(&self) -> bool {
        self.count == 0
    }

    /// Zero both rings and restart the hop.
    pub(crate) fn clear(&mut self) {
        self.input_ring.fill(0.0);
        self.output_ring.fill(0.0);
        self.pos = 0;
        self.count = 0;
    }

    /// Store `sample` and return the delayed output sample at the same ring
    /// position, plus whether a full hop has now been collected.
    #[inline]
    pub(crate) fn push(&mut self, sample: f32) -> (f32, bool) {
        self.input_ring[self.pos] = sample;

        // The output ring lags the input by exactly one frame.
        let out = self.output_ring[self.pos];
        self.output_ring[self.pos] = 0.0;

        self.pos += 1;
        if self.pos == self.frame_len {
            self.pos = 0;
        }

        self.count += 1;
        if self.count == self.hop_size {
            self.count = 0;
            return (out, true);
        }
        (out, false)
    }

    /// Run one analysis/resynthesis pass over the most recent frame.
    ///
    /// Unless `bypassed`, the frame is transformed and `analyse` is handed the
    /// bin magnitudes together with the bin-index scratch before the inverse
    /// transform runs. Both windows and the overlap gain are applied either way.
    pub(crate) fn process_frame<F>(&mut self, bypassed: bool, analyse: F)
    where
        F: FnOnce(&[f32], &mut [usize]),
    {
        let n = self.frame_len;
        let pos = self.pos;

        // De-wrap the input ring (oldest sample first) and apply the analysis window.
        let (head, tail) = self.input_ring.split_at(pos);
        for (i, &s) in tail.iter().chain(head.iter()).enumerate() {
            self.frame[i] = Complex {
                re: s * self.window[i],
                im: 0.0,
            };
        }

        if !bypassed {
            self.forward
                .process_with_scratch(&mut self.frame, &mut self.fft_scratch);

            for (mag, c) in self.magnitudes.iter_mut().zip(&self.frame) {
                *mag = c.norm();
            }
            analyse(&self.magnitudes, &mut self.bin_scratch);

            self.inverse
                .process_with_scratch(&mut self.frame, &mut self.fft_scratch);
            let scale = 1.0 / n as f32;
            for c in self.frame.iter_mut() {
                c.re *= scale;
                c.im = 0.0;
            }
        }

        // Synthesis window and overlap gain, then accumulate at the same two
        // wrapped segments.
        for (c, &w) in self.frame.iter_mut().zip(&self.window) {
            c.re *= w * self.correction;
        }
        let (older, newer) = self.frame.split_at(n - pos);
        for (out, c) in self.output_ring[pos..].iter_mut().zip(older) {
            *out += c.re;
        }
        for (out, c) in self.output_ring[..pos].iter_mut().zip(newer) {
            *out += c.re;
        }
    }
}
