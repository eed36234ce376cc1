//! Spectral tuning estimate
//!
//! Picks the strongest local peaks of a magnitude spectrum, refines each to a sub-bin
//! frequency, and folds them onto a one-semitone circle to get a single
//! deviation from equal temperament in cents.

use std::f32::consts::PI;

const TWO_PI: f32 = 2.0 * PI;

/// Cents per equal-tempered semitone; one full turn of the pitch-class circle.
pub const CENTS_PER_SEMITONE: f32 = 100.0;

/// Curvature below which parabolic refinement falls back to the bin centre.
const MIN_CURVATURE: f32 = 1e-4;

/// Total magnitude below which the circular mean reports 0 cents.
const MIN_WEIGHT: f32 = 1e-4;

/// Lowest frequency a refined peak may report.
const MIN_FREQ_HZ: f32 = 1.0;

/// How candidate bins are chosen before the strongest are kept.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PeakPicking {
    /// Every bin competes on magnitude alone, including the flanks of a peak.
    Strongest,
    /// Only interior bins that rise above their lower neighbour and are not
    /// exceeded by their upper neighbour compete.
    #[default]
    LocalMaxima,
}

/// A selected spectral peak.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Peak {
    /// Refined frequency in Hz.
    pub frequency: f32,
    /// Magnitude of the peak bin.
    pub magnitude: f32,
}

/// Reorder `scratch` so that its first entries are the indices of the
/// `count` strongest candidate bins of `mags`, strongest first, and return
/// that prefix. `scratch` must be exactly as long as `mags`.
pub(crate) fn select_peaks<'a>(
    mags: &[f32],
    scratch: &'a mut [usize],
    count: usize,
    picking: PeakPicking,
) -> &'a [usize] {
    let candidates = match picking {
        PeakPicking::Strongest => {
            for (i, slot) in scratch.iter_mut().enumerate() {
                *slot = i;
            }
            mags.len()
        }
        PeakPicking::LocalMaxima => {
            let mut n = 0;
            for (i, w) in mags.windows(3).enumerate() {
                if w[1] > w[0] && w[1] >= w[2] {
                    scratch[n] = i + 1;
                    n += 1;
                }
            }
            n
        }
    };

    let pool = &mut scratch[..candidates];
    let choices = count.min(candidates);
    let by_magnitude_desc = |a: &usize, b: &usize| mags[*b].total_cmp(&mags[*a]);

    if choices < pool.len() {
        pool.select_nth_unstable_by(choices, by_magnitude_desc);
    }
    pool[..choices].sort_unstable_by(by_magnitude_desc);
    &scratch[..choices]
}

/// Sub-bin frequency of bin `i` by fitting a parabola through the magnitudes
/// of bins `i - 1`, `i`, `i + 1`.
///
/// Boundary bins and flat neighbourhoods use the bin-centre frequency. The
/// result is never below 1 Hz.
pub fn refine_frequency(mags: &[f32], i: usize, bin_hz: f32) -> f32 {
    let centre = (i as f32 * bin_hz).max(MIN_FREQ_HZ);
    if i == 0 || i + 1 >= mags.len() {
        return centre;
    }

    let (left, mid, right) = (mags[i - 1], mags[i], mags[i + 1]);
    let divisor = left - 2.0 * mid + right;
    if divisor.abs() <= MIN_CURVATURE {
        return centre;
    }

    let delta = 0.5 * (left - right) / divisor;
    ((i as f32 + delta) * bin_hz).max(MIN_FREQ_HZ)
}

/// Deviation of `freq` from `reference`, in cents.
#[inline]
pub fn cents_from(freq: f32, reference: f32) -> f32 {
    1200.0 * (freq / reference).log2()
}

/// Magnitude-weighted circular mean of pitch class.
///
/// Each partial becomes a vector on a circle that turns once per semitone, so
/// partials an exact number of semitones apart land on the same point.
#[derive(Debug, Default, Copy, Clone)]
pub struct PitchClassMean {
    re: f32,
    im: f32,
    weight: f32,
}

impl PitchClassMean {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a partial at `cents` from the reference with weight `magnitude`.
    pub fn add(&mut self, cents: f32, magnitude: f32) {
        let angle = TWO_PI * cents / CENTS_PER_SEMITONE;
        self.re += magnitude * angle.cos();
        self.im += magnitude * angle.sin();
        self.weight += magnitude;
    }

    /// Mean deviation in cents, in `(-50, 50]`. Zero when nothing (or nothing
    /// audible) was added.
    pub fn deviation_cents(&self) -> f32 {
        if self.weight.abs() < MIN_WEIGHT {
            return 0.0;
        }
        let (re, im) = (self.re / self.weight, self.im / self.weight);
        (CENTS_PER_SEMITONE / TWO_PI) * im.atan2(re)
    }
}

/// Per-frame estimator settings.
#[derive(Debug, Copy, Clone)]
pub(crate) struct EstimateConfig {
    pub peak_count: usize,
    pub picking: PeakPicking,
    pub reference_hz: f32,
    pub bin_hz: f32,
}

/// One frame's deviation from equal temperament, in cents.
pub(crate) fn estimate_deviation(
    mags: &[f32],
    scratch: &mut [usize],
    config: EstimateConfig,
) -> f32 {
    let mut mean = PitchClassMean::new();
    for &i in select_peaks(mags, scratch, config.peak_count, config.picking) {
        let peak = Peak {
            frequency: refine_frequency(mags, i, config.bin_hz),
            magnitude: mags[i],
        };
        mean.add(cents_from(peak.frequency, config.reference_hz), peak.magnitude);
    }
    mean.deviation_cents()
}
