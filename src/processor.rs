//! Tuning processor
//!
//! Per-channel engine: overlap-add framing on the sample path, a spectral
//! tuning estimate on every hop, then smoothing and a bounded history.

use std::sync::Arc;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::{
    params::{TuningParams, DEFAULT_PEAK_COUNT, DEFAULT_REFERENCE_HZ, DEFAULT_WINDOW_LENGTH},
    reconfigure::{order_channel, validate_order, OrderController, OrderSwap},
    smoothing::{
        History, HistoryPublisher, HistoryReader, Smoother, SmoothingMode,
        DEFAULT_HISTORY_CAPACITY,
    },
    spectrum::{estimate_deviation, EstimateConfig, PeakPicking},
    stft::{FrameBuffers, DEFAULT_ORDER, OVERLAP},
};

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;

/// Errors returned while configuring a processor.
#[derive(Debug, Error)]
pub enum TuningError {
    /// Transform order outside the supported range.
    #[error("transform order {order} outside {min}..={max}")]
    InvalidOrder {
        /// The rejected order.
        order: u32,
        /// Smallest supported order.
        min: u32,
        /// Largest supported order.
        max: u32,
    },

    /// Sample rate was not a positive finite number.
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(f32),

    /// Any other invalid setting.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The other end of an order controller has been dropped.
    #[error("processor no longer listening for order changes")]
    ControllerDisconnected,
}

/// Builder for a [`TuningProcessor`].
pub struct TuningProcessorBuilder {
    sample_rate: f32,
    order: u32,
    reference_hz: f32,
    peak_count: usize,
    window_length: usize,
    history_capacity: usize,
    smoothing: SmoothingMode,
    picking: PeakPicking,
    params: Option<Arc<TuningParams>>,
}

impl TuningProcessorBuilder {
    /// Start with default parameters:
    /// sample_rate = 48_000, order = 13, reference_hz = 440,
    /// peak_count = 20, window_length = 1, history_capacity = 20,
    /// positional smoothing, local-maximum peak picking.
    pub fn new() -> Self {
        TuningProcessorBuilder {
            sample_rate: DEFAULT_SAMPLE_RATE,
            order: DEFAULT_ORDER,
            reference_hz: DEFAULT_REFERENCE_HZ,
            peak_count: DEFAULT_PEAK_COUNT,
            window_length: DEFAULT_WINDOW_LENGTH,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            smoothing: SmoothingMode::default(),
            picking: PeakPicking::default(),
            params: None,
        }
    }

    /// Set the sample rate of the incoming audio.
    pub fn sample_rate(mut self, rate: f32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the transform order; frames are `2^order` samples long.
    pub fn order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    /// Set the tuning reference in Hz.
    pub fn reference_hz(mut self, hz: f32) -> Self {
        self.reference_hz = hz;
        self
    }

    /// Set how many spectral peaks contribute to each estimate.
    pub fn peak_count(mut self, n: usize) -> Self {
        self.peak_count = n;
        self
    }

    /// Set the smoothing window length in frames.
    pub fn window_length(mut self, n: usize) -> Self {
        self.window_length = n;
        self
    }

    /// Set how many smoothed values the history keeps.
    pub fn history_capacity(mut self, n: usize) -> Self {
        self.history_capacity = n;
        self
    }

    /// Set which ring entries the smoothed average covers.
    pub fn smoothing(mut self, mode: SmoothingMode) -> Self {
        self.smoothing = mode;
        self
    }

    /// Set how candidate peaks are chosen.
    pub fn peak_picking(mut self, picking: PeakPicking) -> Self {
        self.picking = picking;
        self
    }

    /// Share an existing parameter handle. The builder's `reference_hz`,
    /// `peak_count` and `window_length` are written into it.
    pub fn params(mut self, params: Arc<TuningParams>) -> Self {
        self.params = Some(params);
        self
    }

    /// Finalize and create the processor.
    pub fn build(self) -> Result<TuningProcessor, TuningError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(TuningError::InvalidSampleRate(self.sample_rate));
        }
        let order = validate_order(self.order)?;
        if self.history_capacity == 0 {
            return Err(TuningError::Configuration(
                "history_capacity cannot be zero".into(),
            ));
        }

        let params = self.params.unwrap_or_default();
        if !params.set_reference_hz(self.reference_hz) {
            return Err(TuningError::Configuration(format!(
                "reference_hz must be positive, got {}",
                self.reference_hz
            )));
        }
        params.set_peak_count(self.peak_count);
        params.set_window_length(self.window_length);

        let frames = FrameBuffers::new(order);
        let (controller, swap) = order_channel();
        let publisher = HistoryPublisher::new(self.history_capacity);

        debug!(
            "tuning processor: {} Hz, order {order} ({} samples), history {}",
            self.sample_rate,
            frames.frame_len(),
            self.history_capacity
        );

        Ok(TuningProcessor {
            sample_rate: self.sample_rate,
            frames,
            params,
            picking: self.picking,
            smoother: Smoother::new(self.smoothing),
            history: History::with_capacity(self.history_capacity),
            publisher,
            swap,
            controller: Some(controller),
            last_deviation: 0.0,
        })
    }
}

impl Default for TuningProcessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming tuning-deviation estimator for one audio channel.
///
/// Audio passes through with a latency of one frame; every hop the most recent
/// frame is analysed and one smoothed deviation (in cents from the nearest
/// equal-tempered semitone) is appended to the history.
pub struct TuningProcessor {
    sample_rate: f32,
    frames: FrameBuffers,
    params: Arc<TuningParams>,
    picking: PeakPicking,
    smoother: Smoother,
    history: History,
    publisher: HistoryPublisher,
    swap: OrderSwap,
    controller: Option<OrderController>,
    last_deviation: f32,
}

impl TuningProcessor {
    /// Start customizing with a builder.
    pub fn builder() -> TuningProcessorBuilder {
        TuningProcessorBuilder::new()
    }

    /// Push one sample in and get the sample from one frame earlier out.
    #[inline]
    pub fn submit(&mut self, sample: f32) -> f32 {
        if self.frames.at_hop_boundary() {
            self.apply_staged_order();
        }
        let (out, frame_ready) = self.frames.push(sample);
        if frame_ready {
            self.process_frame();
        }
        out
    }

    /// Run [`submit`](Self::submit) over `block` in order, replacing each
    /// sample with the delayed output.
    pub fn process_block(&mut self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            *sample = self.submit(*sample);
        }
    }

    fn process_frame(&mut self) {
        let p = self.params.snapshot();
        let config = EstimateConfig {
            peak_count: p.peak_count.min(self.frames.num_bins()),
            picking: self.picking,
            reference_hz: p.reference_hz,
            bin_hz: self.sample_rate / self.frames.frame_len() as f32,
        };

        let mut deviation = None;
        self.frames.process_frame(p.bypassed, |mags, scratch| {
            deviation = Some(estimate_deviation(mags, scratch, config));
        });

        if let Some(cents) = deviation {
            self.last_deviation = cents;
            let smoothed = self.smoother.push(cents, p.window_length);
            self.history.push(smoothed);
            self.publisher.publish(&self.history);
            trace!("deviation {cents:.2} cents, smoothed {smoothed:.2}");
        }
    }

    fn apply_staged_order(&mut self) {
        if let Some(next) = self.swap.poll() {
            let old = std::mem::replace(&mut self.frames, next);
            self.swap.retire(old);
        }
    }

    /// Zero the framing buffers. Order, smoothing state and history are kept.
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Zero the framing buffers, the smoothing ring and the history.
    pub fn reset_all(&mut self) {
        self.frames.clear();
        self.smoother.clear();
        self.history.clear();
        self.publisher.clear();
        self.last_deviation = 0.0;
    }

    /// Replace all frame buffers for a new transform order, discarding any
    /// audio in flight. A staged request not yet applied is dropped, so this
    /// order holds until the next request. Out-of-range orders are rejected
    /// and leave the processor untouched.
    pub fn change_order(&mut self, order: u32) -> Result<(), TuningError> {
        let order = validate_order(order).inspect_err(|e| warn!("order change rejected: {e}"))?;
        while let Some(stale) = self.swap.poll() {
            debug!("dropping staged order {} superseded by {order}", stale.order());
            self.swap.retire(stale);
        }
        self.frames = FrameBuffers::new(order);
        debug!(
            "order changed to {order}, latency {} samples",
            self.frames.frame_len()
        );
        Ok(())
    }

    /// Take the controller for staged order changes from another thread.
    /// Returns `None` after the first call.
    pub fn order_controller(&mut self) -> Option<OrderController> {
        self.controller.take()
    }

    /// Processing latency in samples; equal to the frame length.
    pub fn latency_samples(&self) -> usize {
        self.frames.frame_len()
    }

    /// Current transform order.
    pub fn order(&self) -> u32 {
        self.frames.order()
    }

    /// Samples between frame passes.
    pub fn hop_size(&self) -> usize {
        self.frames.frame_len() / OVERLAP
    }

    /// Sample rate the processor was built for.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Shared parameter handle.
    pub fn params(&self) -> &Arc<TuningParams> {
        &self.params
    }

    /// Unsmoothed deviation of the most recent analysed frame, in cents.
    pub fn last_deviation(&self) -> f32 {
        self.last_deviation
    }

    /// Most recent smoothed deviation, in cents.
    pub fn latest(&self) -> Option<f32> {
        self.history.latest()
    }

    /// Reference frequency implied by the latest smoothed deviation, i.e.
    /// where A4 would sit if the input were in tune with itself.
    pub fn estimated_reference_hz(&self) -> Option<f32> {
        let cents = self.history.latest()?;
        Some(self.params.reference_hz() * 2f32.powf(cents / 1200.0))
    }

    /// Smoothed history, oldest first.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Smoothing ring state.
    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }

    /// Handle for reading the history from another thread.
    pub fn history_reader(&self) -> HistoryReader {
        self.publisher.reader()
    }
}
