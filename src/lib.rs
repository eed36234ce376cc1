//! # tuning_estimator
//!
//! Real-time estimate of how far the pitch content of an audio stream sits from
//! equal temperament, in cents relative to the nearest semitone of a reference
//! (A4 = 440 Hz by default).
//!
//! Audio runs through a short-time Fourier analysis/resynthesis loop with 75%
//! overlap. On every hop the strongest local spectral peaks are refined by parabolic
//! interpolation and averaged on a one-semitone circle; the per-frame deviation
//! is smoothed and kept in a bounded history for display.
//!
//! ## Example
//! ```rust
//! use tuning_estimator::{TuningProcessor, TuningError};
//!
//! fn run() -> Result<(), TuningError> {
//!     // 1) Build one processor per channel
//!     let mut tuner = TuningProcessor::builder()
//!         .sample_rate(48_000.0)
//!         .order(12)
//!         .window_length(8)
//!         .build()?;
//!
//!     // 2) Hand the parameter and history handles to the UI side
//!     let params = tuner.params().clone();
//!     let reader = tuner.history_reader();
//!     params.set_reference_hz(442.0);
//!
//!     // 3) In your audio callback:
//!     let mut block = vec![0.0f32; 512]; // fill with actual samples
//!     tuner.process_block(&mut block);
//!
//!     // 4) On a display timer:
//!     println!("{:+.1} cents, {} frames", reader.latest(), reader.frames());
//!     Ok(())
//! }
//! # run().unwrap();
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

/// Per-channel processor and its builder.
pub use processor::{TuningError, TuningProcessor, TuningProcessorBuilder, DEFAULT_SAMPLE_RATE};

/// Shared runtime parameters.
pub use params::{TuningParams, MAX_SLOTS};

/// Staged order changes.
pub use reconfigure::{clamp_order, validate_order, OrderController};

/// Smoothing and history types.
pub use smoothing::{History, HistoryReader, Smoother, SmoothingMode};

/// Spectral estimate building blocks.
pub use spectrum::{cents_from, refine_frequency, Peak, PeakPicking, PitchClassMean};

/// Framing constants and window helpers.
pub use stft::{hann_window, window_correction, DEFAULT_ORDER, MAX_ORDER, MIN_ORDER, OVERLAP};

/// Shared parameter handles.
pub mod params;

/// Tuning processor.
pub mod processor;

/// Transform-order reconfiguration.
pub mod reconfigure;

/// Temporal smoothing and history.
pub mod smoothing;

/// Peak extraction and pitch-class averaging.
pub mod spectrum;

/// Overlap-add framing and transform.
pub mod stft;
