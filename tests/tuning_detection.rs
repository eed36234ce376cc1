//! Integration tests for tuning-deviation estimation using synthesised tones.

use lazy_static::lazy_static;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::sync::{Arc, Mutex};
use tuning_estimator::{PeakPicking, TuningProcessor, MAX_SLOTS};

const SAMPLE_RATE: f32 = 48_000.0;
const A4: f64 = 440.0;

/// `freq` shifted by `cents`.
fn detune(freq: f64, cents: f64) -> f64 {
    freq * 2f64.powf(cents / 1200.0)
}

/// Sum of sinusoids `(frequency, amplitude)`, `len` samples long.
fn tone(partials: &[(f64, f64)], len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| {
            let t = n as f64 / SAMPLE_RATE as f64;
            partials
                .iter()
                .map(|&(f, a)| a * (2.0 * std::f64::consts::PI * f * t).sin())
                .sum::<f64>() as f32
        })
        .collect()
}

/// Build a processor, feed it `seconds` of `partials` and return the latest
/// smoothed deviation.
fn settle(builder: tuning_estimator::TuningProcessorBuilder, partials: &[(f64, f64)]) -> f32 {
    let mut tuner = builder.build().unwrap();
    let mut audio = tone(partials, 2 * SAMPLE_RATE as usize);
    tuner.process_block(&mut audio);
    tuner.latest().expect("no frame was analysed")
}

#[derive(Debug, Clone)]
struct ToneCase {
    name: &'static str,
    partials: Vec<(f64, f64)>,
    expected_cents: f32,
    tolerance: f32,
}

lazy_static! {
    static ref TONE_CASES: Vec<ToneCase> = vec![
        ToneCase {
            name: "A4 at reference",
            partials: vec![(A4, 0.5)],
            expected_cents: 0.0,
            tolerance: 1.0,
        },
        ToneCase {
            name: "one semitone above reference",
            partials: vec![(detune(A4, 100.0), 0.5)],
            expected_cents: 0.0,
            tolerance: 1.0,
        },
        ToneCase {
            name: "25 cents sharp",
            partials: vec![(detune(A4, 25.0), 0.5)],
            expected_cents: 25.0,
            tolerance: 2.0,
        },
        ToneCase {
            name: "30 cents flat",
            partials: vec![(detune(A4, -30.0), 0.5)],
            expected_cents: -30.0,
            tolerance: 2.0,
        },
        ToneCase {
            name: "octave below reference",
            partials: vec![(A4 / 2.0, 0.5)],
            expected_cents: 0.0,
            tolerance: 2.0,
        },
        ToneCase {
            name: "harmonic tone 10 cents sharp",
            partials: vec![
                (detune(A4, 10.0), 0.5),
                (detune(2.0 * A4, 10.0), 0.25),
                (detune(3.0 * A4, 10.0), 0.15),
            ],
            expected_cents: 10.0,
            tolerance: 2.0,
        },
    ];
}

#[test]
fn test_tone_deviation_converges() {
    let failures = Arc::new(Mutex::new(Vec::<String>::new()));

    TONE_CASES.par_iter().for_each(|case| {
        let builder = TuningProcessor::builder().window_length(MAX_SLOTS);
        let cents = settle(builder, &case.partials);

        if (cents - case.expected_cents).abs() > case.tolerance {
            failures.lock().unwrap().push(format!(
                "{}: expected {:+.2} ± {}, got {:+.2}",
                case.name, case.expected_cents, case.tolerance, cents
            ));
        }
    });

    let failures = Arc::try_unwrap(failures).unwrap().into_inner().unwrap();
    if !failures.is_empty() {
        panic!("{} tone cases failed:\n{}", failures.len(), failures.join("\n"));
    }
}

#[test]
fn single_strongest_bin_tracks_detuned_tone() {
    let builder = TuningProcessor::builder()
        .sample_rate(SAMPLE_RATE)
        .peak_picking(PeakPicking::Strongest)
        .peak_count(1)
        .window_length(MAX_SLOTS);
    let cents = settle(builder, &[(detune(A4, 25.0), 0.5)]);
    assert!((cents - 25.0).abs() < 2.0, "got {cents}");
}

#[test]
fn deviation_is_relative_to_reference() {
    // 442 Hz against a 442 Hz reference is in tune.
    let builder = TuningProcessor::builder()
        .sample_rate(SAMPLE_RATE)
        .reference_hz(442.0)
        .window_length(MAX_SLOTS);
    let cents = settle(builder, &[(442.0, 0.5)]);
    assert!(cents.abs() < 2.0, "got {cents}");
}

#[test]
fn estimated_reference_follows_detuned_input() {
    let mut tuner = TuningProcessor::builder()
        .sample_rate(SAMPLE_RATE)
        .window_length(MAX_SLOTS)
        .build()
        .unwrap();
    let mut audio = tone(&[(detune(A4, 25.0), 0.5)], 2 * SAMPLE_RATE as usize);
    tuner.process_block(&mut audio);

    let hz = tuner.estimated_reference_hz().unwrap();
    let expected = detune(A4, 25.0) as f32;
    assert!((hz - expected).abs() < 0.6, "got {hz}, expected {expected}");
}

#[test]
fn silence_reports_zero_deviation() {
    let mut tuner = TuningProcessor::builder().order(10).build().unwrap();
    let mut audio = vec![0.0f32; 8 * 1024];
    tuner.process_block(&mut audio);

    assert_eq!(tuner.history().len(), 20);
    assert!(tuner.history().iter().all(|v| v == 0.0));
    assert!(audio.iter().all(|&s| s == 0.0));
}

#[test]
fn runtime_parameters_take_effect_between_frames() {
    let mut tuner = TuningProcessor::builder()
        .sample_rate(SAMPLE_RATE)
        .window_length(MAX_SLOTS)
        .build()
        .unwrap();
    let params = tuner.params().clone();

    let mut audio = tone(&[(A4, 0.5)], 2 * SAMPLE_RATE as usize);
    tuner.process_block(&mut audio);
    assert!(tuner.latest().unwrap().abs() < 1.0);

    // Raising the reference by 20 cents makes the same tone read 20 cents flat.
    assert!(params.set_reference_hz(detune(A4, 20.0) as f32));
    let mut audio = tone(&[(A4, 0.5)], 2 * SAMPLE_RATE as usize);
    tuner.process_block(&mut audio);
    let cents = tuner.latest().unwrap();
    assert!((cents + 20.0).abs() < 1.5, "got {cents}");
}
