//! Analysis tap: a passive frequency analyser on the playback path.
//!
//! Behaves like a browser analyser node. The playing source pushes a mono mix of every frame
//! into a ring of the last `fft_size` samples; readers get `fft_size / 2` byte bins computed with
//! a Blackman window, magnitude normalized by `1/N`, temporal smoothing, and a linear map of
//! `[min_decibels, max_decibels]` onto `0..=255`.
//!
//! Analysis (FFT plus one smoothing step) only runs when samples arrived since the previous read;
//! otherwise readers get the cached bytes, so any number of visualizers can share one tap.

use crate::error::{VoiceError, VoiceResult};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Fixed analyser settings. Set at construction, never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserConfig {
    pub fft_size: usize,
    pub min_decibels: f32,
    pub max_decibels: f32,
    pub smoothing: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            min_decibels: -100.0,
            max_decibels: -30.0,
            smoothing: 0.8,
        }
    }
}

impl AnalyserConfig {
    pub fn with_fft_size(fft_size: usize) -> Self {
        Self {
            fft_size,
            ..Self::default()
        }
    }

    fn validate(&self) -> VoiceResult<()> {
        if !self.fft_size.is_power_of_two() || !(32..=32_768).contains(&self.fft_size) {
            return Err(VoiceError::Playback(format!(
                "fft size {} must be a power of two in 32..=32768",
                self.fft_size
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(VoiceError::Playback("min_decibels must be below max_decibels".into()));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(VoiceError::Playback("smoothing must be within 0..=1".into()));
        }
        Ok(())
    }
}

struct TapState {
    ring: Vec<f32>,
    /// Next write position; also the oldest sample once the ring has wrapped.
    write: usize,
    smoothed: Vec<f32>,
    /// Bumped by every non-empty push.
    generation: u64,
    /// Generation the cached bytes were computed from.
    analysed: Option<u64>,
    bytes: Vec<u8>,
}

/// Shared between the playback path (writer) and any number of visualizers (readers).
pub struct AnalysisTap {
    config: AnalyserConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    state: Mutex<TapState>,
}

impl fmt::Debug for AnalysisTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisTap")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AnalysisTap {
    pub fn new(config: AnalyserConfig) -> VoiceResult<Self> {
        config.validate()?;
        let n = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(n);
        Ok(Self {
            config,
            fft,
            window: blackman_window(n),
            state: Mutex::new(TapState {
                ring: vec![0.0; n],
                write: 0,
                smoothed: vec![0.0; n / 2],
                generation: 0,
                analysed: None,
                bytes: vec![0; n / 2],
            }),
        })
    }

    pub fn config(&self) -> &AnalyserConfig {
        &self.config
    }

    /// Number of bins returned by [`Self::byte_frequency_data`].
    pub fn frequency_bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    fn lock(&self) -> MutexGuard<'_, TapState> {
        // poisoned state is still valid sample data
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Feed mono samples from the playback path.
    pub fn push_samples(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let mut state = self.lock();
        state.generation = state.generation.wrapping_add(1);
        let n = state.ring.len();
        // only the last `n` samples can survive
        let skip = samples.len().saturating_sub(n);
        for &s in &samples[skip..] {
            let at = state.write;
            state.ring[at] = s;
            state.write = (at + 1) % n;
        }
    }

    /// Current spectrum as `fft_size / 2` bytes. Repeated reads without new samples agree.
    pub fn byte_frequency_data(&self) -> Vec<u8> {
        let mut state = self.lock();
        if state.analysed != Some(state.generation) {
            self.analyse(&mut state);
        }
        state.bytes.clone()
    }

    fn analyse(&self, state: &mut TapState) {
        let n = self.config.fft_size;

        let mut spectrum: Vec<Complex<f32>> = (0..n)
            .map(|i| {
                let s = state.ring[(state.write + i) % n];
                Complex::new(s * self.window[i], 0.0)
            })
            .collect();
        self.fft.process(&mut spectrum);

        let k = self.config.smoothing;
        let range = self.config.max_decibels - self.config.min_decibels;
        let scale = 1.0 / n as f32;
        for (bin, value) in spectrum.iter().take(n / 2).enumerate() {
            let magnitude = value.norm() * scale;
            let smoothed = k * state.smoothed[bin] + (1.0 - k) * magnitude;
            state.smoothed[bin] = smoothed;
            state.bytes[bin] = to_byte(smoothed, self.config.min_decibels, range);
        }
        state.analysed = Some(state.generation);
    }
}

fn to_byte(magnitude: f32, min_db: f32, range: f32) -> u8 {
    if magnitude <= 0.0 || !magnitude.is_finite() {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = 255.0 / range * (db - min_db);
    scaled.clamp(0.0, 255.0) as u8
}

fn blackman_window(n: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
