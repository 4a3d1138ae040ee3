//! Frequency-bar visualizer driven by the playback transport.
//!
//! While playing, each frame tick pulls byte frequency data from the shared [`AnalysisTap`] and
//! draws centered bars; when idle it draws one flat line and sleeps until the state changes.

use crate::analyser::AnalysisTap;
use crate::playback::PlaybackState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// ~60 Hz.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

const BAR_WIDTH_FACTOR: f32 = 2.5;
const BAR_GAP: f32 = 2.0;

/// A drawing target. Coordinates are in surface units, origin top-left.
pub trait Surface {
    fn width(&self) -> f32;
    fn height(&self) -> f32;
    fn clear(&mut self);
    /// `value` is the raw bin magnitude (0..=255) for color mapping.
    fn fill_bar(&mut self, x: f32, y: f32, width: f32, height: f32, value: u8);
    fn draw_idle_line(&mut self, y: f32);
    /// Called after a complete frame has been drawn.
    fn present(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub value: u8,
}

/// Bar geometry for one frame: width `(surface_width / bins) * 2.5`, gap 2, height `value / 2`,
/// vertically centered. Zero bars are skipped; bars starting past the right edge are dropped.
pub fn bar_layout(data: &[u8], width: f32, height: f32) -> Vec<Bar> {
    if data.is_empty() || width <= 0.0 {
        return Vec::new();
    }
    let bar_width = (width / data.len() as f32) * BAR_WIDTH_FACTOR;
    let mut bars = Vec::new();
    let mut x = 0.0;
    for &value in data {
        if x >= width {
            break;
        }
        let bar_height = value as f32 / 2.0;
        if bar_height > 0.0 {
            bars.push(Bar {
                x,
                y: (height - bar_height) / 2.0,
                width: bar_width,
                height: bar_height,
                value,
            });
        }
        x += bar_width + BAR_GAP;
    }
    bars
}

/// Observes the tap; never touches the transport.
#[derive(Debug, Clone)]
pub struct Visualizer {
    tap: Arc<AnalysisTap>,
    frame_interval: Duration,
}

impl Visualizer {
    pub fn new(tap: Arc<AnalysisTap>) -> Self {
        Self {
            tap,
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Draw one frame of live data.
    pub fn render_frame<S: Surface + ?Sized>(&self, surface: &mut S) {
        let data = self.tap.byte_frequency_data();
        surface.clear();
        for bar in bar_layout(&data, surface.width(), surface.height()) {
            surface.fill_bar(bar.x, bar.y, bar.width, bar.height, bar.value);
        }
        surface.present();
    }

    /// Draw the idle view: a flat centered line.
    pub fn render_idle<S: Surface + ?Sized>(&self, surface: &mut S) {
        surface.clear();
        let y = surface.height() / 2.0;
        surface.draw_idle_line(y);
        surface.present();
    }

    /// Follow `state` until the engine goes away, then hand the surface back.
    pub async fn run<S: Surface>(
        self,
        mut surface: S,
        mut state: watch::Receiver<PlaybackState>,
    ) -> S {
        loop {
            let playing = *state.borrow_and_update() == PlaybackState::Playing;
            if !playing {
                self.render_idle(&mut surface);
                if state.changed().await.is_err() {
                    return surface;
                }
                continue;
            }

            let mut ticker = tokio::time::interval(self.frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.render_frame(&mut surface),
                    changed = state.changed() => {
                        if changed.is_err() {
                            return surface;
                        }
                        break;
                    }
                }
            }
        }
    }
}
