//! **PlaybackEngine** — owns the live audio graph: source → analysis tap → output.
//!
//! At most one session is connected at a time; `play()` tears the previous one down first.
//! Transport state (Idle/Playing) is published on a `watch` channel so visualizers and
//! front ends can follow it without polling.

use crate::analyser::AnalysisTap;
use crate::audio::SampleBuffer;
use crate::error::VoiceResult;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Slowest supported playback rate.
pub const MIN_SPEED: f32 = 0.5;
/// Fastest supported playback rate.
pub const MAX_SPEED: f32 = 2.0;

/// Mono frames accumulated before they are pushed into the tap.
const TAP_BATCH: usize = 64;

/// Clamp a requested rate into the supported range. NaN plays at normal speed.
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        1.0
    } else {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
}

/// A connected output session. Dropping it must also silence it.
pub trait PlaybackSink {
    /// Change the rate of the running session.
    fn set_speed(&self, speed: f32);
    /// Halt and disconnect.
    fn stop(&self);
    /// Everything handed to the device has been consumed, or the session was stopped.
    fn drained(&self) -> bool;
}

/// Where sessions get connected. Not `Send`: the default device stream is pinned to its thread on some platforms.
pub trait OutputDevice {
    fn connect(&mut self, source: TappedSource, speed: f32) -> VoiceResult<Box<dyn PlaybackSink>>;
}

/// Interleaved f32 source over a shared buffer that feeds the analysis tap as it is pulled
/// and fires a completion hook when it runs out naturally.
pub struct TappedSource {
    buffer: Arc<SampleBuffer>,
    tap: Arc<AnalysisTap>,
    frame: usize,
    channel: usize,
    mix: f32,
    pending: Vec<f32>,
    on_end: Option<Box<dyn FnOnce() + Send>>,
}

impl TappedSource {
    pub fn new(buffer: Arc<SampleBuffer>, tap: Arc<AnalysisTap>) -> Self {
        Self {
            buffer,
            tap,
            frame: 0,
            channel: 0,
            mix: 0.0,
            pending: Vec::with_capacity(TAP_BATCH),
            on_end: None,
        }
    }

    /// Run `hook` once, when the last sample has been pulled. Not called if the source is dropped early.
    ///
    /// The output may still be rendering buffered samples at that point; see [`PlaybackSink::drained`].
    pub fn on_end(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_end = Some(Box::new(hook));
        self
    }

    pub fn frames_played(&self) -> usize {
        self.frame
    }

    fn flush_tap(&mut self) {
        if !self.pending.is_empty() {
            self.tap.push_samples(&self.pending);
            self.pending.clear();
        }
    }

    fn finish(&mut self) {
        self.flush_tap();
        if let Some(hook) = self.on_end.take() {
            hook();
        }
    }
}

impl Iterator for TappedSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.frame >= self.buffer.frames() {
            self.finish();
            return None;
        }
        let channels = self.buffer.channel_count() as usize;
        let sample = self.buffer.sample(self.frame, self.channel);
        self.mix += sample;
        self.channel += 1;
        if self.channel == channels {
            self.pending.push(self.mix / channels as f32);
            self.mix = 0.0;
            self.channel = 0;
            self.frame += 1;
            if self.pending.len() >= TAP_BATCH {
                self.flush_tap();
            }
        }
        Some(sample)
    }
}

impl Source for TappedSource {
    fn current_frame_len(&self) -> Option<usize> {
        let channels = self.buffer.channel_count() as usize;
        let remaining = self.buffer.frames().saturating_sub(self.frame) * channels;
        Some(remaining.saturating_sub(self.channel))
    }

    fn channels(&self) -> u16 {
        self.buffer.channel_count()
    }

    fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.buffer.duration())
    }
}

/// Default output device via rodio.
pub struct RodioOutput {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl RodioOutput {
    /// Open the default output device.
    pub fn new() -> VoiceResult<Self> {
        let (stream, handle) = OutputStream::try_default()?;
        info!("🔊 RodioOutput: default output device ready");
        Ok(Self {
            _stream: stream,
            handle,
        })
    }
}

impl OutputDevice for RodioOutput {
    fn connect(&mut self, source: TappedSource, speed: f32) -> VoiceResult<Box<dyn PlaybackSink>> {
        // one sink per session
        let sink = Sink::try_new(&self.handle)?;
        sink.set_speed(speed);
        sink.append(source);
        Ok(Box::new(RodioSink(sink)))
    }
}

struct RodioSink(Sink);

impl PlaybackSink for RodioSink {
    fn set_speed(&self, speed: f32) {
        self.0.set_speed(speed);
    }

    fn stop(&self) {
        self.0.stop();
    }

    fn drained(&self) -> bool {
        self.0.empty()
    }
}

/// Shared with completion hooks. State changes happen under `current`; a hook from a
/// superseded session is a no-op.
struct Transport {
    current: Mutex<Option<u64>>,
    state: watch::Sender<PlaybackState>,
}

impl Transport {
    fn current(&self) -> std::sync::MutexGuard<'_, Option<u64>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, id: u64) {
        let mut current = self.current();
        *current = Some(id);
        self.state.send_replace(PlaybackState::Playing);
    }

    fn finish(&self, id: u64) {
        let mut current = self.current();
        if *current == Some(id) {
            *current = None;
            self.state.send_replace(PlaybackState::Idle);
            debug!(session = id, "playback ended");
        }
    }

    fn halt(&self) {
        let mut current = self.current();
        *current = None;
        self.state.send_if_modified(|s| {
            let changed = *s != PlaybackState::Idle;
            *s = PlaybackState::Idle;
            changed
        });
    }
}

struct Session {
    id: u64,
    sink: Box<dyn PlaybackSink>,
    speed: f32,
}

/// Transport control over one output device.
pub struct PlaybackEngine {
    output: Box<dyn OutputDevice>,
    tap: Arc<AnalysisTap>,
    transport: Arc<Transport>,
    session: Option<Session>,
    next_session: u64,
}

impl PlaybackEngine {
    pub fn new(output: Box<dyn OutputDevice>, tap: Arc<AnalysisTap>) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            output,
            tap,
            transport: Arc::new(Transport {
                current: Mutex::new(None),
                state,
            }),
            session: None,
            next_session: 0,
        }
    }

    /// Replace any running session with `buffer` at `speed` (clamped to 0.5..=2.0).
    /// Returns the new session id.
    pub fn play(&mut self, buffer: Arc<SampleBuffer>, speed: f32) -> VoiceResult<u64> {
        self.stop();

        self.next_session += 1;
        let id = self.next_session;
        let speed = clamp_speed(speed);
        let frames = buffer.frames();

        self.transport.begin(id);
        let transport: Weak<Transport> = Arc::downgrade(&self.transport);
        let source = TappedSource::new(buffer, Arc::clone(&self.tap)).on_end(move || {
            if let Some(t) = transport.upgrade() {
                t.finish(id);
            }
        });

        match self.output.connect(source, speed) {
            Ok(sink) => {
                self.session = Some(Session { id, sink, speed });
                info!(session = id, frames, speed, "▶️ playback started");
                Ok(id)
            }
            Err(e) => {
                self.transport.finish(id);
                Err(e)
            }
        }
    }

    /// Halt the current session, if any. Always safe to call.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.sink.stop();
            debug!(session = session.id, "playback stopped");
        }
        self.transport.halt();
    }

    /// Change the running session's rate. Ignored (and not remembered) while idle.
    pub fn set_speed(&mut self, speed: f32) -> bool {
        if self.state() != PlaybackState::Playing {
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let speed = clamp_speed(speed);
        session.sink.set_speed(speed);
        session.speed = speed;
        debug!(session = session.id, speed, "playback speed changed");
        true
    }

    pub fn state(&self) -> PlaybackState {
        *self.transport.state.borrow()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Follow transport state. The channel closes when the engine is dropped.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.transport.state.subscribe()
    }

    pub fn tap(&self) -> Arc<AnalysisTap> {
        Arc::clone(&self.tap)
    }

    /// Rate of the current session while playing.
    pub fn current_speed(&self) -> Option<f32> {
        if self.is_playing() {
            self.session.as_ref().map(|s| s.speed)
        } else {
            None
        }
    }

    /// True once the last session's output has run dry. A naturally finished session keeps its
    /// sink until the next `play()` or `stop()`, so callers about to drop the engine should wait
    /// for this after the state goes Idle.
    pub fn output_drained(&self) -> bool {
        self.session.as_ref().map_or(true, |s| s.sink.drained())
    }

    /// Id of the connected session, if one is playing.
    pub fn current_session(&self) -> Option<u64> {
        *self.transport.current()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::AnalyserConfig;
    use crate::headless::{HeadlessOutput, Pace};

    fn tap() -> Arc<AnalysisTap> {
        Arc::new(AnalysisTap::new(AnalyserConfig::default()).unwrap())
    }

    fn tone(frames: usize) -> Arc<SampleBuffer> {
        let samples = (0..frames).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        Arc::new(SampleBuffer::mono(24_000, samples).unwrap())
    }

    #[test]
    fn tapped_source_yields_interleaved_and_fires_hook_once() {
        let buffer = Arc::new(SampleBuffer::new(8_000, vec![vec![0.5, 0.25], vec![-0.5, 0.75]]).unwrap());
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let mut source = TappedSource::new(buffer, tap()).on_end(move || {
            f.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        assert_eq!(source.channels(), 2);
        assert_eq!(source.current_frame_len(), Some(4));
        let out: Vec<f32> = source.by_ref().collect();
        assert_eq!(out, vec![0.5, -0.5, 0.25, 0.75]);
        assert_eq!(source.next(), None);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(source.frames_played(), 2);
    }

    #[test]
    fn second_play_replaces_first() {
        let output = HeadlessOutput::new(Pace::Held);
        let probe = output.probe();
        let mut engine = PlaybackEngine::new(Box::new(output), tap());

        let first = engine.play(tone(1_000), 1.0).unwrap();
        let second = engine.play(tone(1_000), 1.0).unwrap();
        assert_ne!(first, second);
        assert_eq!(probe.sessions_opened(), 2);
        assert_eq!(probe.connected_sessions(), 1);
        assert!(!probe.session(0).unwrap().connected);
        assert!(probe.session(1).unwrap().connected);
        assert_eq!(engine.current_session(), Some(second));
        assert!(engine.is_playing());
    }

    #[test]
    fn stop_is_idempotent() {
        let output = HeadlessOutput::new(Pace::Held);
        let probe = output.probe();
        let mut engine = PlaybackEngine::new(Box::new(output), tap());
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Idle);
        engine.play(tone(100), 1.0).unwrap();
        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert_eq!(probe.connected_sessions(), 0);
    }

    #[test]
    fn speed_applies_only_while_playing() {
        let output = HeadlessOutput::new(Pace::Held);
        let probe = output.probe();
        let mut engine = PlaybackEngine::new(Box::new(output), tap());

        assert!(!engine.set_speed(1.5));
        engine.play(tone(100), 1.0).unwrap();
        assert!(engine.set_speed(1.5));
        assert_eq!(probe.last().unwrap().speed, 1.5);
        assert!(engine.set_speed(9.0));
        assert_eq!(engine.current_speed(), Some(MAX_SPEED));

        engine.stop();
        assert!(!engine.set_speed(0.7));
        assert_eq!(engine.current_speed(), None);
        // the next session starts at its own requested rate, not a buffered one
        engine.play(tone(100), 1.0).unwrap();
        assert_eq!(probe.last().unwrap().speed, 1.0);
    }

    #[tokio::test]
    async fn natural_end_returns_to_idle() {
        let output = HeadlessOutput::new(Pace::Unthrottled);
        let mut engine = PlaybackEngine::new(Box::new(output), tap());
        let mut rx = engine.subscribe();
        engine.play(tone(2_400), 1.0).unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == PlaybackState::Idle))
            .await
            .expect("playback should finish")
            .unwrap();
        assert_eq!(engine.current_session(), None);
        assert!(!engine.set_speed(1.2));
    }

    #[tokio::test]
    async fn finished_session_drains_before_release() {
        let output = HeadlessOutput::new(Pace::Held);
        let mut engine = PlaybackEngine::new(Box::new(output), tap());
        assert!(engine.output_drained());
        engine.play(tone(100), 1.0).unwrap();
        assert!(!engine.output_drained());
        engine.stop();
        assert!(engine.output_drained());

        let output = HeadlessOutput::new(Pace::Unthrottled);
        let probe = output.probe();
        let mut engine = PlaybackEngine::new(Box::new(output), tap());
        let mut rx = engine.subscribe();
        engine.play(tone(2_400), 1.0).unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == PlaybackState::Idle))
            .await
            .expect("playback should finish")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !engine.output_drained() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("output should drain");
        assert!(probe.last().unwrap().completed);
    }

    #[test]
    fn clamps_speed() {
        assert_eq!(clamp_speed(0.1), MIN_SPEED);
        assert_eq!(clamp_speed(3.0), MAX_SPEED);
        assert_eq!(clamp_speed(1.3), 1.3);
        assert_eq!(clamp_speed(f32::NAN), 1.0);
    }
}
