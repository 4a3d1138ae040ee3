//! Output device without audio hardware.
//!
//! Drains sessions on a worker thread as fast as possible, or holds them until stopped. Used on
//! CI, on machines without a sound card, and by `--no-audio` runs.
//! [`HeadlessProbe`] exposes what was connected so callers can inspect the transport.

use crate::error::VoiceResult;
use crate::playback::{OutputDevice, PlaybackSink, TappedSource};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Pull everything immediately.
    Unthrottled,
    /// Never pull; the session stays connected until stopped.
    Held,
}

#[derive(Debug)]
struct SessionState {
    speed: AtomicU32,
    connected: AtomicBool,
    completed: AtomicBool,
}

impl SessionState {
    fn new(speed: f32) -> Self {
        Self {
            speed: AtomicU32::new(speed.to_bits()),
            connected: AtomicBool::new(true),
            completed: AtomicBool::new(false),
        }
    }

    fn speed(&self) -> f32 {
        f32::from_bits(self.speed.load(Ordering::Acquire))
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            speed: self.speed(),
            connected: self.connected.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
        }
    }
}

/// Point-in-time view of one headless session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSnapshot {
    pub speed: f32,
    /// Connected to the output and not yet stopped or finished.
    pub connected: bool,
    /// The source ran out naturally.
    pub completed: bool,
}

/// Cloneable view of every session a [`HeadlessOutput`] has connected.
#[derive(Debug, Clone, Default)]
pub struct HeadlessProbe {
    sessions: Arc<Mutex<Vec<Arc<SessionState>>>>,
}

impl HeadlessProbe {
    fn sessions(&self) -> std::sync::MutexGuard<'_, Vec<Arc<SessionState>>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, state: Arc<SessionState>) {
        self.sessions().push(state);
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions().len()
    }

    pub fn connected_sessions(&self) -> usize {
        self.sessions()
            .iter()
            .filter(|s| s.connected.load(Ordering::Acquire))
            .count()
    }

    pub fn session(&self, index: usize) -> Option<SessionSnapshot> {
        self.sessions().get(index).map(|s| s.snapshot())
    }

    pub fn last(&self) -> Option<SessionSnapshot> {
        self.sessions().last().map(|s| s.snapshot())
    }
}

/// Hardware-free [`OutputDevice`].
#[derive(Debug)]
pub struct HeadlessOutput {
    pace: Pace,
    probe: HeadlessProbe,
}

impl HeadlessOutput {
    pub fn new(pace: Pace) -> Self {
        Self {
            pace,
            probe: HeadlessProbe::default(),
        }
    }

    pub fn probe(&self) -> HeadlessProbe {
        self.probe.clone()
    }
}

impl OutputDevice for HeadlessOutput {
    fn connect(&mut self, source: TappedSource, speed: f32) -> VoiceResult<Box<dyn PlaybackSink>> {
        let state = Arc::new(SessionState::new(speed));
        self.probe.push(Arc::clone(&state));

        let held = match self.pace {
            Pace::Held => Some(source),
            Pace::Unthrottled => {
                let worker = Arc::clone(&state);
                std::thread::Builder::new()
                    .name("voicefy-headless".to_string())
                    .spawn(move || drain(source, worker))?;
                None
            }
        };
        debug!(pace = ?self.pace, speed, "headless session connected");

        Ok(Box::new(HeadlessSink {
            state,
            held: Mutex::new(held),
        }))
    }
}

fn drain(mut source: TappedSource, state: Arc<SessionState>) {
    while state.connected.load(Ordering::Acquire) {
        if source.next().is_none() {
            state.completed.store(true, Ordering::Release);
            state.connected.store(false, Ordering::Release);
            return;
        }
    }
}

struct HeadlessSink {
    state: Arc<SessionState>,
    held: Mutex<Option<TappedSource>>,
}

impl PlaybackSink for HeadlessSink {
    fn set_speed(&self, speed: f32) {
        self.state.speed.store(speed.to_bits(), Ordering::Release);
    }

    fn stop(&self) {
        self.state.connected.store(false, Ordering::Release);
        let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        held.take();
    }

    fn drained(&self) -> bool {
        !self.state.connected.load(Ordering::Acquire)
    }
}

impl Drop for HeadlessSink {
    fn drop(&mut self) {
        self.stop();
    }
}
