//! Bounded most-recently-used history of generations.
//!
//! One `VecDeque` serves as both the display list (front = newest) and the cache index.
//! A request matches an entry when text, persona and language are identical and the
//! speeds differ by at most [`SPEED_TOLERANCE`].

use crate::audio::SampleBuffer;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;
use voicefy_core::{Language, DEFAULT_PERSONA};

pub const DEFAULT_CAPACITY: usize = 10;
/// Speeds within this distance reuse the same audio.
pub const SPEED_TOLERANCE: f32 = 0.1;
// absorbs f32 representation error so 1.0 vs 1.1 still matches
const SPEED_EPSILON: f32 = 1e-4;

/// What the user asked for. Identity key for the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub text: String,
    pub persona: String,
    pub language: Language,
    pub speed: f32,
    /// High quality (slower model) vs turbo.
    pub high_quality: bool,
}

impl GenerationRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            persona: DEFAULT_PERSONA.to_string(),
            language: Language::default(),
            speed: 1.0,
            high_quality: true,
        }
    }

    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn high_quality(mut self, high_quality: bool) -> Self {
        self.high_quality = high_quality;
        self
    }

    /// Cache equivalence. The quality flag is not part of the identity.
    pub fn matches(&self, other: &GenerationRequest) -> bool {
        self.text == other.text
            && self.persona == other.persona
            && self.language == other.language
            && (self.speed - other.speed).abs() <= SPEED_TOLERANCE + SPEED_EPSILON
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub request: GenerationRequest,
    pub created_at: DateTime<Utc>,
    /// `None` when the audio is not held in memory (such entries never satisfy a cache probe).
    pub buffer: Option<Arc<SampleBuffer>>,
}

impl HistoryEntry {
    pub fn new(request: GenerationRequest, buffer: Option<Arc<SampleBuffer>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            created_at: Utc::now(),
            buffer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl History {
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }

    pub fn get(&self, id: Uuid) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Index of the first entry with audio whose request matches.
    pub fn find_match(&self, request: &GenerationRequest) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.buffer.is_some() && e.request.matches(request))
    }

    /// Move the entry at `index` to the front.
    pub fn promote(&mut self, index: usize) -> Option<&HistoryEntry> {
        let entry = self.entries.remove(index)?;
        self.entries.push_front(entry);
        self.entries.front()
    }

    pub fn promote_id(&mut self, id: Uuid) -> Option<&HistoryEntry> {
        let index = self.position(id)?;
        self.promote(index)
    }

    /// Insert at the front; returns the evicted oldest entry, if any.
    pub fn push_front(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> Option<Arc<SampleBuffer>> {
        Some(Arc::new(SampleBuffer::mono(24_000, vec![0.0; 4]).unwrap()))
    }

    fn entry(text: &str) -> HistoryEntry {
        HistoryEntry::new(GenerationRequest::new(text), buffer())
    }

    #[test]
    fn bounded_to_capacity_newest_first() {
        let mut h = History::default();
        for i in 0..15 {
            h.push_front(entry(&format!("t{}", i)));
        }
        assert_eq!(h.len(), 10);
        let texts: Vec<_> = h.iter().map(|e| e.request.text.clone()).collect();
        assert_eq!(texts.first().unwrap(), "t14");
        assert_eq!(texts.last().unwrap(), "t5");
    }

    #[test]
    fn promote_moves_without_duplicating() {
        let mut h = History::default();
        for i in 0..5 {
            h.push_front(entry(&format!("t{}", i)));
        }
        let id = h.iter().nth(3).unwrap().id;
        assert_eq!(h.promote_id(id).unwrap().id, id);
        assert_eq!(h.len(), 5);
        assert_eq!(h.position(id), Some(0));
        assert_eq!(h.iter().filter(|e| e.id == id).count(), 1);
        assert!(h.promote_id(Uuid::new_v4()).is_none());
    }

    #[test]
    fn speed_tolerance_is_inclusive() {
        let base = GenerationRequest::new("hi").speed(1.0);
        assert!(base.matches(&GenerationRequest::new("hi").speed(1.1)));
        assert!(base.matches(&GenerationRequest::new("hi").speed(0.9)));
        assert!(!base.matches(&GenerationRequest::new("hi").speed(1.2)));
        assert!(!base.matches(&GenerationRequest::new("hi").speed(1.0).persona("Char_Robot")));
        assert!(!base.matches(&GenerationRequest::new("hi").language(Language::Tamil)));
        assert!(base.matches(&GenerationRequest::new("hi").high_quality(false)));
    }

    #[test]
    fn entries_without_audio_never_match() {
        let mut h = History::default();
        h.push_front(HistoryEntry::new(GenerationRequest::new("hi"), None));
        assert!(h.find_match(&GenerationRequest::new("hi")).is_none());
        h.push_front(entry("hi"));
        assert_eq!(h.find_match(&GenerationRequest::new("hi")), Some(0));
    }
}
