//! Supported output languages and their built-in sample texts.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Tamil,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::English, Language::Tamil];

    /// Name used in prompts and on screen.
    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Tamil => "Tamil",
        }
    }

    /// Text offered when the editor is empty.
    pub fn sample_text(&self) -> &'static str {
        match self {
            Language::English => {
                "The future belongs to those who believe in the beauty of their dreams."
            }
            Language::Tamil => {
                "வாழ்க்கை என்பது ஒரு வட்டம். அதில் ஜெயிக்கிறவன் தோற்பான், தோற்கிறவன் ஜெயிப்பான்!"
            }
        }
    }

    /// True if `text` is one of the built-in samples (in any language).
    pub fn is_sample_text(text: &str) -> bool {
        let text = text.trim();
        Self::ALL.iter().any(|l| l.sample_text() == text)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|l| l.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownLanguage(s.to_string()))
    }
}
