//! Persona catalog: maps a persona id to the synthesis voice and style descriptor sent to the speech API.
//!
//! Loaded once from `data/personas.toml`. Lookups never fail: unmapped ids resolve to
//! [`FALLBACK_VOICE`] with the [`FALLBACK_STYLE`] descriptor.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Synthesis voice used for unmapped personas.
pub const FALLBACK_VOICE: &str = "Puck";
/// Style descriptor used for unmapped personas.
pub const FALLBACK_STYLE: &str = "Neutral";
/// Style used when refining text for an unmapped persona.
pub const REFINE_FALLBACK_STYLE: &str = "Clear and professional";
/// Persona selected when nothing else is chosen.
pub const DEFAULT_PERSONA: &str = "Base_Kore";

const BUILTIN_CATALOG: &str = include_str!("../data/personas.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Robot,
    Neutral,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Robot => "Robot",
            Gender::Neutral => "Neutral",
        };
        f.write_str(s)
    }
}

/// What the speech API needs for a persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaVoice {
    /// Prebuilt voice name (Fenrir, Charon, Puck, Kore, Zephyr).
    pub voice: String,
    /// Free-text delivery instructions.
    pub style: String,
}

/// Display metadata for personas offered in the selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonaProfile {
    pub id: String,
    pub name: String,
    pub gender: Gender,
    /// Short style label, e.g. "Wise & Deep".
    pub label: String,
    pub description: String,
}

impl PersonaProfile {
    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.label.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    featured: Vec<String>,
    #[serde(default)]
    persona: Vec<PersonaEntry>,
}

#[derive(Debug, Deserialize)]
struct PersonaEntry {
    id: String,
    voice: String,
    style: String,
    name: Option<String>,
    gender: Option<Gender>,
    label: Option<String>,
    description: Option<String>,
}

/// Immutable persona table.
#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    voices: HashMap<String, PersonaVoice>,
    profiles: HashMap<String, PersonaProfile>,
    featured: Vec<String>,
    fallback: PersonaVoice,
}

impl PersonaCatalog {
    /// The catalog shipped with the crate.
    pub fn builtin() -> CoreResult<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// Parse a catalog. Duplicate ids and featured ids without display metadata are rejected.
    pub fn from_toml_str(raw: &str) -> CoreResult<Self> {
        let file: CatalogFile = toml::from_str(raw)?;
        let mut voices = HashMap::with_capacity(file.persona.len());
        let mut profiles = HashMap::new();

        for entry in file.persona {
            if voices.contains_key(&entry.id) {
                return Err(CoreError::Catalog(format!("duplicate persona id {}", entry.id)));
            }
            if let (Some(name), Some(gender), Some(label), Some(description)) =
                (entry.name, entry.gender, entry.label, entry.description)
            {
                profiles.insert(
                    entry.id.clone(),
                    PersonaProfile {
                        id: entry.id.clone(),
                        name,
                        gender,
                        label,
                        description,
                    },
                );
            }
            voices.insert(
                entry.id,
                PersonaVoice {
                    voice: entry.voice,
                    style: entry.style,
                },
            );
        }

        let mut seen = HashSet::new();
        for id in &file.featured {
            if !profiles.contains_key(id) {
                return Err(CoreError::Catalog(format!(
                    "featured persona {} has no display metadata",
                    id
                )));
            }
            if !seen.insert(id.as_str()) {
                return Err(CoreError::Catalog(format!("persona {} featured twice", id)));
            }
        }

        tracing::debug!(
            personas = voices.len(),
            featured = file.featured.len(),
            "persona catalog loaded"
        );

        Ok(Self {
            voices,
            profiles,
            featured: file.featured,
            fallback: PersonaVoice {
                voice: FALLBACK_VOICE.to_string(),
                style: FALLBACK_STYLE.to_string(),
            },
        })
    }

    /// Voice and style for `id`; the fallback mapping when `id` is unknown.
    pub fn resolve(&self, id: &str) -> &PersonaVoice {
        self.voices.get(id).unwrap_or(&self.fallback)
    }

    /// Style used when rewriting text for `id`.
    pub fn refine_style(&self, id: &str) -> &str {
        self.voices
            .get(id)
            .map(|v| v.style.as_str())
            .unwrap_or(REFINE_FALLBACK_STYLE)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.voices.contains_key(id)
    }

    pub fn profile(&self, id: &str) -> Option<&PersonaProfile> {
        self.profiles.get(id)
    }

    /// Featured personas in display order.
    pub fn featured(&self) -> impl Iterator<Item = &PersonaProfile> + '_ {
        self.featured.iter().filter_map(|id| self.profiles.get(id))
    }

    /// Featured personas whose name, label or description contains `query` (case-insensitive).
    /// An empty query returns every featured persona.
    pub fn search(&self, query: &str) -> Vec<&PersonaProfile> {
        let needle = query.trim().to_lowercase();
        self.featured()
            .filter(|p| needle.is_empty() || p.matches(&needle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}
