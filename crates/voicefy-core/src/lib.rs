//! # Voicefy Core
//!
//! Shared foundation for the Voicefy studio: configuration, supported languages,
//! the persona catalog, and the persistent audio library.

pub mod config;
pub mod error;
pub mod language;
pub mod library;
pub mod persona;

pub use config::{is_usable_credential, StudioConfig};
pub use error::{CoreError, CoreResult};
pub use language::Language;
pub use library::{Library, LibraryItem, LibraryRecord};
pub use persona::{
    Gender, PersonaCatalog, PersonaProfile, PersonaVoice, DEFAULT_PERSONA, FALLBACK_STYLE,
    FALLBACK_VOICE, REFINE_FALLBACK_STYLE,
};
