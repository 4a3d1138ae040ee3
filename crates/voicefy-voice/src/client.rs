//! Lazily-connected handle to the remote collaborator.
//!
//! The handle owns the credential. Nothing is built until the first call that needs the network;
//! `reinitialize` swaps the credential and drops the cached client so the next call reconnects.

use crate::error::{VoiceError, VoiceResult};
use crate::gemini::GeminiClient;
use crate::tts::StudioBackend;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use voicefy_core::{is_usable_credential, StudioConfig};

/// Builds a backend for a credential.
pub type Connector = Box<dyn Fn(&str) -> VoiceResult<Arc<dyn StudioBackend>> + Send + Sync>;

pub struct ClientHandle {
    credential: Option<String>,
    connector: Connector,
    client: Option<Arc<dyn StudioBackend>>,
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("has_credential", &self.has_credential())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ClientHandle {
    pub fn new(credential: Option<String>, connector: Connector) -> Self {
        Self {
            credential: credential.filter(|c| is_usable_credential(c)),
            connector,
            client: None,
        }
    }

    /// Gemini-backed handle using the credential from `config`.
    pub fn gemini(config: &StudioConfig) -> Self {
        let cfg = config.clone();
        let connector: Connector =
            Box::new(move |key: &str| -> VoiceResult<Arc<dyn StudioBackend>> {
                Ok(Arc::new(GeminiClient::new(&cfg, key)?))
            });
        Self::new(config.credential().map(str::to_string), connector)
    }

    /// Handle that always hands out `backend` (credential still required).
    pub fn fixed(credential: Option<String>, backend: Arc<dyn StudioBackend>) -> Self {
        Self::new(credential, Box::new(move |_: &str| -> VoiceResult<Arc<dyn StudioBackend>> {
            Ok(Arc::clone(&backend))
        }))
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Fails with `Configuration` when no credential is set; connects on first use.
    pub fn get(&mut self) -> VoiceResult<Arc<dyn StudioBackend>> {
        let Some(credential) = self.credential.as_deref() else {
            return Err(VoiceError::Configuration("API_KEY_MISSING".to_string()));
        };
        if let Some(client) = &self.client {
            return Ok(Arc::clone(client));
        }
        let client = (self.connector)(credential)?;
        info!("🔌 remote client initialized");
        self.client = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Replace the credential; the next call builds a fresh client.
    pub fn reinitialize(&mut self, credential: Option<String>) {
        self.credential = credential.filter(|c| is_usable_credential(c));
        self.client = None;
        info!(has_credential = self.credential.is_some(), "remote client reset");
    }
}
