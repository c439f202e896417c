//! Voice configuration collaborator.
//!
//! The real client speaks an ElevenLabs-style HTTP API: voices are listed
//! and fetched under `/v1/voices` with an `xi-api-key` header. The mock
//! hands back a fixed placeholder profile.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::errors::ServiceError;
use crate::types::{ServiceVariant, VoiceProfile};

/// What the caller wants from voice configuration.
#[derive(Clone, Debug, Default)]
pub struct VoiceSelection {
    /// Specific voice to use; `None` picks the provider default.
    pub voice_id: Option<String>,
}

/// Configures the voice an agent speaks with.
#[async_trait]
pub trait VoiceService: Send + Sync {
    /// Which implementation this is.
    fn variant(&self) -> ServiceVariant;

    /// Cheap health check, called once at pipeline construction.
    async fn probe(&self) -> Result<(), ServiceError>;

    /// Resolve a selection into a concrete voice profile.
    async fn configure(&self, selection: &VoiceSelection) -> Result<VoiceProfile, ServiceError>;
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<ApiVoice>,
}

#[derive(Deserialize)]
struct ApiVoice {
    voice_id: String,
    name: String,
}

/// Real voice client.
pub struct ElevenLabsVoiceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ElevenLabsVoiceClient {
    /// Create a client against `base_url` with the given API key.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn list_voices(&self) -> Result<Vec<ApiVoice>, ServiceError> {
        let url = format!("{}/v1/voices", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Upstream {
                status: status.as_u16(),
                detail: status.canonical_reason().unwrap_or("voice list failed").into(),
            });
        }
        let body: VoicesResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
        Ok(body.voices)
    }
}

#[async_trait]
impl VoiceService for ElevenLabsVoiceClient {
    fn variant(&self) -> ServiceVariant {
        ServiceVariant::Real
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        if self.api_key.is_empty() {
            return Err(ServiceError::NotConfigured("voice api key".into()));
        }
        let _ = self.list_voices().await?;
        Ok(())
    }

    #[instrument(skip(self, selection))]
    async fn configure(&self, selection: &VoiceSelection) -> Result<VoiceProfile, ServiceError> {
        let voices = self.list_voices().await?;
        let chosen = match &selection.voice_id {
            Some(wanted) => voices
                .into_iter()
                .find(|v| &v.voice_id == wanted)
                .ok_or_else(|| ServiceError::NotFound(format!("voice {wanted}")))?,
            None => voices
                .into_iter()
                .next()
                .ok_or_else(|| ServiceError::InvalidResponse("no voices available".into()))?,
        };
        debug!(voice_id = %chosen.voice_id, "voice configured");
        Ok(VoiceProfile {
            voice_id: chosen.voice_id,
            display_name: chosen.name,
            provider: "elevenlabs".into(),
        })
    }
}

/// Mock voice client: fixed placeholder profile.
pub struct MockVoiceService;

#[async_trait]
impl VoiceService for MockVoiceService {
    fn variant(&self) -> ServiceVariant {
        ServiceVariant::Mock
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn configure(&self, selection: &VoiceSelection) -> Result<VoiceProfile, ServiceError> {
        Ok(VoiceProfile {
            voice_id: selection
                .voice_id
                .clone()
                .unwrap_or_else(|| "mock-default".into()),
            display_name: "Placeholder voice".into(),
            provider: "mock".into(),
        })
    }
}
