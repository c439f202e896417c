//! Layered configuration.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ChimeSettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `CHIME_*` overrides (highest priority)

use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChimeSettings {
    /// HTTP/WebSocket server.
    pub server: ServerSettings,
    /// Pipeline tunables.
    pub pipeline: PipelineSettings,
    /// Crawler client.
    pub crawler: CrawlerSettings,
    /// Voice client credentials.
    pub voice: VoiceSettings,
    /// Phone client credentials.
    pub phone: PhoneSettings,
    /// Agent store location.
    pub store: StoreSettings,
}

/// Server bind configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
}

/// Pipeline timing and sizing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Wall-clock budget per run, seconds.
    pub budget_secs: u64,
    /// Remaining-time threshold that triggers a timeout warning, seconds.
    pub warning_threshold_secs: u64,
    /// Completed progress sessions older than this are swept, hours.
    pub session_ttl_hours: u64,
    /// Concurrent `create_agent` runs the process will accept.
    pub max_concurrent_runs: usize,
    /// Confidence floor for knowledge-base merging.
    pub min_confidence: f64,
    /// Serialized knowledge-base size cap, bytes.
    pub max_kb_bytes: usize,
}

/// Crawler limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrawlerSettings {
    /// Pages visited per site, including the root.
    pub max_pages: usize,
}

/// Voice provider access.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceSettings {
    /// API base URL.
    pub base_url: String,
    /// API key; absent means the voice service starts degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Phone provider access.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhoneSettings {
    /// API base URL.
    pub base_url: String,
    /// Account SID; absent means the phone service starts degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_sid: Option<String>,
    /// Auth token paired with the account SID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Agent store location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// `SQLite` database path.
    pub db_path: String,
}

impl Default for ChimeSettings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            pipeline: PipelineSettings::default(),
            crawler: CrawlerSettings::default(),
            voice: VoiceSettings::default(),
            phone: PhoneSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8090,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            budget_secs: 180,
            warning_threshold_secs: 30,
            session_ttl_hours: 24,
            max_concurrent_runs: 8,
            min_confidence: 0.5,
            max_kb_bytes: 64 * 1024,
        }
    }
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self { max_pages: 5 }
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".into(),
            api_key: None,
        }
    }
}

impl Default for PhoneSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.twilio.com".into(),
            account_sid: None,
            auth_token: None,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "chime.db".into(),
        }
    }
}

/// Recursively merge `overlay` onto `base`. Objects merge key-by-key;
/// everything else is replaced by the overlay value.
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Load settings from a JSON file, merged over defaults, with env overrides.
///
/// A missing file is not an error; defaults plus env apply.
pub fn load_settings_from_path(path: &Path) -> Result<ChimeSettings, serde_json::Error> {
    let defaults = serde_json::to_value(ChimeSettings::default())?;
    let merged = match std::fs::read_to_string(path) {
        Ok(contents) => deep_merge(defaults, serde_json::from_str(&contents)?),
        Err(_) => defaults,
    };
    let mut settings: ChimeSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn apply_env_overrides(settings: &mut ChimeSettings) {
    if let Ok(port) = std::env::var("CHIME_PORT") {
        if let Ok(port) = port.parse() {
            settings.server.port = port;
        }
    }
    if let Ok(budget) = std::env::var("CHIME_BUDGET_SECS") {
        if let Ok(budget) = budget.parse() {
            settings.pipeline.budget_secs = budget;
        }
    }
    if let Ok(key) = std::env::var("CHIME_VOICE_API_KEY") {
        settings.voice.api_key = Some(key);
    }
    if let Ok(sid) = std::env::var("CHIME_PHONE_ACCOUNT_SID") {
        settings.phone.account_sid = Some(sid);
    }
    if let Ok(token) = std::env::var("CHIME_PHONE_AUTH_TOKEN") {
        settings.phone.auth_token = Some(token);
    }
    if let Ok(path) = std::env::var("CHIME_DB_PATH") {
        settings.store.db_path = path;
    }
}

/// Global settings singleton.
///
/// `RwLock<Option<Arc<..>>>` rather than `OnceLock` so the cached value
/// can be swapped when settings are reloaded. Reads are a shared lock
/// plus an `Arc::clone`.
static SETTINGS: RwLock<Option<Arc<ChimeSettings>>> = RwLock::new(None);

/// Get the global settings instance, initializing with defaults on first use.
pub fn get_settings() -> Arc<ChimeSettings> {
    {
        let guard = SETTINGS.read().expect("settings lock poisoned");
        if let Some(ref s) = *guard {
            return Arc::clone(s);
        }
    }
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }
    let mut defaults = ChimeSettings::default();
    apply_env_overrides(&mut defaults);
    let settings = Arc::new(defaults);
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Replace the global settings with a specific value.
pub fn init_settings(settings: ChimeSettings) {
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(Arc::new(settings));
}

#[cfg(test)]
pub(crate) fn reset_settings() {
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = None;
}
