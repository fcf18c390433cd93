//! Configuration loading and validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::presets::{DEFAULT_PRESET, PresetCatalog};
use crate::types::{Theme, ViewMode};

/// Realtime application targeted by default.
pub const DEFAULT_APP: &str = "fal-ai/flux-2/klein";

/// Top-level Klein Realtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime: Option<RealtimeConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    /// Extra or replacement style presets, keyed by id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub presets: BTreeMap<String, String>,
}

/// Realtime connection settings used by the session's transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Base application id, without the trailing `/realtime`.
    #[serde(default = "default_app")]
    pub app: String,

    /// WebSocket origin of the realtime service.
    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,

    /// Credential endpoint that issues short-lived tokens.
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Minimum spacing between outbound frames (default: 64ms).
    #[serde(default = "default_throttle_interval_ms")]
    pub throttle_interval_ms: u64,

    /// Age after which a token is refreshed before sending (default: 110s).
    #[serde(default = "default_token_expiration_secs")]
    pub token_expiration_secs: u64,

    /// Label attached to the connection in logs.
    #[serde(default = "default_connection_key")]
    pub connection_key: String,
}

fn default_app() -> String {
    DEFAULT_APP.into()
}

fn default_ws_base_url() -> String {
    "wss://fal.run".into()
}

fn default_token_url() -> String {
    "http://127.0.0.1:3000/api/fal/realtime-token".into()
}

fn default_throttle_interval_ms() -> u64 {
    64
}

fn default_token_expiration_secs() -> u64 {
    110
}

fn default_connection_key() -> String {
    "klein-realtime".into()
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            app: default_app(),
            ws_base_url: default_ws_base_url(),
            token_url: default_token_url(),
            throttle_interval_ms: default_throttle_interval_ms(),
            token_expiration_secs: default_token_expiration_secs(),
            connection_key: default_connection_key(),
        }
    }
}

impl RealtimeConfig {
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    pub fn token_expiration(&self) -> Duration {
        Duration::from_secs(self.token_expiration_secs)
    }
}

/// Session controller tuning and initial UI state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Quiet period before a drawing burst is sent (default: 128ms).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Time a request may go unanswered before the UI resumes listening (default: 15s).
    #[serde(default = "default_watchdog_secs")]
    pub watchdog_secs: u64,

    /// Side length of the captured square frame (default: 704).
    #[serde(default = "default_capture_size")]
    pub capture_size: u32,

    /// JPEG quality of captured frames, 1-100 (default: 50).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default = "default_preset")]
    pub preset: String,

    #[serde(default)]
    pub theme: Theme,

    #[serde(default)]
    pub view_mode: ViewMode,

    /// Open the realtime connection at startup instead of on first send.
    #[serde(default)]
    pub connect_on_start: bool,
}

fn default_debounce_ms() -> u64 {
    128
}

fn default_watchdog_secs() -> u64 {
    15
}

fn default_capture_size() -> u32 {
    704
}

fn default_jpeg_quality() -> u8 {
    50
}

fn default_preset() -> String {
    DEFAULT_PRESET.into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            watchdog_secs: default_watchdog_secs(),
            capture_size: default_capture_size(),
            jpeg_quality: default_jpeg_quality(),
            preset: default_preset(),
            theme: Theme::default(),
            view_mode: ViewMode::default(),
            connect_on_start: false,
        }
    }
}

impl SessionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }
}

/// HTTP gateway (token proxy and static assets).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen port. Falls back to `$PORT`, then 3000.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Directory served as static assets.
    #[serde(default = "default_public_dir")]
    pub public_dir: String,

    /// Logo file served at `/falailogo.png`.
    #[serde(default = "default_logo_path")]
    pub logo_path: String,

    /// Upstream token issuance endpoint.
    #[serde(default = "default_token_api_url")]
    pub token_api_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fal_key: Option<String>,

    #[serde(default = "default_fal_key_env")]
    pub fal_key_env: Option<String>,

    /// Lifetime of issued tokens in seconds (default: 120).
    #[serde(default = "default_issued_token_expiration")]
    pub token_expiration_secs: u64,

    /// Per-IP issuance limit; 30 per minute when absent, 0 disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

fn default_public_dir() -> String {
    "public".into()
}

fn default_logo_path() -> String {
    "falailogo.png".into()
}

fn default_token_api_url() -> String {
    "https://rest.alpha.fal.ai/tokens/".into()
}

fn default_fal_key_env() -> Option<String> {
    Some("FAL_KEY".into())
}

fn default_issued_token_expiration() -> u64 {
    120
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: None,
            bind: None,
            public_dir: default_public_dir(),
            logo_path: default_logo_path(),
            token_api_url: default_token_api_url(),
            fal_key: None,
            fal_key_env: default_fal_key_env(),
            token_expiration_secs: default_issued_token_expiration(),
            rate_limit: None,
        }
    }
}

impl GatewayConfig {
    /// Resolve the server-held secret: direct value first, then the env var.
    pub fn resolve_fal_key(&self) -> Option<String> {
        resolve_secret_field(&self.fal_key, &self.fal_key_env)
    }
}

/// Token issuance rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Max tokens issued per client IP per minute (default: 30).
    #[serde(default = "default_max_tokens_per_minute")]
    pub max_tokens_per_minute: u32,
}

fn default_max_tokens_per_minute() -> u32 {
    30
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_minute: default_max_tokens_per_minute(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "klein_realtime=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_log_format() -> String {
    "plain".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
        }
    }
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::KleinError::Io)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::KleinError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Resolve the default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json5")
    }

    pub fn realtime(&self) -> RealtimeConfig {
        self.realtime.clone().unwrap_or_default()
    }

    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    pub fn gateway(&self) -> GatewayConfig {
        self.gateway.clone().unwrap_or_default()
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway
            .as_ref()
            .and_then(|g| g.port)
            .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(3000)
    }

    pub fn preset_catalog(&self) -> PresetCatalog {
        PresetCatalog::with_overrides(&self.presets)
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let gateway = self.gateway();
        if gateway.resolve_fal_key().is_none() {
            warnings.push(
                "No FAL key configured; the token endpoint will refuse requests".to_string(),
            );
        }
        if gateway.port == Some(0) {
            errors.push("Gateway port cannot be 0".to_string());
        }

        let session = self.session();
        if session.capture_size == 0 {
            errors.push("Capture size cannot be 0".to_string());
        }
        if !(1..=100).contains(&session.jpeg_quality) {
            errors.push(format!(
                "JPEG quality must be between 1 and 100, got {}",
                session.jpeg_quality
            ));
        }
        if session.watchdog_secs == 0 {
            errors.push("Watchdog timeout cannot be 0".to_string());
        }
        if !self.preset_catalog().contains(&session.preset) {
            warnings.push(format!(
                "Unknown preset '{}', '{DEFAULT_PRESET}' will be used",
                session.preset
            ));
        }

        let realtime = self.realtime();
        if !realtime.ws_base_url.starts_with("ws://") && !realtime.ws_base_url.starts_with("wss://") {
            errors.push(format!(
                "Realtime ws_base_url must start with ws:// or wss://, got {}",
                realtime.ws_base_url
            ));
        }

        (warnings, errors)
    }
}

/// Base directory for Klein data: `~/.klein/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".klein")
}
