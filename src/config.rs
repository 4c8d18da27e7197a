//! Application-level configuration loading: round timings from JSON, backends from the environment.

use std::{env, fmt, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CINESCORE_CONFIG_PATH";

/// Round timings and provider bounds shared across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Dwell on the reveal screen before auto-advancing.
    pub reveal_dwell: Duration,
    /// Time a claimant has to submit an answer.
    pub answer_window: Duration,
    /// How long a wrong-guess message stays visible.
    pub feedback_clear: Duration,
    /// Upper bound on a single judging call.
    pub judge_timeout: Duration,
    /// Upper bound on a single media lookup.
    pub media_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reveal_dwell: Duration::from_secs(8),
            answer_window: Duration::from_secs(20),
            feedback_clear: Duration::from_secs(3),
            judge_timeout: Duration::from_secs(15),
            media_timeout: Duration::from_secs(8),
        }
    }
}

/// Environment variable holding the identity signing secret.
const IDENTITY_SECRET_ENV: &str = "CINESCORE_IDENTITY_SECRET";
/// Default identity token lifetime.
const DEFAULT_IDENTITY_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// How identity tokens are signed and how long they live.
#[derive(Clone)]
pub struct IdentitySettings {
    /// HMAC secret; every replica sharing a store must use the same one.
    pub secret: String,
    /// Token lifetime.
    pub ttl: Duration,
}

impl IdentitySettings {
    /// Random per-process secret, only suitable for a single instance.
    pub fn ephemeral() -> Self {
        Self {
            secret: format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
            ttl: DEFAULT_IDENTITY_TTL,
        }
    }
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self::ephemeral()
    }
}

impl fmt::Debug for IdentitySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySettings")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Round timings.
    pub timings: Timings,
    /// Identity token signing.
    pub identity: IdentitySettings,
}

impl AppConfig {
    /// Load the application configuration: timings from disk, the identity secret from
    /// `CINESCORE_IDENTITY_SECRET`.
    pub fn load() -> Self {
        let mut config = Self::load_file();
        match env::var(IDENTITY_SECRET_ENV) {
            Ok(secret) if !secret.trim().is_empty() => config.identity.secret = secret,
            _ => warn!(
                "{IDENTITY_SECRET_ENV} not set; identity tokens will not survive a restart \
                 or be accepted by other replicas"
            ),
        }
        config
    }

    fn load_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        timings = ?app_config.timings,
                        "loaded round timings from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    timings: RawTimings,
    identity_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
/// Millisecond timings; missing entries keep their defaults.
struct RawTimings {
    reveal_dwell_ms: Option<u64>,
    answer_window_ms: Option<u64>,
    feedback_clear_ms: Option<u64>,
    judge_timeout_ms: Option<u64>,
    media_timeout_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Timings::default();
        let raw = &value.timings;
        let pick = |ms: Option<u64>, fallback: Duration| ms.map(Duration::from_millis).unwrap_or(fallback);
        Self {
            timings: Timings {
                reveal_dwell: pick(raw.reveal_dwell_ms, defaults.reveal_dwell),
                answer_window: pick(raw.answer_window_ms, defaults.answer_window),
                feedback_clear: pick(raw.feedback_clear_ms, defaults.feedback_clear),
                judge_timeout: pick(raw.judge_timeout_ms, defaults.judge_timeout),
                media_timeout: pick(raw.media_timeout_ms, defaults.media_timeout),
            },
            identity: IdentitySettings {
                ttl: value
                    .identity_ttl_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_IDENTITY_TTL),
                ..IdentitySettings::ephemeral()
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Fatal startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `STORE_BACKEND` names a backend this binary does not know or was not built with.
    #[error("unsupported STORE_BACKEND `{0}` (expected memory, mongo or couch)")]
    UnknownBackend(String),
}

/// Which [`SessionStore`](crate::dao::session_store::SessionStore) implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store; state is lost on restart.
    Memory,
    /// MongoDB (`MONGO_URI`, `MONGO_DB`).
    #[cfg(feature = "mongo-store")]
    Mongo,
    /// CouchDB (`COUCH_BASE_URL`, `COUCH_DB`, optional credentials).
    #[cfg(feature = "couch-store")]
    Couch,
}

impl StoreBackend {
    /// Read `STORE_BACKEND`, defaulting to the first durable backend compiled in.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var("STORE_BACKEND") {
            Ok(value) => Self::parse(&value),
            Err(_) => Ok(Self::default_backend()),
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            #[cfg(feature = "mongo-store")]
            "mongo" | "mongodb" => Ok(Self::Mongo),
            #[cfg(feature = "couch-store")]
            "couch" | "couchdb" => Ok(Self::Couch),
            other => Err(ConfigError::UnknownBackend(other.to_owned())),
        }
    }

    #[allow(unreachable_code)]
    fn default_backend() -> Self {
        #[cfg(feature = "mongo-store")]
        return Self::Mongo;
        #[cfg(all(not(feature = "mongo-store"), feature = "couch-store"))]
        return Self::Couch;
        Self::Memory
    }
}

/// Credentials for external providers; every entry is optional.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    /// Gemini API key used by the judge.
    pub gemini_api_key: Option<String>,
    /// Gemini model override.
    pub gemini_model: Option<String>,
    /// TMDB API key used for cover art.
    pub tmdb_api_key: Option<String>,
}

impl ProviderKeys {
    /// Read provider keys, treating empty values as absent.
    pub fn from_env() -> Self {
        let read = |var: &str| env::var(var).ok().filter(|value| !value.trim().is_empty());
        Self {
            gemini_api_key: read("GEMINI_API_KEY"),
            gemini_model: read("GEMINI_MODEL"),
            tmdb_api_key: read("TMDB_API_KEY"),
        }
    }
}
