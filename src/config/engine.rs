// src/config/engine.rs
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

use crate::error::ConfigError;
use crate::location::District;

pub const DEFAULT_ENGINE_CONFIG_PATH: &str = "config/engine.toml";
pub const ENV_ENGINE_CONFIG_PATH: &str = "CRISIS_ENGINE_CONFIG";
pub const ENV_MAX_LOCATION_RETRIES: &str = "CRISIS_MAX_LOCATION_RETRIES";
pub const ENV_FUZZY_MIN_SCORE: &str = "CRISIS_FUZZY_MIN_SCORE";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub resolver: ResolverConfig,
    pub retry: RetryConfig,
    pub history: HistoryConfig,
    pub nlu: NluConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum fuzzy score for a match (and for tied suggestions).
    pub min_score: f64,
    /// Band boundary: accepted silently at or above.
    pub accept_score: f64,
    /// Band boundary: accepted with confirmation at or above.
    pub confirm_score: f64,
    /// Near misses at or above this are offered when nothing clears `min_score`.
    pub suggestion_floor: f64,
    pub max_suggestions: usize,
    /// Canonical name used when a Berlin GPS fix matches nothing.
    pub gps_fallback_district: String,
    pub gps_fallback_confidence: f64,
    /// Word-window matching only for aliases at least this long.
    pub min_window_alias_len: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_score: 0.7,
            accept_score: 0.8,
            confirm_score: 0.6,
            suggestion_floor: 0.5,
            max_suggestions: 3,
            gps_fallback_district: "Mitte".to_string(),
            gps_fallback_confidence: 0.6,
            min_window_alias_len: 5,
        }
    }
}

impl ResolverConfig {
    /// Validated by `sanitize`, so Mitte is only reached for a hand-built config
    /// that skipped loading.
    pub fn fallback_district(&self) -> District {
        self.gps_fallback_district.parse().unwrap_or(District::Mitte)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Recent entries scanned for "already asked/shown" markers.
    pub idempotency_window: usize,
    /// Recent entries scanned for a location prompt.
    pub location_window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            idempotency_window: 15,
            location_window: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NluConfig {
    /// Intents below this confidence are treated as `nlu_fallback`.
    pub fallback_threshold: f64,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            fallback_threshold: 0.3,
        }
    }
}

impl EngineConfig {
    /// Load from `$CRISIS_ENGINE_CONFIG` or `config/engine.toml`; a missing default
    /// file yields the built-in defaults. Env overrides are applied last.
    pub fn load() -> anyhow::Result<Self> {
        let explicit = env::var(ENV_ENGINE_CONFIG_PATH).ok().map(PathBuf::from);
        let mut cfg = match explicit {
            Some(path) => Self::load_from_file(&path)?,
            None => {
                let path = PathBuf::from(DEFAULT_ENGINE_CONFIG_PATH);
                if path.exists() {
                    Self::load_from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides()?;
        cfg.sanitize()?;
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading engine config from {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&content)
            .with_context(|| format!("parsing engine config {}", path.display()))?;
        cfg.sanitize()?;
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: EngineConfig = toml::from_str(s)?;
        cfg.sanitize()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(raw) = env::var(ENV_MAX_LOCATION_RETRIES) {
            self.retry.max_attempts =
                raw.trim().parse().map_err(|_| ConfigError::BadEnvValue {
                    var: ENV_MAX_LOCATION_RETRIES,
                    value: raw.clone(),
                })?;
        }
        if let Ok(raw) = env::var(ENV_FUZZY_MIN_SCORE) {
            self.resolver.min_score =
                raw.trim().parse().map_err(|_| ConfigError::BadEnvValue {
                    var: ENV_FUZZY_MIN_SCORE,
                    value: raw.clone(),
                })?;
        }
        Ok(())
    }

    /// Clamp scores to [0,1], keep band order, reject an unknown fallback district.
    fn sanitize(&mut self) -> Result<(), ConfigError> {
        let defaults = ResolverConfig::default();
        let r = &mut self.resolver;
        for (value, default) in [
            (&mut r.min_score, defaults.min_score),
            (&mut r.accept_score, defaults.accept_score),
            (&mut r.confirm_score, defaults.confirm_score),
            (&mut r.suggestion_floor, defaults.suggestion_floor),
            (&mut r.gps_fallback_confidence, defaults.gps_fallback_confidence),
        ] {
            if !value.is_finite() {
                *value = default;
            }
            *value = value.clamp(0.0, 1.0);
        }
        if r.confirm_score > r.accept_score {
            std::mem::swap(&mut r.confirm_score, &mut r.accept_score);
        }
        if r.suggestion_floor > r.min_score {
            r.suggestion_floor = r.min_score;
        }
        if r.max_suggestions == 0 {
            r.max_suggestions = defaults.max_suggestions;
        }
        r.gps_fallback_district
            .parse::<District>()
            .map_err(|e| ConfigError::UnknownFallbackDistrict(e.0))?;

        if self.retry.max_attempts == 0 {
            self.retry.max_attempts = 1;
        }
        if self.history.idempotency_window == 0 {
            self.history.idempotency_window = HistoryConfig::default().idempotency_window;
        }
        if self.history.location_window == 0 {
            self.history.location_window = HistoryConfig::default().location_window;
        }
        if !self.nlu.fallback_threshold.is_finite() {
            self.nlu.fallback_threshold = NluConfig::default().fallback_threshold;
        }
        self.nlu.fallback_threshold = self.nlu.fallback_threshold.clamp(0.0, 1.0);
        Ok(())
    }
}
