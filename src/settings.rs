use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::scoring::EngagementWeights;

pub const DB_PATH_ENV: &str = "ENGAGE_DB_PATH";
pub const STORE_TIMEOUT_ENV: &str = "ENGAGE_STORE_TIMEOUT_MS";
pub const LOG_LEVEL_ENV: &str = "ENGAGE_LOG_LEVEL";

const DEFAULT_STORE_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_AUTH_SESSION_DAYS: i64 = 7;
const MAX_AUTH_SESSION_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub db_path: PathBuf,
    /// Upper bound on every store call before it fails as unavailable.
    pub store_timeout_ms: u64,
    pub log_level: String,
    pub auth_session_lifetime_days: i64,
    pub engagement: EngagementWeights,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("engagement.sqlite3"),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            log_level: "info".into(),
            auth_session_lifetime_days: DEFAULT_AUTH_SESSION_DAYS,
            engagement: EngagementWeights::default(),
        }
    }
}

impl TrackerSettings {
    /// Reads `path` if it exists, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse settings in {}", path.display()))?
            }
            _ => TrackerSettings::default(),
        };

        base.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by the `ENGAGE_*` variable names.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(DB_PATH_ENV).filter(|value| !value.trim().is_empty()) {
            self.db_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(STORE_TIMEOUT_ENV) {
            self.store_timeout_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{STORE_TIMEOUT_ENV} must be milliseconds, got {raw:?}"))?;
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|value| !value.trim().is_empty()) {
            self.log_level = level.trim().to_string();
        }
        Ok(self)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms.max(1))
    }

    /// Configured lifetime, clamped to `0..=36_500` days.
    pub fn auth_session_lifetime(&self) -> ChronoDuration {
        ChronoDuration::days(
            self.auth_session_lifetime_days
                .clamp(0, MAX_AUTH_SESSION_DAYS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let settings = TrackerSettings::load(Some(&dir.path().join("absent.json")))
            .unwrap()
            .with_overrides(|_| None)
            .unwrap();
        assert_eq!(settings.store_timeout(), Duration::from_secs(15));
        assert_eq!(settings.auth_session_lifetime(), ChronoDuration::days(7));
        assert_eq!(settings.engagement, EngagementWeights::default());
    }

    #[test]
    fn file_values_survive_a_save_and_partial_files_fill_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "store_timeout_ms": 250 }"#).unwrap();

        let settings: TrackerSettings =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(settings.store_timeout_ms, 250);
        assert_eq!(settings.log_level, "info");

        settings.save(&path).unwrap();
        let reloaded: TrackerSettings =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reloaded.store_timeout_ms, 250);
    }

    #[test]
    fn environment_overrides_win() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (DB_PATH_ENV, "/tmp/override.sqlite3"),
            (STORE_TIMEOUT_ENV, "500"),
            (LOG_LEVEL_ENV, "debug"),
        ]);
        let settings = TrackerSettings::default()
            .with_overrides(|key| vars.get(key).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(settings.db_path, PathBuf::from("/tmp/override.sqlite3"));
        assert_eq!(settings.store_timeout(), Duration::from_millis(500));
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn session_lifetime_is_clamped() {
        let huge = TrackerSettings {
            auth_session_lifetime_days: i64::MAX,
            ..TrackerSettings::default()
        };
        assert_eq!(huge.auth_session_lifetime(), ChronoDuration::days(36_500));

        let negative = TrackerSettings {
            auth_session_lifetime_days: -3,
            ..TrackerSettings::default()
        };
        assert_eq!(negative.auth_session_lifetime(), ChronoDuration::zero());
    }

    #[test]
    fn malformed_timeout_is_rejected() {
        let result = TrackerSettings::default()
            .with_overrides(|key| (key == STORE_TIMEOUT_ENV).then(|| "soon".to_string()));
        assert!(result.is_err());
    }
}
