//! Configuration loading.
//!
//! Values come from `.env` (via dotenvy) and the process environment; the
//! CLI and HTTP front ends override them per run.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `ALMA_API_KEY` | required for fetching |
//! | `ALMA_REGION` | `na` |
//! | `ALMA_INSTITUTION_CODE` | derived per record, else `01GCL_INST` |
//! | `ALMA_EXPORT_DIR` | `exports` |
//! | `ALMA_LOG_DIR` | `logs` |

use std::env;
use std::path::PathBuf;

use crate::alma::Region;
use crate::dublin_core::FieldCatalog;
use crate::error::{ConfigError, ConfigResult};

pub const ENV_API_KEY: &str = "ALMA_API_KEY";
pub const ENV_REGION: &str = "ALMA_REGION";
pub const ENV_INSTITUTION: &str = "ALMA_INSTITUTION_CODE";
pub const ENV_EXPORT_DIR: &str = "ALMA_EXPORT_DIR";
pub const ENV_LOG_DIR: &str = "ALMA_LOG_DIR";

/// Process-level settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    pub api_key: Option<String>,
    pub region: Region,
    /// Fixed institution code; `None` derives it from each record.
    pub institution: Option<String>,
    pub export_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            region: Region::default(),
            institution: None,
            export_dir: PathBuf::from("exports"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl ExportConfig {
    /// Load `.env`, then read the environment.
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = Self::default();
        Ok(Self {
            api_key: get(ENV_API_KEY),
            region: match get(ENV_REGION) {
                Some(code) => code.parse()?,
                None => defaults.region,
            },
            institution: get(ENV_INSTITUTION),
            export_dir: get(ENV_EXPORT_DIR).map(PathBuf::from).unwrap_or(defaults.export_dir),
            log_dir: get(ENV_LOG_DIR).map(PathBuf::from).unwrap_or(defaults.log_dir),
        })
    }

    /// Override the API key when `key` is set and not blank.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key.trim().to_string());
        }
        self
    }

    pub fn with_region(mut self, region: Option<Region>) -> Self {
        if let Some(region) = region {
            self.region = region;
        }
        self
    }

    pub fn with_institution(mut self, institution: Option<String>) -> Self {
        if let Some(code) = institution.filter(|c| !c.trim().is_empty()) {
            self.institution = Some(code.trim().to_string());
        }
        self
    }

    pub fn with_export_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.export_dir = dir;
        }
        self
    }

    /// The API key, or [`ConfigError::MissingApiKey`].
    pub fn require_api_key(&self) -> ConfigResult<&str> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    /// Field catalog for this configuration's institution policy.
    pub fn catalog(&self) -> FieldCatalog {
        match &self.institution {
            Some(code) => FieldCatalog::for_institution(code.as_str()),
            None => FieldCatalog::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dublin_core::InstitutionPolicy;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExportConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ExportConfig::default());
        assert_eq!(config.require_api_key(), Err(ConfigError::MissingApiKey));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.export_dir, PathBuf::from("exports"));
    }

    #[test]
    fn test_reads_environment() {
        let config = ExportConfig::from_lookup(lookup(&[
            ("ALMA_API_KEY", " l8xx-secret "),
            ("ALMA_REGION", "EU"),
            ("ALMA_INSTITUTION_CODE", "01ABC_INST"),
            ("ALMA_EXPORT_DIR", "/tmp/exports"),
            ("ALMA_LOG_DIR", ""),
        ]))
        .unwrap();

        assert_eq!(config.require_api_key(), Ok("l8xx-secret"));
        assert_eq!(config.region, Region::Europe);
        assert_eq!(config.export_dir, PathBuf::from("/tmp/exports"));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(
            config.catalog().institution(),
            &InstitutionPolicy::Fixed("01ABC_INST".into())
        );
    }

    #[test]
    fn test_invalid_region() {
        let err = ExportConfig::from_lookup(lookup(&[("ALMA_REGION", "moon")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidRegion("moon".into()));
    }

    #[test]
    fn test_overrides() {
        let config = ExportConfig::default()
            .with_api_key(Some("cli-key".into()))
            .with_api_key(Some("   ".into()))
            .with_region(Some(Region::Canada))
            .with_institution(None)
            .with_export_dir(Some(PathBuf::from("out")));

        assert_eq!(config.api_key.as_deref(), Some("cli-key"));
        assert_eq!(config.region, Region::Canada);
        assert_eq!(config.institution, None);
        assert_eq!(config.export_dir, PathBuf::from("out"));
        assert!(matches!(config.catalog().institution(), InstitutionPolicy::FromRecord { .. }));
    }
}
