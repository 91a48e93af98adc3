use crate::core::duplicate::Matcher;
use crate::core::index::SearchStrategy;
use crate::io::hashio::LoadOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_DIR: &str = "pdqcull";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Invalid config {path}: {error}")]
    Parse {
        path: PathBuf,
        #[source]
        error: serde_json::Error,
    },

    #[error("No distance threshold given; pass -d or set \"threshold\" in the config file")]
    MissingThreshold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub threshold: Option<u32>,
    pub dihedral: bool,
    pub min_cluster_size: usize,
    pub min_quality: Option<u32>,
    pub id_field: Option<String>,
    pub separate_clusters: bool,
    /// Compare every pair instead of going through the slot index.
    pub brute_force: bool,
    /// rayon pool size; rayon's own default when unset.
    pub parallel_workers: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold: None,
            dihedral: false,
            min_cluster_size: 1,
            min_quality: None,
            id_field: None,
            separate_clusters: false,
            brute_force: false,
            parallel_workers: None,
        }
    }
}

/// Values given on the command line. `None` leaves the file value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub threshold: Option<u32>,
    pub dihedral: Option<bool>,
    pub min_cluster_size: Option<usize>,
    pub min_quality: Option<u32>,
    pub id_field: Option<String>,
    pub separate_clusters: Option<bool>,
    pub brute_force: Option<bool>,
}

/// `--flag` / `--no-flag` pairs as an override: unset when neither is given.
pub fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Reads `explicit` when given (it must exist), otherwise the default
    /// path if there is a file there, otherwise built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => {
                    log::debug!("no config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let settings = serde_json::from_str(&text).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })?;
        log::debug!("loaded config from {}", path.display());
        Ok(settings)
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if overrides.threshold.is_some() {
            self.threshold = overrides.threshold;
        }
        if let Some(dihedral) = overrides.dihedral {
            self.dihedral = dihedral;
        }
        if let Some(size) = overrides.min_cluster_size {
            self.min_cluster_size = size;
        }
        if overrides.min_quality.is_some() {
            self.min_quality = overrides.min_quality;
        }
        if overrides.id_field.is_some() {
            self.id_field = overrides.id_field;
        }
        if let Some(separate) = overrides.separate_clusters {
            self.separate_clusters = separate;
        }
        if let Some(brute_force) = overrides.brute_force {
            self.brute_force = brute_force;
        }
        self
    }

    pub fn threshold(&self) -> Result<u32, ConfigError> {
        self.threshold.ok_or(ConfigError::MissingThreshold)
    }

    pub fn matcher(&self) -> Result<Matcher, ConfigError> {
        let strategy = if self.brute_force {
            SearchStrategy::LinearScan
        } else {
            SearchStrategy::Index
        };
        Ok(Matcher::new(self.threshold()?)
            .with_dihedral(self.dihedral)
            .with_strategy(strategy))
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            id_field: self.id_field.clone(),
            min_quality: self.min_quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_have_no_threshold() {
        let settings = Settings::default();
        assert_eq!(settings.min_cluster_size, 1);
        assert!(matches!(settings.threshold(), Err(ConfigError::MissingThreshold)));
        assert!(settings.matcher().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{ "threshold": 31, "id_field": "filename" }"#).unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.threshold().unwrap(), 31);
        assert_eq!(settings.min_cluster_size, 1);
        assert_eq!(settings.load_options().id_field.as_deref(), Some("filename"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = Settings {
            threshold: Some(31),
            min_cluster_size: 2,
            ..Settings::default()
        };
        let merged = file.apply(Overrides {
            threshold: Some(10),
            dihedral: Some(true),
            ..Overrides::default()
        });
        assert_eq!(merged.threshold, Some(10));
        assert_eq!(merged.min_cluster_size, 2);
        let matcher = merged.matcher().unwrap();
        assert_eq!(matcher.threshold(), 10);
        assert!(matcher.is_dihedral());
        assert_eq!(matcher.strategy(), SearchStrategy::Index);
    }

    #[test]
    fn test_cli_can_switch_file_flags_off() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "threshold": 31, "dihedral": true, "separate_clusters": true, "brute_force": true }"#,
        )
        .unwrap();
        let file = Settings::load(Some(&path)).unwrap();
        assert!(file.matcher().unwrap().is_dihedral());
        assert_eq!(file.matcher().unwrap().strategy(), SearchStrategy::LinearScan);

        let unchanged = file.clone().apply(Overrides::default());
        assert_eq!(unchanged, file);

        let merged = file.apply(Overrides {
            dihedral: switch(false, true),
            separate_clusters: switch(false, true),
            brute_force: Some(false),
            ..Overrides::default()
        });
        assert!(!merged.dihedral);
        assert!(!merged.separate_clusters);
        assert!(!merged.matcher().unwrap().is_dihedral());
        assert_eq!(merged.matcher().unwrap().strategy(), SearchStrategy::Index);
    }

    #[test]
    fn test_switch() {
        assert_eq!(switch(false, false), None);
        assert_eq!(switch(true, false), Some(true));
        assert_eq!(switch(false, true), Some(false));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp_dir = tempdir().unwrap();
        let err = Settings::load(Some(&temp_dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ threshold: ").unwrap();
        assert!(matches!(Settings::from_file(&path), Err(ConfigError::Parse { .. })));
    }
}
