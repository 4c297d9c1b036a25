//! Engine configuration.
//!
//! Settings are read once at startup from a JSON file. A missing file is not
//! an error: every field has a default, so a bare `Settings::default()` runs
//! with no monitoring, no priority extensions and no encryption. A file that
//! exists but does not parse (including an unknown backup type in the job
//! list) is a configuration error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::BackupType;

/// One configured backup mapping, as the CLI feeds it to the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub source: PathBuf,
    pub target: PathBuf,
    pub backup_type: BackupType,
}

/// Process-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Process name whose presence pauses all jobs. Empty/absent disables
    /// monitoring.
    pub business_process: Option<String>,

    /// Extensions granted preferential transfer admission.
    pub priority_extensions: Vec<String>,

    /// Transfers strictly larger than this many bytes are single-flight.
    /// 0 disables the rule.
    pub large_file_threshold: u64,

    /// External program invoked per file to encrypt. Absent disables
    /// encryption.
    pub encryption_program: Option<String>,

    /// Extensions of files handed to the encryption program after copy.
    pub encryption_extensions: Vec<String>,

    /// Jobs registered at startup.
    pub jobs: Vec<JobSpec>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            business_process: None,
            priority_extensions: Vec::new(),
            large_file_threshold: 0,
            encryption_program: None,
            encryption_extensions: Vec::new(),
            jobs: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    /// Returns `EngineError::SettingsInvalid` if the file exists but cannot
    /// be read or parsed.
    pub fn load(path: &Path) -> Result<Settings, EngineError> {
        if !path.exists() {
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| EngineError::SettingsInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|e| EngineError::SettingsInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let settings = Settings::load(&temp_dir.path().join("absent.json"))
            .expect("Missing file should default");

        assert!(settings.business_process.is_none());
        assert!(settings.priority_extensions.is_empty());
        assert_eq!(settings.large_file_threshold, 0);
        assert!(settings.jobs.is_empty());
    }

    #[test]
    fn test_partial_file_fills_remaining_defaults() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
                "business_process": "calc.exe",
                "priority_extensions": ["pri", "doc"]
            }"#,
        )
        .expect("Failed to write settings");

        let settings = Settings::load(&path).expect("Failed to load settings");
        assert_eq!(settings.business_process.as_deref(), Some("calc.exe"));
        assert_eq!(settings.priority_extensions, vec!["pri", "doc"]);
        assert_eq!(settings.large_file_threshold, 0);
        assert!(settings.encryption_program.is_none());
    }

    #[test]
    fn test_jobs_parse_with_backup_type() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
                "jobs": [
                    {"name": "docs", "source": "/s", "target": "/t", "backup_type": "complete"},
                    {"name": "mail", "source": "/m", "target": "/n", "backup_type": "differential"}
                ]
            }"#,
        )
        .expect("Failed to write settings");

        let settings = Settings::load(&path).expect("Failed to load settings");
        assert_eq!(settings.jobs.len(), 2);
        assert_eq!(settings.jobs[0].backup_type, BackupType::Complete);
        assert_eq!(settings.jobs[1].backup_type, BackupType::Differential);
    }

    #[test]
    fn test_unknown_backup_type_is_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"jobs": [{"name": "docs", "source": "/s", "target": "/t", "backup_type": "incremental"}]}"#,
        )
        .expect("Failed to write settings");

        let result = Settings::load(&path);
        assert!(matches!(result, Err(EngineError::SettingsInvalid { .. })));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "{not json").expect("Failed to write settings");

        assert!(Settings::load(&path).is_err());
    }
}
