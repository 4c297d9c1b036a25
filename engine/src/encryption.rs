//! Encryption hand-off.
//!
//! The engine never implements encryption itself; after a file is copied the
//! job asks an `EncryptionGate` whether the destination copy must be
//! encrypted and, if so, hands it off and records the elapsed time. The
//! shipped production gate shells out to an external program per file.

use std::collections::HashSet;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

use log::warn;

/// Decides whether a copied file must be encrypted and performs the hand-off.
pub trait EncryptionGate: Send + Sync {
    /// True when the file at `path` must be encrypted after copy.
    fn should_encrypt(&self, path: &Path) -> bool;

    /// Encrypt the file in place.
    ///
    /// Returns the elapsed wall-clock milliseconds (at least 1 on success),
    /// or 0 when encryption failed.
    fn encrypt(&self, path: &Path) -> u64;
}

/// Gate that never encrypts anything.
#[derive(Debug, Default)]
pub struct NoEncryption;

impl EncryptionGate for NoEncryption {
    fn should_encrypt(&self, _path: &Path) -> bool {
        false
    }

    fn encrypt(&self, _path: &Path) -> u64 {
        0
    }
}

/// Gate that invokes an external program (`program <file>`) for files whose
/// extension is in the configured set.
///
/// The program is trusted to encrypt in place; its exit status is the only
/// feedback. A spawn failure or nonzero exit reports 0 elapsed milliseconds.
pub struct CommandEncryptor {
    program: String,
    /// Lower-cased extensions, no leading dot.
    extensions: HashSet<String>,
}

impl CommandEncryptor {
    pub fn new<I, S>(program: &str, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        CommandEncryptor {
            program: program.to_string(),
            extensions,
        }
    }
}

impl EncryptionGate for CommandEncryptor {
    fn should_encrypt(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    fn encrypt(&self, path: &Path) -> u64 {
        let started = Instant::now();
        match Command::new(&self.program).arg(path).status() {
            Ok(status) if status.success() => (started.elapsed().as_millis() as u64).max(1),
            Ok(status) => {
                warn!(
                    "encryption program '{}' exited with {} for {}",
                    self.program,
                    status,
                    path.display()
                );
                0
            }
            Err(e) => {
                warn!(
                    "failed to run encryption program '{}' for {}: {}",
                    self.program,
                    path.display(),
                    e
                );
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_encryption_never_matches() {
        let gate = NoEncryption;
        assert!(!gate.should_encrypt(Path::new("/data/secret.key")));
        assert_eq!(gate.encrypt(Path::new("/data/secret.key")), 0);
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        let gate = CommandEncryptor::new("true", [".key", "PEM"]);
        assert!(gate.should_encrypt(Path::new("/data/a.key")));
        assert!(gate.should_encrypt(Path::new("/data/a.KEY")));
        assert!(gate.should_encrypt(Path::new("/data/a.pem")));
        assert!(!gate.should_encrypt(Path::new("/data/a.txt")));
        assert!(!gate.should_encrypt(Path::new("/data/no_extension")));
    }

    #[test]
    #[cfg(unix)]
    fn test_successful_program_reports_elapsed() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("a.key");
        std::fs::write(&file, b"data").expect("Failed to write file");

        let gate = CommandEncryptor::new("true", ["key"]);
        assert!(gate.encrypt(&file) >= 1);
    }

    #[test]
    #[cfg(unix)]
    fn test_failing_program_reports_zero() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("a.key");
        std::fs::write(&file, b"data").expect("Failed to write file");

        let gate = CommandEncryptor::new("false", ["key"]);
        assert_eq!(gate.encrypt(&file), 0);
    }

    #[test]
    fn test_missing_program_reports_zero() {
        let gate = CommandEncryptor::new("mirrorsafe-no-such-program", ["key"]);
        assert_eq!(gate.encrypt(Path::new("/data/a.key")), 0);
    }
}
