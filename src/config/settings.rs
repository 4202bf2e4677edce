use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::{KdfParams, PBKDF2_DEFAULT_ITERATIONS};
use crate::errors::{PassCliError, Result};

/// Environment variable overriding the audit log location.
pub const ENV_AUDIT_LOG: &str = "PASS_CLI_AUDIT_LOG";

/// Environment variable overriding PBKDF2 iterations. Values below
/// the default floor are rejected so the KDF can never be weakened.
pub const ENV_KDF_ITERATIONS: &str = "PASS_CLI_KDF_ITERATIONS";

/// Project-level configuration, loaded from `.pass-cli.toml`.
///
/// Every field has a sensible default so pass-cli works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// KDF for new vaults: "pbkdf2-sha256" (default) or "argon2id".
    #[serde(default = "default_kdf_algorithm")]
    pub kdf_algorithm: String,

    /// PBKDF2 iteration count for new vaults (default: 600 000).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Whether new vaults enable audit logging (default: true).
    #[serde(default = "default_audit_enabled")]
    pub audit_enabled: bool,

    /// Audit log path override. Defaults to `<vault-dir>/audit.log`.
    #[serde(default)]
    pub audit_log_path: Option<String>,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_kdf_algorithm() -> String {
    "pbkdf2-sha256".to_string()
}

fn default_kdf_iterations() -> u32 {
    PBKDF2_DEFAULT_ITERATIONS
}

fn default_audit_enabled() -> bool {
    true
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            kdf_algorithm: default_kdf_algorithm(),
            kdf_iterations: default_kdf_iterations(),
            audit_enabled: default_audit_enabled(),
            audit_log_path: None,
        }
    }
}

impl Settings {
    /// Name of the config file we look for.
    const FILE_NAME: &'static str = ".pass-cli.toml";

    /// Load settings from `<dir>/.pass-cli.toml`, then apply
    /// environment overrides.
    ///
    /// A missing file yields the defaults; a file that exists but
    /// cannot be parsed is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        let mut settings = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str(&contents).map_err(|e| {
                PassCliError::ConfigError(format!(
                    "Failed to parse {}: {e}",
                    config_path.display()
                ))
            })?
        } else {
            Self::default()
        };

        settings.apply_env_overrides()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var(ENV_AUDIT_LOG) {
            if !path.is_empty() {
                self.audit_log_path = Some(path);
            }
        }

        if let Ok(raw) = std::env::var(ENV_KDF_ITERATIONS) {
            if !raw.is_empty() {
                let iterations: u32 = raw.parse().map_err(|_| {
                    PassCliError::ConfigError(format!(
                        "{ENV_KDF_ITERATIONS} must be an integer, got '{raw}'"
                    ))
                })?;
                if iterations < PBKDF2_DEFAULT_ITERATIONS {
                    return Err(PassCliError::ConfigError(format!(
                        "{ENV_KDF_ITERATIONS} must be at least {PBKDF2_DEFAULT_ITERATIONS}"
                    )));
                }
                self.kdf_iterations = iterations;
            }
        }

        Ok(())
    }

    /// Convert the settings into crypto-layer KDF params.
    pub fn kdf_params(&self) -> Result<KdfParams> {
        match self.kdf_algorithm.as_str() {
            "pbkdf2-sha256" => Ok(KdfParams::pbkdf2(self.kdf_iterations)),
            "argon2id" => Ok(KdfParams::argon2id()),
            other => Err(PassCliError::ConfigError(format!(
                "unknown kdf_algorithm '{other}' — expected pbkdf2-sha256 or argon2id"
            ))),
        }
    }

    /// Resolve the audit log path for a given vault directory.
    pub fn audit_log_path(&self, vault_dir: &Path) -> PathBuf {
        match &self.audit_log_path {
            Some(path) => PathBuf::from(path),
            None => vault_dir.join("audit.log"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.kdf_algorithm, "pbkdf2-sha256");
        assert_eq!(s.kdf_iterations, PBKDF2_DEFAULT_ITERATIONS);
        assert!(s.audit_enabled);
        assert!(s.audit_log_path.is_none());
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.kdf_algorithm, "pbkdf2-sha256");
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
kdf_algorithm = "argon2id"
audit_enabled = false
audit_log_path = "/var/log/pass-audit.log"
"#;
        fs::write(tmp.path().join(".pass-cli.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.kdf_algorithm, "argon2id");
        assert!(!settings.audit_enabled);
        assert_eq!(
            settings.audit_log_path.as_deref(),
            Some("/var/log/pass-audit.log")
        );
    }

    #[test]
    fn load_uses_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".pass-cli.toml"), "audit_enabled = false\n").unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert!(!settings.audit_enabled);
        assert_eq!(settings.kdf_iterations, PBKDF2_DEFAULT_ITERATIONS);
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".pass-cli.toml"), "not valid {{toml").unwrap();
        assert!(Settings::load(tmp.path()).is_err());
    }

    #[test]
    fn kdf_params_dispatches_on_algorithm() {
        let mut s = Settings::default();
        assert!(!s.kdf_params().unwrap().is_legacy());

        s.kdf_algorithm = "argon2id".into();
        assert_eq!(s.kdf_params().unwrap(), KdfParams::argon2id());

        s.kdf_algorithm = "rot13".into();
        assert!(s.kdf_params().is_err());
    }

    #[test]
    fn audit_path_defaults_to_vault_dir() {
        let s = Settings::default();
        assert_eq!(
            s.audit_log_path(Path::new("/v")),
            PathBuf::from("/v/audit.log")
        );
    }
}
