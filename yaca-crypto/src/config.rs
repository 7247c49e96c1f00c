#![forbid(unsafe_code)]

//! Engine configuration: TOML file, environment overrides and validation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Lowest PBKDF2 iteration count accepted for PKCS#8 export.
pub const MIN_PKCS8_ITERATIONS: u32 = 1000;

/// Tunables shared by every context created from one engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Verbosity a front end should install for `tracing` output.
    pub log_level: String,
    /// PBKDF2 iterations used when exporting encrypted PKCS#8 blobs.
    pub pkcs8_iterations: u32,
    /// Salt length in bytes for encrypted PKCS#8 export.
    pub pkcs8_salt_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { log_level: "info".into(), pkcs8_iterations: 2048, pkcs8_salt_len: 16 }
    }
}

impl EngineConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        let cfg: Self =
            toml::from_str(&data).map_err(|e| Error::config(format!("toml parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `YACA_LOG_LEVEL`, `YACA_PKCS8_ITERATIONS` and `YACA_PKCS8_SALT_LEN`.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies environment overrides on top of the current values.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("YACA_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("YACA_PKCS8_ITERATIONS") {
            self.pkcs8_iterations =
                v.parse().map_err(|_| Error::config(format!("invalid YACA_PKCS8_ITERATIONS: {v}")))?;
        }
        if let Ok(v) = std::env::var("YACA_PKCS8_SALT_LEN") {
            self.pkcs8_salt_len =
                v.parse().map_err(|_| Error::config(format!("invalid YACA_PKCS8_SALT_LEN: {v}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let allowed = ["trace", "debug", "info", "warn", "error"];
        if !allowed.contains(&self.log_level.as_str()) {
            return Err(Error::config(format!("invalid log_level: {}", self.log_level)));
        }
        if self.pkcs8_iterations < MIN_PKCS8_ITERATIONS {
            return Err(Error::config(format!(
                "pkcs8_iterations must be at least {MIN_PKCS8_ITERATIONS}, got {}",
                self.pkcs8_iterations
            )));
        }
        if !(8..=64).contains(&self.pkcs8_salt_len) {
            return Err(Error::config(format!(
                "pkcs8_salt_len must be within 8..=64, got {}",
                self.pkcs8_salt_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() -> core::result::Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "pkcs8_iterations = 4096")?;
        let cfg = EngineConfig::load_from_file(file.path())?;
        assert_eq!(cfg.pkcs8_iterations, 4096);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.pkcs8_salt_len, 16);
        Ok(())
    }

    #[test]
    fn rejects_weak_iteration_count() {
        let cfg = EngineConfig { pkcs8_iterations: 10, ..EngineConfig::default() };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_unknown_log_level() -> core::result::Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "log_level = \"loud\"")?;
        assert!(EngineConfig::load_from_file(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = EngineConfig::load_from_file("/nonexistent/yaca.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
