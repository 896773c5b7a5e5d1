use std::path::PathBuf;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::{AdequacyError, PpResult};

/// Options of the adequacy run surface.
#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Analysis descriptor of the fitted model (see `descriptor.rs`).
    #[arg(long = "xml", value_name = "FILE")]
    pub xml: PathBuf,

    /// Directory containing the trace and tree logs of the posterior sample.
    #[arg(long, default_value = ".")]
    pub log_directory: PathBuf,

    /// Percentage of each log to discard as burn-in.
    #[arg(long, default_value_t = 10)]
    pub burn_in_percentage: u8,

    /// Number of replicate alignments to generate (must not exceed the
    /// number of retained posterior samples).
    #[arg(long, default_value_t = 100)]
    pub replicate_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            xml: PathBuf::new(),
            log_directory: PathBuf::from("."),
            burn_in_percentage: 10,
            replicate_count: 100,
        }
    }
}

impl Config {
    pub fn validate(&self) -> PpResult<()> {
        if self.xml.as_os_str().is_empty() || !self.xml.exists() {
            return Err(AdequacyError::InvalidConfiguration(format!(
                "analysis descriptor not found: {:?}",
                self.xml
            )));
        }
        if !self.log_directory.is_dir() {
            return Err(AdequacyError::InvalidConfiguration(format!(
                "log directory not found: {:?}",
                self.log_directory
            )));
        }
        if self.burn_in_percentage >= 100 {
            return Err(AdequacyError::InvalidConfiguration(format!(
                "burn-in percentage must be below 100, got {}",
                self.burn_in_percentage
            )));
        }
        if self.replicate_count == 0 {
            return Err(AdequacyError::InvalidConfiguration(
                "replicate count must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve a file name against the log directory (inputs and outputs of
    /// the run both live there).
    pub fn log_path(&self, file_name: &str) -> PathBuf {
        self.log_directory.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_run_surface() {
        let config = Config::default();
        assert_eq!(config.burn_in_percentage, 10);
        assert_eq!(config.replicate_count, 100);
        assert_eq!(config.log_directory, PathBuf::from("."));
    }

    #[test]
    fn missing_descriptor_rejected() {
        let config = Config {
            xml: PathBuf::from("/definitely/not/here.json"),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AdequacyError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn burn_in_bounds_checked() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dir.path().join("analysis.json");
        std::fs::write(&xml, "{}").unwrap();
        let config = Config {
            xml,
            log_directory: dir.path().to_path_buf(),
            burn_in_percentage: 100,
            replicate_count: 10,
        };
        assert!(config.validate().is_err());
    }
}
