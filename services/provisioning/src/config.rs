use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::quota::{QuotaDriverKind, QuotaFlags, DOMAINS_FLAG, SUBSCRIBERS_FLAG, UNLIMITED};

#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    pub server_host: String,
    pub server_port: u16,
    pub data_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub quota_domains: i64,
    pub quota_subscribers: i64,
    pub quota_driver: QuotaDriverKind,
    pub log_level: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 9869,
            data_dir: PathBuf::from("data/provisioning"),
            request_timeout_secs: 30,
            quota_domains: 1,
            quota_subscribers: 10,
            quota_driver: QuotaDriverKind::Database,
            log_level: "info".to_string(),
        }
    }
}

impl ProvisioningConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("PROVISIONING_HOST") {
            cfg.server_host = host;
        }
        if let Ok(port) = env::var("PROVISIONING_PORT") {
            cfg.server_port = port
                .parse()
                .context("PROVISIONING_PORT must be a valid u16")?;
        }
        if let Ok(dir) = env::var("PROVISIONING_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(timeout) = env::var("REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout_secs = timeout
                .parse()
                .context("REQUEST_TIMEOUT_SECS must be a positive integer")?;
        }
        if let Ok(limit) = env::var("QUOTA_DOMAINS") {
            cfg.quota_domains = limit
                .parse()
                .context("QUOTA_DOMAINS must be an integer")?;
        }
        if let Ok(limit) = env::var("QUOTA_SUBSCRIBERS") {
            cfg.quota_subscribers = limit
                .parse()
                .context("QUOTA_SUBSCRIBERS must be an integer")?;
        }
        if let Ok(driver) = env::var("QUOTA_DRIVER") {
            cfg.quota_driver = driver
                .parse::<QuotaDriverKind>()
                .map_err(|err| anyhow::anyhow!(err))
                .context("QUOTA_DRIVER must be one of: database, noop")?;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure_directory(&self.data_dir)?;

        if self.quota_domains < UNLIMITED {
            anyhow::bail!("QUOTA_DOMAINS must be -1 (unlimited) or greater");
        }
        if self.quota_subscribers < UNLIMITED {
            anyhow::bail!("QUOTA_SUBSCRIBERS must be -1 (unlimited) or greater");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        Ok(())
    }

    /// Values backing the resource default flags.
    pub fn quota_flags(&self) -> QuotaFlags {
        QuotaFlags::new()
            .with(DOMAINS_FLAG, self.quota_domains)
            .with(SUBSCRIBERS_FLAG, self.quota_subscribers)
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("{} exists but is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("unable to create data directory {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &Path) -> ProvisioningConfig {
        ProvisioningConfig {
            data_dir: dir.join("data"),
            ..ProvisioningConfig::default()
        }
    }

    #[test]
    fn defaults_match_builtin_quotas() {
        let config = ProvisioningConfig::default();
        let flags = config.quota_flags();

        assert_eq!(config.quota_driver, QuotaDriverKind::Database);
        assert_eq!(flags.get(DOMAINS_FLAG), Some(1));
        assert_eq!(flags.get(SUBSCRIBERS_FLAG), Some(10));
    }

    #[test]
    fn validate_creates_data_directory() {
        let temp = tempdir().expect("failed to create temp dir");
        let config = config_in(temp.path());

        config.validate().expect("config should validate");
        assert!(config.data_dir.is_dir());
    }

    #[test]
    fn validate_rejects_negative_quotas() {
        let temp = tempdir().expect("failed to create temp dir");
        let mut config = config_in(temp.path());
        config.quota_subscribers = -2;

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_unlimited_quotas() {
        let temp = tempdir().expect("failed to create temp dir");
        let mut config = config_in(temp.path());
        config.quota_domains = UNLIMITED;

        config.validate().expect("unlimited quota should be accepted");
    }

    #[test]
    fn validate_rejects_file_as_data_dir() {
        let temp = tempdir().expect("failed to create temp dir");
        let file = temp.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        let config = ProvisioningConfig {
            data_dir: file,
            ..ProvisioningConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
