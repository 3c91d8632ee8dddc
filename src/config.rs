use crate::error::ConfigError;
use crate::models::MAX_PAGE_LIMIT;
use crate::query::PagingOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";
pub const DEFAULT_HANDLE_DOMAIN: &str = "bsky.social";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(from = "RawConfig")]
pub struct Config {
    pub service_url: String,
    pub handle_domain: Option<String>,
    pub page_limit: u8,
    pub timeout_seconds: u64,
    pub page_delay_ms: u64,
    pub rate_limit_tolerance: Option<u32>,
}

/// Intermediate type for deserialization (empty domain and zero tolerance → `None`).
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_service_url")]
    service_url: String,
    #[serde(default = "default_handle_domain")]
    handle_domain: String,
    #[serde(default = "default_page_limit")]
    page_limit: u8,
    #[serde(default = "default_timeout")]
    timeout_seconds: u64,
    #[serde(default = "default_page_delay")]
    page_delay_ms: u64,
    #[serde(default = "default_tolerance")]
    rate_limit_tolerance: u32,
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        Self {
            service_url: raw.service_url.trim_end_matches('/').to_string(),
            handle_domain: Some(raw.handle_domain).filter(|d| !d.is_empty()),
            page_limit: raw.page_limit,
            timeout_seconds: raw.timeout_seconds,
            page_delay_ms: raw.page_delay_ms,
            rate_limit_tolerance: Some(raw.rate_limit_tolerance).filter(|t| *t > 0),
        }
    }
}

fn default_service_url() -> String {
    DEFAULT_SERVICE_URL.to_string()
}

fn default_handle_domain() -> String {
    DEFAULT_HANDLE_DOMAIN.to_string()
}

const fn default_page_limit() -> u8 {
    MAX_PAGE_LIMIT
}

const fn default_timeout() -> u64 {
    30
}

const fn default_page_delay() -> u64 {
    200
}

const fn default_tolerance() -> u32 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            handle_domain: Some(default_handle_domain()),
            page_limit: default_page_limit(),
            timeout_seconds: default_timeout(),
            page_delay_ms: default_page_delay(),
            rate_limit_tolerance: Some(default_tolerance()),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = config_file_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            ConfigError::Invalid(format!(
                "Cannot read config at {}: {}",
                config_path.display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&contents).map_err(|e| {
            ConfigError::Invalid(format!("Invalid TOML in {}: {}", config_path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.service_url.starts_with("https://") && !self.service_url.starts_with("http://") {
            anyhow::bail!("service_url must be an http(s) URL");
        }
        if self.page_limit == 0 || self.page_limit > MAX_PAGE_LIMIT {
            anyhow::bail!("page_limit must be between 1 and {MAX_PAGE_LIMIT}");
        }
        if self.timeout_seconds == 0 || self.timeout_seconds > 300 {
            anyhow::bail!("timeout_seconds must be between 1 and 300");
        }
        if let Some(ref domain) = self.handle_domain
            && (domain.starts_with('.') || domain.ends_with('.') || !domain.contains('.'))
        {
            anyhow::bail!("handle_domain must be a dotted domain name, got {domain:?}");
        }
        Ok(())
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn paging_options(&self) -> PagingOptions {
        PagingOptions {
            page_limit: self.page_limit,
            page_delay: (self.page_delay_ms > 0).then(|| Duration::from_millis(self.page_delay_ms)),
            rate_limit_tolerance: self.rate_limit_tolerance,
            handle_domain: self.handle_domain.clone(),
        }
    }
}

fn config_file_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ConfigError::Invalid("Cannot determine home directory".to_string()))?;
    Ok(home.join(".config").join("skyquery").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn empty_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.service_url, "https://bsky.social");
        assert_eq!(config.handle_domain.as_deref(), Some("bsky.social"));
        assert_eq!(config.page_limit, 100);
        assert_eq!(config.page_delay_ms, 200);
        assert_eq!(config.rate_limit_tolerance, Some(10));
    }

    #[test]
    fn load_valid_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
            service_url = "https://pds.example.com/"
            handle_domain = "example.com"
            page_limit = 50
            timeout_seconds = 10
            page_delay_ms = 0
            rate_limit_tolerance = 3
            "#,
        );
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.service_url, "https://pds.example.com");
        assert_eq!(config.handle_domain.as_deref(), Some("example.com"));
        assert_eq!(config.page_limit, 50);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.rate_limit_tolerance, Some(3));
    }

    #[test]
    fn zero_tolerance_disables_rate_limit_wait() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "rate_limit_tolerance = 0");
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.rate_limit_tolerance.is_none());
        assert!(config.paging_options().rate_limit_tolerance.is_none());
    }

    #[test]
    fn empty_handle_domain_disables_qualification() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "handle_domain = \"\"");
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.handle_domain.is_none());
    }

    #[test]
    fn non_http_service_url_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "service_url = \"ftp://bsky.social\"");
        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("service_url"));
    }

    #[test]
    fn page_limit_bounds_enforced() {
        let tmp = tempfile::tempdir().unwrap();
        for limit in [0, 101] {
            let path = write_config(tmp.path(), &format!("page_limit = {limit}"));
            let err = Config::load_from_path(&path).unwrap_err();
            assert!(err.to_string().contains("page_limit"));
        }
        for limit in [1, 100] {
            let path = write_config(tmp.path(), &format!("page_limit = {limit}"));
            assert!(Config::load_from_path(&path).is_ok());
        }
    }

    #[test]
    fn timeout_bounds_enforced() {
        let tmp = tempfile::tempdir().unwrap();
        for timeout in [0, 301] {
            let path = write_config(tmp.path(), &format!("timeout_seconds = {timeout}"));
            assert!(Config::load_from_path(&path).is_err());
        }
    }

    #[test]
    fn undotted_handle_domain_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "handle_domain = \"localhost\"");
        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("handle_domain"));
    }

    #[test]
    fn invalid_toml_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "page_limit = [");
        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Config::load_from_path(&tmp.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Cannot read config"));
    }

    #[test]
    fn paging_options_follow_config() {
        let options = Config::default().paging_options();
        assert_eq!(options.page_limit, 100);
        assert_eq!(options.page_delay, Some(Duration::from_millis(200)));
        assert_eq!(options.rate_limit_tolerance, Some(10));
        assert_eq!(options.handle_domain.as_deref(), Some("bsky.social"));

        let quiet = Config {
            page_delay_ms: 0,
            ..Config::default()
        };
        assert!(quiet.paging_options().page_delay.is_none());
    }
}
