use crate::Result;
use crate::stats::{Endpoints, PagePolicy, ServiceSettings, Timeouts};
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use ohno::{IntoAppError, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Name of the configuration file looked up when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "mailpulse.toml";

/// Largest page the message listing endpoint accepts.
const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// How long a built snapshot is reused before it is rebuilt
    #[serde(default = "default_snapshot_ttl", with = "humantime_serde")]
    pub snapshot_ttl: Duration,

    /// Messages requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Maximum pages walked for each month of the trailing series
    #[serde(default = "default_monthly_page_limit")]
    pub monthly_page_limit: u32,

    /// Maximum pages walked for the current month
    #[serde(default = "default_current_month_page_limit")]
    pub current_month_page_limit: u32,

    /// Maximum number of months counted concurrently
    #[serde(default = "default_worker_width")]
    pub worker_width: usize,

    #[serde(default = "default_identity_timeout", with = "humantime_serde")]
    pub identity_timeout: Duration,

    #[serde(default = "default_quota_timeout", with = "humantime_serde")]
    pub quota_timeout: Duration,

    #[serde(default = "default_list_timeout", with = "humantime_serde")]
    pub list_timeout: Duration,

    /// Upper bound on counting a single month
    #[serde(default = "default_month_task_timeout", with = "humantime_serde")]
    pub month_task_timeout: Duration,

    /// Provider endpoint URLs
    #[serde(default)]
    pub endpoints: Endpoints,
}

const fn default_snapshot_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

const fn default_page_size() -> u32 {
    PagePolicy::MONTHLY.page_size
}

const fn default_monthly_page_limit() -> u32 {
    PagePolicy::MONTHLY.max_pages
}

const fn default_current_month_page_limit() -> u32 {
    PagePolicy::CURRENT_MONTH.max_pages
}

const fn default_worker_width() -> usize {
    12
}

const fn default_identity_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_quota_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_list_timeout() -> Duration {
    Duration::from_secs(15)
}

const fn default_month_task_timeout() -> Duration {
    Duration::from_secs(120)
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Without an explicit `config_path`, `mailpulse.toml` in `base_dir` is used if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading mailpulse configuration file '{path}'"))?;
            (path.clone(), text)
        } else {
            let path = base_dir.join(CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Ok(Self::default());
                }
                Err(e) => return Err(e).into_app_err_with(|| format!("reading mailpulse configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if a limit, width, timeout, or TTL is zero, the page size is out of
    /// range, the month task timeout cannot cover a full month of slow pages, or an endpoint
    /// is not an HTTP URL
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            bail!("page_size must be between 1 and {MAX_PAGE_SIZE}, got {}", self.page_size);
        }

        if self.monthly_page_limit == 0 {
            bail!("monthly_page_limit must be at least 1");
        }

        if self.current_month_page_limit == 0 {
            bail!("current_month_page_limit must be at least 1");
        }

        if self.worker_width == 0 {
            bail!("worker_width must be at least 1");
        }

        for (name, value) in [
            ("snapshot_ttl", self.snapshot_ttl),
            ("identity_timeout", self.identity_timeout),
            ("quota_timeout", self.quota_timeout),
            ("list_timeout", self.list_timeout),
            ("month_task_timeout", self.month_task_timeout),
        ] {
            if value.is_zero() {
                bail!("{name} must be greater than zero");
            }
        }

        let worst_case_month = self.worst_case_month();
        if self.month_task_timeout < worst_case_month {
            bail!(
                "month_task_timeout must be at least {}ms (two counts of monthly_page_limit pages at list_timeout each), got {}ms",
                worst_case_month.as_millis(),
                self.month_task_timeout.as_millis()
            );
        }

        for (name, url) in [
            ("endpoints.identity", &self.endpoints.identity),
            ("endpoints.messages", &self.endpoints.messages),
            ("endpoints.quota", &self.endpoints.quota),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("{name} must be an http:// or https:// URL, got '{url}'");
            }
        }

        Ok(())
    }

    /// Longest a month task can spend on requests that are still making progress.
    ///
    /// A month counts received and then sent messages, each over up to `monthly_page_limit`
    /// pages that may take `list_timeout` apiece.
    fn worst_case_month(&self) -> Duration {
        self.list_timeout.saturating_mul(self.monthly_page_limit.saturating_mul(2))
    }

    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        Timeouts {
            identity: self.identity_timeout,
            quota: self.quota_timeout,
            list: self.list_timeout,
        }
    }

    #[must_use]
    pub const fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            ttl: self.snapshot_ttl,
            current_month_policy: PagePolicy {
                page_size: self.page_size,
                max_pages: self.current_month_page_limit,
            },
            monthly_policy: PagePolicy {
                page_size: self.page_size,
                max_pages: self.monthly_page_limit,
            },
            worker_width: self.worker_width,
            month_task_timeout: self.month_task_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}
