//! Site configuration (_config.yml)

use anyhow::{anyhow, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::content::{DateFormatter, Locale};

/// Environment variable overriding `cms.endpoint`
pub const ENV_ENDPOINT: &str = "PRISMIC_API_ENDPOINT";
/// Environment variable overriding `cms.access_token`
pub const ENV_ACCESS_TOKEN: &str = "PRISMIC_ACCESS_TOKEN";

/// Main site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // Site
    pub title: String,
    pub language: String,
    pub timezone: String,

    // URL
    pub url: String,

    // Directory
    pub public_dir: String,
    pub source_dir: String,

    // Content
    #[serde(default)]
    pub cms: CmsConfig,

    // Regeneration
    #[serde(default)]
    pub revalidate: RevalidateConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "spacetraveling".to_string(),
            language: "pt-BR".to_string(),
            timezone: "UTC".to_string(),

            url: "http://localhost:3000".to_string(),

            public_dir: "public".to_string(),
            source_dir: "source".to_string(),

            cms: CmsConfig::default(),
            revalidate: RevalidateConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: SiteConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|v| !v.is_empty()) {
            tracing::debug!("CMS endpoint taken from {}", ENV_ENDPOINT);
            self.cms.endpoint = endpoint;
        }
        if let Some(token) = lookup(ENV_ACCESS_TOKEN).filter(|v| !v.is_empty()) {
            self.cms.access_token = Some(token);
        }
    }

    /// Date formatter for the configured language and timezone
    pub fn date_formatter(&self) -> Result<DateFormatter> {
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|e| anyhow!("Invalid timezone `{}`: {}", self.timezone, e))?;
        Ok(DateFormatter::new(
            Locale::from_language(&self.language),
            timezone,
        ))
    }
}

/// Headless CMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CmsConfig {
    /// API root, e.g. `https://<repo>.cdn.prismic.io/api/v2`
    pub endpoint: String,
    pub access_token: Option<String>,
    pub document_type: String,
    /// Posts per listing page
    pub page_size: usize,
    pub timeout_secs: u64,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_token: None,
            document_type: "post".to_string(),
            page_size: 4,
            timeout_secs: 10,
        }
    }
}

/// Staleness windows of rendered routes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevalidateConfig {
    pub index_secs: u64,
    pub post_secs: u64,
    /// Wait before retrying a post whose generation failed
    pub retry_secs: u64,
}

impl RevalidateConfig {
    pub fn index(&self) -> Duration {
        Duration::from_secs(self.index_secs)
    }

    pub fn post(&self) -> Duration {
        Duration::from_secs(self.post_secs)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

impl Default for RevalidateConfig {
    fn default() -> Self {
        Self {
            index_secs: 60 * 60 * 24,
            post_secs: 1,
            retry_secs: 10,
        }
    }
}
