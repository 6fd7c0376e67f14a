//! Initialize a new site

use anyhow::{bail, Result};
use std::fs;
use std::path::Path;

use crate::config::SiteConfig;

/// Default `_config.yml` written by `init`
const CONFIG_TEMPLATE: &str = r#"# spacetraveling configuration

# Site
title: spacetraveling
language: pt-BR
timezone: America/Sao_Paulo

# URL
url: http://localhost:3000

# Directory
source_dir: source
public_dir: public

# Content
## PRISMIC_API_ENDPOINT and PRISMIC_ACCESS_TOKEN override these values
cms:
  endpoint: https://your-repository.cdn.prismic.io/api/v2
  access_token:
  document_type: post
  page_size: 4
  timeout_secs: 10

# Regeneration (seconds before a rendered page is refreshed)
revalidate:
  index_secs: 86400
  post_secs: 1
  retry_secs: 10
"#;

/// Initialize a new site in the given directory
pub fn init_site(target_dir: &Path) -> Result<()> {
    let config_path = target_dir.join("_config.yml");
    if config_path.exists() {
        bail!("{:?} already exists", config_path);
    }

    fs::create_dir_all(target_dir.join("source"))?;
    fs::write(&config_path, CONFIG_TEMPLATE)?;

    // Fail now rather than at the first build if the template drifts
    SiteConfig::load(&config_path)?.date_formatter()?;

    Ok(())
}
