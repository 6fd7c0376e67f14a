//! Generate static files

use anyhow::Result;
use std::sync::Arc;

use crate::cms::ContentSource;
use crate::generator::Generator;
use crate::Site;

/// Generate the static site from the configured CMS
pub async fn run(site: &Site) -> Result<()> {
    let source = site.content_source()?;
    run_with_source(site, source).await
}

/// Generate the static site from a given content source
pub async fn run_with_source(site: &Site, source: Arc<dyn ContentSource>) -> Result<()> {
    let start = std::time::Instant::now();

    let generator = Generator::new(site, source)?;
    let manifest = generator.generate().await?;

    manifest.save(&site.base_dir)?;

    let duration = start.elapsed();
    tracing::info!(
        "Generated {} posts in {:.2}s",
        manifest.posts.len(),
        duration.as_secs_f64()
    );

    Ok(())
}
