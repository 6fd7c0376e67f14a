//! Generator module - fetches content and renders pages with the built-in templates

use anyhow::{Context as _, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::cache::BuildManifest;
use crate::cms::ContentSource;
use crate::content::mapper::{map_detail, map_page};
use crate::content::{DetailView, PostList};
use crate::helpers::is_valid_uid;
use crate::templates::{TemplateRenderer, ASSETS};
use crate::Site;

/// A rendered detail route
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedPost {
    Ready(String),
    NotFound(String),
}

/// Static site generator over a content source
pub struct Generator {
    site: Site,
    renderer: TemplateRenderer,
    source: Arc<dyn ContentSource>,
}

impl Generator {
    /// Create a new generator
    pub fn new(site: &Site, source: Arc<dyn ContentSource>) -> Result<Self> {
        let renderer = TemplateRenderer::new(&site.config)?;

        Ok(Self {
            site: site.clone(),
            renderer,
            source,
        })
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        &self.renderer
    }

    pub fn source(&self) -> &dyn ContentSource {
        self.source.as_ref()
    }

    /// Generate the entire site into the public directory
    pub async fn generate(&self) -> Result<BuildManifest> {
        // Ensure public directory exists
        fs::create_dir_all(&self.site.public_dir)?;

        self.write_assets()?;
        self.copy_source_assets()?;

        let (index_html, list) = self.build_index().await?;
        write_page(&self.site.public_dir.join("index.html"), &index_html)?;
        tracing::info!("Generated index with {} posts", list.items().len());

        let mut prebuilt = Vec::with_capacity(list.items().len());
        for summary in list.items() {
            if !is_valid_uid(&summary.uid) {
                tracing::warn!("Skipping post with unusable uid {:?}", summary.uid);
                continue;
            }
            match self.build_post(&summary.uid).await? {
                RenderedPost::Ready(html) => {
                    let output_path = self.post_output_path(&summary.uid);
                    write_page(&output_path, &html)?;
                    tracing::debug!("Generated post: {:?}", output_path);
                    prebuilt.push(summary.uid.clone());
                }
                RenderedPost::NotFound(_) => {
                    tracing::warn!("Post {} is listed but could not be fetched", summary.uid);
                }
            }
        }

        Ok(BuildManifest::new(
            prebuilt,
            list.cursor().map(|c| c.to_string()),
        ))
    }

    /// Fetch the first page of posts and render the listing
    pub async fn build_index(&self) -> Result<(String, PostList)> {
        let cms = &self.site.config.cms;
        let response = self
            .source
            .list_by_type(&cms.document_type, cms.page_size)
            .await
            .context("Failed to list posts")?;
        let list = PostList::seed(map_page(response)?);
        let html = self.renderer.render_index(&list)?;
        Ok((html, list))
    }

    /// Fetch one post and render its detail page
    pub async fn build_post(&self, uid: &str) -> Result<RenderedPost> {
        let cms = &self.site.config.cms;
        let document = self
            .source
            .get_by_uid(&cms.document_type, uid)
            .await
            .with_context(|| format!("Failed to fetch post {}", uid))?;

        match document {
            Some(doc) => {
                let post = map_detail(&doc)?;
                let html = self.renderer.render_detail(&DetailView::Ready(post))?;
                Ok(RenderedPost::Ready(html))
            }
            None => {
                let html = self.renderer.render_detail(&DetailView::NotFound)?;
                Ok(RenderedPost::NotFound(html))
            }
        }
    }

    /// Render the transient page shown while a post is generated
    pub fn loading_page(&self) -> Result<String> {
        self.renderer.render_detail(&DetailView::Loading)
    }

    /// Output file of a post page
    pub fn post_output_path(&self, uid: &str) -> std::path::PathBuf {
        self.site.public_dir.join("post").join(uid).join("index.html")
    }

    /// Write the embedded stylesheet, script and images
    fn write_assets(&self) -> Result<()> {
        for (path, content) in ASSETS {
            write_page(&self.site.public_dir.join(path), content)?;
        }
        Ok(())
    }

    /// Copy files from the source directory (favicons, images) verbatim
    fn copy_source_assets(&self) -> Result<()> {
        let source_dir = &self.site.source_dir;
        if !source_dir.exists() {
            return Ok(());
        }

        for entry in WalkDir::new(source_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() {
                let relative = path.strip_prefix(source_dir)?;
                let dest = self.site.public_dir.join(relative);

                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }

                fs::copy(path, &dest)?;
                tracing::debug!("Copied: {:?}", relative);
            }
        }

        Ok(())
    }
}

fn write_page(output_path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("Failed to create dir {:?}: {}", parent, e))?;
    }
    fs::write(output_path, content)
        .map_err(|e| anyhow::anyhow!("Failed to write {:?}: {}", output_path, e))?;
    Ok(())
}
