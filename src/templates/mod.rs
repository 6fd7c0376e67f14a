//! Built-in site templates using the Tera template engine
//!
//! Templates and static assets are embedded in the binary.

use anyhow::Result;
use serde::Serialize;
use tera::{Context, Tera};

use crate::config::SiteConfig;
use crate::content::{DateFormatter, DetailView, PostDetail, PostList, PostSummary};
use crate::helpers::{full_url_for, post_path};

/// Reading time shown on every post
pub const READING_TIME: &str = "4 min";

/// Seconds before the loading page asks the browser to retry
const LOADING_RETRY_SECS: u64 = 1;

/// Route of the "load more" endpoint
pub const MORE_ENDPOINT: &str = "/api/posts";

/// Static assets written next to the rendered pages: (path, content)
pub const ASSETS: &[(&str, &str)] = &[
    ("styles.css", include_str!("site/assets/styles.css")),
    ("load-more.js", include_str!("site/assets/load-more.js")),
    ("images/logo.svg", include_str!("site/assets/images/logo.svg")),
];

/// Template renderer with the embedded site templates
pub struct TemplateRenderer {
    tera: Tera,
    site: SiteData,
    dates: DateFormatter,
}

impl TemplateRenderer {
    /// Create a new renderer with all templates loaded
    pub fn new(config: &SiteConfig) -> Result<Self> {
        let mut tera = Tera::default();

        tera.add_raw_templates(vec![
            ("layout.html", include_str!("site/layout.html")),
            ("index.html", include_str!("site/index.html")),
            ("post.html", include_str!("site/post.html")),
            ("loading.html", include_str!("site/loading.html")),
            ("not_found.html", include_str!("site/not_found.html")),
            // Partials
            (
                "partials/header.html",
                include_str!("site/partials/header.html"),
            ),
            (
                "partials/icon_calendar.html",
                include_str!("site/partials/icon_calendar.html"),
            ),
            (
                "partials/icon_user.html",
                include_str!("site/partials/icon_user.html"),
            ),
            (
                "partials/icon_clock.html",
                include_str!("site/partials/icon_clock.html"),
            ),
        ])?;

        Ok(Self {
            tera,
            site: SiteData {
                title: config.title.clone(),
                language: config.language.clone(),
                url: config.url.clone(),
            },
            dates: config.date_formatter()?,
        })
    }

    /// Render the post listing
    pub fn render_index(&self, list: &PostList) -> Result<String> {
        let posts: Vec<SummaryView> = list
            .items()
            .iter()
            .map(|s| SummaryView::new(s, &self.dates))
            .collect();
        let more = MoreData {
            next_page: list
                .can_load_more()
                .then(|| list.cursor().map(|c| c.to_string()))
                .flatten(),
            endpoint: MORE_ENDPOINT.to_string(),
        };

        let mut context = self.base_context();
        context.insert("canonical", &full_url_for(&self.site.url, "/"));
        context.insert("posts", &posts);
        context.insert("more", &more);
        self.render("index.html", &context)
    }

    /// Render the detail route in any of its states
    pub fn render_detail(&self, view: &DetailView) -> Result<String> {
        let mut context = self.base_context();
        match view {
            DetailView::Loading => {
                context.insert("retry_secs", &LOADING_RETRY_SECS);
                self.render("loading.html", &context)
            }
            DetailView::Ready(post) => {
                context.insert(
                    "canonical",
                    &full_url_for(&self.site.url, &post_path(&post.uid)),
                );
                context.insert("post", &DetailData::new(post, &self.dates));
                self.render("post.html", &context)
            }
            DetailView::NotFound => self.render("not_found.html", &context),
        }
    }

    /// Render the page shown while the CMS cannot be reached for a post
    pub fn render_unavailable(&self, retry_secs: u64) -> Result<String> {
        let mut context = self.base_context();
        context.insert("retry_secs", &retry_secs);
        context.insert("unavailable", &true);
        self.render("loading.html", &context)
    }

    /// Summaries as served by the "load more" endpoint
    pub fn summary_views(&self, items: &[PostSummary]) -> Vec<SummaryView> {
        items
            .iter()
            .map(|s| SummaryView::new(s, &self.dates))
            .collect()
    }

    fn base_context(&self) -> Context {
        let mut context = Context::new();
        context.insert("site", &self.site);
        context.insert("canonical", &None::<String>);
        context.insert("unavailable", &false);
        context.insert("version", env!("CARGO_PKG_VERSION"));
        context
    }

    fn render(&self, template_name: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template_name, context)?)
    }
}

/// Data structures for template context

#[derive(Debug, Clone, Serialize)]
pub struct SiteData {
    pub title: String,
    pub language: String,
    pub url: String,
}

/// A listing entry ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryView {
    pub uid: String,
    pub href: String,
    /// RFC 3339 timestamp, empty when unknown
    pub first_publication_date: String,
    pub display_date: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
}

impl SummaryView {
    pub fn new(summary: &PostSummary, dates: &DateFormatter) -> Self {
        Self {
            uid: summary.uid.clone(),
            href: post_path(&summary.uid),
            first_publication_date: summary
                .first_publication_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
            display_date: dates.format(summary.first_publication_date.as_ref()),
            title: summary.title.clone(),
            subtitle: summary.subtitle.clone(),
            author: summary.author.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MoreData {
    pub next_page: Option<String>,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailData {
    pub uid: String,
    pub title: String,
    pub subtitle: String,
    pub banner_url: String,
    pub first_publication_date: String,
    pub display_date: String,
    pub author: String,
    pub reading_time: String,
    pub sections: Vec<SectionData>,
}

impl DetailData {
    pub fn new(post: &PostDetail, dates: &DateFormatter) -> Self {
        Self {
            uid: post.uid.clone(),
            title: post.title.clone(),
            subtitle: post.subtitle.clone(),
            banner_url: post.banner_url.clone(),
            first_publication_date: post
                .first_publication_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
            display_date: dates.format(post.first_publication_date.as_ref()),
            author: post.author.clone(),
            reading_time: READING_TIME.to_string(),
            sections: post
                .content
                .iter()
                .map(|s| SectionData {
                    heading: s.heading.clone(),
                    body_html: s.body_html.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionData {
    pub heading: String,
    pub body_html: String,
}
