//! Post view models

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::cms::Cursor;

/// A post as shown in the listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostSummary {
    /// CMS uid, also the detail route parameter
    pub uid: String,

    /// First publication date, absent for unpublished previews
    pub first_publication_date: Option<DateTime<FixedOffset>>,

    pub title: String,
    pub subtitle: String,
    pub author: String,
}

/// One page of summaries plus the cursor of the page after it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPage {
    pub items: Vec<PostSummary>,
    pub next_page: Option<Cursor>,
}

/// A full post
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDetail {
    pub uid: String,
    pub first_publication_date: Option<DateTime<FixedOffset>>,
    pub title: String,
    pub subtitle: String,
    /// Banner image URL; empty when the post has none or it is not a safe URL
    pub banner_url: String,
    pub author: String,
    pub content: Vec<ContentSection>,
}

/// A section of a post body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentSection {
    pub heading: String,
    /// Sanitized HTML
    pub body_html: String,
}

/// What the detail route shows for a uid
#[derive(Debug, Clone, PartialEq)]
pub enum DetailView {
    /// Generation for this uid has not finished yet
    Loading,
    Ready(PostDetail),
    NotFound,
}
