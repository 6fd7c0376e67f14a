//! Headless CMS access
//!
//! [`ContentSource`] is the seam between the site and the content API. The
//! production implementation is [`PrismicClient`]; tests use an in-memory
//! source.

mod prismic;
pub mod richtext;

pub use prismic::PrismicClient;
pub use richtext::TextField;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while talking to the CMS or decoding its responses
#[derive(Error, Debug)]
pub enum CmsError {
    #[error("invalid CMS endpoint `{0}`")]
    InvalidEndpoint(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CMS responded with status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed CMS response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("CMS API exposes no master ref")]
    NoMasterRef,

    #[error("cursor `{0}` does not point at the configured CMS")]
    InvalidCursor(String),

    #[error("document is missing field `{0}`")]
    MissingField(&'static str),
}

/// Opaque locator of the next page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a document search
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<Document>,
    #[serde(default)]
    pub next_page: Option<Cursor>,
}

/// A raw CMS document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub first_publication_date: Option<String>,
    #[serde(default)]
    pub data: PostFields,
}

/// Fields of a `post` document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostFields {
    pub title: TextField,
    pub subtitle: TextField,
    pub author: TextField,
    pub banner: Option<ImageField>,
    pub content: Vec<ContentField>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImageField {
    pub url: Option<String>,
    pub alt: Option<String>,
}

/// A group of the `content` repeatable field
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentField {
    pub heading: TextField,
    pub body: TextField,
}

/// Read access to the CMS
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// First page of documents of a type
    async fn list_by_type(
        &self,
        doc_type: &str,
        page_size: usize,
    ) -> Result<SearchResponse, CmsError>;

    /// A single document by uid, `None` when no such document exists
    async fn get_by_uid(&self, doc_type: &str, uid: &str) -> Result<Option<Document>, CmsError>;

    /// Follow a next-page cursor
    async fn fetch_page(&self, cursor: &Cursor) -> Result<SearchResponse, CmsError>;
}
