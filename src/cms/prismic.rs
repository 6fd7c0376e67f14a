//! Prismic REST API v2 client

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{CmsError, ContentSource, Cursor, Document, SearchResponse};
use crate::config::CmsConfig;

/// Repository information returned by the API root
#[derive(Debug, Deserialize)]
struct ApiInfo {
    #[serde(default)]
    refs: Vec<ApiRef>,
}

#[derive(Debug, Deserialize)]
struct ApiRef {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(rename = "isMasterRef", default)]
    is_master: bool,
}

/// Client for a Prismic repository
pub struct PrismicClient {
    http: reqwest::Client,
    endpoint: Url,
    access_token: Option<String>,
}

impl PrismicClient {
    /// Create a client from the CMS configuration
    pub fn new(config: &CmsConfig) -> Result<Self, CmsError> {
        let endpoint = Url::parse(config.endpoint.trim_end_matches('/'))
            .map_err(|_| CmsError::InvalidEndpoint(config.endpoint.clone()))?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.host_str().is_none() {
            return Err(CmsError::InvalidEndpoint(config.endpoint.clone()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("spacetraveling/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint,
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
        })
    }

    /// The current master ref; content queries are made against it
    async fn master_ref(&self) -> Result<String, CmsError> {
        let info: ApiInfo = self.get_json(self.with_token(self.endpoint.clone())).await?;
        info.refs
            .into_iter()
            .find(|r| r.is_master)
            .map(|r| r.reference)
            .ok_or(CmsError::NoMasterRef)
    }

    /// Run a predicate query against the master ref
    async fn search(&self, predicate: &str, page_size: usize) -> Result<SearchResponse, CmsError> {
        let reference = self.master_ref().await?;
        let mut url = self.search_url();
        url.query_pairs_mut()
            .append_pair("ref", &reference)
            .append_pair("q", &format!("[{}]", predicate))
            .append_pair("pageSize", &page_size.to_string());
        self.get_json(self.with_token(url)).await
    }

    fn search_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        let path = format!("{}/documents/search", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url
    }

    fn with_token(&self, mut url: Url) -> Url {
        if let Some(token) = &self.access_token {
            let present = url.query_pairs().any(|(k, _)| k == "access_token");
            if !present {
                url.query_pairs_mut().append_pair("access_token", token);
            }
        }
        url
    }

    /// Resolve a cursor to a URL on the configured endpoint's origin
    fn cursor_url(&self, cursor: &Cursor) -> Result<Url, CmsError> {
        let url = Url::parse(cursor.as_str())
            .map_err(|_| CmsError::InvalidCursor(cursor.to_string()))?;
        if url.origin() != self.endpoint.origin() {
            return Err(CmsError::InvalidCursor(cursor.to_string()));
        }
        Ok(self.with_token(url))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CmsError> {
        tracing::debug!("GET {}", url.path());
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CmsError::Status {
                status: status.as_u16(),
                url: redact(&url),
            });
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// URL without its query, for error messages
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

/// Quote a value for use inside a predicate
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[async_trait]
impl ContentSource for PrismicClient {
    async fn list_by_type(
        &self,
        doc_type: &str,
        page_size: usize,
    ) -> Result<SearchResponse, CmsError> {
        let predicate = format!("[at(document.type,{})]", quote(doc_type));
        self.search(&predicate, page_size).await
    }

    async fn get_by_uid(&self, doc_type: &str, uid: &str) -> Result<Option<Document>, CmsError> {
        let predicate = format!("[at(my.{}.uid,{})]", doc_type, quote(uid));
        let response = self.search(&predicate, 1).await?;
        Ok(response.results.into_iter().next())
    }

    async fn fetch_page(&self, cursor: &Cursor) -> Result<SearchResponse, CmsError> {
        let url = self.cursor_url(cursor)?;
        self.get_json(url).await
    }
}
