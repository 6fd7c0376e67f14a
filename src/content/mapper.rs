//! Mapping raw CMS documents into view models

use crate::cms::{CmsError, Document, SearchResponse};
use crate::helpers::is_safe_url;

use super::date::parse_publication_date;
use super::post::{ContentSection, PostDetail, PostPage, PostSummary};

fn uid_of(doc: &Document) -> Result<String, CmsError> {
    doc.uid
        .clone()
        .filter(|uid| !uid.is_empty())
        .ok_or(CmsError::MissingField("uid"))
}

/// Map a document into a listing entry
pub fn map_summary(doc: &Document) -> Result<PostSummary, CmsError> {
    Ok(PostSummary {
        uid: uid_of(doc)?,
        first_publication_date: doc
            .first_publication_date
            .as_deref()
            .and_then(parse_publication_date),
        title: doc.data.title.as_text(),
        subtitle: doc.data.subtitle.as_text(),
        author: doc.data.author.as_text(),
    })
}

/// Map a document into a full post
pub fn map_detail(doc: &Document) -> Result<PostDetail, CmsError> {
    let banner_url = doc
        .data
        .banner
        .as_ref()
        .and_then(|b| b.url.clone())
        .filter(|url| is_safe_url(url))
        .unwrap_or_default();

    Ok(PostDetail {
        uid: uid_of(doc)?,
        first_publication_date: doc
            .first_publication_date
            .as_deref()
            .and_then(parse_publication_date),
        title: doc.data.title.as_text(),
        subtitle: doc.data.subtitle.as_text(),
        banner_url,
        author: doc.data.author.as_text(),
        content: doc
            .data
            .content
            .iter()
            .map(|section| ContentSection {
                heading: section.heading.as_text(),
                body_html: section.body.as_html(),
            })
            .collect(),
    })
}

/// Map a whole search page; a single unmappable document fails the page
pub fn map_page(response: SearchResponse) -> Result<PostPage, CmsError> {
    let items = response
        .results
        .iter()
        .map(map_summary)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PostPage {
        items,
        next_page: response.next_page,
    })
}
