//! List posts on the terminal, loading further pages on demand

use anyhow::Result;
use std::collections::HashSet;
use std::io::Write;

use crate::cms::ContentSource;
use crate::content::mapper::map_page;
use crate::content::{PostList, PostSummary};
use crate::Site;

/// List posts from the configured CMS
///
/// `pages` is the number of pages to show; `0` keeps loading until the
/// listing is exhausted.
pub async fn run(site: &Site, pages: usize) -> Result<()> {
    let source = site.content_source()?;
    let mut out = std::io::stdout();
    run_with_source(site, source.as_ref(), pages, &mut out).await
}

/// List posts from a given content source into a writer
pub async fn run_with_source<W: Write>(
    site: &Site,
    source: &dyn ContentSource,
    pages: usize,
    out: &mut W,
) -> Result<()> {
    let dates = site.config.date_formatter()?;
    let cms = &site.config.cms;

    let first = source
        .list_by_type(&cms.document_type, cms.page_size)
        .await?;
    let mut list = PostList::seed(map_page(first)?);
    let mut shown = 0;
    let mut loaded_pages = 1;
    let mut visited = HashSet::new();

    loop {
        for post in &list.items()[shown..] {
            let date = dates.format(post.first_publication_date.as_ref());
            writeln!(out, "{}", format_line(post, &date))?;
        }
        shown = list.items().len();

        if !list.can_load_more() || (pages != 0 && loaded_pages >= pages) {
            break;
        }
        if let Some(cursor) = list.cursor() {
            if !visited.insert(cursor.clone()) {
                tracing::warn!("Next page {} was already listed, stopping", cursor);
                break;
            }
        }

        list.load_more(source).await?;
        loaded_pages += 1;
    }

    if list.can_load_more() {
        writeln!(out, "{} posts listed, more available", shown)?;
    } else {
        writeln!(out, "{} posts listed", shown)?;
    }
    Ok(())
}

fn format_line(post: &PostSummary, date: &str) -> String {
    format!("  {} - {} [{}] by {}", date, post.title, post.uid, post.author)
}
