//! Incremental post list loader
//!
//! [`PostList`] holds the summaries shown on the list page, the cursor of the
//! next page and a load status. It changes only through [`PostList::apply`]:
//!
//! - `RequestMore` starts a load when a cursor exists and no load is in
//!   flight, returning the cursor to fetch; otherwise it does nothing.
//! - `MoreLoaded` appends the new summaries and moves the cursor forward.
//! - `MoreFailed` records the error and keeps the cursor, so the same page
//!   can be requested again.

use std::collections::HashSet;

use crate::cms::{CmsError, ContentSource, Cursor};

use super::mapper::map_page;
use super::post::{PostPage, PostSummary};

/// Load status of a [`PostList`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Error(String),
}

/// Transitions of a [`PostList`]
#[derive(Debug, Clone, PartialEq)]
pub enum ListAction {
    RequestMore,
    MoreLoaded(PostPage),
    MoreFailed(String),
}

/// Accumulated post listing
#[derive(Debug, Clone, PartialEq)]
pub struct PostList {
    items: Vec<PostSummary>,
    cursor: Option<Cursor>,
    status: LoadStatus,
}

impl PostList {
    /// Seed the listing with its first page
    pub fn seed(first: PostPage) -> Self {
        let mut list = Self {
            items: Vec::with_capacity(first.items.len()),
            cursor: None,
            status: LoadStatus::Idle,
        };
        list.append(first);
        list
    }

    pub fn items(&self) -> &[PostSummary] {
        &self.items
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    /// Whether the "load more" control should be offered
    pub fn can_load_more(&self) -> bool {
        self.cursor.is_some() && self.status != LoadStatus::Loading
    }

    /// Apply an action; `RequestMore` returns the cursor to fetch, if any
    pub fn apply(&mut self, action: ListAction) -> Option<Cursor> {
        match action {
            ListAction::RequestMore => {
                if !self.can_load_more() {
                    return None;
                }
                self.status = LoadStatus::Loading;
                self.cursor.clone()
            }
            ListAction::MoreLoaded(page) => {
                self.append(page);
                self.status = LoadStatus::Idle;
                None
            }
            ListAction::MoreFailed(reason) => {
                self.status = LoadStatus::Error(reason);
                None
            }
        }
    }

    /// Fetch and append the next page
    ///
    /// Returns the number of summaries appended; `Ok(0)` without touching the
    /// source when there is nothing to load or a load is already in flight.
    pub async fn load_more(&mut self, source: &dyn ContentSource) -> Result<usize, CmsError> {
        let Some(cursor) = self.apply(ListAction::RequestMore) else {
            return Ok(0);
        };

        match fetch_and_map(source, &cursor).await {
            Ok(page) => {
                let before = self.items.len();
                self.apply(ListAction::MoreLoaded(page));
                Ok(self.items.len() - before)
            }
            Err(e) => {
                tracing::warn!("Loading more posts from {} failed: {}", cursor, e);
                self.apply(ListAction::MoreFailed(e.to_string()));
                Err(e)
            }
        }
    }

    fn append(&mut self, page: PostPage) {
        let mut seen: HashSet<String> = self.items.iter().map(|s| s.uid.clone()).collect();
        for item in page.items {
            if seen.insert(item.uid.clone()) {
                self.items.push(item);
            } else {
                tracing::debug!("Skipping duplicate post {}", item.uid);
            }
        }
        self.cursor = page.next_page;
    }
}

/// Fetch the page behind a cursor and map it into summaries
pub async fn fetch_and_map(
    source: &dyn ContentSource,
    cursor: &Cursor,
) -> Result<PostPage, CmsError> {
    let response = source.fetch_page(cursor).await?;
    map_page(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::testing::{page, MemorySource};
    use crate::content::mapper::map_page;

    const PAGE2: &str = "https://api.example/page2";
    const PAGE3: &str = "https://api.example/page3";

    fn uids(list: &PostList) -> Vec<&str> {
        list.items().iter().map(|s| s.uid.as_str()).collect()
    }

    fn seeded(next: Option<&str>) -> PostList {
        PostList::seed(map_page(page(&["p1", "p2", "p3", "p4"], next)).unwrap())
    }

    #[tokio::test]
    async fn test_load_more_without_cursor_is_noop() {
        let source = MemorySource::default();
        let mut list = seeded(None);
        let before = list.clone();

        assert!(!list.can_load_more());
        assert_eq!(list.load_more(&source).await.unwrap(), 0);
        assert_eq!(source.calls(), 0);
        assert_eq!(list, before);
    }

    #[tokio::test]
    async fn test_load_more_appends_next_page() {
        let mut source = MemorySource::default();
        source.add_page(PAGE2, page(&["p5", "p6", "p7", "p8"], None));
        let mut list = seeded(Some(PAGE2));

        assert_eq!(list.load_more(&source).await.unwrap(), 4);
        assert_eq!(uids(&list), ["p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8"]);
        assert_eq!(list.cursor(), None);
        assert_eq!(list.status(), &LoadStatus::Idle);
        assert!(!list.can_load_more());
    }

    #[tokio::test]
    async fn test_cursor_moves_forward() {
        let mut source = MemorySource::default();
        source.add_page(PAGE2, page(&["p5", "p6", "p7", "p8"], Some(PAGE3)));
        source.add_page(PAGE3, page(&["p9"], None));
        let mut list = seeded(Some(PAGE2));

        list.load_more(&source).await.unwrap();
        assert_eq!(list.cursor(), Some(&Cursor::new(PAGE3)));
        list.load_more(&source).await.unwrap();
        assert_eq!(list.items().len(), 9);
        assert_eq!(list.cursor(), None);
    }

    #[tokio::test]
    async fn test_duplicates_are_not_appended() {
        let mut source = MemorySource::default();
        source.add_page(PAGE2, page(&["p4", "p5", "p5"], None));
        let mut list = seeded(Some(PAGE2));

        assert_eq!(list.load_more(&source).await.unwrap(), 1);
        assert_eq!(uids(&list), ["p1", "p2", "p3", "p4", "p5"]);
    }

    #[tokio::test]
    async fn test_failure_keeps_list_and_cursor() {
        let mut source = MemorySource::default();
        source.failing.insert(PAGE2.to_string());
        let mut list = seeded(Some(PAGE2));

        assert!(list.load_more(&source).await.is_err());
        assert_eq!(list.items().len(), 4);
        assert_eq!(list.cursor(), Some(&Cursor::new(PAGE2)));
        assert!(matches!(list.status(), LoadStatus::Error(_)));

        // retry once the page is reachable
        source.failing.clear();
        source.add_page(PAGE2, page(&["p5"], None));
        assert_eq!(list.load_more(&source).await.unwrap(), 1);
        assert_eq!(list.status(), &LoadStatus::Idle);
    }

    #[test]
    fn test_request_more_is_guarded_while_loading() {
        let mut list = seeded(Some(PAGE2));

        assert_eq!(list.apply(ListAction::RequestMore), Some(Cursor::new(PAGE2)));
        assert_eq!(list.status(), &LoadStatus::Loading);
        assert!(!list.can_load_more());
        assert_eq!(list.apply(ListAction::RequestMore), None);

        let next = map_page(page(&["p5"], None)).unwrap();
        list.apply(ListAction::MoreLoaded(next));
        assert_eq!(list.items().len(), 5);
        assert_eq!(list.status(), &LoadStatus::Idle);
    }

    #[test]
    fn test_failed_list_can_retry() {
        let mut list = seeded(Some(PAGE2));
        list.apply(ListAction::RequestMore);
        list.apply(ListAction::MoreFailed("timeout".to_string()));

        assert_eq!(list.status(), &LoadStatus::Error("timeout".to_string()));
        assert!(list.can_load_more());
        assert_eq!(list.apply(ListAction::RequestMore), Some(Cursor::new(PAGE2)));
    }
}
