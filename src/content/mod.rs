//! Content module - view models, mapping from CMS documents, and the
//! incremental post list

pub mod date;
pub mod loader;
pub mod mapper;
mod post;

pub use date::{DateFormatter, Locale};
pub use loader::{fetch_and_map, ListAction, LoadStatus, PostList};
pub use post::{ContentSection, DetailView, PostDetail, PostPage, PostSummary};
