//! Helper functions shared by the renderers
//!
//! HTML escaping, URL allow-listing and route construction.

mod html;
mod url;

pub use self::html::*;
pub use self::url::*;
