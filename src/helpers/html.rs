//! HTML helper functions

use url::Url;

/// Link schemes allowed in rendered CMS content
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Whether a URL coming from the CMS may be placed in an `href` or `src`
///
/// Absolute URLs must use one of the allowed schemes. Root-relative paths
/// are accepted, protocol-relative (`//host`) ones are not.
///
/// # Examples
/// ```ignore
/// is_safe_url("https://example.com/a.png") // -> true
/// is_safe_url("javascript:alert(1)")       // -> false
/// ```
pub fn is_safe_url(raw: &str) -> bool {
    let raw = raw.trim();
    if raw.is_empty() {
        return false;
    }

    if raw.starts_with('/') {
        return !raw.starts_with("//") && !raw.contains('\\');
    }

    match Url::parse(raw) {
        Ok(url) => ALLOWED_SCHEMES.contains(&url.scheme()),
        Err(_) => false,
    }
}

/// Generate an image tag, or nothing when the source is not a safe URL
pub fn image_tag(src: &str, alt: Option<&str>) -> String {
    if !is_safe_url(src) {
        return String::new();
    }

    format!(
        r#"<img src="{}" alt="{}">"#,
        html_escape(src),
        html_escape(alt.unwrap_or(""))
    )
}
