//! Rich text fields
//!
//! The CMS stores structured text as an array of blocks, each carrying its
//! text and a list of inline spans addressed by UTF-16 offsets. Fields that
//! were configured as plain text arrive as a bare string instead; both shapes
//! deserialize into [`TextField`].
//!
//! Rendering to HTML escapes every text run and only emits links and images
//! whose URL passes [`is_safe_url`], so the output can be inserted into a
//! page without further sanitizing.

use serde::Deserialize;

use crate::helpers::{html_escape, image_tag, is_safe_url, post_path};

/// A text field: absent, plain string, or rich text
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(untagged)]
pub enum TextField {
    #[default]
    Empty,
    Plain(String),
    Rich(Vec<Block>),
}

impl TextField {
    /// Plain text content; rich text blocks are joined by a single space
    pub fn as_text(&self) -> String {
        match self {
            TextField::Empty => String::new(),
            TextField::Plain(s) => s.clone(),
            TextField::Rich(blocks) => as_text(blocks, " "),
        }
    }

    /// Sanitized HTML content
    pub fn as_html(&self) -> String {
        match self {
            TextField::Empty => String::new(),
            TextField::Plain(s) if s.trim().is_empty() => String::new(),
            TextField::Plain(s) => format!("<p>{}</p>", escape_with_breaks(s)),
            TextField::Rich(blocks) => as_html(blocks),
        }
    }
}

/// Block type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BlockKind {
    #[serde(rename = "heading1")]
    Heading1,
    #[serde(rename = "heading2")]
    Heading2,
    #[serde(rename = "heading3")]
    Heading3,
    #[serde(rename = "heading4")]
    Heading4,
    #[serde(rename = "heading5")]
    Heading5,
    #[serde(rename = "heading6")]
    Heading6,
    #[serde(rename = "paragraph")]
    Paragraph,
    #[serde(rename = "preformatted")]
    Preformatted,
    #[serde(rename = "list-item")]
    ListItem,
    #[serde(rename = "o-list-item")]
    OrderedListItem,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "embed")]
    Embed,
    #[serde(other)]
    Unknown,
}

impl BlockKind {
    fn heading_level(self) -> Option<u8> {
        match self {
            BlockKind::Heading1 => Some(1),
            BlockKind::Heading2 => Some(2),
            BlockKind::Heading3 => Some(3),
            BlockKind::Heading4 => Some(4),
            BlockKind::Heading5 => Some(5),
            BlockKind::Heading6 => Some(6),
            _ => None,
        }
    }

    fn has_text(self) -> bool {
        !matches!(
            self,
            BlockKind::Image | BlockKind::Embed | BlockKind::Unknown
        )
    }
}

/// A rich text block
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub spans: Vec<Span>,
    /// Image source, for image blocks
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub oembed: Option<Embed>,
}

/// Inline span over a block's text, in UTF-16 code units
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub kind: SpanKind,
    #[serde(default)]
    pub data: Option<LinkData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Strong,
    Em,
    Hyperlink,
    Label,
    #[serde(other)]
    Unknown,
}

/// Link target of a hyperlink span
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct LinkData {
    pub link_type: Option<String>,
    pub url: Option<String>,
    pub uid: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub target: Option<String>,
    pub label: Option<String>,
}

impl LinkData {
    /// Resolve the link to an href; document links resolve to post routes
    pub fn href(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref() {
            return is_safe_url(url).then(|| url.to_string());
        }

        match (self.doc_type.as_deref(), self.uid.as_deref()) {
            (Some("post"), Some(uid)) => Some(post_path(uid)),
            _ => None,
        }
    }
}

/// Embedded media
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Embed {
    pub embed_url: Option<String>,
    pub title: Option<String>,
}

/// Concatenate the text of every textual block
pub fn as_text(blocks: &[Block], separator: &str) -> String {
    blocks
        .iter()
        .filter(|b| b.kind.has_text())
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Serialize blocks to HTML
///
/// Consecutive list items are grouped into a single `<ul>` or `<ol>`.
pub fn as_html(blocks: &[Block]) -> String {
    let mut html = String::new();
    let mut open_list: Option<&'static str> = None;

    for block in blocks {
        let list_tag = match block.kind {
            BlockKind::ListItem => Some("ul"),
            BlockKind::OrderedListItem => Some("ol"),
            _ => None,
        };

        if open_list != list_tag {
            if let Some(tag) = open_list {
                html.push_str(&format!("</{}>", tag));
            }
            if let Some(tag) = list_tag {
                html.push_str(&format!("<{}>", tag));
            }
            open_list = list_tag;
        }

        html.push_str(&render_block(block));
    }

    if let Some(tag) = open_list {
        html.push_str(&format!("</{}>", tag));
    }

    html
}

fn render_block(block: &Block) -> String {
    if let Some(level) = block.kind.heading_level() {
        let inner = render_spans(&block.text, &block.spans, true);
        return format!("<h{level}>{inner}</h{level}>");
    }

    match block.kind {
        BlockKind::Paragraph => {
            format!("<p>{}</p>", render_spans(&block.text, &block.spans, true))
        }
        BlockKind::Preformatted => {
            format!("<pre>{}</pre>", render_spans(&block.text, &block.spans, false))
        }
        BlockKind::ListItem | BlockKind::OrderedListItem => {
            format!("<li>{}</li>", render_spans(&block.text, &block.spans, true))
        }
        BlockKind::Image => match block.url.as_deref() {
            Some(url) => {
                let img = image_tag(url, block.alt.as_deref());
                if img.is_empty() {
                    img
                } else {
                    format!(r#"<p class="block-img">{}</p>"#, img)
                }
            }
            None => String::new(),
        },
        BlockKind::Embed => {
            let Some(embed) = &block.oembed else {
                return String::new();
            };
            match embed.embed_url.as_deref().filter(|u| is_safe_url(u)) {
                Some(url) => {
                    let title = embed.title.as_deref().unwrap_or(url);
                    format!(
                        r#"<div class="embed"><a href="{}" target="_blank" rel="noopener noreferrer">{}</a></div>"#,
                        html_escape(url),
                        html_escape(title)
                    )
                }
                None => String::new(),
            }
        }
        _ => String::new(),
    }
}

/// Render text with its inline spans applied
///
/// The text is cut at every span boundary; each piece is wrapped in the tags
/// of all spans covering it, so the output is always well nested.
fn render_spans(text: &str, spans: &[Span], line_breaks: bool) -> String {
    let escape = |s: &str| {
        if line_breaks {
            escape_with_breaks(s)
        } else {
            html_escape(s)
        }
    };

    if spans.is_empty() {
        return escape(text);
    }

    let ranges: Vec<(usize, usize, &Span)> = spans
        .iter()
        .map(|span| {
            let start = utf16_to_byte(text, span.start);
            let end = utf16_to_byte(text, span.end);
            (start, end.max(start), span)
        })
        .collect();

    let mut cuts: Vec<usize> = vec![0, text.len()];
    for (start, end, _) in &ranges {
        cuts.push(*start);
        cuts.push(*end);
    }
    cuts.sort_unstable();
    cuts.dedup();

    let mut html = String::new();
    for pair in cuts.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        if from == to {
            continue;
        }

        let mut active: Vec<&(usize, usize, &Span)> = ranges
            .iter()
            .filter(|(start, end, _)| *start <= from && *end >= to)
            .collect();
        active.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut closing = Vec::new();
        for (_, _, span) in &active {
            if let Some((open, close)) = span_tags(span) {
                html.push_str(&open);
                closing.push(close);
            }
        }
        html.push_str(&escape(&text[from..to]));
        for close in closing.iter().rev() {
            html.push_str(close);
        }
    }

    html
}

fn span_tags(span: &Span) -> Option<(String, &'static str)> {
    match span.kind {
        SpanKind::Strong => Some(("<strong>".to_string(), "</strong>")),
        SpanKind::Em => Some(("<em>".to_string(), "</em>")),
        SpanKind::Label => {
            let label = span.data.as_ref().and_then(|d| d.label.as_deref())?;
            Some((
                format!(r#"<span class="{}">"#, html_escape(label)),
                "</span>",
            ))
        }
        SpanKind::Hyperlink => {
            let data = span.data.as_ref()?;
            let href = data.href()?;
            let target = if data.target.as_deref() == Some("_blank") {
                r#" target="_blank" rel="noopener noreferrer""#
            } else {
                ""
            };
            Some((
                format!(r#"<a href="{}"{}>"#, html_escape(&href), target),
                "</a>",
            ))
        }
        SpanKind::Unknown => None,
    }
}

/// Convert a UTF-16 offset into a byte offset, clamped to the text length
fn utf16_to_byte(text: &str, units: usize) -> usize {
    let mut seen = 0;
    for (byte, c) in text.char_indices() {
        if seen >= units {
            return byte;
        }
        seen += c.len_utf16();
    }
    text.len()
}

fn escape_with_breaks(s: &str) -> String {
    html_escape(s).replace('\n', "<br />")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(json: &str) -> Vec<Block> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_text_field_shapes() {
        let plain: TextField = serde_json::from_str(r#""Como utilizar Hooks""#).unwrap();
        assert_eq!(plain.as_text(), "Como utilizar Hooks");

        let rich: TextField = serde_json::from_str(
            r#"[{"type":"heading1","text":"Como utilizar","spans":[]},
                {"type":"paragraph","text":"Hooks","spans":[]}]"#,
        )
        .unwrap();
        assert_eq!(rich.as_text(), "Como utilizar Hooks");

        let null: TextField = serde_json::from_str("null").unwrap();
        assert_eq!(null, TextField::Empty);
        assert_eq!(null.as_text(), "");
    }

    #[test]
    fn test_as_text_skips_images() {
        let b = blocks(
            r#"[{"type":"paragraph","text":"a","spans":[]},
                {"type":"image","url":"https://x.io/a.png","alt":null},
                {"type":"paragraph","text":"b","spans":[]}]"#,
        );
        assert_eq!(as_text(&b, " "), "a b");
    }

    #[test]
    fn test_paragraph_is_escaped() {
        let b = blocks(r#"[{"type":"paragraph","text":"<script>alert(1)</script>","spans":[]}]"#);
        assert_eq!(
            as_html(&b),
            "<p>&lt;script&gt;alert(1)&lt;/script&gt;</p>"
        );
    }

    #[test]
    fn test_spans() {
        let b = blocks(
            r#"[{"type":"paragraph","text":"Hello bold world","spans":[
                {"start":6,"end":10,"type":"strong"},
                {"start":6,"end":16,"type":"em"}]}]"#,
        );
        assert_eq!(
            as_html(&b),
            "<p>Hello <em><strong>bold</strong></em><em> world</em></p>"
        );
    }

    #[test]
    fn test_spans_use_utf16_offsets() {
        let b = blocks(
            r#"[{"type":"paragraph","text":"Olá 🚀 mundo","spans":[
                {"start":7,"end":12,"type":"strong"}]}]"#,
        );
        assert_eq!(as_html(&b), "<p>Olá 🚀 <strong>mundo</strong></p>");
    }

    #[test]
    fn test_hyperlinks_are_allow_listed() {
        let b = blocks(
            r#"[{"type":"paragraph","text":"good bad","spans":[
                {"start":0,"end":4,"type":"hyperlink","data":{"link_type":"Web","url":"https://rust-lang.org","target":"_blank"}},
                {"start":5,"end":8,"type":"hyperlink","data":{"link_type":"Web","url":"javascript:alert(1)"}}]}]"#,
        );
        assert_eq!(
            as_html(&b),
            r#"<p><a href="https://rust-lang.org" target="_blank" rel="noopener noreferrer">good</a> bad</p>"#
        );
    }

    #[test]
    fn test_document_link() {
        let b = blocks(
            r#"[{"type":"paragraph","text":"next","spans":[
                {"start":0,"end":4,"type":"hyperlink","data":{"link_type":"Document","type":"post","uid":"outro-post"}}]}]"#,
        );
        assert_eq!(as_html(&b), r#"<p><a href="/post/outro-post">next</a></p>"#);
    }

    #[test]
    fn test_lists_are_grouped() {
        let b = blocks(
            r#"[{"type":"list-item","text":"a","spans":[]},
                {"type":"list-item","text":"b","spans":[]},
                {"type":"o-list-item","text":"c","spans":[]},
                {"type":"paragraph","text":"d","spans":[]}]"#,
        );
        assert_eq!(
            as_html(&b),
            "<ul><li>a</li><li>b</li></ul><ol><li>c</li></ol><p>d</p>"
        );
    }

    #[test]
    fn test_headings_preformatted_and_breaks() {
        let b = blocks(
            r#"[{"type":"heading2","text":"Title","spans":[]},
                {"type":"paragraph","text":"line\nbreak","spans":[]},
                {"type":"preformatted","text":"let x = 1;\nx < 2","spans":[]}]"#,
        );
        assert_eq!(
            as_html(&b),
            "<h2>Title</h2><p>line<br />break</p><pre>let x = 1;\nx &lt; 2</pre>"
        );
    }

    #[test]
    fn test_image_and_unknown_blocks() {
        let b = blocks(
            r#"[{"type":"image","url":"https://images.prismic.io/a.png","alt":"banner"},
                {"type":"image","url":"javascript:alert(1)","alt":""},
                {"type":"something-new","text":"?"}]"#,
        );
        assert_eq!(
            as_html(&b),
            r#"<p class="block-img"><img src="https://images.prismic.io/a.png" alt="banner"></p>"#
        );
    }

    #[test]
    fn test_plain_body() {
        let field = TextField::Plain("a & b".to_string());
        assert_eq!(field.as_html(), "<p>a &amp; b</p>");
        assert_eq!(TextField::Plain("  ".to_string()).as_html(), "");
    }
}
