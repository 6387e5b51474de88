//! Structure-aware document chunker.
//!
//! Splits one document into addressable [`DocumentChunk`]s. Markup pages are
//! tokenized with `quick-xml` in lenient mode so that region boundaries come
//! from real tag events and byte offsets rather than from pattern matching.
//!
//! # Algorithm
//!
//! 1. Plain documents (Markdown notes) become exactly one chunk.
//! 2. Markup is scanned once, recording every balanced `<article>` and
//!    `<section>` element plus every balanced heading (`h1`..`h6`).
//! 3. Each outermost article becomes a chunk, and so does each outermost
//!    section that is not inside an article. A section wrapping an article
//!    keeps the article as part of its own text.
//! 4. With neither, or when the tokenizer gives up, the whole document is
//!    one chunk whose source is the bare path.
//!
//! Sub-region sources are `path#slug`, where the slug is the element's `id`
//! attribute, else the slugified first heading inside it, else
//! `<element>-<index>`.
//!
//! # Example
//!
//! ```rust
//! use site_context_core::chunk::{chunk_document, DocumentKind};
//!
//! let html = "<section id=\"about\"><h2>About</h2><p>Hi</p></section>";
//! let chunks = chunk_document(html, "index.html", DocumentKind::Markup);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].source, "index.html#about");
//! assert_eq!(chunks[0].label.as_deref(), Some("About"));
//! ```

use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256};

use crate::models::DocumentChunk;

/// How a document's text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// HTML pages, split on structural elements.
    Markup,
    /// Notes and anything else, kept whole.
    Plain,
}

impl DocumentKind {
    /// Classify by extension: `html`, `htm` and `xhtml` are markup.
    pub fn from_path(path: &str) -> Self {
        let ext = path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("html" | "htm" | "xhtml") => DocumentKind::Markup,
            _ => DocumentKind::Plain,
        }
    }
}

/// Lowercase hex SHA-256 of the chunk text; the chunk's id.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lower-case `text` and collapse every run of non-alphanumeric characters
/// into a single `-`, trimming separators at both ends.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}

/// Split a document into chunks in document order.
///
/// Always returns at least one chunk. Never fails: malformed markup falls
/// back to a single whole-document chunk.
pub fn chunk_document(text: &str, path: &str, kind: DocumentKind) -> Vec<DocumentChunk> {
    let regions = match kind {
        DocumentKind::Plain => Vec::new(),
        DocumentKind::Markup => markup_regions(text, path),
    };

    if regions.is_empty() {
        return vec![DocumentChunk {
            text: text.to_string(),
            source: path.to_string(),
            label: file_name(path),
        }];
    }

    regions
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionKind {
    Article,
    Section,
}

impl RegionKind {
    fn from_tag(name: &[u8]) -> Option<Self> {
        if name.eq_ignore_ascii_case(b"article") {
            Some(RegionKind::Article)
        } else if name.eq_ignore_ascii_case(b"section") {
            Some(RegionKind::Section)
        } else {
            None
        }
    }

    fn tag(self) -> &'static str {
        match self {
            RegionKind::Article => "article",
            RegionKind::Section => "section",
        }
    }
}

/// A balanced structural element, as byte offsets into the document.
#[derive(Debug)]
struct Region {
    kind: RegionKind,
    start: usize,
    end: usize,
    id: Option<String>,
}

#[derive(Debug)]
struct OpenRegion {
    kind: RegionKind,
    start: usize,
    id: Option<String>,
}

#[derive(Debug)]
struct Heading {
    start: usize,
    text: String,
}

#[derive(Debug)]
struct OpenHeading {
    level: u8,
    start: usize,
    text: String,
}

fn markup_regions(text: &str, path: &str) -> Vec<DocumentChunk> {
    let Some((regions, headings)) = scan_markup(text) else {
        return Vec::new();
    };

    // Articles win over sections nested inside them; sections outside every
    // article stay, so no top-level region is lost.
    let articles: Vec<&Region> = regions
        .iter()
        .filter(|r| r.kind == RegionKind::Article)
        .collect();
    let candidates: Vec<&Region> = regions
        .iter()
        .filter(|r| {
            r.kind == RegionKind::Article
                || !articles.iter().any(|a| a.start <= r.start && r.end <= a.end)
        })
        .collect();
    let selected = outermost(candidates);

    let mut seen = [0usize; 2];
    selected
        .iter()
        .filter_map(|region| {
            let counter = &mut seen[region.kind as usize];
            let index = *counter;
            *counter += 1;
            let body = text.get(region.start..region.end)?;
            let heading = headings
                .iter()
                .find(|h| h.start >= region.start && h.start < region.end)
                .map(|h| h.text.as_str())
                .filter(|t| !t.is_empty());

            let anchor = region
                .id
                .clone()
                .or_else(|| heading.map(slugify).filter(|s| !s.is_empty()))
                .unwrap_or_else(|| format!("{}-{}", region.kind.tag(), index));

            Some(DocumentChunk {
                text: body.to_string(),
                source: format!("{}#{}", path, anchor),
                label: heading.map(str::to_string).or_else(|| file_name(path)),
            })
        })
        .collect()
}

/// Tokenize the document, returning balanced regions and headings.
///
/// Returns `None` if the tokenizer reports an error; callers treat that as
/// "no structure found".
fn scan_markup(text: &str) -> Option<(Vec<Region>, Vec<Heading>)> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.trim_text(false);

    let mut regions = Vec::new();
    let mut open_regions: Vec<OpenRegion> = Vec::new();
    let mut headings = Vec::new();
    let mut open_heading: Option<OpenHeading> = None;

    loop {
        let start = offset(&reader);
        let event = reader.read_event().ok()?;
        let end = offset(&reader);

        match event {
            Event::Start(tag) => {
                let name = tag.name();
                if let Some(kind) = RegionKind::from_tag(name.as_ref()) {
                    open_regions.push(OpenRegion {
                        kind,
                        start,
                        id: id_attribute(&tag),
                    });
                } else if let Some(level) = heading_level(name.as_ref()) {
                    if open_heading.is_none() {
                        open_heading = Some(OpenHeading {
                            level,
                            start,
                            text: String::new(),
                        });
                    }
                }
            }
            Event::End(tag) => {
                let name = tag.name();
                if let Some(kind) = RegionKind::from_tag(name.as_ref()) {
                    // Unmatched closing tags are ignored.
                    if let Some(pos) = open_regions.iter().rposition(|o| o.kind == kind) {
                        let open = open_regions.remove(pos);
                        regions.push(Region {
                            kind,
                            start: open.start,
                            end,
                            id: open.id,
                        });
                    }
                } else if let Some(level) = heading_level(name.as_ref()) {
                    if open_heading.as_ref().is_some_and(|h| h.level == level) {
                        if let Some(h) = open_heading.take() {
                            headings.push(Heading {
                                start: h.start,
                                text: collapse_whitespace(&h.text),
                            });
                        }
                    }
                }
            }
            Event::Text(t) => {
                if let Some(h) = open_heading.as_mut() {
                    match t.unescape_with(resolve_html5_entity) {
                        Ok(decoded) => h.text.push_str(&decoded),
                        Err(_) => h.text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Event::CData(t) => {
                if let Some(h) = open_heading.as_mut() {
                    h.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    regions.sort_by_key(|r| r.start);
    headings.sort_by_key(|h| h.start);
    Some((regions, headings))
}

/// Keep only regions not contained in an earlier kept region.
fn outermost(mut regions: Vec<&Region>) -> Vec<&Region> {
    regions.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut kept: Vec<&Region> = Vec::new();
    for region in regions {
        if kept.last().map_or(true, |last| region.start >= last.end) {
            kept.push(region);
        }
    }
    kept
}

fn offset(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn heading_level(name: &[u8]) -> Option<u8> {
    match name {
        [h, d] if h.eq_ignore_ascii_case(&b'h') && (b'1'..=b'6').contains(d) => Some(d - b'0'),
        _ => None,
    }
}

fn id_attribute(tag: &BytesStart<'_>) -> Option<String> {
    tag.html_attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| attr.key.as_ref().eq_ignore_ascii_case(b"id"))
        .map(|attr| match attr.unescape_value_with(resolve_html5_entity) {
            Ok(value) => value.trim().to_string(),
            Err(_) => String::from_utf8_lossy(&attr.value).trim().to_string(),
        })
        .filter(|id| !id.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn file_name(path: &str) -> Option<String> {
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markup(text: &str) -> Vec<DocumentChunk> {
        chunk_document(text, "index.html", DocumentKind::Markup)
    }

    #[test]
    fn test_plain_is_single_chunk() {
        let text = "# Notes\n\n<section>not parsed</section>\n";
        let chunks = chunk_document(text, "notes/today.md", DocumentKind::Plain);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].source, "notes/today.md");
        assert_eq!(chunks[0].label.as_deref(), Some("today.md"));
    }

    #[test]
    fn test_empty_document_still_yields_chunk() {
        let chunks = markup("");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
        assert_eq!(chunks[0].source, "index.html");
    }

    #[test]
    fn test_no_structure_is_whole_document() {
        let html = "<html><body><h1>Home</h1><p>Welcome</p></body></html>";
        let chunks = markup(html);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, html);
        assert_eq!(chunks[0].source, "index.html");
    }

    #[test]
    fn test_sections_keyed_by_id_heading_and_position() {
        let html = concat!(
            "<main>",
            "<section id=\"about\"><h2>About me</h2><p>a</p></section>",
            "<section><h2>  Side   Projects! </h2><p>b</p></section>",
            "<section><p>c</p></section>",
            "</main>"
        );
        let chunks = markup(html);
        let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(
            sources,
            vec![
                "index.html#about",
                "index.html#side-projects",
                "index.html#section-2"
            ]
        );
        assert_eq!(chunks[0].label.as_deref(), Some("About me"));
        assert_eq!(chunks[1].label.as_deref(), Some("Side Projects!"));
        assert_eq!(chunks[2].label.as_deref(), Some("index.html"));
        assert_eq!(
            chunks[0].text,
            "<section id=\"about\"><h2>About me</h2><p>a</p></section>"
        );
    }

    #[test]
    fn test_articles_take_priority_over_nested_sections() {
        let html = concat!(
            "<section id=\"intro\"><p>intro</p></section>",
            "<article><h1>First post</h1><section><h2>Part</h2></section></article>",
            "<article id=\"second\"><p>two</p></article>"
        );
        let chunks = markup(html);
        let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(
            sources,
            vec!["index.html#intro", "index.html#first-post", "index.html#second"]
        );
        assert!(chunks[1].text.contains("<section><h2>Part</h2></section>"));
    }

    #[test]
    fn test_sections_outside_articles_are_kept() {
        let html = concat!(
            "<section id=\"intro\">About me and contact</section>",
            "<article id=\"p\">post</article>",
            "<section>Links</section>"
        );
        let chunks = markup(html);
        let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(
            sources,
            vec!["index.html#intro", "index.html#p", "index.html#section-1"]
        );
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        for region in ["About me and contact", "post", "Links"] {
            assert!(joined.contains(region), "missing {:?}", region);
        }
    }

    #[test]
    fn test_section_wrapping_article_is_one_chunk() {
        let html = "<section id=\"blog\"><article id=\"p\">post</article></section>";
        let chunks = markup(html);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source, "index.html#blog");
        assert_eq!(chunks[0].text, html);
    }

    #[test]
    fn test_nested_sections_covered_by_outermost() {
        let html = "<section id=\"outer\"><section id=\"inner\"><p>x</p></section></section>";
        let chunks = markup(html);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source, "index.html#outer");
        assert_eq!(chunks[0].text, html);
    }

    #[test]
    fn test_unclosed_section_falls_back_to_whole_document() {
        let html = "<body><section><h2>Open</h2><p>never closed</p></body>";
        let chunks = markup(html);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source, "index.html");
        assert_eq!(chunks[0].text, html);
    }

    #[test]
    fn test_stray_closing_tag_ignored() {
        let html = "<p>text</p></section><section id=\"real\"><p>y</p></section>";
        let chunks = markup(html);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source, "index.html#real");
    }

    #[test]
    fn test_duplicate_headings_keep_duplicate_slugs() {
        let html = "<section><h2>Notes</h2>a</section><section><h2>Notes</h2>b</section>";
        let chunks = markup(html);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source, chunks[1].source);
        assert_ne!(chunks[0].text, chunks[1].text);
    }

    #[test]
    fn test_heading_with_inline_markup_and_entities() {
        let html = "<section><h3><a href=\"#\">Tips &amp; Tricks</a></h3></section>";
        let chunks = markup(html);
        assert_eq!(chunks[0].label.as_deref(), Some("Tips & Tricks"));
        assert_eq!(chunks[0].source, "index.html#tips-tricks");
    }

    #[test]
    fn test_named_html_entities_decoded() {
        let html = "<section><h2>Caf&eacute;&nbsp;Notes &mdash; 2024</h2><p>x</p></section>";
        let chunks = markup(html);
        assert_eq!(chunks[0].source, "index.html#café-notes-2024");
        assert_eq!(chunks[0].label.as_deref(), Some("Café Notes — 2024"));

        let chunks = markup("<section id=\"r&eacute;sum&eacute;\"><p>cv</p></section>");
        assert_eq!(chunks[0].source, "index.html#résumé");
    }

    #[test]
    fn test_html_style_attributes() {
        let html = "<section hidden class=card id=contact><p>mail</p></section>";
        let chunks = markup(html);
        assert_eq!(chunks[0].source, "index.html#contact");
    }

    #[test]
    fn test_malformed_input_never_panics() {
        let inputs = [
            "<section",
            "<<<>>>",
            "<section><h2>unterminated",
            "</article></section>",
            "<article><section></article></section>",
            "<script>if (a < b && c > d) {}</script><section>s</section>",
            "<section id=\"caf\u{e9}\">\u{1F600}</section>",
        ];
        for input in inputs {
            let chunks = markup(input);
            assert!(!chunks.is_empty(), "no chunks for {:?}", input);
        }
    }

    #[test]
    fn test_deterministic() {
        let html = "<section><h2>A</h2></section><section><h2>B</h2></section>";
        assert_eq!(markup(html), markup(html));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  --Rust & WASM--  "), "rust-wasm");
        assert_eq!(slugify("2024 Goals"), "2024-goals");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_fingerprint_stability() {
        assert_eq!(fingerprint("Alpha"), fingerprint("Alpha"));
        assert_ne!(fingerprint("Alpha"), fingerprint("Alpha."));
        assert_eq!(fingerprint("").len(), 64);
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(DocumentKind::from_path("a/b/index.HTML"), DocumentKind::Markup);
        assert_eq!(DocumentKind::from_path("page.htm"), DocumentKind::Markup);
        assert_eq!(DocumentKind::from_path("notes/x.md"), DocumentKind::Plain);
        assert_eq!(DocumentKind::from_path("README"), DocumentKind::Plain);
    }
}
