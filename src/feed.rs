use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One feed item. `pub_date` keeps whatever date string the feed carried,
/// never reparsed into a calendar type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: String,
    pub entries: Vec<FeedEntry>,
}

static ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<item[\s>].*?</item\s*>").expect("valid regex"));
static ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<entry[\s>].*?</entry\s*>").expect("valid regex"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").expect("valid regex"));
static LINK_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<link[^>]*>([^<]+)</link\s*>").expect("valid regex"));
static LINK_HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<link[^>]+href\s*=\s*["']([^"']+)["']"#).expect("valid regex"));
static DESCRIPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<description[^>]*>(.*?)</description\s*>").expect("valid regex"));
static SUMMARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<summary[^>]*>(.*?)</summary\s*>").expect("valid regex"));
static CONTENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<content[^>]*>(.*?)</content[^>]*>").expect("valid regex"));
static PUB_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<pubDate[^>]*>(.*?)</pubDate\s*>").expect("valid regex"));
static PUBLISHED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<published[^>]*>(.*?)</published\s*>").expect("valid regex"));
static UPDATED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<updated[^>]*>(.*?)</updated\s*>").expect("valid regex"));
static CDATA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));

/// Tolerant single-pass scan over RSS `<item>` or Atom `<entry>` blocks.
///
/// This is deliberately not an XML parser: real-world feeds are full of
/// unescaped markup and truncated tails, and a block that cannot be made
/// sense of simply produces no entry. Entries missing both a title and a
/// link are dropped.
pub fn parse_feed(markup: &str) -> ParsedFeed {
    let mut blocks: Vec<regex::Match> = ITEM_RE.find_iter(markup).collect();
    if blocks.is_empty() {
        blocks = ENTRY_RE.find_iter(markup).collect();
    }

    // The feed-level title lives before the first item block.
    let head_end = blocks.first().map_or(markup.len(), |m| m.start());
    let title = TITLE_RE
        .captures(&markup[..head_end])
        .map(|c| clean_text(&c[1]))
        .unwrap_or_default();

    let mut entries = Vec::new();
    for block in blocks.iter().map(|m| m.as_str()) {
        let entry_title = first_field(block, &TITLE_RE).unwrap_or_default();
        let link = entry_link(block);
        let description = first_field(block, &DESCRIPTION_RE)
            .or_else(|| first_field(block, &SUMMARY_RE))
            .or_else(|| first_field(block, &CONTENT_RE))
            .unwrap_or_default();
        let pub_date = first_field(block, &PUB_DATE_RE)
            .or_else(|| first_field(block, &PUBLISHED_RE))
            .or_else(|| first_field(block, &UPDATED_RE));

        if entry_title.is_empty() && link.is_empty() {
            log::debug!("dropping feed entry with neither title nor link");
            continue;
        }

        entries.push(FeedEntry {
            title: entry_title,
            link,
            description,
            pub_date,
        });
    }

    ParsedFeed { title, entries }
}

fn first_field(block: &str, re: &Regex) -> Option<String> {
    re.captures(block)
        .map(|c| clean_text(&c[1]))
        .filter(|s| !s.is_empty())
}

// RSS carries the link as element text, Atom as an href attribute.
fn entry_link(block: &str) -> String {
    if let Some(c) = LINK_TEXT_RE.captures(block) {
        let text = clean_text(&c[1]);
        if !text.is_empty() {
            return text;
        }
    }
    if let Some(c) = LINK_HREF_RE.captures(block) {
        return c[1].trim().to_string();
    }
    String::new()
}

// CDATA unwrap, then tag strip, then entity decode, then whitespace collapse.
// Decoding after the strip keeps literal "&lt;p&gt;" text from being eaten as
// markup.
fn clean_text(raw: &str) -> String {
    let unwrapped = CDATA_RE.replace_all(raw, "$1");
    let stripped = TAG_RE.replace_all(&unwrapped, " ");
    let decoded = decode_html_entities(stripped.as_ref());
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
