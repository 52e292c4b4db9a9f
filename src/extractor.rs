use std::collections::HashSet;

use ego_tree::NodeRef;
use scraper::{Html, Node, Selector};
use url::Url;

pub const DEFAULT_BODY_CAP: usize = 50_000;
pub const DEFAULT_LINK_CAP: usize = 50;

const UNTITLED: &str = "(untitled)";

/// Structured output of one extraction pass.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub title: String,
    pub body: String,
    pub links: Vec<String>,
}

/// Pulls title, visible text and outbound links out of raw markup. The parser
/// underneath is error-recovering, so malformed input degrades to empty
/// fields rather than an error.
pub struct Extractor {
    body_cap: usize,
    link_cap: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Extractor::new(DEFAULT_BODY_CAP, DEFAULT_LINK_CAP)
    }
}

impl Extractor {
    pub fn new(body_cap: usize, link_cap: usize) -> Extractor {
        Extractor { body_cap, link_cap }
    }

    pub fn extract(&self, base: &Url, markup: &str) -> Extraction {
        let document = Html::parse_document(markup);

        let title_selector = Selector::parse("title").unwrap();
        let body_selector = Selector::parse("body").unwrap();
        let href_selector = Selector::parse("a").unwrap();

        let title = document
            .select(&title_selector)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        // Visible text only: walk the body subtree and leave out anything
        // inside script/style/noscript.
        let mut raw_text = String::new();
        if let Some(body) = document.select(&body_selector).next() {
            collect_text(*body, &mut raw_text);
        }
        let body = truncate_chars(
            raw_text.split_whitespace().collect::<Vec<_>>().join(" "),
            self.body_cap,
        );

        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for element in document.select(&href_selector) {
            if links.len() >= self.link_cap {
                break;
            }
            if let Some(href) = element.value().attr("href") {
                if let Ok(resolved) = base.join(href) {
                    if resolved.scheme() == "http" || resolved.scheme() == "https" {
                        let resolved = resolved.to_string();
                        if seen.insert(resolved.clone()) {
                            links.push(resolved);
                        }
                    }
                }
            }
        }

        Extraction { title, body, links }
    }
}

fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => {
            out.push_str(text);
            out.push(' ');
        }
        Node::Element(element) => {
            if matches!(element.name(), "script" | "style" | "noscript") {
                return;
            }
            for child in node.children() {
                collect_text(child, out);
            }
        }
        _ => {
            for child in node.children() {
                collect_text(child, out);
            }
        }
    }
}

// Char-based cap, applied silently.
fn truncate_chars(mut text: String, cap: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(cap) {
        text.truncate(idx);
    }
    text
}
