//! Content extraction from fetched pages
//!
//! This module turns raw markup into cleaned, structured text:
//! - Decoding and parsing the payload
//! - Page title and category labels as metadata
//! - Locating the main content region and walking its blocks in order
//! - Removing citation markers and stray symbols
//! - Rejecting pages whose text is too short to be useful

use crate::config::ScraperConfig;
use crate::state::ErrorKind;
use crate::ConfigError;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

/// Elements that never carry article text; their whole subtree is ignored
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "nav", "header", "footer"];

/// Emitted in place of a table, whose cells are not transcribed
pub const TABLE_PLACEHOLDER: &str = "[Table content preserved]";

/// Metadata collected alongside the page text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Text of the `<title>` element
    pub title: Option<String>,

    /// `Last-Modified` header of the response
    pub last_modified: Option<String>,

    /// Category labels in document order
    pub categories: Vec<String>,
}

/// One row of the harvested corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// The item identifier (URL)
    pub identifier: String,

    /// Cleaned structured text; empty for a failed item
    pub content: String,

    pub metadata: PageMetadata,

    /// UTF-8 byte length of `content`
    pub size_bytes: u64,

    /// Why the item failed, if it did
    pub error: Option<ErrorKind>,
}

impl ExtractedRecord {
    /// Creates the record for an item that ended in an error
    pub fn failed(identifier: impl Into<String>, error: ErrorKind) -> Self {
        Self {
            identifier: identifier.into(),
            content: String::new(),
            metadata: PageMetadata::default(),
            size_bytes: 0,
            error: Some(error),
        }
    }

    /// Returns true if the item produced content
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Extracts structured text from page markup
///
/// All selectors and patterns are compiled once; `extract` is a pure function
/// of its inputs.
#[derive(Debug, Clone)]
pub struct Extractor {
    title: Selector,
    content: Selector,
    categories: Selector,
    list_items: Selector,
    citation: Regex,
    disallowed: Regex,
    whitespace: Regex,
    min_content_length: usize,
}

impl Extractor {
    /// Creates an extractor for the configured containers and length floor
    ///
    /// # Arguments
    ///
    /// * `config` - Scraper configuration (container names, minimum length)
    ///
    /// # Returns
    ///
    /// * `Ok(Extractor)` - Ready to extract
    /// * `Err(ConfigError)` - A container name does not form a valid selector
    pub fn new(config: &ScraperConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            title: selector("title")?,
            content: selector(&format!("[id=\"{}\"]", config.content_container))?,
            categories: selector(&format!("[class~=\"{}\"] li a", config.category_container))?,
            list_items: selector("li")?,
            citation: pattern(r"\[\d+\]")?,
            disallowed: pattern(r"[^\w\s.,;?!():\-]")?,
            whitespace: pattern(r"\s+")?,
            min_content_length: config.min_content_length,
        })
    }

    /// Extracts the cleaned text and metadata of a fetched page
    ///
    /// # Arguments
    ///
    /// * `identifier` - The item the payload belongs to
    /// * `payload` - Raw response body
    /// * `last_modified` - `Last-Modified` header of the response, if any
    ///
    /// # Returns
    ///
    /// * `Ok(ExtractedRecord)` - The page produced enough content
    /// * `Err(ErrorKind::ParseError)` - The payload is not valid UTF-8
    /// * `Err(ErrorKind::NoContent)` - The page has no content region
    /// * `Err(ErrorKind::TooShort)` - The cleaned text is below the minimum length
    pub fn extract(
        &self,
        identifier: &str,
        payload: &[u8],
        last_modified: Option<&str>,
    ) -> Result<ExtractedRecord, ErrorKind> {
        let markup = std::str::from_utf8(payload).map_err(|_| ErrorKind::ParseError)?;
        let document = Html::parse_document(markup);

        let metadata = PageMetadata {
            title: self.extract_title(&document),
            last_modified: last_modified.map(str::to_string),
            categories: self.extract_categories(&document),
        };

        let container = self
            .find_content_container(&document)
            .ok_or(ErrorKind::NoContent)?;

        let mut blocks = Vec::new();
        self.collect_blocks(container, &mut blocks);
        let content = blocks.join("\n").trim().to_string();

        if content.chars().count() < self.min_content_length {
            return Err(ErrorKind::TooShort);
        }

        Ok(ExtractedRecord {
            identifier: identifier.to_string(),
            size_bytes: content.len() as u64,
            content,
            metadata,
            error: None,
        })
    }

    /// Normalizes the text of one block
    ///
    /// Citation markers are removed, characters outside the allowed
    /// punctuation set are dropped and whitespace collapses to single spaces.
    pub fn clean(&self, text: &str) -> String {
        let text = self.citation.replace_all(text, "");
        let text = self.disallowed.replace_all(&text, "");
        let text = self.whitespace.replace_all(&text, " ");
        text.trim().to_string()
    }

    fn extract_title(&self, document: &Html) -> Option<String> {
        document
            .select(&self.title)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn extract_categories(&self, document: &Html) -> Vec<String> {
        document
            .select(&self.categories)
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Finds the content region, ignoring one buried inside a skipped element
    fn find_content_container<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        document.select(&self.content).find(|element| {
            !element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|ancestor| is_skipped(ancestor.value().name()))
        })
    }

    /// Walks `element` in document order, emitting one string per block
    fn collect_blocks(&self, element: ElementRef<'_>, blocks: &mut Vec<String>) {
        for child in element.children().filter_map(ElementRef::wrap) {
            let name = child.value().name();
            if is_skipped(name) {
                continue;
            }

            match name {
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    let text = self.clean(&block_text(child, &[]));
                    if !text.is_empty() {
                        blocks.push(format!("\n== {} ==\n", text));
                    }
                }
                "ul" | "ol" => {
                    for item in child.select(&self.list_items) {
                        // Nested lists are reported as their own items
                        let text = self.clean(&block_text(item, &["ul", "ol"]));
                        if !text.is_empty() {
                            blocks.push(format!("- {}", text));
                        }
                    }
                }
                "table" => blocks.push(TABLE_PLACEHOLDER.to_string()),
                "p" => {
                    let text = self.clean(&block_text(child, &[]));
                    if !text.is_empty() {
                        blocks.push(text);
                    }
                }
                _ => self.collect_blocks(child, blocks),
            }
        }
    }
}

fn is_skipped(name: &str) -> bool {
    SKIPPED_ELEMENTS.contains(&name)
}

/// Concatenated text beneath `element`, leaving out skipped and `excluded` subtrees
fn block_text(element: ElementRef<'_>, excluded: &[&str]) -> String {
    let mut text = String::new();
    push_text(element, excluded, &mut text);
    text
}

fn push_text(element: ElementRef<'_>, excluded: &[&str], out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                if is_skipped(el.name()) || excluded.contains(&el.name()) {
                    continue;
                }
                if let Some(child) = ElementRef::wrap(child) {
                    push_text(child, excluded, out);
                }
            }
            _ => {}
        }
    }
}

fn selector(css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css)
        .map_err(|e| ConfigError::Validation(format!("invalid selector {:?}: {}", css, e)))
}

fn pattern(re: &str) -> Result<Regex, ConfigError> {
    Regex::new(re).map_err(|e| ConfigError::Validation(format!("invalid pattern {:?}: {}", re, e)))
}
