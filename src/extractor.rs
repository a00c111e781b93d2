//! Content extraction for fetched payloads
//!
//! Turns an HTML page, a JSON object or anything else into a bounded
//! summary that is small enough to hand back to the model. Extraction never
//! fails: input that fits no other branch is stringified and truncated.

use chrono::{DateTime, SecondsFormat, Utc};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 300;
pub const MAX_HTML_CONTENT_CHARS: usize = 2000;
pub const MAX_STRING_CHARS: usize = 1000;
pub const MAX_ARRAY_ITEMS: usize = 10;
pub const MAX_SUMMARY_KEYS: usize = 20;

/// Fields copied from JSON objects, in output order
pub const JSON_FIELDS: [&str; 8] = [
    "title",
    "name",
    "description",
    "content",
    "text",
    "body",
    "message",
    "data",
];

/// Primary-content selectors, landmarks first and `body` last
const CONTENT_SELECTORS: [&str; 10] = [
    "main",
    "article",
    "[role=\"main\"]",
    "#content",
    "#main",
    ".main-content",
    ".content",
    ".post-content",
    ".entry-content",
    "body",
];

/// Elements whose text never reaches the output
const SKIPPED_ELEMENTS: [&str; 6] = ["script", "style", "noscript", "template", "meta", "link"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Html,
    Json,
    Text,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    pub url: String,
    pub content_type: ContentType,
    pub extracted_at: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ExtractedContent {
    /// Returns a string field such as `title`, `content` or `summary`
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Extracts a bounded summary of `payload` fetched from `url`
pub fn extract(payload: &Value, url: &str) -> ExtractedContent {
    extract_at(payload, url, Utc::now())
}

/// Same as [`extract`] with an explicit timestamp
pub fn extract_at(payload: &Value, url: &str, now: DateTime<Utc>) -> ExtractedContent {
    let (content_type, fields) = match payload {
        Value::String(text) if looks_like_markup(text) => (ContentType::Html, extract_html(text)),
        Value::Object(object) => (ContentType::Json, extract_json(object)),
        other => (ContentType::Text, extract_text(other)),
    };

    tracing::debug!(
        url = %url,
        content_type = ?content_type,
        fields = fields.len(),
        "Extracted content"
    );

    ExtractedContent {
        url: url.to_string(),
        content_type,
        extracted_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        fields,
    }
}

/// Full documents anywhere in the text, or a fragment opening with a tag
fn looks_like_markup(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    let document = ["<!doctype html", "<html", "<head", "<body"]
        .iter()
        .any(|marker| lower.contains(marker));

    let mut start = text.trim_start().chars();
    let fragment =
        start.next() == Some('<') && start.next().is_some_and(|c| c.is_ascii_alphabetic());

    document || fragment
}

fn extract_html(markup: &str) -> Map<String, Value> {
    let document = Html::parse_document(markup);
    let mut fields = Map::new();

    if let Some(title) = first_text(&document, "title").filter(|t| !t.is_empty()) {
        fields.insert(
            "title".to_string(),
            Value::String(truncate_chars(&title, MAX_TITLE_CHARS)),
        );
    }

    let description = meta_content(&document, "meta[name=\"description\"]")
        .or_else(|| meta_content(&document, "meta[property=\"og:description\"]"));
    if let Some(description) = description {
        fields.insert(
            "description".to_string(),
            Value::String(truncate_chars(&description, MAX_DESCRIPTION_CHARS)),
        );
    }

    let content = CONTENT_SELECTORS
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|selector| document.select(&selector).next().map(visible_text))
        .unwrap_or_default();

    fields.insert(
        "content".to_string(),
        Value::String(truncate_chars(&content, MAX_HTML_CONTENT_CHARS)),
    );

    fields
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|content| !content.is_empty())
}

/// Text under `root`, skipping script-like subtrees, whitespace collapsed
fn visible_text(root: ElementRef<'_>) -> String {
    let mut pieces = Vec::new();

    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });

        if !hidden {
            pieces.push(&**text);
        }
    }

    collapse_whitespace(&pieces.join(" "))
}

fn extract_json(object: &Map<String, Value>) -> Map<String, Value> {
    let mut fields = Map::new();

    for key in JSON_FIELDS {
        if let Some(value) = object.get(key) {
            fields.insert(key.to_string(), bound_value(value));
        }
    }

    if fields.is_empty() {
        let keys: Vec<&str> = object
            .keys()
            .take(MAX_SUMMARY_KEYS)
            .map(String::as_str)
            .collect();
        fields.insert(
            "summary".to_string(),
            Value::String(format!(
                "Object with {} keys: {}",
                object.len(),
                keys.join(", ")
            )),
        );
    }

    fields
}

/// Truncates strings and arrays at every depth
fn bound_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_chars(s, MAX_STRING_CHARS)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .take(MAX_ARRAY_ITEMS)
                .map(bound_value)
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), bound_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn extract_text(payload: &Value) -> Map<String, Value> {
    let text = match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut fields = Map::new();
    fields.insert(
        "content".to_string(),
        Value::String(truncate_chars(&text, MAX_STRING_CHARS)),
    );
    fields
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keeps at most `max` characters
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
