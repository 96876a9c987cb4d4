use std::path::Path;
use std::sync::LazyLock;

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex::Regex;
use serde::{Deserialize, Serialize};
use yaml_rust::yaml::Hash;
use yaml_rust::{Yaml, YamlEmitter, YamlLoader};

use crate::error::{Result, VaultError};

pub const DELIMITER: &str = "---";

pub(crate) static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").unwrap());

/// Ordered metadata block. Key order is preserved through parse and serialize.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(Hash);

impl Metadata {
    pub fn new() -> Self {
        Self(Hash::new())
    }

    pub fn from_hash(hash: Hash) -> Self {
        Self(hash)
    }

    pub fn as_hash(&self) -> &Hash {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Yaml> {
        self.0.get(&Yaml::String(key.to_string()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&Yaml::String(key.to_string()))
    }

    /// Replace the value of `key` in place, or append it when absent.
    pub fn set(&mut self, key: &str, value: Yaml) {
        let key = Yaml::String(key.to_string());
        match self.0.get_mut(&key) {
            Some(slot) => *slot = value,
            None => {
                self.0.insert(key, value);
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().filter_map(|k| k.as_str())
    }

    /// Scalar field rendered as a string.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_to_string)
    }

    /// Tag-like field as strings: a list yields each item (null items become empty
    /// strings), a scalar yields a single item, null yields nothing. `None` when the
    /// field is absent or is a mapping.
    pub fn string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            Yaml::Array(items) => Some(
                items
                    .iter()
                    .map(|item| scalar_to_string(item).unwrap_or_default())
                    .collect(),
            ),
            Yaml::Null => Some(Vec::new()),
            other => scalar_to_string(other).map(|s| vec![s]),
        }
    }
}

pub fn scalar_to_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Real(r) => Some(r.clone()),
        Yaml::Integer(i) => Some(i.to_string()),
        Yaml::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn string_list_yaml<S: AsRef<str>>(items: &[S]) -> Yaml {
    Yaml::Array(
        items
            .iter()
            .map(|s| Yaml::String(s.as_ref().to_string()))
            .collect(),
    )
}

/// Outcome of locating the metadata block at the top of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Frontmatter<'a> {
    Absent,
    Malformed { reason: String },
    Present { metadata: Metadata, body: &'a str },
}

/// Locate and parse the metadata block. The opening delimiter must be the very first
/// line; the block ends at the next delimiter line.
pub fn split_frontmatter(content: &str) -> Frontmatter<'_> {
    let mut lines = content.split_inclusive('\n');
    let first = match lines.next() {
        Some(line) => line,
        None => return Frontmatter::Absent,
    };
    if first.trim_end() != DELIMITER || !first.ends_with('\n') {
        return Frontmatter::Absent;
    }

    let block_start = first.len();
    let mut offset = block_start;
    for line in lines {
        if line.trim_end() == DELIMITER {
            let block = &content[block_start..offset];
            let body = &content[offset + line.len()..];
            return match parse_block(block) {
                Ok(metadata) => Frontmatter::Present { metadata, body },
                Err(reason) => Frontmatter::Malformed { reason },
            };
        }
        offset += line.len();
    }

    Frontmatter::Absent
}

fn parse_block(block: &str) -> std::result::Result<Metadata, String> {
    let docs = YamlLoader::load_from_str(block).map_err(|e| e.to_string())?;
    match docs.into_iter().next() {
        None | Some(Yaml::Null) => Ok(Metadata::new()),
        Some(Yaml::Hash(hash)) => Ok(Metadata::from_hash(hash)),
        Some(_) => Err("metadata block is not a mapping".to_string()),
    }
}

/// Split a document into metadata and body. A malformed block is treated exactly like
/// a missing one.
pub fn parse(content: &str) -> (Option<Metadata>, String) {
    match split_frontmatter(content) {
        Frontmatter::Present { metadata, body } => (Some(metadata), body.to_string()),
        Frontmatter::Absent | Frontmatter::Malformed { .. } => (None, content.to_string()),
    }
}

pub fn serialize(metadata: Option<&Metadata>, body: &str) -> Result<String> {
    let metadata = match metadata {
        Some(metadata) => metadata,
        None => return Ok(body.to_string()),
    };

    let mut out = String::new();
    if metadata.is_empty() {
        out.push_str(DELIMITER);
        out.push('\n');
    } else {
        // The emitter opens with its own "---" line.
        let mut emitter = YamlEmitter::new(&mut out);
        emitter
            .dump(&Yaml::Hash(metadata.as_hash().clone()))
            .map_err(|e| VaultError::Emit(format!("{:?}", e)))?;
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    /// Target without a `#heading` or `#^block` fragment.
    pub fn note(&self) -> &str {
        match self.target.find('#') {
            Some(idx) => &self.target[..idx],
            None => &self.target,
        }
    }
}

pub fn extract_references(body: &str) -> Vec<Reference> {
    REFERENCE_RE
        .captures_iter(body)
        .map(|cap| {
            let inner = &cap[1];
            match inner.split_once('|') {
                Some((target, display)) => Reference {
                    target: target.to_string(),
                    display: Some(display.to_string()),
                },
                None => Reference {
                    target: inner.to_string(),
                    display: None,
                },
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

pub fn extract_headings(body: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut current_level = 0u8;
    let mut current_text = String::new();

    for event in Parser::new(body) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current_level = level as u8;
                current_text.clear();
            }
            Event::End(TagEnd::Heading(_)) => {
                headings.push(Heading {
                    level: current_level,
                    text: current_text.trim().to_string(),
                });
                current_level = 0;
            }
            Event::Text(text) | Event::Code(text) => {
                if current_level > 0 {
                    current_text.push_str(&text);
                }
            }
            _ => {}
        }
    }

    headings
}

fn normalize_heading(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// True when some heading at `level` starts with `title` (case-insensitive).
pub fn has_heading(headings: &[Heading], level: u8, title: &str) -> bool {
    let title = normalize_heading(title);
    headings
        .iter()
        .filter(|h| h.level == level)
        .any(|h| normalize_heading(&h.text).starts_with(&title))
}

/// A parsed document: optional metadata block plus body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub metadata: Option<Metadata>,
    pub body: String,
}

impl Document {
    pub fn parse(content: &str) -> Self {
        let (metadata, body) = parse(content);
        Self { metadata, body }
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| VaultError::io(path, e))?;
        Ok(Self::parse(&content))
    }

    pub fn serialize(&self) -> Result<String> {
        serialize(self.metadata.as_ref(), &self.body)
    }

    pub fn references(&self) -> Vec<Reference> {
        extract_references(&self.body)
    }

    pub fn headings(&self) -> Vec<Heading> {
        extract_headings(&self.body)
    }
}
