use serde::{Deserialize, Serialize};

use super::parser::REFERENCE_RE;

/// Relative path with the final extension removed: `a/b/Note.md` -> `a/b/Note`.
pub fn without_extension(rel: &str) -> &str {
    let name_start = rel.rfind('/').map_or(0, |i| i + 1);
    match rel[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &rel[..name_start + dot],
        _ => rel,
    }
}

/// File name without extension: `a/b/Note.md` -> `Note`.
pub fn file_stem(rel: &str) -> &str {
    let stem = without_extension(rel);
    &stem[stem.rfind('/').map_or(0, |i| i + 1)..]
}

pub fn file_name(rel: &str) -> &str {
    &rel[rel.rfind('/').map_or(0, |i| i + 1)..]
}

/// A planned relocation of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveRecord {
    pub source_path: String,
    pub target_path: String,
}

impl MoveRecord {
    pub fn new(source_path: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
        }
    }
}

/// Old reference name -> new reference name, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMapping {
    entries: Vec<(String, String)>,
}

impl LinkMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both the bare-stem and the path-without-extension forms, each only when it
    /// changes. For root-level documents both share a key and the path form wins.
    pub fn for_move(record: &MoveRecord) -> Self {
        let mut mapping = Self::new();

        let old_stem = file_stem(&record.source_path);
        let new_stem = file_stem(&record.target_path);
        if old_stem != new_stem {
            mapping.insert(old_stem, new_stem);
        }

        let old_rel = without_extension(&record.source_path);
        let new_rel = without_extension(&record.target_path);
        if old_rel != new_rel {
            mapping.insert(old_rel, new_rel);
        }

        mapping
    }

    pub fn insert(&mut self, old: &str, new: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == old) {
            Some(entry) => entry.1 = new.to_string(),
            None => self.entries.push((old.to_string(), new.to_string())),
        }
    }

    pub fn get(&self, old: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == old)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Cheap substring pre-filter: could `content` reference any old name?
    pub fn may_apply_to(&self, content: &str) -> bool {
        self.entries.iter().any(|(old, _)| content.contains(old.as_str()))
    }
}

/// A reference token whose target span can be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceOccurrence {
    /// Target without `#fragment` or `|display`.
    pub name: String,
    /// Byte offset of the name, right after `[[`.
    pub name_start: usize,
    pub name_len: usize,
}

pub fn reference_occurrences(content: &str) -> Vec<ReferenceOccurrence> {
    REFERENCE_RE
        .captures_iter(content)
        .filter_map(|cap| {
            let inner = cap.get(1)?;
            let text = inner.as_str();
            let name_end = text
                .find('|')
                .unwrap_or(text.len())
                .min(text.find('#').unwrap_or(text.len()));
            if name_end == 0 {
                return None;
            }
            Some(ReferenceOccurrence {
                name: text[..name_end].to_string(),
                name_start: inner.start(),
                name_len: name_end,
            })
        })
        .collect()
}

/// Replace `remove_len` bytes at `offset` with `insert_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub offset: usize,
    pub remove_len: usize,
    pub insert_text: String,
}

/// Edits for every reference whose target exactly matches an old name, in reverse
/// offset order. Display text and fragments are left untouched.
pub fn compute_rewrite_edits(content: &str, mapping: &LinkMapping) -> Vec<TextEdit> {
    if mapping.is_empty() {
        return Vec::new();
    }

    let mut edits: Vec<TextEdit> = reference_occurrences(content)
        .into_iter()
        .filter_map(|occ| {
            mapping.get(&occ.name).map(|new| TextEdit {
                offset: occ.name_start,
                remove_len: occ.name_len,
                insert_text: new.to_string(),
            })
        })
        .collect();

    edits.sort_by(|a, b| b.offset.cmp(&a.offset));
    edits
}

pub fn apply_edits(content: &str, edits: &[TextEdit]) -> String {
    let mut out = content.to_string();
    for edit in edits {
        out.replace_range(edit.offset..edit.offset + edit.remove_len, &edit.insert_text);
    }
    out
}

/// Rewrite references according to `mapping`; returns the new content and the number
/// of rewritten references.
pub fn rewrite_references(content: &str, mapping: &LinkMapping) -> (String, usize) {
    let edits = compute_rewrite_edits(content, mapping);
    if edits.is_empty() {
        return (content.to_string(), 0);
    }
    (apply_edits(content, &edits), edits.len())
}
