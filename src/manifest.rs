use crate::types::{Result, ShelfError};
use crate::utils::title;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// One game record resolved from the local manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    /// Slug key, e.g. `the_witcher_3`.
    pub title: String,
    pub long_title: Option<String>,
    pub image: Option<String>,
    /// Source scale is 0-50.
    pub rating: Option<u8>,
    pub release_timestamp: Option<i64>,
}

impl ManifestEntry {
    pub fn named(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            long_title: None,
            image: None,
            rating: None,
            release_timestamp: None,
        }
    }
}

/// Local manifest lookup, keyed by normalized title.
///
/// The manifest file is accepted in JSON or TOML encoding, and in any of the
/// shapes downloader tools emit: a list of game objects, a map of slug to
/// game object, or a flat list of titles. Unknown shapes resolve to an empty
/// store rather than an error.
pub struct ManifestStore {
    entries: HashMap<String, ManifestEntry>,
}

impl ManifestStore {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let value = parse_any(&raw)?;
        let entries = resolve_entries(&value);
        info!(
            "Loaded manifest {} with {} entries",
            path.display(),
            entries.len()
        );
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: Vec<ManifestEntry>) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            let key = title::normalize_key(&entry.title);
            if key.is_empty() {
                warn!("Skipping manifest entry with empty title");
                continue;
            }
            map.insert(key, entry);
        }
        Self { entries: map }
    }

    /// Exact-key lookup on the normalized title.
    pub fn lookup(&self, title_or_key: &str) -> Option<&ManifestEntry> {
        self.entries.get(&title::normalize_key(title_or_key))
    }

    /// Sorted slug listing for presentation layers.
    pub fn titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = self.entries.values().map(|e| e.title.clone()).collect();
        titles.sort();
        titles
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_any(raw: &str) -> Result<Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Ok(value),
        Err(json_err) => match raw.parse::<toml::Value>() {
            Ok(value) => serde_json::to_value(value).map_err(ShelfError::Serialization),
            Err(toml_err) => Err(ShelfError::Manifest(format!(
                "neither JSON ({}) nor TOML ({})",
                json_err, toml_err
            ))),
        },
    }
}

fn resolve_entries(value: &Value) -> Vec<ManifestEntry> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(slug) => Some(ManifestEntry::named(slug.clone())),
                Value::Object(_) => entry_from_object(None, item),
                other => {
                    warn!("Skipping manifest item of unexpected shape: {}", other);
                    None
                }
            })
            .collect(),
        Value::Object(map) => {
            // A top-level `games` list is unwrapped first.
            if let Some(games) = map.get("games") {
                if games.is_array() {
                    return resolve_entries(games);
                }
            }
            map.iter()
                .filter_map(|(slug, item)| entry_from_object(Some(slug.as_str()), item))
                .collect()
        }
        other => {
            warn!("Manifest has unexpected top-level shape: {}", other);
            Vec::new()
        }
    }
}

fn entry_from_object(slug: Option<&str>, value: &Value) -> Option<ManifestEntry> {
    let object = value.as_object()?;
    let title = object
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| slug.map(str::to_string))?;

    Some(ManifestEntry {
        title,
        long_title: object
            .get("long_title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        image: object
            .get("image")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(normalize_image_url),
        rating: object.get("rating").and_then(as_rating),
        release_timestamp: object.get("release_timestamp").and_then(as_timestamp),
    })
}

/// Manifest image URLs are scheme-relative.
fn normalize_image_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url.to_string()
    }
}

fn as_rating(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_u64().map(|r| r.min(u8::MAX as u64) as u8),
        Value::String(s) => s.trim().parse::<u8>().ok(),
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
