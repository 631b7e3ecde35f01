//! Model registry: category names mapped to download URLs and display
//! names, plus label normalization for raw classifier output.

use std::collections::BTreeMap;

use serde::Serialize;

/// Built-in categories: key, storage file name, display name.
const MODEL_FILES: &[(&str, &str, &str)] = &[
    ("alphabet", "letters.task", "Letters (A-Z)"),
    ("numbers", "numbers.task", "Numbers (0-9)"),
    ("colors", "colors.task", "Colors"),
    ("basicWords", "basicWords.task", "Basic Words"),
    ("family", "family.task", "Family & People"),
    ("food", "food.task", "Food & Drinks"),
];

/// Synonym table normalizing raw model output to canonical sign labels.
const WORD_MAPPINGS: &[(&str, &str)] = &[
    ("thank you", "THANK"),
    ("thankyou", "THANK"),
    ("thanks", "THANK"),
    ("goodbye", "GOODBYE"),
    ("good bye", "GOODBYE"),
    ("bye", "GOODBYE"),
    ("hello", "HELLO"),
    ("hi", "HELLO"),
    ("please", "PLEASE"),
    ("yes", "YES"),
    ("no", "NO"),
];

#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub key: String,
    pub url: String,
    pub display_name: String,
}

/// Read-only lookup table from category to canonical model location.
/// Fixed at configuration time; the admin surface may register extra
/// entries before the pipeline starts, never while it runs.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: BTreeMap<String, ModelEntry>,
}

impl ModelRegistry {
    /// Registry of the built-in categories rooted at a storage bucket URL.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let mut registry = Self::default();
        for (key, file, display_name) in MODEL_FILES {
            registry.insert(ModelEntry {
                key: (*key).to_string(),
                url: format!("{base}/{file}"),
                display_name: (*display_name).to_string(),
            });
        }
        registry
    }

    pub fn insert(&mut self, entry: ModelEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn get(&self, category: &str) -> Option<&ModelEntry> {
        self.entries.get(category)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.entries.contains_key(category)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ModelEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What to load: a registered category, or a custom externally-hosted model
/// (a lesson module may override the canonical URL). Custom models are
/// cached keyed by their URL; categories by their registry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Category(String),
    Custom { url: String, display_name: String },
}

impl ModelSource {
    pub fn category(name: impl Into<String>) -> Self {
        Self::Category(name.into())
    }
}

/// Normalizes raw classifier output: trims, maps known synonyms to their
/// canonical sign, upper-cases everything else.
pub fn normalize_label(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let lower = trimmed.to_lowercase();
    for (from, to) in WORD_MAPPINGS {
        if lower == *from {
            return (*to).to_string();
        }
    }
    trimmed.to_uppercase()
}
