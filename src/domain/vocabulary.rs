// ============================================================
// Layer 3 — Label Vocabulary
// ============================================================
// Bidirectional label <-> id mapping.
//
// Two types model the two phases:
//   VocabularyBuilder — open; the indexer adds labels as it
//                       meets the first line of each file
//   LabelVocabulary   — frozen; no insert method exists, so no
//                       label can appear after indexing ends
//
// Freezing appends the synthetic padding label "nothing" and,
// when a multiple is requested (half-precision training wants
// dimensions divisible by 8), "nothing_1", "nothing_2", ...

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Label assigned to padding samples.
pub const NOTHING_LABEL: &str = "nothing";

/// Open vocabulary used while scanning the corpus.
#[derive(Debug, Default)]
pub struct VocabularyBuilder {
    names: Vec<String>,
    ids:   HashMap<String, usize>,
}

impl VocabularyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `label`, assigning the next sequential
    /// id if it has not been seen before.
    pub fn intern(&mut self, label: &str) -> usize {
        if let Some(&id) = self.ids.get(label) {
            return id;
        }
        let id = self.names.len();
        self.names.push(label.to_string());
        self.ids.insert(label.to_string(), id);
        id
    }

    /// Close the vocabulary. Appends "nothing", then pads with
    /// "nothing_N" until the length is a multiple of `multiple`.
    pub fn freeze(mut self, multiple: Option<usize>) -> LabelVocabulary {
        self.intern(NOTHING_LABEL);
        if let Some(m) = multiple.filter(|&m| m > 1) {
            let mut extra = 0usize;
            while self.names.len() % m != 0 {
                extra += 1;
                self.intern(&format!("{NOTHING_LABEL}_{extra}"));
            }
        }
        LabelVocabulary { names: self.names, ids: self.ids }
    }
}

/// Frozen vocabulary. Serialised as its ordered name list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelVocabulary {
    names: Vec<String>,
    ids:   HashMap<String, usize>,
}

impl From<Vec<String>> for LabelVocabulary {
    fn from(names: Vec<String>) -> Self {
        let ids = names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id))
            .collect();
        Self { names, ids }
    }
}

impl From<LabelVocabulary> for Vec<String> {
    fn from(vocab: LabelVocabulary) -> Self {
        vocab.names
    }
}

impl LabelVocabulary {
    pub fn id_of(&self, label: &str) -> Option<usize> {
        self.ids.get(label).copied()
    }

    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Id of the padding label. Present in every frozen vocabulary.
    pub fn nothing_id(&self) -> usize {
        self.id_of(NOTHING_LABEL).unwrap_or(self.names.len().saturating_sub(1))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential_and_deduplicated() {
        let mut b = VocabularyBuilder::new();
        assert_eq!(b.intern("cat"), 0);
        assert_eq!(b.intern("dog"), 1);
        assert_eq!(b.intern("cat"), 0);
        assert_eq!(b.names.len(), 2);
    }

    #[test]
    fn test_freeze_appends_nothing_last() {
        let mut b = VocabularyBuilder::new();
        b.intern("cat");
        b.intern("dog");
        let vocab = b.freeze(None);
        assert_eq!(vocab.names(), &["cat", "dog", "nothing"]);
        assert_eq!(vocab.nothing_id(), 2);
        assert_eq!(vocab.name_of(1), Some("dog"));
        assert_eq!(vocab.id_of("horse"), None);
    }

    #[test]
    fn test_freeze_pads_to_multiple() {
        let mut b = VocabularyBuilder::new();
        for label in ["a", "b", "c"] {
            b.intern(label);
        }
        let vocab = b.freeze(Some(8));
        assert_eq!(vocab.len(), 8);
        assert_eq!(vocab.nothing_id(), 3);
        assert_eq!(vocab.name_of(7), Some("nothing_4"));
    }

    #[test]
    fn test_deserialised_vocabulary_rebuilds_reverse_map() {
        let vocab = LabelVocabulary::from(vec!["cat".to_string(), "nothing".to_string()]);
        let json = serde_json::to_string(&vocab).unwrap();
        assert_eq!(json, r#"["cat","nothing"]"#);
        let back: LabelVocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id_of("nothing"), Some(1));
    }
}
