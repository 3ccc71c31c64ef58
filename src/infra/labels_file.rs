// ============================================================
// Layer 6 — Label List File
// ============================================================
// labels.txt: one label per line, line number == label id.
// The inference side reads it to turn class ids back into
// words, so it is written once and never rewritten. If an
// existing file disagrees with the live vocabulary we only
// warn; the operator decides which one is stale.

use anyhow::{Context, Result};
use std::{fs, path::Path};

use crate::domain::vocabulary::LabelVocabulary;

/// What happened to the label list on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelsFileStatus {
    Written,
    Matches,
    Differs,
}

pub fn ensure_labels_file(path: &Path, vocabulary: &LabelVocabulary) -> Result<LabelsFileStatus> {
    if !path.exists() {
        let mut text = vocabulary.names().join("\n");
        text.push('\n');
        fs::write(path, text)
            .with_context(|| format!("Cannot write label list '{}'", path.display()))?;
        tracing::info!("Wrote {} labels to '{}'", vocabulary.len(), path.display());
        return Ok(LabelsFileStatus::Written);
    }

    let existing = fs::read_to_string(path)
        .with_context(|| format!("Cannot read label list '{}'", path.display()))?;
    let on_disk: Vec<&str> = existing.lines().collect();

    if on_disk.iter().copied().eq(vocabulary.names().iter().map(String::as_str)) {
        Ok(LabelsFileStatus::Matches)
    } else {
        let first = (0..on_disk.len().max(vocabulary.len()))
            .find(|&id| on_disk.get(id).copied() != vocabulary.name_of(id))
            .unwrap_or(0);
        tracing::warn!(
            "'{}' lists {} labels but the corpus vocabulary has {} (first difference at id {first}: {:?} vs {:?}); leaving it unchanged",
            path.display(),
            on_disk.len(),
            vocabulary.len(),
            on_disk.get(first),
            vocabulary.name_of(first)
        );
        Ok(LabelsFileStatus::Differs)
    }
}
