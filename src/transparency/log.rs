//! Collection transparency log.
//!
//! Counts what the recorder kept and which questions were exported. Holds no
//! recorded values and no participant ids.

use crate::recorder::QuestionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while persisting the counts.
#[derive(Debug, Error)]
pub enum TransparencyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stats file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Something the page loop counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tally {
    /// Slider value change appended
    Value,
    /// Slider enter/leave appended
    Hover,
    /// Choice enter/leave/select appended
    Selection,
    /// Notification dropped (unknown control, malformed id)
    Skipped,
}

/// Cumulative counts, as persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionCounts {
    pub value_events: u64,
    pub hover_events: u64,
    pub selection_events: u64,
    pub skipped_notifications: u64,
    /// Exports that contained each question
    pub exports: BTreeMap<QuestionId, u64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CollectionCounts {
    /// Events kept across all control kinds.
    pub fn recorded_events(&self) -> u64 {
        self.value_events + self.hover_events + self.selection_events
    }

    /// Exports per question, summed.
    pub fn question_exports(&self) -> u64 {
        self.exports.values().sum()
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "Collection Statistics:\n\
             - Slider value changes recorded: {}\n\
             - Slider hover events recorded: {}\n\
             - Choice events recorded: {}\n\
             - Notifications skipped: {}",
            self.value_events, self.hover_events, self.selection_events, self.skipped_notifications,
        );
        if self.exports.is_empty() {
            out.push_str("\n - Exports: none");
        } else {
            out.push_str("\n - Exports by question:");
            for (question, n) in &self.exports {
                out.push_str(&format!("\n     {question}: {n}"));
            }
        }
        out
    }
}

/// Shared counter of recording activity.
#[derive(Debug, Default)]
pub struct TransparencyLog {
    counts: Mutex<CollectionCounts>,
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue from the counts stored at `path`; a missing or unreadable
    /// file starts from zero.
    pub fn with_persistence(path: PathBuf) -> Self {
        let counts = match read_counts(&path) {
            Ok(counts) => counts,
            Err(e) => {
                warn!("Could not load previous transparency stats: {e}");
                CollectionCounts::default()
            }
        };
        Self {
            counts: Mutex::new(counts),
            persist_path: Some(path),
        }
    }

    pub fn tally(&self, tally: Tally) {
        let mut counts = self.lock();
        let counter = match tally {
            Tally::Value => &mut counts.value_events,
            Tally::Hover => &mut counts.hover_events,
            Tally::Selection => &mut counts.selection_events,
            Tally::Skipped => &mut counts.skipped_notifications,
        };
        *counter += 1;
    }

    /// Count one export covering `questions`.
    pub fn record_export(&self, questions: &[&QuestionId]) {
        let mut counts = self.lock();
        for question in questions {
            *counts.exports.entry((*question).clone()).or_default() += 1;
        }
    }

    /// Snapshot of the current counts.
    pub fn counts(&self) -> CollectionCounts {
        self.lock().clone()
    }

    pub fn summary(&self) -> String {
        self.counts().summary()
    }

    /// Write the counts to the persistence path, if any.
    pub fn save(&self) -> Result<(), TransparencyError> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut counts = self.counts();
        counts.last_updated = Some(Utc::now());
        std::fs::write(path, serde_json::to_string_pretty(&counts)?)?;
        debug!("Transparency stats saved to {path:?}");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, CollectionCounts> {
        match self.counts.lock() {
            Ok(counts) => counts,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Read persisted counts. A missing file reads as zero.
pub fn read_counts(path: &std::path::Path) -> Result<CollectionCounts, TransparencyError> {
    if !path.exists() {
        return Ok(CollectionCounts::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tallies_and_exports() {
        let log = TransparencyLog::new();
        let q1 = QuestionId::new("QID1");
        let q2 = QuestionId::new("QID2");

        log.tally(Tally::Value);
        log.tally(Tally::Value);
        log.tally(Tally::Hover);
        log.record_export(&[&q1, &q2]);
        log.record_export(&[&q2]);

        let counts = log.counts();
        assert_eq!(counts.value_events, 2);
        assert_eq!(counts.hover_events, 1);
        assert_eq!(counts.recorded_events(), 3);
        assert_eq!(counts.exports.get(&q1), Some(&1));
        assert_eq!(counts.exports.get(&q2), Some(&2));
        assert_eq!(counts.question_exports(), 3);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("sir-transparency-{}", uuid::Uuid::new_v4()))
            .join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.tally(Tally::Selection);
        log.record_export(&[&QuestionId::new("QID7")]);
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path.clone()).counts();
        assert_eq!(reloaded.selection_events, 1);
        assert_eq!(reloaded.exports.get(&QuestionId::new("QID7")), Some(&1));
        assert!(reloaded.last_updated.is_some());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_stats_file_reads_as_zero() {
        let path = std::env::temp_dir().join(format!("sir-missing-{}.json", uuid::Uuid::new_v4()));
        assert_eq!(read_counts(&path).unwrap(), CollectionCounts::default());
    }

    #[test]
    fn test_summary_lists_questions() {
        let log = TransparencyLog::new();
        assert!(log.summary().contains("Exports: none"));

        log.record_export(&[&QuestionId::new("QID4")]);
        let summary = log.summary();
        assert!(summary.contains("Choice events"));
        assert!(summary.contains("QID4: 1"));
    }
}
