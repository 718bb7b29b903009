//! # Import Report
//!
//! What an import did (or, for a dry run, would do): counts per outcome,
//! field-level conflicts with their resolution, per-record errors and
//! warnings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a field conflict was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The stored value was kept.
    KeptExisting,
    /// The imported value replaced the stored one.
    AppliedIncoming,
    /// The stored value was empty and got filled in.
    FilledEmpty,
    /// Nothing changed; a person must decide.
    NeedsReview,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::KeptExisting => "kept existing",
            Self::AppliedIncoming => "applied incoming",
            Self::FilledEmpty => "filled empty",
            Self::NeedsReview => "needs review",
        };
        f.write_str(text)
    }
}

/// One field whose stored and imported values differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    /// Record kind ("course", "term", ...).
    pub entity: String,
    /// Natural key of the record (course number, email, ...).
    pub key: String,
    /// Field name.
    pub field: String,
    /// Stored value.
    pub existing: String,
    /// Imported value.
    pub incoming: String,
    /// What happened.
    pub resolution: Resolution,
}

/// A record that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    /// Record kind.
    pub entity: String,
    /// Natural key, or a row reference when the key could not be read.
    pub key: String,
    /// Why it failed.
    pub message: String,
}

/// Result of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Adapter used.
    pub adapter: String,
    /// Whether nothing was written.
    pub dry_run: bool,
    /// Records looked at.
    pub processed: usize,
    /// Records created.
    pub created: usize,
    /// Records changed.
    pub updated: usize,
    /// Records that already matched.
    pub unchanged: usize,
    /// Records left alone because of conflicts or strategy.
    pub skipped: usize,
    /// Created records per kind.
    pub created_by_entity: BTreeMap<String, usize>,
    /// Field-level differences.
    pub conflicts: Vec<FieldConflict>,
    /// Per-record failures.
    pub errors: Vec<RecordError>,
    /// Non-fatal notes (parse problems, ignored values).
    pub warnings: Vec<String>,
}

impl ImportReport {
    /// Start an empty report.
    #[must_use]
    pub fn new(adapter: impl Into<String>, dry_run: bool) -> Self {
        Self {
            adapter: adapter.into(),
            dry_run,
            ..Self::default()
        }
    }

    /// Count a created record.
    pub fn created(&mut self, entity: &str) {
        self.processed += 1;
        self.created += 1;
        *self.created_by_entity.entry(entity.to_string()).or_default() += 1;
    }

    /// Count an updated record.
    pub fn updated(&mut self) {
        self.processed += 1;
        self.updated += 1;
    }

    /// Count a record that already matched.
    pub fn unchanged(&mut self) {
        self.processed += 1;
        self.unchanged += 1;
    }

    /// Count a record left alone.
    pub fn skipped(&mut self) {
        self.processed += 1;
        self.skipped += 1;
    }

    /// Record a failure and count the record as processed.
    pub fn error(&mut self, entity: &str, key: impl Into<String>, message: impl ToString) {
        self.processed += 1;
        self.errors.push(RecordError {
            entity: entity.to_string(),
            key: key.into(),
            message: message.to_string(),
        });
    }

    /// Add a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Conflicts that still need a person.
    pub fn unresolved_conflicts(&self) -> impl Iterator<Item = &FieldConflict> {
        self.conflicts
            .iter()
            .filter(|c| c.resolution == Resolution::NeedsReview)
    }

    /// No errors and no unresolved conflicts.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.unresolved_conflicts().next().is_none()
    }

    /// Plain-text rendering for the CLI.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { " (dry run)" } else { "" };
        out.push_str(&format!("Import via {}{mode}\n", self.adapter));
        out.push_str(&format!(
            "  processed {}  created {}  updated {}  unchanged {}  skipped {}\n",
            self.processed, self.created, self.updated, self.unchanged, self.skipped
        ));
        for (entity, count) in &self.created_by_entity {
            out.push_str(&format!("  + {count} {entity}\n"));
        }

        if !self.conflicts.is_empty() {
            out.push_str(&format!("Conflicts ({}):\n", self.conflicts.len()));
            for c in &self.conflicts {
                out.push_str(&format!(
                    "  - {} {} {}: '{}' vs '{}' [{}]\n",
                    c.entity, c.key, c.field, c.existing, c.incoming, c.resolution
                ));
            }
        }
        if !self.errors.is_empty() {
            out.push_str(&format!("Errors ({}):\n", self.errors.len()));
            for e in &self.errors {
                out.push_str(&format!("  - {} {}: {}\n", e.entity, e.key, e.message));
            }
        }
        if !self.warnings.is_empty() {
            out.push_str(&format!("Warnings ({}):\n", self.warnings.len()));
            for w in &self.warnings {
                out.push_str(&format!("  - {w}\n"));
            }
        }
        out
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(resolution: Resolution) -> FieldConflict {
        FieldConflict {
            entity: "course".into(),
            key: "CS 101".into(),
            field: "title".into(),
            existing: "Intro".into(),
            incoming: "Introduction".into(),
            resolution,
        }
    }

    #[test]
    fn counters_add_up() {
        let mut report = ImportReport::new("roster_csv", false);
        report.created("course");
        report.created("course");
        report.updated();
        report.unchanged();
        report.skipped();
        report.error("term", "Fall", "bad dates");

        assert_eq!(report.processed, 6);
        assert_eq!(report.created_by_entity.get("course"), Some(&2));
        assert!(!report.is_clean());
    }

    #[test]
    fn resolved_conflicts_keep_report_clean() {
        let mut report = ImportReport::new("json", true);
        report.conflicts.push(conflict(Resolution::AppliedIncoming));
        assert!(report.is_clean());

        report.conflicts.push(conflict(Resolution::NeedsReview));
        assert!(!report.is_clean());
        assert_eq!(report.unresolved_conflicts().count(), 1);
    }

    #[test]
    fn text_mentions_everything() {
        let mut report = ImportReport::new("catalog_csv", true);
        report.created("outcome");
        report.conflicts.push(conflict(Resolution::NeedsReview));
        report.warn("row 4: blank course number");

        let text = report.to_text();
        assert!(text.contains("dry run"));
        assert!(text.contains("+ 1 outcome"));
        assert!(text.contains("needs review"));
        assert!(text.contains("row 4"));
    }
}
