//! Catalog records: courses and their learning outcomes.

use crate::primitives::{CourseId, InstitutionId, OutcomeId, ProgramId};
use crate::storage::{Record, RecordKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Identifier.
    pub id: CourseId,
    /// Owning institution.
    pub institution_id: InstitutionId,
    /// Normalized number, unique per institution (e.g. "CS 101").
    pub course_number: String,
    /// Title (e.g. "Introduction to Programming").
    pub title: String,
    /// Department name, may be empty.
    pub department: String,
    /// Credit hours.
    pub credit_hours: u8,
    /// Programs the course belongs to.
    pub program_ids: Vec<ProgramId>,
    /// Inactive courses cannot get new offerings.
    pub active: bool,
    /// Creation time.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl Course {
    /// Whether the course belongs to any of `programs`.
    #[must_use]
    pub fn in_any_program(&self, programs: &[ProgramId]) -> bool {
        self.program_ids.iter().any(|p| programs.contains(p))
    }
}

/// A Course Learning Outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Identifier.
    pub id: OutcomeId,
    /// Owning institution.
    pub institution_id: InstitutionId,
    /// Course the outcome belongs to.
    pub course_id: CourseId,
    /// Position within the course, starting at 1.
    pub clo_number: u16,
    /// Outcome statement.
    pub description: String,
    /// Inactive outcomes get no new assessments.
    pub active: bool,
}

impl Record for Course {
    const KIND: RecordKind = RecordKind::Course;

    fn key(&self) -> u64 {
        self.id.0
    }

    fn institution(&self) -> Option<InstitutionId> {
        Some(self.institution_id)
    }
}

impl Record for Outcome {
    const KIND: RecordKind = RecordKind::Outcome;

    fn key(&self) -> u64 {
        self.id.0
    }

    fn institution(&self) -> Option<InstitutionId> {
        Some(self.institution_id)
    }
}
