//! Schedule records: terms, course offerings and sections.

use crate::error::{RegistrarError, Result};
use crate::primitives::{CourseId, InstitutionId, OfferingId, SectionId, TermId, UserId};
use crate::storage::{Record, RecordKind};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An academic term (e.g. "Fall 2025").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    /// Identifier.
    pub id: TermId,
    /// Owning institution.
    pub institution_id: InstitutionId,
    /// Name, unique per institution.
    pub name: String,
    /// First day of the term.
    pub start_date: NaiveDate,
    /// Last day of the term. Always after `start_date`.
    pub end_date: NaiveDate,
    /// Inactive terms are hidden from default listings.
    pub active: bool,
}

impl Term {
    /// Validate the date range.
    pub fn check_dates(start: NaiveDate, end: NaiveDate) -> Result<()> {
        if start >= end {
            return Err(RegistrarError::validation(format!(
                "term start date {start} must be before end date {end}"
            )));
        }
        Ok(())
    }
}

/// A course offered in a term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    /// Identifier.
    pub id: OfferingId,
    /// Owning institution.
    pub institution_id: InstitutionId,
    /// Offered course.
    pub course_id: CourseId,
    /// Term of the offering.
    pub term_id: TermId,
    /// Creation time.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// Scheduled and running.
    #[default]
    Open,
    /// Finished.
    Closed,
    /// Cancelled before it ran.
    Cancelled,
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

impl FromStr for SectionStatus {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(RegistrarError::validation(format!(
                "unknown section status '{other}'"
            ))),
        }
    }
}

/// A section of an offering, taught by at most one instructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Identifier.
    pub id: SectionId,
    /// Owning institution.
    pub institution_id: InstitutionId,
    /// Parent offering.
    pub offering_id: OfferingId,
    /// Section label, unique within the offering (e.g. "001").
    pub section_number: String,
    /// Assigned instructor.
    pub instructor_id: Option<UserId>,
    /// Enrolled students. Zero means unknown.
    pub enrollment: u32,
    /// Lifecycle status.
    pub status: SectionStatus,
}

impl Record for Term {
    const KIND: RecordKind = RecordKind::Term;

    fn key(&self) -> u64 {
        self.id.0
    }

    fn institution(&self) -> Option<InstitutionId> {
        Some(self.institution_id)
    }
}

impl Record for Offering {
    const KIND: RecordKind = RecordKind::Offering;

    fn key(&self) -> u64 {
        self.id.0
    }

    fn institution(&self) -> Option<InstitutionId> {
        Some(self.institution_id)
    }
}

impl Record for Section {
    const KIND: RecordKind = RecordKind::Section;

    fn key(&self) -> u64 {
        self.id.0
    }

    fn institution(&self) -> Option<InstitutionId> {
        Some(self.institution_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_dates_must_be_ordered() {
        let a = NaiveDate::from_ymd_opt(2025, 8, 25);
        let b = NaiveDate::from_ymd_opt(2025, 12, 15);
        let (Some(a), Some(b)) = (a, b) else {
            return;
        };
        assert!(Term::check_dates(a, b).is_ok());
        assert!(Term::check_dates(b, a).is_err());
        assert!(Term::check_dates(a, a).is_err());
    }

    #[test]
    fn section_status_parsing() {
        assert_eq!("Canceled".parse::<SectionStatus>().ok(), Some(SectionStatus::Cancelled));
        assert_eq!(SectionStatus::default(), SectionStatus::Open);
        assert!("paused".parse::<SectionStatus>().is_err());
    }
}
