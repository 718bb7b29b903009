//! CLO assessments: the unit of outcome reporting.

use crate::primitives::{AssessmentId, InstitutionId, OutcomeId, SectionId, UserId};
use crate::storage::{Record, RecordKind};
use crate::workflow::{self, AssessmentData, CloStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in an assessment's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status before the change.
    pub from: CloStatus,
    /// Status after the change.
    pub to: CloStatus,
    /// Who made the change. `None` for system transitions.
    pub actor: Option<UserId>,
    /// When it happened.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub at: DateTime<Utc>,
    /// Reviewer feedback or reason, when given.
    pub note: Option<String>,
}

/// Results for one learning outcome in one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    /// Identifier.
    pub id: AssessmentId,
    /// Owning institution.
    pub institution_id: InstitutionId,
    /// Assessed section.
    pub section_id: SectionId,
    /// Assessed outcome.
    pub outcome_id: OutcomeId,
    /// Workflow status.
    pub status: CloStatus,
    /// Entered numbers and notes.
    pub data: AssessmentData,
    /// Latest reviewer feedback.
    pub feedback: Option<String>,
    /// Who last submitted.
    pub submitted_by: Option<UserId>,
    /// When it was last submitted.
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub submitted_at: Option<DateTime<Utc>>,
    /// Who last reviewed.
    pub reviewed_by: Option<UserId>,
    /// When it was last reviewed.
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Every status change, oldest first.
    pub history: Vec<StatusChange>,
}

impl Assessment {
    /// Integer pass rate for the entered numbers.
    #[must_use]
    pub fn pass_rate_percent(&self) -> Option<u32> {
        workflow::pass_rate_percent(self.data.students_took, self.data.students_passed)
    }

    /// Move to `to`, appending the change to the history.
    pub(crate) fn transition(&mut self, to: CloStatus, actor: Option<UserId>, note: Option<String>) {
        self.history.push(StatusChange {
            from: self.status,
            to,
            actor,
            at: Utc::now(),
            note,
        });
        self.status = to;
    }
}

impl Record for Assessment {
    const KIND: RecordKind = RecordKind::Assessment;

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
    fn transition_records_history() {
        let mut assessment = Assessment {
            id: AssessmentId(1),
            institution_id: InstitutionId(1),
            section_id: SectionId(1),
            outcome_id: OutcomeId(1),
            status: CloStatus::Assigned,
            data: AssessmentData::default(),
            feedback: None,
            submitted_by: None,
            submitted_at: None,
            reviewed_by: None,
            reviewed_at: None,
            history: Vec::new(),
        };
        assessment.transition(CloStatus::InProgress, Some(UserId(3)), None);
        assert_eq!(assessment.status, CloStatus::InProgress);
        assert_eq!(assessment.history.len(), 1);
        assert_eq!(assessment.history[0].from, CloStatus::Assigned);
        assert_eq!(assessment.history[0].actor, Some(UserId(3)));
    }
}
