//! # CLO Workflow
//!
//! The status machine every CLO assessment moves through.
//!
//! ```text
//! unassigned ──assign──► assigned ──record──► in_progress ──submit──► awaiting_approval
//!                           │                     ▲                      │        │
//!                           └──────submit─────────┼──────────────────────┘        │
//!                                                 │                     approve   rework
//!                                              reopen                      ▼        ▼
//!                                                 └──────────────────── approved  needs_rework
//! ```
//!
//! Any state except `approved` can be marked `never_coming_in`; reopening it
//! returns to `assigned` (or `unassigned` when the section has no instructor).
//!
//! This module is pure: it decides transitions and validates data. Access
//! checks and persistence happen in [`crate::registrar`].

use crate::error::{RegistrarError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a CLO assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloStatus {
    /// Section has no instructor yet.
    Unassigned,
    /// Instructor assigned, no data entered.
    Assigned,
    /// Data entry started.
    InProgress,
    /// Submitted and waiting for a reviewer.
    AwaitingApproval,
    /// Accepted by a reviewer.
    Approved,
    /// Sent back to the instructor with feedback.
    NeedsRework,
    /// Will not be reported for this term.
    NeverComingIn,
}

impl CloStatus {
    /// All statuses in workflow order.
    pub const ALL: [Self; 7] = [
        Self::Unassigned,
        Self::Assigned,
        Self::InProgress,
        Self::AwaitingApproval,
        Self::Approved,
        Self::NeedsRework,
        Self::NeverComingIn,
    ];

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Approved => "approved",
            Self::NeedsRework => "needs_rework",
            Self::NeverComingIn => "never_coming_in",
        }
    }

    /// Whether assessment data may be edited in this status.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        matches!(self, Self::Assigned | Self::InProgress | Self::NeedsRework)
    }

    /// Whether the assessment counts as finished for completion reporting.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Approved | Self::NeverComingIn)
    }
}

impl fmt::Display for CloStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloStatus {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RegistrarError::validation(format!("unknown CLO status '{s}'")))
    }
}

/// An action applied to an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    /// System: instructor set on the section.
    AssignInstructor,
    /// System: instructor cleared from the section.
    UnassignInstructor,
    /// Save assessment data.
    Record,
    /// Send for review.
    Submit,
    /// Accept the submission.
    Approve,
    /// Return to the instructor with feedback.
    RequestRework,
    /// Close without data.
    MarkNeverComingIn,
    /// Reopen an approved or closed assessment.
    Reopen,
}

impl WorkflowAction {
    /// Whether the action is a reviewer decision.
    #[must_use]
    pub const fn is_review(self) -> bool {
        matches!(
            self,
            Self::Approve | Self::RequestRework | Self::MarkNeverComingIn | Self::Reopen
        )
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AssignInstructor => "assign an instructor to",
            Self::UnassignInstructor => "unassign the instructor of",
            Self::Record => "record data for",
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::RequestRework => "request rework on",
            Self::MarkNeverComingIn => "mark never-coming-in",
            Self::Reopen => "reopen",
        };
        f.write_str(text)
    }
}

/// Compute the status reached by applying `action` from `from`.
///
/// `has_instructor` only matters when reopening a never-coming-in
/// assessment.
pub fn next_status(from: CloStatus, action: WorkflowAction, has_instructor: bool) -> Result<CloStatus> {
    use CloStatus as S;
    use WorkflowAction as A;

    let to = match (action, from) {
        (A::AssignInstructor, S::Unassigned) => S::Assigned,
        (A::UnassignInstructor, S::Assigned) => S::Unassigned,
        (A::Record, S::Assigned | S::InProgress | S::NeedsRework) => S::InProgress,
        (A::Submit, S::Assigned | S::InProgress | S::NeedsRework) => S::AwaitingApproval,
        (A::Approve, S::AwaitingApproval) => S::Approved,
        (A::RequestRework, S::AwaitingApproval) => S::NeedsRework,
        (A::MarkNeverComingIn, status) if status != S::Approved => S::NeverComingIn,
        (A::Reopen, S::Approved) => S::InProgress,
        (A::Reopen, S::NeverComingIn) => {
            if has_instructor {
                S::Assigned
            } else {
                S::Unassigned
            }
        }
        _ => return Err(RegistrarError::InvalidTransition { from, action }),
    };
    Ok(to)
}

/// Assessment numbers entered by an instructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentData {
    /// Students who took the assessment.
    pub students_took: Option<u32>,
    /// Students who met the outcome.
    pub students_passed: Option<u32>,
    /// How the outcome was assessed (exam, project, rubric, ...).
    pub assessment_tool: Option<String>,
    /// Free-form notes from the instructor.
    pub narrative: Option<String>,
}

/// Check internal consistency of assessment numbers.
///
/// `enrollment` of zero means "unknown" and skips the enrollment bound.
pub fn validate_counts(data: &AssessmentData, enrollment: u32) -> Result<()> {
    if let (Some(took), Some(passed)) = (data.students_took, data.students_passed) {
        if passed > took {
            return Err(RegistrarError::validation(format!(
                "students passed ({passed}) cannot exceed students who took the assessment ({took})"
            )));
        }
    }
    if let Some(took) = data.students_took {
        if enrollment > 0 && took > enrollment {
            return Err(RegistrarError::validation(format!(
                "students who took the assessment ({took}) cannot exceed enrollment ({enrollment})"
            )));
        }
    }
    Ok(())
}

/// Check that assessment data is complete enough to submit.
pub fn validate_submission(data: &AssessmentData, enrollment: u32) -> Result<()> {
    let mut missing = Vec::new();
    if data.students_took.is_none() {
        missing.push("students_took");
    }
    if data.students_passed.is_none() {
        missing.push("students_passed");
    }
    if data
        .assessment_tool
        .as_deref()
        .is_none_or(|tool| tool.trim().is_empty())
    {
        missing.push("assessment_tool");
    }
    if !missing.is_empty() {
        return Err(RegistrarError::validation(format!(
            "cannot submit: missing {}",
            missing.join(", ")
        )));
    }
    validate_counts(data, enrollment)
}

/// Integer pass rate (floor), or `None` when nobody took the assessment.
#[must_use]
pub fn pass_rate_percent(took: Option<u32>, passed: Option<u32>) -> Option<u32> {
    match (took, passed) {
        (Some(took), Some(passed)) if took > 0 => {
            Some((u64::from(passed) * 100 / u64::from(took)) as u32)
        }
        _ => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn complete() -> AssessmentData {
        AssessmentData {
            students_took: Some(20),
            students_passed: Some(17),
            assessment_tool: Some("Final exam Q4".into()),
            narrative: None,
        }
    }

    #[test]
    fn happy_path_to_approval() {
        let s = next_status(CloStatus::Unassigned, WorkflowAction::AssignInstructor, true);
        assert_eq!(s.ok(), Some(CloStatus::Assigned));
        let s = next_status(CloStatus::Assigned, WorkflowAction::Record, true);
        assert_eq!(s.ok(), Some(CloStatus::InProgress));
        let s = next_status(CloStatus::InProgress, WorkflowAction::Submit, true);
        assert_eq!(s.ok(), Some(CloStatus::AwaitingApproval));
        let s = next_status(CloStatus::AwaitingApproval, WorkflowAction::Approve, true);
        assert_eq!(s.ok(), Some(CloStatus::Approved));
    }

    #[test]
    fn rework_loop() {
        let s = next_status(CloStatus::AwaitingApproval, WorkflowAction::RequestRework, true);
        assert_eq!(s.ok(), Some(CloStatus::NeedsRework));
        let s = next_status(CloStatus::NeedsRework, WorkflowAction::Submit, true);
        assert_eq!(s.ok(), Some(CloStatus::AwaitingApproval));
    }

    #[test]
    fn approved_cannot_be_marked_never_coming_in() {
        let err = next_status(CloStatus::Approved, WorkflowAction::MarkNeverComingIn, true);
        assert!(matches!(
            err,
            Err(RegistrarError::InvalidTransition {
                from: CloStatus::Approved,
                ..
            })
        ));
    }

    #[test]
    fn reopen_never_coming_in_depends_on_instructor() {
        let with = next_status(CloStatus::NeverComingIn, WorkflowAction::Reopen, true);
        let without = next_status(CloStatus::NeverComingIn, WorkflowAction::Reopen, false);
        assert_eq!(with.ok(), Some(CloStatus::Assigned));
        assert_eq!(without.ok(), Some(CloStatus::Unassigned));
    }

    #[test]
    fn reopen_approved_returns_to_in_progress() {
        let s = next_status(CloStatus::Approved, WorkflowAction::Reopen, true);
        assert_eq!(s.ok(), Some(CloStatus::InProgress));
    }

    #[test]
    fn cannot_approve_unsubmitted() {
        assert!(next_status(CloStatus::InProgress, WorkflowAction::Approve, true).is_err());
        assert!(next_status(CloStatus::Assigned, WorkflowAction::RequestRework, true).is_err());
    }

    #[test]
    fn submission_requires_all_fields() {
        let err = validate_submission(&AssessmentData::default(), 0);
        let message = err.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains("students_took"));
        assert!(message.contains("students_passed"));
        assert!(message.contains("assessment_tool"));
        assert!(validate_submission(&complete(), 25).is_ok());
    }

    #[test]
    fn blank_tool_is_missing() {
        let data = AssessmentData {
            assessment_tool: Some("  ".into()),
            ..complete()
        };
        assert!(validate_submission(&data, 0).is_err());
    }

    #[test]
    fn counts_respect_enrollment() {
        assert!(validate_counts(&complete(), 19).is_err());
        assert!(validate_counts(&complete(), 20).is_ok());
        assert!(validate_counts(&complete(), 0).is_ok());
        let inverted = AssessmentData {
            students_took: Some(3),
            students_passed: Some(4),
            ..AssessmentData::default()
        };
        assert!(validate_counts(&inverted, 0).is_err());
    }

    #[test]
    fn pass_rate_is_floored() {
        assert_eq!(pass_rate_percent(Some(3), Some(2)), Some(66));
        assert_eq!(pass_rate_percent(Some(0), Some(0)), None);
        assert_eq!(pass_rate_percent(None, Some(1)), None);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Awaiting_Approval".parse::<CloStatus>().ok(), Some(CloStatus::AwaitingApproval));
        assert!("done".parse::<CloStatus>().is_err());
    }

    fn any_status() -> impl Strategy<Value = CloStatus> {
        prop::sample::select(CloStatus::ALL.to_vec())
    }

    fn any_action() -> impl Strategy<Value = WorkflowAction> {
        prop::sample::select(vec![
            WorkflowAction::AssignInstructor,
            WorkflowAction::UnassignInstructor,
            WorkflowAction::Record,
            WorkflowAction::Submit,
            WorkflowAction::Approve,
            WorkflowAction::RequestRework,
            WorkflowAction::MarkNeverComingIn,
            WorkflowAction::Reopen,
        ])
    }

    proptest! {
        #[test]
        fn approval_only_from_awaiting(from in any_status(), has_instructor in any::<bool>()) {
            let result = next_status(from, WorkflowAction::Approve, has_instructor);
            prop_assert_eq!(result.is_ok(), from == CloStatus::AwaitingApproval);
        }

        #[test]
        fn approved_is_left_only_by_reopen(action in any_action(), has_instructor in any::<bool>()) {
            let result = next_status(CloStatus::Approved, action, has_instructor);
            prop_assert_eq!(result.is_ok(), action == WorkflowAction::Reopen);
        }

        #[test]
        fn never_coming_in_from_all_but_approved(from in any_status(), has_instructor in any::<bool>()) {
            let result = next_status(from, WorkflowAction::MarkNeverComingIn, has_instructor);
            prop_assert_eq!(result.is_ok(), from != CloStatus::Approved);
            if let Ok(to) = result {
                prop_assert_eq!(to, CloStatus::NeverComingIn);
            }
        }

        #[test]
        fn editable_states_accept_record(from in any_status()) {
            let result = next_status(from, WorkflowAction::Record, true);
            prop_assert_eq!(result.is_ok(), from.is_editable());
        }

        #[test]
        fn pass_rate_never_exceeds_hundred(took in 1u32..10_000, passed in 0u32..10_000) {
            let passed = passed.min(took);
            let rate = pass_rate_percent(Some(took), Some(passed));
            prop_assert!(rate.is_some_and(|r| r <= 100));
        }
    }
}
