//! CLO data entry and the approval workflow.
//!
//! Instructors record and submit results for their own sections. Reviewers
//! (program admins in scope, institution admins, site admins) approve,
//! return or close submissions. Every status change lands in the
//! assessment's history.

use super::Registrar;
use super::schedule::initial_status;
use crate::access::{Actor, Permission, Role};
use crate::error::{RegistrarError, Result};
use crate::models::{Assessment, Course, Offering, Outcome, Section};
use crate::primitives::{
    AssessmentId, InstitutionId, OfferingId, SectionId, TermId, UserId, optional_text,
    require_text,
};
use crate::storage::{RecordKind, RecordStore, WriteBatch};
use crate::workflow::{
    AssessmentData, CloStatus, WorkflowAction, next_status, validate_counts, validate_submission,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Filter for [`Registrar::list_assessments`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssessmentFilter {
    /// Institution to list. Defaults to the caller's.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    /// Only assessments of this section.
    #[serde(default)]
    pub section_id: Option<SectionId>,
    /// Only assessments in this status.
    #[serde(default)]
    pub status: Option<CloStatus>,
    /// Only sections taught by this user.
    #[serde(default)]
    pub instructor_id: Option<UserId>,
    /// Only sections in this term.
    #[serde(default)]
    pub term_id: Option<TermId>,
}

fn clean(data: AssessmentData) -> AssessmentData {
    AssessmentData {
        students_took: data.students_took,
        students_passed: data.students_passed,
        assessment_tool: optional_text(data.assessment_tool.as_deref()),
        narrative: optional_text(data.narrative.as_deref()),
    }
}

impl<S: RecordStore> Registrar<S> {
    /// Open the assessment of `outcome` in `section`.
    pub(crate) fn open_assessment(
        &mut self,
        batch: &mut WriteBatch,
        section: &Section,
        outcome: &Outcome,
    ) -> Result<Assessment> {
        let assessment = Assessment {
            id: AssessmentId(self.next_id(RecordKind::Assessment)?),
            institution_id: section.institution_id,
            section_id: section.id,
            outcome_id: outcome.id,
            status: initial_status(section),
            data: AssessmentData::default(),
            feedback: None,
            submitted_by: None,
            submitted_at: None,
            reviewed_by: None,
            reviewed_at: None,
            history: Vec::new(),
        };
        batch.put(&assessment)?;
        Ok(assessment)
    }

    /// Load an assessment with its section and course.
    fn assessment_context(
        &self,
        actor: &Actor,
        id: AssessmentId,
    ) -> Result<(Assessment, Section, Course)> {
        let assessment: Assessment = self.load_scoped(actor, id.0, "assessment")?;
        let section: Section = self.load(assessment.section_id.0, "section")?;
        let offering: Offering = self.load(section.offering_id.0, "offering")?;
        let course: Course = self.load(offering.course_id.0, "course")?;
        Ok((assessment, section, course))
    }

    /// Assessments visible to the caller. Instructors only see their own
    /// sections.
    pub fn list_assessments(
        &self,
        actor: &Actor,
        filter: &AssessmentFilter,
    ) -> Result<Vec<Assessment>> {
        actor.require(Permission::ViewInstitution)?;
        let institution = actor.resolve_institution(filter.institution_id)?;

        let terms: BTreeMap<OfferingId, TermId> = self
            .store
            .scan_tenant::<Offering>(institution)?
            .into_iter()
            .map(|o| (o.id, o.term_id))
            .collect();
        let own_only = actor.role == Role::Instructor;
        let sections: BTreeMap<SectionId, Section> = self
            .store
            .scan_tenant::<Section>(institution)?
            .into_iter()
            .filter(|s| !own_only || s.instructor_id == Some(actor.user_id))
            .filter(|s| filter.instructor_id.is_none_or(|i| s.instructor_id == Some(i)))
            .filter(|s| {
                filter
                    .term_id
                    .is_none_or(|t| terms.get(&s.offering_id) == Some(&t))
            })
            .map(|s| (s.id, s))
            .collect();

        Ok(self
            .store
            .scan_tenant::<Assessment>(institution)?
            .into_iter()
            .filter(|a| sections.contains_key(&a.section_id))
            .filter(|a| filter.section_id.is_none_or(|s| a.section_id == s))
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .collect())
    }

    /// Fetch one assessment.
    pub fn get_assessment(&self, actor: &Actor, id: AssessmentId) -> Result<Assessment> {
        actor.require(Permission::ViewInstitution)?;
        let (assessment, section, course) = self.assessment_context(actor, id)?;
        if !actor.can_edit_for(&course, section.instructor_id) {
            return Err(RegistrarError::forbidden(format!(
                "assessment {id} belongs to another instructor's section"
            )));
        }
        Ok(assessment)
    }

    /// Save assessment data without submitting.
    pub fn record_assessment(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        data: AssessmentData,
    ) -> Result<Assessment> {
        let (mut assessment, section, _) = self.editable(actor, id)?;
        let to = next_status(
            assessment.status,
            WorkflowAction::Record,
            section.instructor_id.is_some(),
        )?;
        let data = clean(data);
        validate_counts(&data, section.enrollment)?;

        assessment.data = data;
        if to != assessment.status {
            assessment.transition(to, Some(actor.user_id), None);
        }
        self.store.put(&assessment)?;
        Ok(assessment)
    }

    /// Submit an assessment for approval, optionally replacing its data
    /// first.
    pub fn submit_assessment(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        data: Option<AssessmentData>,
    ) -> Result<Assessment> {
        let (mut assessment, section, _) = self.editable(actor, id)?;
        let to = next_status(
            assessment.status,
            WorkflowAction::Submit,
            section.instructor_id.is_some(),
        )?;
        let data = data.map_or_else(|| assessment.data.clone(), clean);
        validate_submission(&data, section.enrollment)?;

        assessment.data = data;
        assessment.submitted_by = Some(actor.user_id);
        assessment.submitted_at = Some(Utc::now());
        assessment.transition(to, Some(actor.user_id), None);
        self.store.put(&assessment)?;
        Ok(assessment)
    }

    /// Approve a submitted assessment.
    pub fn approve_assessment(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        feedback: Option<String>,
    ) -> Result<Assessment> {
        self.review(actor, id, WorkflowAction::Approve, optional_text(feedback.as_deref()))
    }

    /// Return a submitted assessment to the instructor. Feedback is required.
    pub fn request_rework(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        feedback: &str,
    ) -> Result<Assessment> {
        let feedback = require_text("feedback", feedback)?;
        self.review(actor, id, WorkflowAction::RequestRework, Some(feedback))
    }

    /// Close an assessment whose data will never arrive. A reason is
    /// required.
    pub fn mark_never_coming_in(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        reason: &str,
    ) -> Result<Assessment> {
        let reason = require_text("reason", reason)?;
        self.review(actor, id, WorkflowAction::MarkNeverComingIn, Some(reason))
    }

    /// Reopen an approved or never-coming-in assessment.
    pub fn reopen_assessment(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        note: Option<String>,
    ) -> Result<Assessment> {
        self.review(actor, id, WorkflowAction::Reopen, optional_text(note.as_deref()))
    }

    fn editable(&self, actor: &Actor, id: AssessmentId) -> Result<(Assessment, Section, Course)> {
        actor.require(Permission::SubmitAssessments)?;
        let (assessment, section, course) = self.assessment_context(actor, id)?;
        if !actor.can_edit_for(&course, section.instructor_id) {
            return Err(RegistrarError::forbidden(format!(
                "only the section instructor or a reviewer may edit assessment {id}"
            )));
        }
        Ok((assessment, section, course))
    }

    fn review(
        &mut self,
        actor: &Actor,
        id: AssessmentId,
        action: WorkflowAction,
        note: Option<String>,
    ) -> Result<Assessment> {
        actor.require(Permission::ReviewAssessments)?;
        let (mut assessment, section, course) = self.assessment_context(actor, id)?;
        if !actor.can_review_course(&course) {
            return Err(RegistrarError::forbidden(format!(
                "course {} is outside your programs",
                course.course_number
            )));
        }
        let to = next_status(assessment.status, action, section.instructor_id.is_some())?;

        if action != WorkflowAction::Reopen {
            assessment.reviewed_by = Some(actor.user_id);
            assessment.reviewed_at = Some(Utc::now());
        }
        if matches!(action, WorkflowAction::Approve | WorkflowAction::RequestRework)
            && note.is_some()
        {
            assessment.feedback.clone_from(&note);
        }
        assessment.transition(to, Some(actor.user_id), note);
        self.store.put(&assessment)?;
        Ok(assessment)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registrar::tests::{Fixture, fixture};

    fn data(took: u32, passed: u32) -> AssessmentData {
        AssessmentData {
            students_took: Some(took),
            students_passed: Some(passed),
            assessment_tool: Some("  Final exam  ".into()),
            narrative: None,
        }
    }

    fn first_assessment(fx: &Fixture) -> Result<Assessment> {
        let filter = AssessmentFilter {
            section_id: Some(fx.section.id),
            ..AssessmentFilter::default()
        };
        fx.registrar
            .list_assessments(&fx.admin, &filter)?
            .into_iter()
            .next()
            .ok_or_else(|| RegistrarError::not_found("assessment", "first"))
    }

    #[test]
    fn full_approval_cycle() -> Result<()> {
        let mut fx = fixture()?;
        let id = first_assessment(&fx)?.id;

        let saved = fx.registrar.record_assessment(&fx.instructor, id, data(20, 15))?;
        assert_eq!(saved.status, CloStatus::InProgress);
        assert_eq!(saved.data.assessment_tool.as_deref(), Some("Final exam"));

        let submitted = fx.registrar.submit_assessment(&fx.instructor, id, None)?;
        assert_eq!(submitted.status, CloStatus::AwaitingApproval);
        assert_eq!(submitted.submitted_by, Some(fx.instructor.user_id));

        let approved = fx.registrar.approve_assessment(&fx.admin, id, None)?;
        assert_eq!(approved.status, CloStatus::Approved);
        assert_eq!(approved.pass_rate_percent(), Some(75));
        assert_eq!(approved.history.len(), 3);
        Ok(())
    }

    #[test]
    fn rework_requires_feedback_and_loops_back() -> Result<()> {
        let mut fx = fixture()?;
        let id = first_assessment(&fx)?.id;
        fx.registrar.submit_assessment(&fx.instructor, id, Some(data(20, 10)))?;

        let err = fx.registrar.request_rework(&fx.admin, id, "   ");
        assert!(matches!(err, Err(RegistrarError::Validation(_))));

        let returned = fx.registrar.request_rework(&fx.admin, id, "Explain the tool")?;
        assert_eq!(returned.status, CloStatus::NeedsRework);
        assert_eq!(returned.feedback.as_deref(), Some("Explain the tool"));

        let again = fx.registrar.submit_assessment(&fx.instructor, id, None)?;
        assert_eq!(again.status, CloStatus::AwaitingApproval);
        Ok(())
    }

    #[test]
    fn incomplete_data_cannot_be_submitted() -> Result<()> {
        let mut fx = fixture()?;
        let id = first_assessment(&fx)?.id;
        let err = fx.registrar.submit_assessment(&fx.instructor, id, None);
        assert!(matches!(err, Err(RegistrarError::Validation(_))));

        let err = fx.registrar.record_assessment(&fx.instructor, id, data(30, 10));
        assert!(matches!(err, Err(RegistrarError::Validation(_))), "took > enrollment");

        let unchanged = fx.registrar.get_assessment(&fx.instructor, id)?;
        assert_eq!(unchanged.status, CloStatus::Assigned);
        assert!(unchanged.history.is_empty());
        Ok(())
    }

    #[test]
    fn instructors_cannot_review() -> Result<()> {
        let mut fx = fixture()?;
        let id = first_assessment(&fx)?.id;
        fx.registrar.submit_assessment(&fx.instructor, id, Some(data(20, 18)))?;
        let err = fx.registrar.approve_assessment(&fx.instructor, id, None);
        assert!(matches!(err, Err(RegistrarError::Forbidden(_))));
        Ok(())
    }

    #[test]
    fn illegal_transition_leaves_record_unchanged() -> Result<()> {
        let mut fx = fixture()?;
        let id = first_assessment(&fx)?.id;
        let err = fx.registrar.approve_assessment(&fx.admin, id, None);
        assert!(matches!(
            err,
            Err(RegistrarError::InvalidTransition {
                from: CloStatus::Assigned,
                action: WorkflowAction::Approve,
            })
        ));
        let same = fx.registrar.get_assessment(&fx.admin, id)?;
        assert!(same.history.is_empty());
        assert!(same.reviewed_by.is_none());
        Ok(())
    }

    #[test]
    fn never_coming_in_and_reopen() -> Result<()> {
        let mut fx = fixture()?;
        let id = first_assessment(&fx)?.id;
        let closed = fx
            .registrar
            .mark_never_coming_in(&fx.admin, id, "Instructor left mid-term")?;
        assert_eq!(closed.status, CloStatus::NeverComingIn);

        let reopened = fx.registrar.reopen_assessment(&fx.admin, id, None)?;
        assert_eq!(reopened.status, CloStatus::Assigned);
        Ok(())
    }

    #[test]
    fn marking_never_coming_in_again_keeps_the_new_reason() -> Result<()> {
        let mut fx = fixture()?;
        let id = first_assessment(&fx)?.id;
        fx.registrar
            .mark_never_coming_in(&fx.admin, id, "Instructor left mid-term")?;
        let again = fx
            .registrar
            .mark_never_coming_in(&fx.admin, id, "Section cancelled")?;
        assert_eq!(again.status, CloStatus::NeverComingIn);
        let last = again.history.last().map(|c| (c.from, c.to, c.note.clone()));
        assert_eq!(
            last,
            Some((
                CloStatus::NeverComingIn,
                CloStatus::NeverComingIn,
                Some("Section cancelled".to_string())
            ))
        );
        Ok(())
    }

    #[test]
    fn filter_by_status_and_term() -> Result<()> {
        let mut fx = fixture()?;
        let id = first_assessment(&fx)?.id;
        fx.registrar.record_assessment(&fx.instructor, id, data(5, 5))?;

        let in_progress = AssessmentFilter {
            status: Some(CloStatus::InProgress),
            ..AssessmentFilter::default()
        };
        assert_eq!(fx.registrar.list_assessments(&fx.admin, &in_progress)?.len(), 1);

        let other_term = AssessmentFilter {
            term_id: Some(TermId(fx.term.id.0 + 100)),
            ..AssessmentFilter::default()
        };
        assert!(fx.registrar.list_assessments(&fx.admin, &other_term)?.is_empty());
        assert_eq!(fx.institution.id, fx.section.institution_id);
        Ok(())
    }
}
