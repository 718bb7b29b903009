//! Terms, course offerings and sections.

use super::Registrar;
use crate::access::{Actor, Permission, Role};
use crate::error::{RegistrarError, Result};
use crate::models::{Assessment, Course, Institution, Offering, Section, SectionStatus, Term, User};
use crate::primitives::{
    CourseId, InstitutionId, OfferingId, SectionId, TermId, UserId, require_text,
};
use crate::storage::{RecordKind, RecordStore, WriteBatch};
use crate::workflow::{CloStatus, WorkflowAction, next_status};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Input for [`Registrar::create_term`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTerm {
    /// Owning institution. Defaults to the caller's.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    /// Name, unique per institution.
    pub name: String,
    /// First day.
    pub start_date: NaiveDate,
    /// Last day.
    pub end_date: NaiveDate,
}

/// Partial update of a term.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermUpdate {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New first day.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// New last day.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Activate or deactivate.
    #[serde(default)]
    pub active: Option<bool>,
}

/// Input for [`Registrar::create_offering`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOffering {
    /// Offered course.
    pub course_id: CourseId,
    /// Term.
    pub term_id: TermId,
}

/// Filter for [`Registrar::list_offerings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferingFilter {
    /// Institution to list. Defaults to the caller's.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    /// Only offerings in this term.
    #[serde(default)]
    pub term_id: Option<TermId>,
    /// Only offerings of this course.
    #[serde(default)]
    pub course_id: Option<CourseId>,
}

/// Input for [`Registrar::create_section`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSection {
    /// Parent offering.
    pub offering_id: OfferingId,
    /// Section number, unique per offering.
    pub section_number: String,
    /// Instructor, if already known.
    #[serde(default)]
    pub instructor_id: Option<UserId>,
    /// Enrollment count.
    #[serde(default)]
    pub enrollment: u32,
}

/// Partial update of a section. Use [`Registrar::assign_instructor`] to
/// change the instructor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionUpdate {
    /// New section number.
    #[serde(default)]
    pub section_number: Option<String>,
    /// New enrollment.
    #[serde(default)]
    pub enrollment: Option<u32>,
    /// New status.
    #[serde(default)]
    pub status: Option<SectionStatus>,
}

/// Filter for [`Registrar::list_sections`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionFilter {
    /// Institution to list. Defaults to the caller's.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    /// Only sections of this offering.
    #[serde(default)]
    pub offering_id: Option<OfferingId>,
    /// Only sections in this term.
    #[serde(default)]
    pub term_id: Option<TermId>,
    /// Only sections taught by this user.
    #[serde(default)]
    pub instructor_id: Option<UserId>,
}

impl<S: RecordStore> Registrar<S> {
    // =========================================================================
    // TERMS
    // =========================================================================

    /// Create a term.
    pub fn create_term(&mut self, actor: &Actor, input: NewTerm) -> Result<Term> {
        actor.require(Permission::ManageSchedule)?;
        let institution = actor.resolve_institution(input.institution_id)?;
        let _: Institution = self.load_scoped(actor, institution.0, "institution")?;

        let name = require_text("name", &input.name)?;
        if self.find_term(institution, &name)?.is_some() {
            return Err(RegistrarError::conflict(format!(
                "term '{name}' already exists"
            )));
        }
        Term::check_dates(input.start_date, input.end_date)?;

        let term = Term {
            id: TermId(self.next_id(RecordKind::Term)?),
            institution_id: institution,
            name,
            start_date: input.start_date,
            end_date: input.end_date,
            active: true,
        };
        self.store.put(&term)?;
        Ok(term)
    }

    /// Fetch a term.
    pub fn get_term(&self, actor: &Actor, id: TermId) -> Result<Term> {
        actor.require(Permission::ViewInstitution)?;
        self.load_scoped(actor, id.0, "term")
    }

    /// Terms of an institution, most recent first.
    pub fn list_terms(
        &self,
        actor: &Actor,
        institution: Option<InstitutionId>,
        include_inactive: bool,
    ) -> Result<Vec<Term>> {
        actor.require(Permission::ViewInstitution)?;
        let institution = actor.resolve_institution(institution)?;
        let mut terms: Vec<Term> = self
            .store
            .scan_tenant::<Term>(institution)?
            .into_iter()
            .filter(|t| include_inactive || t.active)
            .collect();
        terms.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(terms)
    }

    /// Look up a term by name (case-insensitive).
    pub fn find_term(&self, institution: InstitutionId, name: &str) -> Result<Option<Term>> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .store
            .scan_tenant::<Term>(institution)?
            .into_iter()
            .find(|t| t.name.to_lowercase() == wanted))
    }

    /// Update a term.
    pub fn update_term(&mut self, actor: &Actor, id: TermId, update: TermUpdate) -> Result<Term> {
        let mut term: Term = self.load_scoped(actor, id.0, "term")?;
        actor.require(Permission::ManageSchedule)?;

        if let Some(name) = update.name {
            let name = require_text("name", &name)?;
            if let Some(other) = self.find_term(term.institution_id, &name)? {
                if other.id != term.id {
                    return Err(RegistrarError::conflict(format!(
                        "term '{name}' already exists"
                    )));
                }
            }
            term.name = name;
        }
        let start = update.start_date.unwrap_or(term.start_date);
        let end = update.end_date.unwrap_or(term.end_date);
        Term::check_dates(start, end)?;
        term.start_date = start;
        term.end_date = end;
        if let Some(active) = update.active {
            term.active = active;
        }
        self.store.put(&term)?;
        Ok(term)
    }

    /// Delete a term. Refused while offerings exist.
    pub fn delete_term(&mut self, actor: &Actor, id: TermId) -> Result<()> {
        let term: Term = self.load_scoped(actor, id.0, "term")?;
        actor.require(Permission::ManageSchedule)?;
        let in_use = self
            .store
            .scan_tenant::<Offering>(term.institution_id)?
            .iter()
            .any(|o| o.term_id == id);
        if in_use {
            return Err(RegistrarError::conflict(format!(
                "term '{}' has offerings; delete them first",
                term.name
            )));
        }
        self.store.remove::<Term>(id.0)?;
        Ok(())
    }

    // =========================================================================
    // OFFERINGS
    // =========================================================================

    /// Offer a course in a term.
    pub fn create_offering(&mut self, actor: &Actor, input: NewOffering) -> Result<Offering> {
        actor.require(Permission::ManageSchedule)?;
        let course: Course = self.load_scoped(actor, input.course_id.0, "course")?;
        let term: Term = self.load_scoped(actor, input.term_id.0, "term")?;
        if term.institution_id != course.institution_id {
            return Err(RegistrarError::validation(
                "course and term belong to different institutions",
            ));
        }
        if self.find_offering(&course, term.id)?.is_some() {
            return Err(RegistrarError::conflict(format!(
                "{} is already offered in {}",
                course.course_number, term.name
            )));
        }
        let offering = Offering {
            id: OfferingId(self.next_id(RecordKind::Offering)?),
            institution_id: course.institution_id,
            course_id: course.id,
            term_id: term.id,
            created_at: Utc::now(),
        };
        self.store.put(&offering)?;
        Ok(offering)
    }

    /// Fetch an offering.
    pub fn get_offering(&self, actor: &Actor, id: OfferingId) -> Result<Offering> {
        actor.require(Permission::ViewInstitution)?;
        self.load_scoped(actor, id.0, "offering")
    }

    /// Offerings of an institution.
    pub fn list_offerings(&self, actor: &Actor, filter: &OfferingFilter) -> Result<Vec<Offering>> {
        actor.require(Permission::ViewInstitution)?;
        let institution = actor.resolve_institution(filter.institution_id)?;
        Ok(self
            .store
            .scan_tenant::<Offering>(institution)?
            .into_iter()
            .filter(|o| filter.term_id.is_none_or(|t| o.term_id == t))
            .filter(|o| filter.course_id.is_none_or(|c| o.course_id == c))
            .collect())
    }

    /// The offering of `course` in `term`, if any.
    pub fn find_offering(&self, course: &Course, term: TermId) -> Result<Option<Offering>> {
        Ok(self
            .store
            .scan_tenant::<Offering>(course.institution_id)?
            .into_iter()
            .find(|o| o.course_id == course.id && o.term_id == term))
    }

    /// Delete an offering with its sections and their assessments.
    pub fn delete_offering(&mut self, actor: &Actor, id: OfferingId) -> Result<()> {
        let offering: Offering = self.load_scoped(actor, id.0, "offering")?;
        actor.require(Permission::ManageSchedule)?;
        let sections: Vec<Section> = self
            .store
            .scan_tenant::<Section>(offering.institution_id)?
            .into_iter()
            .filter(|s| s.offering_id == id)
            .collect();
        let mut batch = WriteBatch::new();
        for section in &sections {
            self.stage_section_removal(&mut batch, section)?;
        }
        batch.remove::<Offering>(id.0);
        self.store.apply(batch)
    }

    // =========================================================================
    // SECTIONS
    // =========================================================================

    /// Create a section and open one assessment per active outcome of its
    /// course.
    pub fn create_section(&mut self, actor: &Actor, input: NewSection) -> Result<Section> {
        actor.require(Permission::ManageSchedule)?;
        let offering: Offering = self.load_scoped(actor, input.offering_id.0, "offering")?;
        let section_number = require_text("section_number", &input.section_number)?;
        if self.find_section(offering.id, &section_number)?.is_some() {
            return Err(RegistrarError::conflict(format!(
                "section {section_number} already exists in offering {}",
                offering.id
            )));
        }
        if let Some(instructor) = input.instructor_id {
            self.check_instructor(offering.institution_id, instructor)?;
        }

        let section = Section {
            id: SectionId(self.next_id(RecordKind::Section)?),
            institution_id: offering.institution_id,
            offering_id: offering.id,
            section_number,
            instructor_id: input.instructor_id,
            enrollment: input.enrollment,
            status: SectionStatus::Open,
        };
        let mut batch = WriteBatch::new();
        batch.put(&section)?;
        let course: Course = self.load(offering.course_id.0, "course")?;
        for outcome in self.outcomes_of(&course)? {
            if outcome.active {
                self.open_assessment(&mut batch, &section, &outcome)?;
            }
        }
        self.store.apply(batch)?;
        Ok(section)
    }

    /// Fetch a section.
    pub fn get_section(&self, actor: &Actor, id: SectionId) -> Result<Section> {
        actor.require(Permission::ViewInstitution)?;
        self.load_scoped(actor, id.0, "section")
    }

    /// Sections of an institution. Instructors only see their own.
    pub fn list_sections(&self, actor: &Actor, filter: &SectionFilter) -> Result<Vec<Section>> {
        actor.require(Permission::ViewInstitution)?;
        let institution = actor.resolve_institution(filter.institution_id)?;
        let in_term: Option<BTreeSet<OfferingId>> = match filter.term_id {
            Some(term) => Some(
                self.store
                    .scan_tenant::<Offering>(institution)?
                    .into_iter()
                    .filter(|o| o.term_id == term)
                    .map(|o| o.id)
                    .collect(),
            ),
            None => None,
        };
        let own_only = actor.role == Role::Instructor;
        Ok(self
            .store
            .scan_tenant::<Section>(institution)?
            .into_iter()
            .filter(|s| !own_only || s.instructor_id == Some(actor.user_id))
            .filter(|s| filter.offering_id.is_none_or(|o| s.offering_id == o))
            .filter(|s| filter.instructor_id.is_none_or(|i| s.instructor_id == Some(i)))
            .filter(|s| in_term.as_ref().is_none_or(|set| set.contains(&s.offering_id)))
            .collect())
    }

    /// Look up a section by number within an offering (case-insensitive).
    pub fn find_section(&self, offering: OfferingId, number: &str) -> Result<Option<Section>> {
        let wanted = number.trim().to_lowercase();
        Ok(self
            .store
            .scan::<Section>()?
            .into_iter()
            .find(|s| s.offering_id == offering && s.section_number.to_lowercase() == wanted))
    }

    /// Update a section's number, enrollment or status.
    pub fn update_section(
        &mut self,
        actor: &Actor,
        id: SectionId,
        update: SectionUpdate,
    ) -> Result<Section> {
        let mut section: Section = self.load_scoped(actor, id.0, "section")?;
        actor.require(Permission::ManageSchedule)?;

        if let Some(number) = update.section_number {
            let number = require_text("section_number", &number)?;
            if let Some(other) = self.find_section(section.offering_id, &number)? {
                if other.id != section.id {
                    return Err(RegistrarError::conflict(format!(
                        "section {number} already exists in offering {}",
                        section.offering_id
                    )));
                }
            }
            section.section_number = number;
        }
        if let Some(enrollment) = update.enrollment {
            if enrollment > 0 {
                let took = self
                    .assessments_of(&section)?
                    .iter()
                    .filter_map(|a| a.data.students_took)
                    .max();
                if let Some(took) = took.filter(|t| *t > enrollment) {
                    return Err(RegistrarError::validation(format!(
                        "enrollment ({enrollment}) cannot be below students who took an assessment ({took})"
                    )));
                }
            }
            section.enrollment = enrollment;
        }
        if let Some(status) = update.status {
            section.status = status;
        }
        self.store.put(&section)?;
        Ok(section)
    }

    /// Set or clear a section's instructor.
    ///
    /// Assigning the first instructor moves unassigned assessments to
    /// `assigned`. Clearing it moves assigned ones back. Assessments already
    /// in progress keep their status.
    pub fn assign_instructor(
        &mut self,
        actor: &Actor,
        id: SectionId,
        instructor: Option<UserId>,
    ) -> Result<Section> {
        let mut section: Section = self.load_scoped(actor, id.0, "section")?;
        actor.require(Permission::ManageSchedule)?;
        if let Some(instructor) = instructor {
            self.check_instructor(section.institution_id, instructor)?;
        }

        let action = match (section.instructor_id, instructor) {
            (None, Some(_)) => Some(WorkflowAction::AssignInstructor),
            (Some(_), None) => Some(WorkflowAction::UnassignInstructor),
            _ => None,
        };
        section.instructor_id = instructor;
        let mut batch = WriteBatch::new();
        batch.put(&section)?;
        if let Some(action) = action {
            for mut assessment in self.assessments_of(&section)? {
                if let Ok(to) = next_status(assessment.status, action, instructor.is_some()) {
                    assessment.transition(to, Some(actor.user_id), None);
                    batch.put(&assessment)?;
                }
            }
        }
        self.store.apply(batch)?;
        Ok(section)
    }

    /// Delete a section and its assessments.
    pub fn delete_section(&mut self, actor: &Actor, id: SectionId) -> Result<()> {
        let section: Section = self.load_scoped(actor, id.0, "section")?;
        actor.require(Permission::ManageSchedule)?;
        let mut batch = WriteBatch::new();
        self.stage_section_removal(&mut batch, &section)?;
        self.store.apply(batch)
    }

    fn stage_section_removal(&self, batch: &mut WriteBatch, section: &Section) -> Result<()> {
        for assessment in self.assessments_of(section)? {
            batch.remove::<Assessment>(assessment.id.0);
        }
        batch.remove::<Section>(section.id.0);
        Ok(())
    }

    pub(crate) fn assessments_of(&self, section: &Section) -> Result<Vec<Assessment>> {
        Ok(self
            .store
            .scan_tenant::<Assessment>(section.institution_id)?
            .into_iter()
            .filter(|a| a.section_id == section.id)
            .collect())
    }

    /// An instructor must be an active user of the section's institution.
    fn check_instructor(&self, institution: InstitutionId, id: UserId) -> Result<User> {
        let user = self
            .store
            .get::<User>(id.0)?
            .filter(|u| u.institution_id == Some(institution))
            .ok_or_else(|| RegistrarError::not_found("user", id))?;
        if !user.active {
            return Err(RegistrarError::validation(format!(
                "{} is inactive and cannot teach",
                user.email
            )));
        }
        Ok(user)
    }
}

/// Initial status of an assessment in a section.
pub(crate) fn initial_status(section: &Section) -> CloStatus {
    if section.instructor_id.is_some() {
        CloStatus::Assigned
    } else {
        CloStatus::Unassigned
    }
}

// =============================================================================
// TESTS
// =============================================================================
