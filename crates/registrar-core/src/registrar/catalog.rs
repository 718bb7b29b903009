//! Courses and Course Learning Outcomes.

use super::Registrar;
use crate::access::{Actor, Permission};
use crate::error::{RegistrarError, Result};
use crate::models::{Assessment, Course, Institution, Offering, Outcome, Section};
use crate::primitives::{
    CourseId, InstitutionId, OutcomeId, ProgramId, normalize_course_number, require_text,
};
use crate::storage::{RecordKind, RecordStore, WriteBatch};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Upper bound on credit hours for a single course.
pub const MAX_CREDIT_HOURS: u8 = 20;

const fn default_credit_hours() -> u8 {
    3
}

/// Input for [`Registrar::create_course`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourse {
    /// Owning institution. Defaults to the caller's.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    /// Course number, normalized to `PREFIX NUMBER`.
    pub course_number: String,
    /// Title.
    pub title: String,
    /// Department.
    #[serde(default)]
    pub department: String,
    /// Credit hours.
    #[serde(default = "default_credit_hours")]
    pub credit_hours: u8,
    /// Programs the course belongs to.
    #[serde(default)]
    pub program_ids: Vec<ProgramId>,
}

/// Partial update of a course.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseUpdate {
    /// New course number.
    #[serde(default)]
    pub course_number: Option<String>,
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New department.
    #[serde(default)]
    pub department: Option<String>,
    /// New credit hours.
    #[serde(default)]
    pub credit_hours: Option<u8>,
    /// Replacement program list.
    #[serde(default)]
    pub program_ids: Option<Vec<ProgramId>>,
    /// Activate or deactivate.
    #[serde(default)]
    pub active: Option<bool>,
}

/// Filter for [`Registrar::list_courses`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseFilter {
    /// Institution to list. Defaults to the caller's.
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    /// Only courses in this program.
    #[serde(default)]
    pub program_id: Option<ProgramId>,
    /// Include deactivated courses.
    #[serde(default)]
    pub include_inactive: bool,
}

/// Input for [`Registrar::create_outcome`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutcome {
    /// CLO number. The next free number when omitted.
    #[serde(default)]
    pub clo_number: Option<u16>,
    /// Outcome statement.
    pub description: String,
}

/// Partial update of an outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeUpdate {
    /// New statement.
    #[serde(default)]
    pub description: Option<String>,
    /// Activate or deactivate. Existing assessments are kept either way.
    #[serde(default)]
    pub active: Option<bool>,
}

fn check_credit_hours(hours: u8) -> Result<u8> {
    if hours > MAX_CREDIT_HOURS {
        return Err(RegistrarError::validation(format!(
            "credit hours must be at most {MAX_CREDIT_HOURS}, got {hours}"
        )));
    }
    Ok(hours)
}

fn normalize_programs(mut programs: Vec<ProgramId>) -> Vec<ProgramId> {
    programs.sort_unstable();
    programs.dedup();
    programs
}

impl<S: RecordStore> Registrar<S> {
    // =========================================================================
    // COURSES
    // =========================================================================

    /// Add a course to the catalog.
    pub fn create_course(&mut self, actor: &Actor, input: NewCourse) -> Result<Course> {
        actor.require(Permission::ManageCatalog)?;
        let institution = actor.resolve_institution(input.institution_id)?;
        let _: Institution = self.load_scoped(actor, institution.0, "institution")?;

        let course_number = normalize_course_number(&input.course_number)?;
        if self.find_course(institution, &course_number)?.is_some() {
            return Err(RegistrarError::conflict(format!(
                "course {course_number} already exists"
            )));
        }
        let program_ids = normalize_programs(input.program_ids);
        self.check_programs(institution, &program_ids)?;

        let course = Course {
            id: CourseId(0),
            institution_id: institution,
            course_number,
            title: require_text("title", &input.title)?,
            department: input.department.trim().to_string(),
            credit_hours: check_credit_hours(input.credit_hours)?,
            program_ids,
            active: true,
            created_at: Utc::now(),
        };
        if !actor.can_manage_course(&course) {
            return Err(RegistrarError::forbidden(
                "the course must belong to one of your programs",
            ));
        }
        let course = Course {
            id: CourseId(self.next_id(RecordKind::Course)?),
            ..course
        };
        self.store.put(&course)?;
        Ok(course)
    }

    /// Fetch a course.
    pub fn get_course(&self, actor: &Actor, id: CourseId) -> Result<Course> {
        actor.require(Permission::ViewInstitution)?;
        self.load_scoped(actor, id.0, "course")
    }

    /// Courses of an institution, ordered by course number.
    pub fn list_courses(&self, actor: &Actor, filter: &CourseFilter) -> Result<Vec<Course>> {
        actor.require(Permission::ViewInstitution)?;
        let institution = actor.resolve_institution(filter.institution_id)?;
        let mut courses: Vec<Course> = self
            .store
            .scan_tenant::<Course>(institution)?
            .into_iter()
            .filter(|c| filter.include_inactive || c.active)
            .filter(|c| filter.program_id.is_none_or(|p| c.program_ids.contains(&p)))
            .collect();
        courses.sort_by(|a, b| a.course_number.cmp(&b.course_number));
        Ok(courses)
    }

    /// Look up a course by number within an institution.
    pub fn find_course(
        &self,
        institution: InstitutionId,
        course_number: &str,
    ) -> Result<Option<Course>> {
        let wanted = normalize_course_number(course_number)?;
        Ok(self
            .store
            .scan_tenant::<Course>(institution)?
            .into_iter()
            .find(|c| c.course_number == wanted))
    }

    /// Update a course.
    pub fn update_course(
        &mut self,
        actor: &Actor,
        id: CourseId,
        update: CourseUpdate,
    ) -> Result<Course> {
        let mut course: Course = self.load_scoped(actor, id.0, "course")?;
        self.ensure_manages(actor, &course)?;

        if let Some(number) = update.course_number {
            let number = normalize_course_number(&number)?;
            if number != course.course_number {
                if self.find_course(course.institution_id, &number)?.is_some() {
                    return Err(RegistrarError::conflict(format!(
                        "course {number} already exists"
                    )));
                }
                course.course_number = number;
            }
        }
        if let Some(title) = update.title {
            course.title = require_text("title", &title)?;
        }
        if let Some(department) = update.department {
            course.department = department.trim().to_string();
        }
        if let Some(hours) = update.credit_hours {
            course.credit_hours = check_credit_hours(hours)?;
        }
        if let Some(programs) = update.program_ids {
            let programs = normalize_programs(programs);
            self.check_programs(course.institution_id, &programs)?;
            course.program_ids = programs;
            // A program admin may not move a course out of their own reach.
            self.ensure_manages(actor, &course)?;
        }
        if let Some(active) = update.active {
            course.active = active;
        }
        self.store.put(&course)?;
        Ok(course)
    }

    /// Delete a course and its outcomes. Refused while offerings exist.
    pub fn delete_course(&mut self, actor: &Actor, id: CourseId) -> Result<()> {
        let course: Course = self.load_scoped(actor, id.0, "course")?;
        self.ensure_manages(actor, &course)?;

        let offered = self
            .store
            .scan_tenant::<Offering>(course.institution_id)?
            .iter()
            .any(|o| o.course_id == id);
        if offered {
            return Err(RegistrarError::conflict(format!(
                "course {} has offerings; delete them first",
                course.course_number
            )));
        }
        let mut batch = WriteBatch::new();
        for outcome in self.outcomes_of(&course)? {
            batch.remove::<Outcome>(outcome.id.0);
        }
        batch.remove::<Course>(id.0);
        self.store.apply(batch)
    }

    fn ensure_manages(&self, actor: &Actor, course: &Course) -> Result<()> {
        actor.require(Permission::ManageCatalog)?;
        if !actor.can_manage_course(course) {
            return Err(RegistrarError::forbidden(format!(
                "course {} is outside your programs",
                course.course_number
            )));
        }
        Ok(())
    }

    // =========================================================================
    // OUTCOMES
    // =========================================================================

    /// Add a CLO to a course and open an assessment for it in every
    /// existing section of the course.
    pub fn create_outcome(
        &mut self,
        actor: &Actor,
        course_id: CourseId,
        input: NewOutcome,
    ) -> Result<Outcome> {
        let course: Course = self.load_scoped(actor, course_id.0, "course")?;
        self.ensure_manages(actor, &course)?;

        let existing = self.outcomes_of(&course)?;
        let clo_number = match input.clo_number {
            Some(0) => return Err(RegistrarError::validation("clo_number starts at 1")),
            Some(n) => n,
            None => existing
                .iter()
                .map(|o| o.clo_number)
                .max()
                .unwrap_or(0)
                .saturating_add(1),
        };
        if existing.iter().any(|o| o.clo_number == clo_number) {
            return Err(RegistrarError::conflict(format!(
                "{} already has CLO {clo_number}",
                course.course_number
            )));
        }

        let outcome = Outcome {
            id: OutcomeId(self.next_id(RecordKind::Outcome)?),
            institution_id: course.institution_id,
            course_id,
            clo_number,
            description: require_text("description", &input.description)?,
            active: true,
        };
        let mut batch = WriteBatch::new();
        batch.put(&outcome)?;
        self.open_assessments_for_outcome(&mut batch, &outcome)?;
        self.store.apply(batch)?;
        Ok(outcome)
    }

    /// Outcomes of a course, ordered by CLO number.
    pub fn list_outcomes(&self, actor: &Actor, course_id: CourseId) -> Result<Vec<Outcome>> {
        let course = self.get_course(actor, course_id)?;
        self.outcomes_of(&course)
    }

    /// Update an outcome. Reactivating it opens any missing assessments.
    pub fn update_outcome(
        &mut self,
        actor: &Actor,
        id: OutcomeId,
        update: OutcomeUpdate,
    ) -> Result<Outcome> {
        let mut outcome: Outcome = self.load_scoped(actor, id.0, "outcome")?;
        let course: Course = self.load(outcome.course_id.0, "course")?;
        self.ensure_manages(actor, &course)?;

        if let Some(description) = update.description {
            outcome.description = require_text("description", &description)?;
        }
        let reactivated = update.active == Some(true) && !outcome.active;
        if let Some(active) = update.active {
            outcome.active = active;
        }
        let mut batch = WriteBatch::new();
        batch.put(&outcome)?;
        if reactivated {
            self.open_assessments_for_outcome(&mut batch, &outcome)?;
        }
        self.store.apply(batch)?;
        Ok(outcome)
    }

    pub(crate) fn outcomes_of(&self, course: &Course) -> Result<Vec<Outcome>> {
        let mut outcomes: Vec<Outcome> = self
            .store
            .scan_tenant::<Outcome>(course.institution_id)?
            .into_iter()
            .filter(|o| o.course_id == course.id)
            .collect();
        outcomes.sort_by_key(|o| o.clo_number);
        Ok(outcomes)
    }

    /// Sections of every offering of a course.
    pub(crate) fn sections_of_course(&self, course: &Course) -> Result<Vec<Section>> {
        let offerings: BTreeSet<_> = self
            .store
            .scan_tenant::<Offering>(course.institution_id)?
            .into_iter()
            .filter(|o| o.course_id == course.id)
            .map(|o| o.id)
            .collect();
        Ok(self
            .store
            .scan_tenant::<Section>(course.institution_id)?
            .into_iter()
            .filter(|s| offerings.contains(&s.offering_id))
            .collect())
    }

    fn open_assessments_for_outcome(
        &mut self,
        batch: &mut WriteBatch,
        outcome: &Outcome,
    ) -> Result<()> {
        let course: Course = self.load(outcome.course_id.0, "course")?;
        let covered: BTreeSet<_> = self
            .store
            .scan_tenant::<Assessment>(outcome.institution_id)?
            .into_iter()
            .filter(|a| a.outcome_id == outcome.id)
            .map(|a| a.section_id)
            .collect();
        for section in self.sections_of_course(&course)? {
            if !covered.contains(&section.id) {
                self.open_assessment(batch, &section, outcome)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::registrar::tests::fixture;
    use crate::registrar::{AssessmentFilter, NewUser};

    #[test]
    fn course_numbers_are_normalized_and_unique() -> Result<()> {
        let mut fx = fixture()?;
        assert_eq!(fx.course.course_number, "CS 101");
        let dup = fx.registrar.create_course(
            &fx.admin,
            NewCourse {
                institution_id: None,
                course_number: "cs   101".into(),
                title: "Duplicate".into(),
                department: String::new(),
                credit_hours: 3,
                program_ids: Vec::new(),
            },
        );
        assert!(matches!(dup, Err(RegistrarError::Conflict(_))));
        Ok(())
    }

    #[test]
    fn new_outcome_opens_assessments_in_existing_sections() -> Result<()> {
        let mut fx = fixture()?;
        let outcome = fx.registrar.create_outcome(
            &fx.admin,
            fx.course.id,
            NewOutcome {
                clo_number: None,
                description: "Test programs".into(),
            },
        )?;
        assert_eq!(outcome.clo_number, 3);

        let filter = AssessmentFilter {
            section_id: Some(fx.section.id),
            ..AssessmentFilter::default()
        };
        let assessments = fx.registrar.list_assessments(&fx.admin, &filter)?;
        assert_eq!(assessments.len(), 3);
        Ok(())
    }

    #[test]
    fn duplicate_clo_number_conflicts() -> Result<()> {
        let mut fx = fixture()?;
        let err = fx.registrar.create_outcome(
            &fx.admin,
            fx.course.id,
            NewOutcome {
                clo_number: Some(2),
                description: "Again".into(),
            },
        );
        assert!(matches!(err, Err(RegistrarError::Conflict(_))));
        Ok(())
    }

    #[test]
    fn course_with_offerings_cannot_be_deleted() -> Result<()> {
        let mut fx = fixture()?;
        let err = fx.registrar.delete_course(&fx.admin, fx.course.id);
        assert!(matches!(err, Err(RegistrarError::Conflict(_))));
        Ok(())
    }

    #[test]
    fn program_admin_scope() -> Result<()> {
        let mut fx = fixture()?;
        let other_program = fx.registrar.create_program(
            &fx.admin,
            fx.institution.id,
            crate::registrar::NewProgram {
                name: "Mathematics".into(),
                short_name: "MATH".into(),
            },
        )?;
        let chair = fx.registrar.create_user(
            &fx.admin,
            NewUser {
                institution_id: None,
                email: "chair@mcc.edu".into(),
                first_name: "Math".into(),
                last_name: "Chair".into(),
                role: Role::ProgramAdmin,
                program_ids: vec![other_program.id],
            },
        )?;
        let chair = Actor::for_user(&chair);

        let err = fx.registrar.update_course(
            &chair,
            fx.course.id,
            CourseUpdate {
                title: Some("Hijacked".into()),
                ..CourseUpdate::default()
            },
        );
        assert!(matches!(err, Err(RegistrarError::Forbidden(_))));

        let math = fx.registrar.create_course(
            &chair,
            NewCourse {
                institution_id: None,
                course_number: "MATH 1010".into(),
                title: "Algebra".into(),
                department: "Math".into(),
                credit_hours: 4,
                program_ids: vec![other_program.id],
            },
        )?;
        assert_eq!(math.institution_id, fx.institution.id);

        let orphan = fx.registrar.create_course(
            &chair,
            NewCourse {
                institution_id: None,
                course_number: "MATH 2020".into(),
                title: "No program".into(),
                department: String::new(),
                credit_hours: 3,
                program_ids: Vec::new(),
            },
        );
        assert!(matches!(orphan, Err(RegistrarError::Forbidden(_))));
        Ok(())
    }

    #[test]
    fn list_filters_by_program() -> Result<()> {
        let fx = fixture()?;
        let filter = CourseFilter {
            program_id: Some(ProgramId(999)),
            ..CourseFilter::default()
        };
        assert!(fx.registrar.list_courses(&fx.instructor, &filter)?.is_empty());
        let all = fx.registrar.list_courses(&fx.instructor, &CourseFilter::default())?;
        assert_eq!(all.len(), 1);
        Ok(())
    }
}
