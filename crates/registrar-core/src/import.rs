//! # Import
//!
//! Applies an [`ImportBatch`] to one institution through the ordinary
//! [`Registrar`] operations, so every access rule holds for imports too.
//!
//! Records are applied in dependency order (programs, terms, instructors,
//! courses, outcomes, offerings, sections) and matched by natural key. A
//! missing record is created. An existing one is compared field by field and
//! each difference is settled by the [`ConflictStrategy`]. A failure on one
//! record is reported and the import moves on.

use crate::access::{Actor, Permission, Role};
use crate::adapters::{
    Adapter, AssessmentRow, CourseRow, ImportBatch, InstructorRow, OfferingRow, OutcomeRow,
    ProgramRow, SectionRow, TermRow,
};
use crate::error::{RegistrarError, Result};
use crate::models::{Course, Offering, Term, User};
use crate::primitives::{
    InstitutionId, ProgramId, normalize_course_number, normalize_email, normalize_short_name,
};
use crate::registrar::{
    CourseUpdate, NewCourse, NewOffering, NewOutcome, NewProgram, NewSection, NewTerm, NewUser,
    OutcomeUpdate, Registrar, SectionUpdate, TermUpdate, UserUpdate,
};
use crate::report::{FieldConflict, ImportReport, Resolution};
use crate::storage::{MemoryStore, RecordStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Credit hours for a created course when the file gives none.
const DEFAULT_CREDIT_HOURS: u8 = 3;

// =============================================================================
// OPTIONS
// =============================================================================

/// How a field that differs between the store and the file is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Keep the stored value.
    UseMine,
    /// Overwrite with the imported value.
    UseTheirs,
    /// Fill stored fields that are empty, keep the rest.
    #[default]
    Merge,
    /// Change nothing and report every difference for review.
    ManualReview,
}

impl ConflictStrategy {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UseMine => "use_mine",
            Self::UseTheirs => "use_theirs",
            Self::Merge => "merge",
            Self::ManualReview => "manual_review",
        }
    }

    fn resolve(self, existing_is_empty: bool) -> Resolution {
        match self {
            Self::UseMine => Resolution::KeptExisting,
            Self::UseTheirs => Resolution::AppliedIncoming,
            Self::Merge if existing_is_empty => Resolution::FilledEmpty,
            Self::Merge => Resolution::KeptExisting,
            Self::ManualReview => Resolution::NeedsReview,
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "use_mine" | "mine" => Ok(Self::UseMine),
            "use_theirs" | "theirs" => Ok(Self::UseTheirs),
            "merge" => Ok(Self::Merge),
            "manual_review" | "manual" => Ok(Self::ManualReview),
            other => Err(RegistrarError::validation(format!(
                "unknown conflict strategy '{other}'"
            ))),
        }
    }
}

/// Import settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Conflict strategy.
    #[serde(default)]
    pub strategy: ConflictStrategy,
    /// Work on a scratch copy and leave the store untouched.
    #[serde(default)]
    pub dry_run: bool,
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Apply `batch` to `institution`.
///
/// The caller needs [`Permission::ImportData`] and must see the institution.
/// Row errors carried in the batch are copied into the report.
pub fn import_batch<S: RecordStore>(
    registrar: &mut Registrar<S>,
    actor: &Actor,
    institution: InstitutionId,
    batch: &ImportBatch,
    options: ImportOptions,
) -> Result<ImportReport> {
    actor.require(Permission::ImportData)?;
    registrar.get_institution(actor, institution)?;

    let report = ImportReport::new("batch", options.dry_run);
    if options.dry_run {
        let mut scratch = Registrar::new(MemoryStore::snapshot_of(registrar.store())?);
        Ok(Importer::new(&mut scratch, actor, institution, options.strategy, report).run(batch))
    } else {
        Ok(Importer::new(registrar, actor, institution, options.strategy, report).run(batch))
    }
}

/// Parse `bytes` with `adapter` and import the result.
pub fn import_file<S: RecordStore>(
    registrar: &mut Registrar<S>,
    actor: &Actor,
    institution: InstitutionId,
    adapter: &dyn Adapter,
    bytes: &[u8],
    options: ImportOptions,
) -> Result<ImportReport> {
    let info = adapter.info();
    if !info.supports_import {
        return Err(RegistrarError::Adapter(format!(
            "adapter '{}' does not support import",
            info.id
        )));
    }
    let batch = adapter.parse(bytes)?;
    let mut report = import_batch(registrar, actor, institution, &batch, options)?;
    report.adapter = info.id;
    Ok(report)
}

// =============================================================================
// IMPORTER
// =============================================================================

/// Outcome of comparing one record.
#[derive(Default)]
struct Diff {
    differs: bool,
    applied: bool,
}

struct Importer<'a, S: RecordStore> {
    registrar: &'a mut Registrar<S>,
    actor: &'a Actor,
    institution: InstitutionId,
    strategy: ConflictStrategy,
    report: ImportReport,
}

impl<'a, S: RecordStore> Importer<'a, S> {
    fn new(
        registrar: &'a mut Registrar<S>,
        actor: &'a Actor,
        institution: InstitutionId,
        strategy: ConflictStrategy,
        report: ImportReport,
    ) -> Self {
        Self {
            registrar,
            actor,
            institution,
            strategy,
            report,
        }
    }

    fn run(mut self, batch: &ImportBatch) -> ImportReport {
        for row_error in &batch.row_errors {
            self.report
                .error("row", format!("line {}", row_error.line), &row_error.message);
        }
        for row in &batch.programs {
            let key = row.short_name.clone();
            let result = self.program(row);
            self.settle("program", &key, result);
        }
        for row in &batch.terms {
            let key = row.name.clone();
            let result = self.term(row);
            self.settle("term", &key, result);
        }
        for row in &batch.instructors {
            let key = row.email.clone();
            let result = self.instructor(row);
            self.settle("instructor", &key, result);
        }
        for row in &batch.courses {
            let key = row.course_number.clone();
            let result = self.course(row);
            self.settle("course", &key, result);
        }
        for row in &batch.outcomes {
            let key = format!("{} CLO {}", row.course_number, row.clo_number);
            let result = self.outcome(row);
            self.settle("outcome", &key, result);
        }
        for row in &batch.offerings {
            let key = format!("{} {}", row.course_number, row.term_name);
            let result = self.offering(row);
            self.settle("offering", &key, result);
        }
        for row in &batch.sections {
            let key = format!("{} {} {}", row.course_number, row.term_name, row.section_number);
            let result = self.section(row);
            self.settle("section", &key, result);
        }
        for row in &batch.assessments {
            let key = format!(
                "{} {} {} CLO {}",
                row.course_number, row.term_name, row.section_number, row.clo_number
            );
            let result = self.assessment(&key, row);
            self.settle("assessment", &key, result);
        }
        self.report
    }

    /// Count a record by what happened to it.
    fn settle(&mut self, entity: &str, key: &str, result: Result<Option<Diff>>) {
        match result {
            Ok(None) => self.report.created(entity),
            Ok(Some(diff)) if diff.applied => self.report.updated(),
            Ok(Some(diff)) if diff.differs => self.report.skipped(),
            Ok(Some(_)) => self.report.unchanged(),
            Err(err) => self.report.error(entity, key, err),
        }
    }

    /// Compare one text field. Returns whether the incoming value should be
    /// written.
    fn field(
        &mut self,
        diff: &mut Diff,
        entity: &str,
        key: &str,
        field: &str,
        existing: &str,
        incoming: Option<&str>,
    ) -> bool {
        let is_empty = existing.trim().is_empty();
        self.field_or_empty(diff, entity, key, field, existing, is_empty, incoming)
    }

    /// Like [`Self::field`] for values whose "unset" form is not an empty
    /// string, such as an enrollment of 0.
    #[allow(clippy::too_many_arguments)]
    fn field_or_empty(
        &mut self,
        diff: &mut Diff,
        entity: &str,
        key: &str,
        field: &str,
        existing: &str,
        existing_is_empty: bool,
        incoming: Option<&str>,
    ) -> bool {
        let Some(incoming) = incoming else {
            return false;
        };
        if existing == incoming {
            return false;
        }
        let resolution = self.strategy.resolve(existing_is_empty);
        self.report.conflicts.push(FieldConflict {
            entity: entity.to_string(),
            key: key.to_string(),
            field: field.to_string(),
            existing: existing.to_string(),
            incoming: incoming.to_string(),
            resolution,
        });
        diff.differs = true;
        let apply = matches!(
            resolution,
            Resolution::AppliedIncoming | Resolution::FilledEmpty
        );
        diff.applied |= apply;
        apply
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    fn course_by_number(&self, number: &str) -> Result<Course> {
        self.registrar
            .find_course(self.institution, number)?
            .ok_or_else(|| RegistrarError::not_found("course", number))
    }

    fn term_by_name(&self, name: &str) -> Result<Term> {
        self.registrar
            .find_term(self.institution, name)?
            .ok_or_else(|| RegistrarError::not_found("term", name))
    }

    fn offering_for(&self, course_number: &str, term_name: &str) -> Result<Offering> {
        let course = self.course_by_number(course_number)?;
        let term = self.term_by_name(term_name)?;
        self.registrar
            .find_offering(&course, term.id)?
            .ok_or_else(|| {
                RegistrarError::not_found("offering", format!("{course_number} {term_name}"))
            })
    }

    /// A user of this institution by email.
    fn member(&self, email: &str) -> Result<User> {
        let email = normalize_email(email)?;
        let user = self
            .registrar
            .find_user_by_email(&email)?
            .ok_or_else(|| RegistrarError::not_found("user", &email))?;
        if user.institution_id != Some(self.institution) {
            return Err(RegistrarError::conflict(format!(
                "{email} belongs to another institution"
            )));
        }
        Ok(user)
    }

    /// Program ids for short names. Unknown names become warnings.
    fn program_ids(&mut self, course_number: &str, names: &[String]) -> Result<Vec<ProgramId>> {
        let mut ids = Vec::new();
        for name in names {
            match self.registrar.find_program(self.institution, name)? {
                Some(program) => ids.push(program.id),
                None => self.report.warn(format!(
                    "{course_number}: unknown program '{name}' ignored"
                )),
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn program_names(&self, ids: &[ProgramId]) -> Result<String> {
        let mut names = Vec::new();
        for program in self
            .registrar
            .list_programs(self.actor, Some(self.institution))?
        {
            if ids.contains(&program.id) {
                names.push(program.short_name);
            }
        }
        names.sort();
        Ok(names.join(";"))
    }

    // -------------------------------------------------------------------------
    // Records. `Ok(None)` means created.
    // -------------------------------------------------------------------------

    fn program(&mut self, row: &ProgramRow) -> Result<Option<Diff>> {
        let short_name = normalize_short_name(&row.short_name)?;
        let Some(existing) = self.registrar.find_program(self.institution, &short_name)? else {
            self.registrar.create_program(
                self.actor,
                self.institution,
                NewProgram {
                    name: row.name.clone().unwrap_or_else(|| short_name.clone()),
                    short_name,
                },
            )?;
            return Ok(None);
        };

        let mut diff = Diff::default();
        if self.field(
            &mut diff,
            "program",
            &short_name,
            "name",
            &existing.name,
            row.name.as_deref(),
        ) {
            let name = row.name.as_deref().unwrap_or_default();
            self.registrar.rename_program(self.actor, existing.id, name)?;
        }
        Ok(Some(diff))
    }

    fn term(&mut self, row: &TermRow) -> Result<Option<Diff>> {
        let Some(existing) = self.registrar.find_term(self.institution, &row.name)? else {
            let (Some(start_date), Some(end_date)) = (row.start_date, row.end_date) else {
                return Err(RegistrarError::validation(
                    "start and end dates are required to create a term",
                ));
            };
            self.registrar.create_term(
                self.actor,
                NewTerm {
                    institution_id: Some(self.institution),
                    name: row.name.clone(),
                    start_date,
                    end_date,
                },
            )?;
            return Ok(None);
        };

        let mut diff = Diff::default();
        let mut update = TermUpdate::default();
        let start = row.start_date.map(|d| d.to_string());
        if self.field(
            &mut diff,
            "term",
            &existing.name,
            "start_date",
            &existing.start_date.to_string(),
            start.as_deref(),
        ) {
            update.start_date = row.start_date;
        }
        let end = row.end_date.map(|d| d.to_string());
        if self.field(
            &mut diff,
            "term",
            &existing.name,
            "end_date",
            &existing.end_date.to_string(),
            end.as_deref(),
        ) {
            update.end_date = row.end_date;
        }
        if diff.applied {
            self.registrar.update_term(self.actor, existing.id, update)?;
        }
        Ok(Some(diff))
    }

    fn instructor(&mut self, row: &InstructorRow) -> Result<Option<Diff>> {
        let email = normalize_email(&row.email)?;
        let Some(existing) = self.registrar.find_user_by_email(&email)? else {
            self.registrar.create_user(
                self.actor,
                NewUser {
                    institution_id: Some(self.institution),
                    email,
                    first_name: row.first_name.clone().unwrap_or_default(),
                    last_name: row.last_name.clone().unwrap_or_default(),
                    role: Role::Instructor,
                    program_ids: Vec::new(),
                },
            )?;
            return Ok(None);
        };
        if existing.institution_id != Some(self.institution) {
            return Err(RegistrarError::conflict(format!(
                "{email} belongs to another institution"
            )));
        }

        let mut diff = Diff::default();
        let mut update = UserUpdate::default();
        if self.field(
            &mut diff,
            "instructor",
            &email,
            "first_name",
            &existing.first_name,
            row.first_name.as_deref(),
        ) {
            update.first_name.clone_from(&row.first_name);
        }
        if self.field(
            &mut diff,
            "instructor",
            &email,
            "last_name",
            &existing.last_name,
            row.last_name.as_deref(),
        ) {
            update.last_name.clone_from(&row.last_name);
        }
        if diff.applied {
            self.registrar.update_user(self.actor, existing.id, update)?;
        }
        Ok(Some(diff))
    }

    fn course(&mut self, row: &CourseRow) -> Result<Option<Diff>> {
        let number = normalize_course_number(&row.course_number)?;
        let program_ids = self.program_ids(&number, &row.programs)?;
        let Some(existing) = self.registrar.find_course(self.institution, &number)? else {
            let title = row
                .title
                .clone()
                .ok_or_else(|| RegistrarError::validation("a title is required to create a course"))?;
            self.registrar.create_course(
                self.actor,
                NewCourse {
                    institution_id: Some(self.institution),
                    course_number: number,
                    title,
                    department: row.department.clone().unwrap_or_default(),
                    credit_hours: row.credit_hours.unwrap_or(DEFAULT_CREDIT_HOURS),
                    program_ids,
                },
            )?;
            return Ok(None);
        };

        let mut diff = Diff::default();
        let mut update = CourseUpdate::default();
        if self.field(
            &mut diff,
            "course",
            &number,
            "title",
            &existing.title,
            row.title.as_deref(),
        ) {
            update.title.clone_from(&row.title);
        }
        if self.field(
            &mut diff,
            "course",
            &number,
            "department",
            &existing.department,
            row.department.as_deref(),
        ) {
            update.department.clone_from(&row.department);
        }
        let hours = row.credit_hours.map(|h| h.to_string());
        if self.field(
            &mut diff,
            "course",
            &number,
            "credit_hours",
            &existing.credit_hours.to_string(),
            hours.as_deref(),
        ) {
            update.credit_hours = row.credit_hours;
        }
        if !row.programs.is_empty() {
            let stored = self.program_names(&existing.program_ids)?;
            let incoming = self.program_names(&program_ids)?;
            if self.field(
                &mut diff,
                "course",
                &number,
                "programs",
                &stored,
                Some(incoming.as_str()),
            ) {
                update.program_ids = Some(program_ids);
            }
        }
        if diff.applied {
            self.registrar.update_course(self.actor, existing.id, update)?;
        }
        Ok(Some(diff))
    }

    fn outcome(&mut self, row: &OutcomeRow) -> Result<Option<Diff>> {
        let course = self.course_by_number(&row.course_number)?;
        let existing = self
            .registrar
            .list_outcomes(self.actor, course.id)?
            .into_iter()
            .find(|o| o.clo_number == row.clo_number);
        let Some(existing) = existing else {
            self.registrar.create_outcome(
                self.actor,
                course.id,
                NewOutcome {
                    clo_number: Some(row.clo_number),
                    description: row.description.clone(),
                },
            )?;
            return Ok(None);
        };

        let mut diff = Diff::default();
        let key = format!("{} CLO {}", course.course_number, row.clo_number);
        if self.field(
            &mut diff,
            "outcome",
            &key,
            "description",
            &existing.description,
            Some(row.description.as_str()),
        ) {
            self.registrar.update_outcome(
                self.actor,
                existing.id,
                OutcomeUpdate {
                    description: Some(row.description.clone()),
                    active: None,
                },
            )?;
        }
        Ok(Some(diff))
    }

    fn offering(&mut self, row: &OfferingRow) -> Result<Option<Diff>> {
        let course = self.course_by_number(&row.course_number)?;
        let term = self.term_by_name(&row.term_name)?;
        if self.registrar.find_offering(&course, term.id)?.is_some() {
            return Ok(Some(Diff::default()));
        }
        self.registrar.create_offering(
            self.actor,
            NewOffering {
                course_id: course.id,
                term_id: term.id,
            },
        )?;
        Ok(None)
    }

    fn section(&mut self, row: &SectionRow) -> Result<Option<Diff>> {
        let offering = self.offering_for(&row.course_number, &row.term_name)?;
        let instructor = row
            .instructor_email
            .as_deref()
            .map(|email| self.member(email))
            .transpose()?;

        let Some(existing) = self
            .registrar
            .find_section(offering.id, &row.section_number)?
        else {
            self.registrar.create_section(
                self.actor,
                NewSection {
                    offering_id: offering.id,
                    section_number: row.section_number.clone(),
                    instructor_id: instructor.as_ref().map(|u| u.id),
                    enrollment: row.enrollment.unwrap_or(0),
                },
            )?;
            return Ok(None);
        };

        let key = format!("{} {} {}", row.course_number, row.term_name, row.section_number);
        let mut diff = Diff::default();
        let enrollment = row.enrollment.map(|n| n.to_string());
        if self.field_or_empty(
            &mut diff,
            "section",
            &key,
            "enrollment",
            &existing.enrollment.to_string(),
            existing.enrollment == 0,
            enrollment.as_deref(),
        ) {
            self.registrar.update_section(
                self.actor,
                existing.id,
                SectionUpdate {
                    enrollment: row.enrollment,
                    ..SectionUpdate::default()
                },
            )?;
        }

        let stored_email = match existing.instructor_id {
            Some(id) => self
                .registrar
                .get_user(self.actor, id)
                .map(|u| u.email)
                .unwrap_or_default(),
            None => String::new(),
        };
        if let Some(user) = instructor {
            if self.field_or_empty(
                &mut diff,
                "section",
                &key,
                "instructor",
                &stored_email,
                existing.instructor_id.is_none(),
                Some(user.email.as_str()),
            ) {
                self.registrar
                    .assign_instructor(self.actor, existing.id, Some(user.id))?;
            }
        }
        Ok(Some(diff))
    }

    /// Results go through `record_assessment`, so approved or closed
    /// assessments refuse changes and the enrollment bound applies.
    fn assessment(&mut self, key: &str, row: &AssessmentRow) -> Result<Option<Diff>> {
        let offering = self.offering_for(&row.course_number, &row.term_name)?;
        let section = self
            .registrar
            .find_section(offering.id, &row.section_number)?
            .ok_or_else(|| {
                RegistrarError::not_found(
                    "section",
                    format!("{} {} {}", row.course_number, row.term_name, row.section_number),
                )
            })?;
        let outcome = self
            .registrar
            .list_outcomes(self.actor, offering.course_id)?
            .into_iter()
            .find(|o| o.clo_number == row.clo_number)
            .ok_or_else(|| RegistrarError::not_found("outcome", key))?;
        let existing = self
            .registrar
            .assessments_of(&section)?
            .into_iter()
            .find(|a| a.outcome_id == outcome.id)
            .ok_or_else(|| RegistrarError::not_found("assessment", key))?;

        let mut diff = Diff::default();
        let mut data = existing.data.clone();
        let stored = &existing.data;
        if self.field(
            &mut diff,
            "assessment",
            key,
            "students_took",
            &shown(stored.students_took),
            row.students_took.map(|n| n.to_string()).as_deref(),
        ) {
            data.students_took = row.students_took;
        }
        if self.field(
            &mut diff,
            "assessment",
            key,
            "students_passed",
            &shown(stored.students_passed),
            row.students_passed.map(|n| n.to_string()).as_deref(),
        ) {
            data.students_passed = row.students_passed;
        }
        if self.field(
            &mut diff,
            "assessment",
            key,
            "assessment_tool",
            stored.assessment_tool.as_deref().unwrap_or_default(),
            row.assessment_tool.as_deref(),
        ) {
            data.assessment_tool.clone_from(&row.assessment_tool);
        }
        if self.field(
            &mut diff,
            "assessment",
            key,
            "narrative",
            stored.narrative.as_deref().unwrap_or_default(),
            row.narrative.as_deref(),
        ) {
            data.narrative.clone_from(&row.narrative);
        }
        if diff.applied {
            self.registrar
                .record_assessment(self.actor, existing.id, data)?;
        }
        Ok(Some(diff))
    }
}

fn shown(value: Option<u32>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterRegistry, roster::RosterCsv};
    use crate::registrar::tests::{date, fixture};
    use crate::storage::RecordKind;
    use crate::workflow::CloStatus;

    const ROSTER: &str = "\
course_number,course_title,term_name,term_start,term_end,section_number,enrollment,instructor_email,instructor_first_name,instructor_last_name,clo_number,clo_description
CS 101,Intro to Programming,Fall 2025,2025-08-25,2025-12-15,001,30,ivy@mcc.edu,Ivy,Instructor,1,Write programs
CS 101,Intro to Programming,Fall 2025,2025-08-25,2025-12-15,002,18,sam@mcc.edu,Sam,Smith,1,Write programs
CS 102,Data Structures,Spring 2026,2026-01-12,2026-05-08,001,20,sam@mcc.edu,Sam,Smith,1,Use lists
";

    fn roster_batch() -> Result<ImportBatch> {
        RosterCsv.parse(ROSTER.as_bytes())
    }

    #[test]
    fn creates_missing_records_in_order() -> Result<()> {
        let mut f = fixture()?;
        let batch = roster_batch()?;
        let report = import_batch(
            &mut f.registrar,
            &f.admin,
            f.institution.id,
            &batch,
            ImportOptions::default(),
        )?;

        assert!(report.errors.is_empty(), "{}", report.to_text());
        assert_eq!(report.created_by_entity.get("term"), Some(&1));
        assert_eq!(report.created_by_entity.get("instructor"), Some(&1));
        assert_eq!(report.created_by_entity.get("course"), Some(&1));
        assert_eq!(report.created_by_entity.get("section"), Some(&2));

        let sam = f.registrar.find_user_by_email("sam@mcc.edu")?;
        assert!(sam.is_some_and(|u| u.role == Role::Instructor));
        let spring = f.registrar.find_term(f.institution.id, "spring 2026")?;
        assert_eq!(spring.map(|t| t.start_date), Some(date(2026, 1, 12)));
        Ok(())
    }

    #[test]
    fn merge_keeps_stored_values() -> Result<()> {
        let mut f = fixture()?;
        let batch = roster_batch()?;
        let report = import_batch(
            &mut f.registrar,
            &f.admin,
            f.institution.id,
            &batch,
            ImportOptions::default(),
        )?;

        // Enrollment 25 is stored, the file says 30.
        let conflict = report
            .conflicts
            .iter()
            .find(|c| c.field == "enrollment")
            .cloned();
        assert_eq!(
            conflict.map(|c| (c.existing, c.incoming, c.resolution)),
            Some(("25".into(), "30".into(), Resolution::KeptExisting))
        );
        assert_eq!(f.registrar.get_section(&f.admin, f.section.id)?.enrollment, 25);
        assert!(report.is_clean());
        Ok(())
    }

    #[test]
    fn merge_fills_unknown_enrollment() -> Result<()> {
        let mut f = fixture()?;
        f.registrar.update_section(
            &f.admin,
            f.section.id,
            SectionUpdate {
                enrollment: Some(0),
                ..SectionUpdate::default()
            },
        )?;
        let batch = roster_batch()?;
        let report = import_batch(
            &mut f.registrar,
            &f.admin,
            f.institution.id,
            &batch,
            ImportOptions::default(),
        )?;

        let conflict = report
            .conflicts
            .iter()
            .find(|c| c.field == "enrollment")
            .map(|c| c.resolution);
        assert_eq!(conflict, Some(Resolution::FilledEmpty));
        assert_eq!(f.registrar.get_section(&f.admin, f.section.id)?.enrollment, 30);
        Ok(())
    }

    #[test]
    fn use_theirs_overwrites() -> Result<()> {
        let mut f = fixture()?;
        let batch = roster_batch()?;
        let options = ImportOptions {
            strategy: ConflictStrategy::UseTheirs,
            dry_run: false,
        };
        import_batch(&mut f.registrar, &f.admin, f.institution.id, &batch, options)?;
        assert_eq!(f.registrar.get_section(&f.admin, f.section.id)?.enrollment, 30);
        Ok(())
    }

    #[test]
    fn manual_review_leaves_conflicts_open() -> Result<()> {
        let mut f = fixture()?;
        let batch = roster_batch()?;
        let options = ImportOptions {
            strategy: ConflictStrategy::ManualReview,
            dry_run: false,
        };
        let report = import_batch(&mut f.registrar, &f.admin, f.institution.id, &batch, options)?;
        assert!(!report.is_clean());
        assert!(report.unresolved_conflicts().any(|c| c.field == "enrollment"));
        assert_eq!(f.registrar.get_section(&f.admin, f.section.id)?.enrollment, 25);
        assert!(report.skipped >= 1);
        Ok(())
    }

    #[test]
    fn dry_run_writes_nothing() -> Result<()> {
        let mut f = fixture()?;
        let before = f.registrar.counts()?;
        let batch = roster_batch()?;
        let options = ImportOptions {
            strategy: ConflictStrategy::UseTheirs,
            dry_run: true,
        };
        let report = import_batch(&mut f.registrar, &f.admin, f.institution.id, &batch, options)?;

        assert!(report.dry_run);
        assert!(report.created > 0);
        assert_eq!(f.registrar.counts()?, before);
        assert_eq!(f.registrar.get_section(&f.admin, f.section.id)?.enrollment, 25);
        Ok(())
    }

    #[test]
    fn second_import_is_unchanged() -> Result<()> {
        let mut f = fixture()?;
        let batch = roster_batch()?;
        let options = ImportOptions {
            strategy: ConflictStrategy::UseTheirs,
            dry_run: false,
        };
        import_batch(&mut f.registrar, &f.admin, f.institution.id, &batch, options)?;
        let again = import_batch(&mut f.registrar, &f.admin, f.institution.id, &batch, options)?;
        assert_eq!(again.created, 0);
        assert_eq!(again.updated, 0);
        assert!(again.conflicts.is_empty());
        Ok(())
    }

    #[test]
    fn failures_are_per_record() -> Result<()> {
        let mut f = fixture()?;
        let mut batch = ImportBatch::default();
        batch.add_term(TermRow {
            name: "Summer 2026".into(),
            start_date: None,
            end_date: None,
        });
        batch.add_course(CourseRow {
            course_number: "ENG 110".into(),
            title: Some("Composition".into()),
            department: None,
            credit_hours: None,
            programs: vec!["NOPE".into()],
        });
        batch.row_error(9, "enrollment: cannot read 'x'");

        let report = import_batch(
            &mut f.registrar,
            &f.admin,
            f.institution.id,
            &batch,
            ImportOptions::default(),
        )?;
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.created_by_entity.get("course"), Some(&1));
        assert_eq!(report.warnings.len(), 1);
        assert!(f.registrar.find_course(f.institution.id, "ENG 110")?.is_some());
        Ok(())
    }

    #[test]
    fn new_sections_open_assessments() -> Result<()> {
        let mut f = fixture()?;
        let batch = roster_batch()?;
        import_batch(
            &mut f.registrar,
            &f.admin,
            f.institution.id,
            &batch,
            ImportOptions::default(),
        )?;
        // Fixture has one section with two CLOs; the roster adds two
        // sections: one of CS 101 (two CLOs) and one of CS 102 (one CLO).
        assert_eq!(f.registrar.store().count(RecordKind::Assessment)?, 5);
        let assigned = f.registrar.list_assessments(
            &f.admin,
            &crate::registrar::AssessmentFilter {
                status: Some(CloStatus::Assigned),
                ..Default::default()
            },
        )?;
        assert_eq!(assigned.len(), 5);
        Ok(())
    }

    #[test]
    fn instructors_cannot_import() -> Result<()> {
        let mut f = fixture()?;
        let batch = roster_batch()?;
        let result = import_batch(
            &mut f.registrar,
            &f.instructor,
            f.institution.id,
            &batch,
            ImportOptions::default(),
        );
        assert!(matches!(result, Err(RegistrarError::Forbidden(_))));
        Ok(())
    }

    #[test]
    fn import_file_names_the_adapter() -> Result<()> {
        let mut f = fixture()?;
        let registry = AdapterRegistry::with_builtin();
        let adapter = registry.get("roster_csv")?;
        let report = import_file(
            &mut f.registrar,
            &f.admin,
            f.institution.id,
            adapter,
            ROSTER.as_bytes(),
            ImportOptions::default(),
        )?;
        assert_eq!(report.adapter, "roster_csv");
        Ok(())
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!(
            "use-theirs".parse::<ConflictStrategy>().ok(),
            Some(ConflictStrategy::UseTheirs)
        );
        assert_eq!(
            "MANUAL_REVIEW".parse::<ConflictStrategy>().ok(),
            Some(ConflictStrategy::ManualReview)
        );
        assert!("yolo".parse::<ConflictStrategy>().is_err());
    }
}
