//! # Adapters
//!
//! File interchange. An [`Adapter`] turns file bytes into an
//! [`ImportBatch`] and an [`ExportBatch`] back into file bytes. The
//! [`AdapterRegistry`] holds every adapter the server knows and picks one by
//! id or by file extension.
//!
//! Import batches carry natural keys only (course numbers, term names,
//! emails), never store ids, so a file exported from one deployment can be
//! imported into another.

pub mod catalog;
pub mod csv;
pub mod json;
pub mod roster;

use crate::error::{RegistrarError, Result};
use crate::models::{
    Assessment, Course, Institution, Offering, Outcome, Program, Section, Term, UserView,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// ADAPTER TRAIT
// =============================================================================

/// Description of an adapter, as listed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    /// Unique id (e.g. "roster_csv").
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the adapter reads and writes.
    pub description: String,
    /// File extensions handled, lowercase without the dot.
    pub extensions: Vec<String>,
    /// Record kinds the files carry.
    pub data_types: Vec<String>,
    /// MIME type of rendered files.
    pub content_type: String,
    /// Whether `parse` is supported.
    pub supports_import: bool,
    /// Whether `render` is supported.
    pub supports_export: bool,
}

/// A file format.
pub trait Adapter: Send + Sync {
    /// Static description.
    fn info(&self) -> AdapterInfo;

    /// Parse file bytes into a batch.
    ///
    /// Structural problems (bad encoding, missing required columns) fail the
    /// whole parse. Problems in single rows land in
    /// [`ImportBatch::row_errors`].
    fn parse(&self, bytes: &[u8]) -> Result<ImportBatch>;

    /// Render an export batch into file bytes.
    fn render(&self, batch: &ExportBatch) -> Result<Vec<u8>>;
}

// =============================================================================
// IMPORT BATCH
// =============================================================================

/// A program referenced by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRow {
    /// Short name (natural key).
    pub short_name: String,
    /// Display name. The short name is used when missing.
    pub name: Option<String>,
}

/// A term referenced by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRow {
    /// Name (natural key).
    pub name: String,
    /// First day, required to create the term.
    pub start_date: Option<NaiveDate>,
    /// Last day, required to create the term.
    pub end_date: Option<NaiveDate>,
}

/// An instructor referenced by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructorRow {
    /// Email (natural key).
    pub email: String,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
}

/// A catalog course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRow {
    /// Course number (natural key).
    pub course_number: String,
    /// Title.
    pub title: Option<String>,
    /// Department.
    pub department: Option<String>,
    /// Credit hours.
    pub credit_hours: Option<u8>,
    /// Program short names.
    pub programs: Vec<String>,
}

/// A learning outcome of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRow {
    /// Course number.
    pub course_number: String,
    /// CLO number within the course.
    pub clo_number: u16,
    /// Statement.
    pub description: String,
}

/// A course offered in a term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingRow {
    /// Course number.
    pub course_number: String,
    /// Term name.
    pub term_name: String,
}

/// A section of an offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRow {
    /// Course number.
    pub course_number: String,
    /// Term name.
    pub term_name: String,
    /// Section number.
    pub section_number: String,
    /// Enrollment.
    pub enrollment: Option<u32>,
    /// Instructor email.
    pub instructor_email: Option<String>,
}

/// Recorded CLO results for one section and outcome. Status and history
/// belong to the workflow and are never imported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRow {
    /// Course number.
    pub course_number: String,
    /// Term name.
    pub term_name: String,
    /// Section number.
    pub section_number: String,
    /// CLO number within the course.
    pub clo_number: u16,
    /// Students who took the assessment.
    pub students_took: Option<u32>,
    /// Students who met the outcome.
    pub students_passed: Option<u32>,
    /// Assessment tool.
    pub assessment_tool: Option<String>,
    /// Instructor narrative.
    pub narrative: Option<String>,
}

impl AssessmentRow {
    /// Whether the row carries any results.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.students_took.is_some()
            || self.students_passed.is_some()
            || self.assessment_tool.is_some()
            || self.narrative.is_some()
    }
}

/// A row that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based line number in the source file.
    pub line: usize,
    /// What was wrong.
    pub message: String,
}

/// Parsed file contents, deduplicated by natural key.
///
/// When the same key appears more than once (a roster repeats its course on
/// every CLO row), the first occurrence wins and later rows only fill in
/// fields the first one left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBatch {
    /// Programs.
    pub programs: Vec<ProgramRow>,
    /// Terms.
    pub terms: Vec<TermRow>,
    /// Instructors.
    pub instructors: Vec<InstructorRow>,
    /// Courses.
    pub courses: Vec<CourseRow>,
    /// Outcomes.
    pub outcomes: Vec<OutcomeRow>,
    /// Offerings.
    pub offerings: Vec<OfferingRow>,
    /// Sections.
    pub sections: Vec<SectionRow>,
    /// Assessment results.
    #[serde(default)]
    pub assessments: Vec<AssessmentRow>,
    /// Rows that could not be read.
    pub row_errors: Vec<RowError>,
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

impl ImportBatch {
    /// Whether the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
            && self.terms.is_empty()
            && self.instructors.is_empty()
            && self.courses.is_empty()
            && self.outcomes.is_empty()
            && self.offerings.is_empty()
            && self.sections.is_empty()
            && self.assessments.is_empty()
    }

    /// Total records across every kind.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.programs.len()
            + self.terms.len()
            + self.instructors.len()
            + self.courses.len()
            + self.outcomes.len()
            + self.offerings.len()
            + self.sections.len()
            + self.assessments.len()
    }

    /// Note a bad row.
    pub fn row_error(&mut self, line: usize, message: impl Into<String>) {
        self.row_errors.push(RowError {
            line,
            message: message.into(),
        });
    }

    /// Add a program unless its short name is already present.
    pub fn add_program(&mut self, row: ProgramRow) {
        let key = row.short_name.to_uppercase();
        match self
            .programs
            .iter_mut()
            .find(|p| p.short_name.to_uppercase() == key)
        {
            Some(existing) => fill(&mut existing.name, &row.name),
            None => self.programs.push(row),
        }
    }

    /// Add a term, merging dates into an earlier row of the same name.
    pub fn add_term(&mut self, row: TermRow) {
        let key = row.name.to_lowercase();
        match self.terms.iter_mut().find(|t| t.name.to_lowercase() == key) {
            Some(existing) => {
                fill(&mut existing.start_date, &row.start_date);
                fill(&mut existing.end_date, &row.end_date);
            }
            None => self.terms.push(row),
        }
    }

    /// Add an instructor, merging names into an earlier row of the same email.
    pub fn add_instructor(&mut self, row: InstructorRow) {
        let key = row.email.to_lowercase();
        match self
            .instructors
            .iter_mut()
            .find(|i| i.email.to_lowercase() == key)
        {
            Some(existing) => {
                fill(&mut existing.first_name, &row.first_name);
                fill(&mut existing.last_name, &row.last_name);
            }
            None => self.instructors.push(row),
        }
    }

    /// Add a course, merging into an earlier row of the same number.
    pub fn add_course(&mut self, row: CourseRow) {
        match self
            .courses
            .iter_mut()
            .find(|c| c.course_number == row.course_number)
        {
            Some(existing) => {
                fill(&mut existing.title, &row.title);
                fill(&mut existing.department, &row.department);
                fill(&mut existing.credit_hours, &row.credit_hours);
                for program in row.programs {
                    if !existing.programs.contains(&program) {
                        existing.programs.push(program);
                    }
                }
            }
            None => self.courses.push(row),
        }
    }

    /// Add an outcome unless (course, CLO number) is already present.
    pub fn add_outcome(&mut self, row: OutcomeRow) {
        let exists = self
            .outcomes
            .iter()
            .any(|o| o.course_number == row.course_number && o.clo_number == row.clo_number);
        if !exists {
            self.outcomes.push(row);
        }
    }

    /// Add an offering unless (course, term) is already present.
    pub fn add_offering(&mut self, row: OfferingRow) {
        let key = row.term_name.to_lowercase();
        let exists = self
            .offerings
            .iter()
            .any(|o| o.course_number == row.course_number && o.term_name.to_lowercase() == key);
        if !exists {
            self.offerings.push(row);
        }
    }

    /// Add a section, merging into an earlier row of the same
    /// (course, term, section number).
    pub fn add_section(&mut self, row: SectionRow) {
        let term = row.term_name.to_lowercase();
        let number = row.section_number.to_lowercase();
        match self.sections.iter_mut().find(|s| {
            s.course_number == row.course_number
                && s.term_name.to_lowercase() == term
                && s.section_number.to_lowercase() == number
        }) {
            Some(existing) => {
                fill(&mut existing.enrollment, &row.enrollment);
                fill(&mut existing.instructor_email, &row.instructor_email);
            }
            None => self.sections.push(row),
        }
    }

    /// Add assessment results, merging into an earlier row of the same
    /// (course, term, section number, CLO). Rows without results are
    /// dropped.
    pub fn add_assessment(&mut self, row: AssessmentRow) {
        if !row.has_data() {
            return;
        }
        let term = row.term_name.to_lowercase();
        let number = row.section_number.to_lowercase();
        match self.assessments.iter_mut().find(|a| {
            a.course_number == row.course_number
                && a.term_name.to_lowercase() == term
                && a.section_number.to_lowercase() == number
                && a.clo_number == row.clo_number
        }) {
            Some(existing) => {
                fill(&mut existing.students_took, &row.students_took);
                fill(&mut existing.students_passed, &row.students_passed);
                fill(&mut existing.assessment_tool, &row.assessment_tool);
                fill(&mut existing.narrative, &row.narrative);
            }
            None => self.assessments.push(row),
        }
    }
}

// =============================================================================
// EXPORT BATCH
// =============================================================================

/// Everything exported for one institution, each list ordered by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBatch {
    /// When the export was taken.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exported_at: DateTime<Utc>,
    /// The institution.
    pub institution: Institution,
    /// Programs.
    pub programs: Vec<Program>,
    /// Instructors (teaching a section or holding the instructor role).
    pub instructors: Vec<UserView>,
    /// Courses.
    pub courses: Vec<Course>,
    /// Outcomes.
    pub outcomes: Vec<Outcome>,
    /// Terms.
    pub terms: Vec<Term>,
    /// Offerings.
    pub offerings: Vec<Offering>,
    /// Sections.
    pub sections: Vec<Section>,
    /// Assessments.
    pub assessments: Vec<Assessment>,
}

/// One (section, outcome) row, resolved to natural keys.
#[derive(Debug, Clone)]
pub struct RosterLine<'a> {
    /// Course of the section.
    pub course: &'a Course,
    /// Term of the offering.
    pub term: &'a Term,
    /// Section.
    pub section: &'a Section,
    /// Instructor, if assigned and exported.
    pub instructor: Option<&'a UserView>,
    /// Outcome and its assessment, `None` for a section with no outcomes.
    pub outcome: Option<(&'a Outcome, Option<&'a Assessment>)>,
}

impl ExportBatch {
    /// Flatten into one line per (section, outcome), ordered by course
    /// number, term start, section number and CLO number.
    #[must_use]
    pub fn roster_lines(&self) -> Vec<RosterLine<'_>> {
        let courses: BTreeMap<_, _> = self.courses.iter().map(|c| (c.id, c)).collect();
        let terms: BTreeMap<_, _> = self.terms.iter().map(|t| (t.id, t)).collect();
        let offerings: BTreeMap<_, _> = self.offerings.iter().map(|o| (o.id, o)).collect();
        let users: BTreeMap<_, _> = self.instructors.iter().map(|u| (u.id, u)).collect();

        let mut lines = Vec::new();
        for section in &self.sections {
            let Some(offering) = offerings.get(&section.offering_id) else {
                continue;
            };
            let (Some(course), Some(term)) =
                (courses.get(&offering.course_id), terms.get(&offering.term_id))
            else {
                continue;
            };
            let instructor = section
                .instructor_id
                .and_then(|id| users.get(&id).copied());

            let mut outcomes: Vec<&Outcome> = self
                .outcomes
                .iter()
                .filter(|o| o.course_id == course.id)
                .collect();
            outcomes.sort_by_key(|o| o.clo_number);

            let with_assessment: Vec<_> = outcomes
                .into_iter()
                .filter_map(|outcome| {
                    let assessment = self
                        .assessments
                        .iter()
                        .find(|a| a.section_id == section.id && a.outcome_id == outcome.id);
                    // Inactive outcomes without an assessment are not part of the roster.
                    (outcome.active || assessment.is_some()).then_some((outcome, assessment))
                })
                .collect();

            if with_assessment.is_empty() {
                lines.push(RosterLine {
                    course,
                    term,
                    section,
                    instructor,
                    outcome: None,
                });
            }
            for pair in with_assessment {
                lines.push(RosterLine {
                    course,
                    term,
                    section,
                    instructor,
                    outcome: Some(pair),
                });
            }
        }
        lines.sort_by(|a, b| {
            (
                &a.course.course_number,
                a.term.start_date,
                &a.section.section_number,
                a.outcome.map(|(o, _)| o.clo_number),
            )
                .cmp(&(
                    &b.course.course_number,
                    b.term.start_date,
                    &b.section.section_number,
                    b.outcome.map(|(o, _)| o.clo_number),
                ))
        });
        lines
    }

    /// Convert back into an import batch keyed by natural keys.
    #[must_use]
    pub fn to_import_batch(&self) -> ImportBatch {
        let mut batch = ImportBatch::default();
        let programs: BTreeMap<_, _> = self.programs.iter().map(|p| (p.id, p)).collect();
        let courses: BTreeMap<_, _> = self.courses.iter().map(|c| (c.id, c)).collect();
        let terms: BTreeMap<_, _> = self.terms.iter().map(|t| (t.id, t)).collect();
        let offerings: BTreeMap<_, _> = self.offerings.iter().map(|o| (o.id, o)).collect();
        let users: BTreeMap<_, _> = self.instructors.iter().map(|u| (u.id, u)).collect();

        for program in &self.programs {
            batch.add_program(ProgramRow {
                short_name: program.short_name.clone(),
                name: Some(program.name.clone()),
            });
        }
        for term in &self.terms {
            batch.add_term(TermRow {
                name: term.name.clone(),
                start_date: Some(term.start_date),
                end_date: Some(term.end_date),
            });
        }
        for user in &self.instructors {
            batch.add_instructor(InstructorRow {
                email: user.email.clone(),
                first_name: Some(user.first_name.clone()),
                last_name: Some(user.last_name.clone()),
            });
        }
        for course in &self.courses {
            batch.add_course(CourseRow {
                course_number: course.course_number.clone(),
                title: Some(course.title.clone()),
                department: Some(course.department.clone()).filter(|d| !d.is_empty()),
                credit_hours: Some(course.credit_hours),
                programs: course
                    .program_ids
                    .iter()
                    .filter_map(|id| programs.get(id).map(|p| p.short_name.clone()))
                    .collect(),
            });
        }
        for (index, outcome) in self.outcomes.iter().enumerate() {
            match courses.get(&outcome.course_id) {
                Some(course) => batch.add_outcome(OutcomeRow {
                    course_number: course.course_number.clone(),
                    clo_number: outcome.clo_number,
                    description: outcome.description.clone(),
                }),
                None => batch.row_error(
                    index + 1,
                    format!("outcome {} refers to unknown course {}", outcome.id, outcome.course_id),
                ),
            }
        }
        for (index, offering) in self.offerings.iter().enumerate() {
            match (courses.get(&offering.course_id), terms.get(&offering.term_id)) {
                (Some(course), Some(term)) => batch.add_offering(OfferingRow {
                    course_number: course.course_number.clone(),
                    term_name: term.name.clone(),
                }),
                _ => batch.row_error(
                    index + 1,
                    format!("offering {} refers to an unknown course or term", offering.id),
                ),
            }
        }
        for (index, section) in self.sections.iter().enumerate() {
            let resolved = offerings.get(&section.offering_id).and_then(|o| {
                Some((courses.get(&o.course_id)?, terms.get(&o.term_id)?))
            });
            let Some((course, term)) = resolved else {
                batch.row_error(
                    index + 1,
                    format!("section {} refers to an unknown offering", section.id),
                );
                continue;
            };
            batch.add_section(SectionRow {
                course_number: course.course_number.clone(),
                term_name: term.name.clone(),
                section_number: section.section_number.clone(),
                enrollment: Some(section.enrollment),
                instructor_email: section
                    .instructor_id
                    .and_then(|id| users.get(&id).map(|u| u.email.clone())),
            });
        }

        let sections: BTreeMap<_, _> = self.sections.iter().map(|s| (s.id, s)).collect();
        let outcomes: BTreeMap<_, _> = self.outcomes.iter().map(|o| (o.id, o)).collect();
        for (index, assessment) in self.assessments.iter().enumerate() {
            let resolved = sections.get(&assessment.section_id).and_then(|section| {
                let offering = offerings.get(&section.offering_id)?;
                Some((
                    section,
                    courses.get(&offering.course_id)?,
                    terms.get(&offering.term_id)?,
                    outcomes.get(&assessment.outcome_id)?,
                ))
            });
            let Some((section, course, term, outcome)) = resolved else {
                batch.row_error(
                    index + 1,
                    format!("assessment {} refers to an unknown section or outcome", assessment.id),
                );
                continue;
            };
            batch.add_assessment(AssessmentRow {
                course_number: course.course_number.clone(),
                term_name: term.name.clone(),
                section_number: section.section_number.clone(),
                clo_number: outcome.clo_number,
                students_took: assessment.data.students_took,
                students_passed: assessment.data.students_passed,
                assessment_tool: assessment.data.assessment_tool.clone(),
                narrative: assessment.data.narrative.clone(),
            });
        }
        batch
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Every adapter the service knows, keyed by id.
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Box<dyn Adapter>>,
    /// extension -> adapter id, first registration wins
    by_extension: BTreeMap<String, String>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("by_extension", &self.by_extension)
            .finish()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl AdapterRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            adapters: BTreeMap::new(),
            by_extension: BTreeMap::new(),
        }
    }

    /// A registry with the built-in adapters: `roster_csv`, `catalog_csv`
    /// and `json`.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        let builtin: [Box<dyn Adapter>; 3] = [
            Box::new(roster::RosterCsv),
            Box::new(catalog::CatalogCsv),
            Box::new(json::JsonAdapter),
        ];
        for adapter in builtin {
            // Built-in ids are distinct, so registration cannot fail here.
            let _ = registry.register(adapter);
        }
        registry
    }

    /// Add an adapter. Duplicate ids are refused.
    pub fn register(&mut self, adapter: Box<dyn Adapter>) -> Result<()> {
        let info = adapter.info();
        if self.adapters.contains_key(&info.id) {
            return Err(RegistrarError::conflict(format!(
                "adapter '{}' is already registered",
                info.id
            )));
        }
        for ext in &info.extensions {
            self.by_extension
                .entry(ext.to_ascii_lowercase())
                .or_insert_with(|| info.id.clone());
        }
        self.adapters.insert(info.id, adapter);
        Ok(())
    }

    /// Adapter by id.
    pub fn get(&self, id: &str) -> Result<&dyn Adapter> {
        self.adapters
            .get(id)
            .map(Box::as_ref)
            .ok_or_else(|| RegistrarError::not_found("adapter", id))
    }

    /// Descriptions of every adapter, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<AdapterInfo> {
        self.adapters.values().map(|a| a.info()).collect()
    }

    /// Adapter for a file name, by extension.
    #[must_use]
    pub fn for_file(&self, file_name: &str) -> Option<&dyn Adapter> {
        let ext = std::path::Path::new(file_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        let id = self.by_extension.get(&ext)?;
        self.adapters.get(id).map(Box::as_ref)
    }

    /// Pick an adapter: explicit id first, then file extension.
    pub fn resolve(&self, id: Option<&str>, file_name: Option<&str>) -> Result<&dyn Adapter> {
        if let Some(id) = id {
            return self.get(id);
        }
        file_name
            .and_then(|name| self.for_file(name))
            .ok_or_else(|| {
                RegistrarError::validation("no adapter given and none matches the file extension")
            })
    }
}

// =============================================================================
// TESTS
// =============================================================================
