//! # Roster CSV
//!
//! One row per (section, CLO): the course, its term, the section with its
//! instructor, and one learning outcome. Exports append the assessment
//! status and counts. Imports read the counts and tool back when present;
//! the status column is informational.

use super::csv::{CsvRow, CsvTable, CsvWriter};
use super::{
    Adapter, AdapterInfo, AssessmentRow, CourseRow, ExportBatch, ImportBatch, InstructorRow,
    OfferingRow, OutcomeRow, SectionRow, TermRow,
};
use crate::error::{RegistrarError, Result};
use crate::primitives::{normalize_course_number, normalize_email};
use chrono::NaiveDate;

const IMPORT_COLUMNS: [&str; 14] = [
    "course_number",
    "course_title",
    "department",
    "credit_hours",
    "term_name",
    "term_start",
    "term_end",
    "section_number",
    "enrollment",
    "instructor_email",
    "instructor_first_name",
    "instructor_last_name",
    "clo_number",
    "clo_description",
];

const EXPORT_EXTRA: [&str; 4] = [
    "status",
    "students_took",
    "students_passed",
    "assessment_tool",
];

const REQUIRED: [&str; 3] = ["course_number", "term_name", "section_number"];

/// The `roster_csv` adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RosterCsv;

/// Everything one roster row contributes.
struct RosterRecord {
    course: CourseRow,
    term: TermRow,
    section: SectionRow,
    instructor: Option<InstructorRow>,
    outcome: Option<OutcomeRow>,
    assessment: Option<AssessmentRow>,
}

fn read_record(table: &CsvTable, row: &CsvRow) -> Result<RosterRecord> {
    let course_number = normalize_course_number(table.get(row, "course_number").unwrap_or(""))?;
    let term_name = table
        .get(row, "term_name")
        .map(str::to_string)
        .ok_or_else(|| RegistrarError::validation("term_name is required"))?;
    let section_number = table
        .get(row, "section_number")
        .map(str::to_string)
        .ok_or_else(|| RegistrarError::validation("section_number is required"))?;

    let instructor = table
        .get(row, "instructor_email")
        .map(normalize_email)
        .transpose()?
        .map(|email| InstructorRow {
            email,
            first_name: table.get(row, "instructor_first_name").map(str::to_string),
            last_name: table.get(row, "instructor_last_name").map(str::to_string),
        });

    let outcome = match table.parse::<u16>(row, "clo_number")? {
        None => None,
        Some(clo_number) => {
            let description = table.get(row, "clo_description").ok_or_else(|| {
                RegistrarError::validation(format!(
                    "clo_description is required for CLO {clo_number}"
                ))
            })?;
            Some(OutcomeRow {
                course_number: course_number.clone(),
                clo_number,
                description: description.to_string(),
            })
        }
    };

    let assessment = match &outcome {
        Some(outcome) => Some(AssessmentRow {
            course_number: course_number.clone(),
            term_name: term_name.clone(),
            section_number: section_number.clone(),
            clo_number: outcome.clo_number,
            students_took: table.parse(row, "students_took")?,
            students_passed: table.parse(row, "students_passed")?,
            assessment_tool: table.get(row, "assessment_tool").map(str::to_string),
            narrative: None,
        }),
        None => None,
    };

    Ok(RosterRecord {
        course: CourseRow {
            course_number: course_number.clone(),
            title: table.get(row, "course_title").map(str::to_string),
            department: table.get(row, "department").map(str::to_string),
            credit_hours: table.parse(row, "credit_hours")?,
            programs: Vec::new(),
        },
        term: TermRow {
            name: term_name.clone(),
            start_date: table.parse::<NaiveDate>(row, "term_start")?,
            end_date: table.parse::<NaiveDate>(row, "term_end")?,
        },
        section: SectionRow {
            course_number,
            term_name,
            section_number,
            enrollment: table.parse(row, "enrollment")?,
            instructor_email: instructor.as_ref().map(|i| i.email.clone()),
        },
        instructor,
        outcome,
        assessment,
    })
}

impl Adapter for RosterCsv {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            id: "roster_csv".into(),
            name: "Roster CSV".into(),
            description: "One row per section and CLO, with term, instructor and assessment status"
                .into(),
            extensions: vec!["csv".into()],
            data_types: [
                "terms",
                "instructors",
                "courses",
                "outcomes",
                "offerings",
                "sections",
                "assessments",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            content_type: "text/csv".into(),
            supports_import: true,
            supports_export: true,
        }
    }

    fn parse(&self, bytes: &[u8]) -> Result<ImportBatch> {
        let table = CsvTable::read(bytes, &REQUIRED)?;
        let mut batch = ImportBatch::default();
        for row in table.rows() {
            match read_record(&table, row) {
                Ok(record) => {
                    let offering = OfferingRow {
                        course_number: record.course.course_number.clone(),
                        term_name: record.term.name.clone(),
                    };
                    batch.add_term(record.term);
                    if let Some(instructor) = record.instructor {
                        batch.add_instructor(instructor);
                    }
                    batch.add_course(record.course);
                    if let Some(outcome) = record.outcome {
                        batch.add_outcome(outcome);
                    }
                    batch.add_offering(offering);
                    batch.add_section(record.section);
                    if let Some(assessment) = record.assessment {
                        batch.add_assessment(assessment);
                    }
                }
                Err(err) => batch.row_error(row.line, err.to_string()),
            }
        }
        Ok(batch)
    }

    fn render(&self, batch: &ExportBatch) -> Result<Vec<u8>> {
        let columns: Vec<&str> = IMPORT_COLUMNS.iter().chain(&EXPORT_EXTRA).copied().collect();
        let mut writer = CsvWriter::with_header(&columns);

        for line in batch.roster_lines() {
            let (clo_number, clo_description, status, took, passed, tool) = match line.outcome {
                Some((outcome, assessment)) => (
                    outcome.clo_number.to_string(),
                    outcome.description.clone(),
                    assessment.map(|a| a.status.to_string()).unwrap_or_default(),
                    assessment
                        .and_then(|a| a.data.students_took)
                        .map(|n| n.to_string())
                        .unwrap_or_default(),
                    assessment
                        .and_then(|a| a.data.students_passed)
                        .map(|n| n.to_string())
                        .unwrap_or_default(),
                    assessment
                        .and_then(|a| a.data.assessment_tool.clone())
                        .unwrap_or_default(),
                ),
                None => Default::default(),
            };
            let (email, first, last) = line
                .instructor
                .map(|u| (u.email.clone(), u.first_name.clone(), u.last_name.clone()))
                .unwrap_or_default();

            let fields = [
                line.course.course_number.clone(),
                line.course.title.clone(),
                line.course.department.clone(),
                line.course.credit_hours.to_string(),
                line.term.name.clone(),
                line.term.start_date.to_string(),
                line.term.end_date.to_string(),
                line.section.section_number.clone(),
                line.section.enrollment.to_string(),
                email,
                first,
                last,
                clo_number,
                clo_description,
                status,
                took,
                passed,
                tool,
            ];
            writer.row(fields.iter().map(String::as_str));
        }
        Ok(writer.into_bytes())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
course_number,course_title,term_name,term_start,term_end,section_number,enrollment,instructor_email,instructor_first_name,instructor_last_name,clo_number,clo_description
cs101,Intro to Programming,Fall 2025,2025-08-25,2025-12-15,001,25,Ivy@MCC.edu,Ivy,Lee,1,Write a program
CS 101,Intro to Programming,Fall 2025,2025-08-25,2025-12-15,001,25,ivy@mcc.edu,Ivy,Lee,2,\"Trace loops, branches\"
CS 101,Intro to Programming,Fall 2025,,,002,,,,,1,Write a program
MATH 200,Calculus,Fall 2025,,,001,thirty,,,,,
";

    #[test]
    fn parses_roster_rows() -> Result<()> {
        let batch = RosterCsv.parse(SAMPLE.as_bytes())?;
        assert_eq!(batch.courses.len(), 1);
        assert_eq!(batch.courses[0].course_number, "CS 101");
        assert_eq!(batch.terms.len(), 1);
        assert_eq!(
            batch.terms[0].start_date,
            NaiveDate::from_ymd_opt(2025, 8, 25)
        );
        assert_eq!(batch.instructors.len(), 1);
        assert_eq!(batch.instructors[0].email, "ivy@mcc.edu");
        assert_eq!(batch.outcomes.len(), 2);
        assert_eq!(batch.outcomes[1].description, "Trace loops, branches");
        assert_eq!(batch.offerings.len(), 1);
        assert_eq!(batch.sections.len(), 2);
        assert_eq!(batch.sections[1].instructor_email, None);
        Ok(())
    }

    #[test]
    fn bad_rows_become_row_errors() -> Result<()> {
        let batch = RosterCsv.parse(SAMPLE.as_bytes())?;
        assert_eq!(batch.row_errors.len(), 1);
        assert_eq!(batch.row_errors[0].line, 5);
        assert!(batch.row_errors[0].message.contains("enrollment"));
        Ok(())
    }

    #[test]
    fn reads_exported_counts_back() -> Result<()> {
        let text = "\
course_number,term_name,section_number,clo_number,clo_description,status,students_took,students_passed,assessment_tool
CS 101,Fall 2025,001,1,Write a program,approved,20,17,Final exam
CS 101,Fall 2025,001,2,Trace loops,assigned,,,
";
        let batch = RosterCsv.parse(text.as_bytes())?;
        assert_eq!(batch.assessments.len(), 1);
        let row = &batch.assessments[0];
        assert_eq!(row.clo_number, 1);
        assert_eq!((row.students_took, row.students_passed), (Some(20), Some(17)));
        assert_eq!(row.assessment_tool.as_deref(), Some("Final exam"));
        Ok(())
    }

    #[test]
    fn missing_section_column_fails_parse() {
        let result = RosterCsv.parse(b"course_number,term_name\nCS 101,Fall 2025\n");
        assert!(result.is_err());
    }
}
