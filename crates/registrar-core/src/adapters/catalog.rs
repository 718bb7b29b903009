//! # Catalog CSV
//!
//! Courses and their CLOs, one row per outcome. `programs` holds
//! `;`-separated program short names.

use super::csv::{CsvRow, CsvTable, CsvWriter};
use super::{Adapter, AdapterInfo, CourseRow, ExportBatch, ImportBatch, OutcomeRow, ProgramRow};
use crate::error::{RegistrarError, Result};
use crate::primitives::{normalize_course_number, normalize_short_name};
use std::collections::BTreeMap;

const COLUMNS: [&str; 7] = [
    "course_number",
    "course_title",
    "department",
    "credit_hours",
    "programs",
    "clo_number",
    "clo_description",
];

/// The `catalog_csv` adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogCsv;

fn read_record(table: &CsvTable, row: &CsvRow) -> Result<(CourseRow, Option<OutcomeRow>)> {
    let course_number = normalize_course_number(table.get(row, "course_number").unwrap_or(""))?;
    let programs = table
        .get(row, "programs")
        .unwrap_or("")
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(normalize_short_name)
        .collect::<Result<Vec<_>>>()?;

    let outcome = match table.parse::<u16>(row, "clo_number")? {
        None => None,
        Some(clo_number) => Some(OutcomeRow {
            course_number: course_number.clone(),
            clo_number,
            description: table
                .get(row, "clo_description")
                .ok_or_else(|| {
                    RegistrarError::validation(format!(
                        "clo_description is required for CLO {clo_number}"
                    ))
                })?
                .to_string(),
        }),
    };

    let course = CourseRow {
        course_number,
        title: table.get(row, "course_title").map(str::to_string),
        department: table.get(row, "department").map(str::to_string),
        credit_hours: table.parse(row, "credit_hours")?,
        programs,
    };
    Ok((course, outcome))
}

impl Adapter for CatalogCsv {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            id: "catalog_csv".into(),
            name: "Catalog CSV".into(),
            description: "Courses, their programs and learning outcomes".into(),
            extensions: vec!["csv".into()],
            data_types: ["programs", "courses", "outcomes"]
                .into_iter()
                .map(String::from)
                .collect(),
            content_type: "text/csv".into(),
            supports_import: true,
            supports_export: true,
        }
    }

    fn parse(&self, bytes: &[u8]) -> Result<ImportBatch> {
        let table = CsvTable::read(bytes, &["course_number", "course_title"])?;
        let mut batch = ImportBatch::default();
        for row in table.rows() {
            match read_record(&table, row) {
                Ok((course, outcome)) => {
                    for program in &course.programs {
                        batch.add_program(ProgramRow {
                            short_name: program.clone(),
                            name: None,
                        });
                    }
                    batch.add_course(course);
                    if let Some(outcome) = outcome {
                        batch.add_outcome(outcome);
                    }
                }
                Err(err) => batch.row_error(row.line, err.to_string()),
            }
        }
        Ok(batch)
    }

    fn render(&self, batch: &ExportBatch) -> Result<Vec<u8>> {
        let programs: BTreeMap<_, _> = batch
            .programs
            .iter()
            .map(|p| (p.id, p.short_name.as_str()))
            .collect();
        let mut courses: Vec<_> = batch.courses.iter().collect();
        courses.sort_by(|a, b| a.course_number.cmp(&b.course_number));

        let mut writer = CsvWriter::with_header(&COLUMNS);
        for course in courses {
            let program_list = course
                .program_ids
                .iter()
                .filter_map(|id| programs.get(id).copied())
                .collect::<Vec<_>>()
                .join(";");
            let credit_hours = course.credit_hours.to_string();
            let course_fields = [
                course.course_number.as_str(),
                course.title.as_str(),
                course.department.as_str(),
                credit_hours.as_str(),
                program_list.as_str(),
            ];

            let mut outcomes: Vec<_> = batch
                .outcomes
                .iter()
                .filter(|o| o.course_id == course.id && o.active)
                .collect();
            outcomes.sort_by_key(|o| o.clo_number);

            if outcomes.is_empty() {
                writer.row(course_fields.iter().copied().chain(["", ""]));
            }
            for outcome in outcomes {
                let number = outcome.clo_number.to_string();
                writer.row(
                    course_fields
                        .iter()
                        .copied()
                        .chain([number.as_str(), outcome.description.as_str()]),
                );
            }
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

    #[test]
    fn reads_programs_and_outcomes() -> Result<()> {
        let text = "Course_Number,Course_Title,Credit_Hours,Programs,CLO_Number,CLO_Description\n\
                    math2510,Calculus I,4,math; stem,1,Differentiate\n\
                    MATH 2510,Calculus I,4,MATH,2,Integrate\n\
                    BIO 101L,Lab,1,,,\n";
        let batch = CatalogCsv.parse(text.as_bytes())?;
        assert!(batch.row_errors.is_empty());
        assert_eq!(batch.programs.len(), 2);
        assert_eq!(batch.programs[1].short_name, "STEM");
        assert_eq!(batch.courses.len(), 2);
        assert_eq!(batch.courses[0].course_number, "MATH 2510");
        assert_eq!(batch.courses[0].credit_hours, Some(4));
        assert_eq!(batch.outcomes.len(), 2);
        Ok(())
    }

    #[test]
    fn outcome_without_description_is_row_error() -> Result<()> {
        let text = "course_number,course_title,clo_number\nCS 101,Intro,1\n";
        let batch = CatalogCsv.parse(text.as_bytes())?;
        assert!(batch.courses.is_empty());
        assert_eq!(batch.row_errors.len(), 1);
        assert_eq!(batch.row_errors[0].line, 2);
        Ok(())
    }

    #[test]
    fn title_column_is_required() {
        assert!(CatalogCsv.parse(b"course_number\nCS 101\n").is_err());
    }
}
