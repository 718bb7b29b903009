//! # Summary
//!
//! CLO completion reporting for an institution, optionally narrowed to one
//! term. An assessment counts as complete once it is approved or marked
//! never-coming-in.

use crate::access::{Actor, Permission};
use crate::error::Result;
use crate::models::{Assessment, Course, Offering, Program, Section};
use crate::primitives::{CourseId, InstitutionId, OfferingId, ProgramId, SectionId, TermId};
use crate::registrar::Registrar;
use crate::storage::RecordStore;
use crate::workflow::CloStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Completion numbers for one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramProgress {
    /// Program.
    pub program_id: ProgramId,
    /// Program short name.
    pub short_name: String,
    /// Assessments of the program's courses.
    pub total: usize,
    /// Of those, how many are complete.
    pub completed: usize,
    /// Integer completion rate (0-100).
    pub completion_percent: u32,
}

/// Completion numbers for an institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionSummary {
    /// Institution.
    pub institution_id: InstitutionId,
    /// Term filter, if any.
    pub term_id: Option<TermId>,
    /// Sections in scope.
    pub sections: usize,
    /// Sections with no instructor yet.
    pub sections_without_instructor: usize,
    /// Assessments in scope.
    pub total: usize,
    /// Assessment count per status. Every status is present.
    pub by_status: BTreeMap<String, usize>,
    /// Approved plus never-coming-in.
    pub completed: usize,
    /// Integer completion rate (0-100). 0 when there is nothing to assess.
    pub completion_percent: u32,
    /// Per-program breakdown, ordered by short name.
    pub programs: Vec<ProgramProgress>,
}

fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        0
    } else {
        (part.saturating_mul(100) / whole) as u32
    }
}

impl<S: RecordStore> Registrar<S> {
    /// Summarize CLO completion for an institution.
    pub fn institution_summary(
        &self,
        actor: &Actor,
        institution: Option<InstitutionId>,
        term: Option<TermId>,
    ) -> Result<InstitutionSummary> {
        actor.require(Permission::ViewInstitution)?;
        let institution = actor.resolve_institution(institution)?;
        let store = self.store();

        let offerings: BTreeMap<OfferingId, CourseId> = store
            .scan_tenant::<Offering>(institution)?
            .into_iter()
            .filter(|o| term.is_none_or(|t| o.term_id == t))
            .map(|o| (o.id, o.course_id))
            .collect();
        let sections: BTreeMap<SectionId, Section> = store
            .scan_tenant::<Section>(institution)?
            .into_iter()
            .filter(|s| offerings.contains_key(&s.offering_id))
            .map(|s| (s.id, s))
            .collect();
        let course_programs: BTreeMap<CourseId, Vec<ProgramId>> = store
            .scan_tenant::<Course>(institution)?
            .into_iter()
            .map(|c| (c.id, c.program_ids))
            .collect();

        let mut by_status: BTreeMap<String, usize> = CloStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut per_program: BTreeMap<ProgramId, (usize, usize)> = BTreeMap::new();
        let mut total = 0usize;
        let mut completed = 0usize;

        for assessment in store.scan_tenant::<Assessment>(institution)? {
            let Some(section) = sections.get(&assessment.section_id) else {
                continue;
            };
            total += 1;
            *by_status
                .entry(assessment.status.as_str().to_string())
                .or_default() += 1;
            let done = assessment.status.is_closed();
            if done {
                completed += 1;
            }
            let programs = offerings
                .get(&section.offering_id)
                .and_then(|course| course_programs.get(course))
                .map(Vec::as_slice)
                .unwrap_or_default();
            for program in programs {
                let entry = per_program.entry(*program).or_default();
                entry.0 += 1;
                if done {
                    entry.1 += 1;
                }
            }
        }

        let mut programs: Vec<ProgramProgress> = store
            .scan_tenant::<Program>(institution)?
            .into_iter()
            .map(|p| {
                let (total, completed) = per_program.get(&p.id).copied().unwrap_or_default();
                ProgramProgress {
                    program_id: p.id,
                    short_name: p.short_name,
                    total,
                    completed,
                    completion_percent: percent(completed, total),
                }
            })
            .collect();
        programs.sort_by(|a, b| a.short_name.cmp(&b.short_name));

        Ok(InstitutionSummary {
            institution_id: institution,
            term_id: term,
            sections: sections.len(),
            sections_without_instructor: sections
                .values()
                .filter(|s| s.instructor_id.is_none())
                .count(),
            total,
            by_status,
            completed,
            completion_percent: percent(completed, total),
            programs,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::registrar::AssessmentFilter;
    use crate::registrar::tests::fixture;
    use crate::primitives::TermId;

    #[test]
    fn counts_and_completion() -> Result<()> {
        let mut fx = fixture()?;
        let first = fx
            .registrar
            .list_assessments(&fx.admin, &AssessmentFilter::default())?
            .into_iter()
            .next()
            .map(|a| a.id);
        if let Some(id) = first {
            fx.registrar.mark_never_coming_in(&fx.admin, id, "course cancelled")?;
        }

        let summary = fx.registrar.institution_summary(&fx.admin, None, None)?;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.completion_percent, 50);
        assert_eq!(summary.by_status.get("never_coming_in"), Some(&1));
        assert_eq!(summary.by_status.get("assigned"), Some(&1));
        assert_eq!(summary.by_status.get("approved"), Some(&0));
        assert_eq!(summary.programs.len(), 1);
        assert_eq!(summary.programs[0].completion_percent, 50);

        let other = fx
            .registrar
            .institution_summary(&fx.admin, None, Some(TermId(fx.term.id.0 + 1)))?;
        assert_eq!(other.total, 0);
        assert_eq!(other.completion_percent, 0);
        Ok(())
    }
}
