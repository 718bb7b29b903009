//! # Export
//!
//! Gathers one institution's records into an [`ExportBatch`] and hands it to
//! an adapter for rendering.

use crate::access::{Actor, Permission, Role};
use crate::adapters::{Adapter, ExportBatch};
use crate::error::{RegistrarError, Result};
use crate::models::{Assessment, Course, Offering, Outcome, Program, Section, Term, User};
use crate::primitives::InstitutionId;
use crate::registrar::Registrar;
use crate::storage::RecordStore;
use chrono::Utc;
use std::collections::BTreeSet;

/// Everything `institution` owns, each list ordered by id.
///
/// Instructors are users who teach a section or hold the instructor role.
/// Token hashes never leave the store.
pub fn collect_export<S: RecordStore>(
    registrar: &Registrar<S>,
    actor: &Actor,
    institution: InstitutionId,
) -> Result<ExportBatch> {
    actor.require(Permission::ExportData)?;
    let institution = registrar.get_institution(actor, institution)?;
    let store = registrar.store();
    let tenant = institution.id;

    let sections: Vec<Section> = store.scan_tenant(tenant)?;
    let teaching: BTreeSet<_> = sections.iter().filter_map(|s| s.instructor_id).collect();
    let instructors = store
        .scan_tenant::<User>(tenant)?
        .into_iter()
        .filter(|u| u.role == Role::Instructor || teaching.contains(&u.id))
        .map(|u| u.view())
        .collect();

    Ok(ExportBatch {
        exported_at: Utc::now(),
        programs: store.scan_tenant::<Program>(tenant)?,
        instructors,
        courses: store.scan_tenant::<Course>(tenant)?,
        outcomes: store.scan_tenant::<Outcome>(tenant)?,
        terms: store.scan_tenant::<Term>(tenant)?,
        offerings: store.scan_tenant::<Offering>(tenant)?,
        sections,
        assessments: store.scan_tenant::<Assessment>(tenant)?,
        institution,
    })
}

/// Render `batch` with `adapter`.
pub fn export_with(adapter: &dyn Adapter, batch: &ExportBatch) -> Result<Vec<u8>> {
    let info = adapter.info();
    if !info.supports_export {
        return Err(RegistrarError::Adapter(format!(
            "adapter '{}' does not support export",
            info.id
        )));
    }
    adapter.render(batch)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterRegistry;
    use crate::import::{ImportOptions, import_batch};
    use crate::registrar::tests::fixture;
    use crate::registrar::{NewInstitution, NewUser};
    use crate::storage::MemoryStore;
    use crate::workflow::AssessmentData;

    #[test]
    fn gathers_one_tenant() -> Result<()> {
        let mut f = fixture()?;
        let other = f.registrar.create_institution(
            &f.site,
            NewInstitution {
                name: "Other College".into(),
                short_name: "oc".into(),
            },
        )?;
        f.registrar.create_user(
            &f.site,
            NewUser {
                institution_id: Some(other.id),
                email: "x@oc.edu".into(),
                first_name: "X".into(),
                last_name: String::new(),
                role: Role::Instructor,
                program_ids: Vec::new(),
            },
        )?;

        let batch = collect_export(&f.registrar, &f.admin, f.institution.id)?;
        assert_eq!(batch.institution.id, f.institution.id);
        assert_eq!(batch.courses.len(), 1);
        assert_eq!(batch.outcomes.len(), 2);
        assert_eq!(batch.sections.len(), 1);
        assert_eq!(batch.assessments.len(), 2);
        let emails: Vec<&str> = batch.instructors.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["ivy@mcc.edu"]);
        Ok(())
    }

    #[test]
    fn other_tenants_are_not_found() -> Result<()> {
        let mut f = fixture()?;
        let other = f.registrar.create_institution(
            &f.site,
            NewInstitution {
                name: "Other College".into(),
                short_name: "oc".into(),
            },
        )?;
        let result = collect_export(&f.registrar, &f.admin, other.id);
        assert!(matches!(result, Err(RegistrarError::NotFound { .. })));
        assert!(collect_export(&f.registrar, &f.instructor, f.institution.id).is_err());
        Ok(())
    }

    #[test]
    fn roster_lists_every_assessment() -> Result<()> {
        let f = fixture()?;
        let batch = collect_export(&f.registrar, &f.admin, f.institution.id)?;
        let registry = AdapterRegistry::with_builtin();
        let bytes = export_with(registry.get("roster_csv")?, &batch)?;
        let text = String::from_utf8(bytes).unwrap_or_default();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("status,students_took,students_passed,assessment_tool"));
        assert!(lines[1].starts_with("CS 101,Intro to Programming,Computing,3,Fall 2025"));
        assert!(lines[1].contains("ivy@mcc.edu"));
        assert!(lines[1].contains(",1,Write programs,assigned,"));
        Ok(())
    }

    #[test]
    fn json_export_seeds_a_fresh_store() -> Result<()> {
        let mut f = fixture()?;
        let recorded = f.registrar.assessments_of(&f.section)?[0].clone();
        f.registrar.record_assessment(
            &f.instructor,
            recorded.id,
            AssessmentData {
                students_took: Some(20),
                students_passed: Some(17),
                assessment_tool: Some("Final exam".into()),
                narrative: Some("Strong cohort".into()),
            },
        )?;
        let batch = collect_export(&f.registrar, &f.admin, f.institution.id)?;
        let registry = AdapterRegistry::with_builtin();
        let json = registry.get("json")?;
        let bytes = export_with(json, &batch)?;

        let mut fresh = Registrar::new(MemoryStore::new());
        let (root, _) = fresh.bootstrap_site_admin("root@example.edu", "Site", "Admin")?;
        let site = Actor::for_user(&root);
        let target = fresh.create_institution(
            &site,
            NewInstitution {
                name: "Copy".into(),
                short_name: "copy".into(),
            },
        )?;

        let incoming = json.parse(&bytes)?;
        let report = import_batch(
            &mut fresh,
            &site,
            target.id,
            &incoming,
            ImportOptions::default(),
        )?;
        assert!(report.errors.is_empty(), "{}", report.to_text());
        assert_eq!(report.created_by_entity.get("section"), Some(&1));
        assert_eq!(report.created_by_entity.get("outcome"), Some(&2));

        let copied = fresh.find_course(target.id, "CS 101")?;
        assert!(copied.is_some_and(|c| c.program_ids.len() == 1));

        let results: Vec<AssessmentData> = fresh
            .store()
            .scan::<Assessment>()?
            .into_iter()
            .map(|a| a.data)
            .filter(|d| *d != AssessmentData::default())
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].students_took, Some(20));
        assert_eq!(results[0].students_passed, Some(17));
        assert_eq!(results[0].assessment_tool.as_deref(), Some("Final exam"));
        assert_eq!(results[0].narrative.as_deref(), Some("Strong cohort"));
        Ok(())
    }
}
