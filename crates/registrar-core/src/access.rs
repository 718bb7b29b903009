//! # Access Control
//!
//! Roles, permissions and tenant scoping.
//!
//! Two rules hold everywhere:
//! - A caller outside a record's institution sees `NotFound`, never
//!   `Forbidden`, so record existence does not leak across tenants.
//! - A caller never grants a role above their own.

use crate::error::{RegistrarError, Result};
use crate::models::{Course, User};
use crate::primitives::{InstitutionId, ProgramId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// ROLES AND PERMISSIONS
// =============================================================================

/// User role, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Teaches sections and reports CLO results.
    Instructor,
    /// Manages courses and reviews assessments within their programs.
    ProgramAdmin,
    /// Manages one institution.
    InstitutionAdmin,
    /// Operates the whole service.
    SiteAdmin,
}

impl Role {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instructor => "instructor",
            Self::ProgramAdmin => "program_admin",
            Self::InstitutionAdmin => "institution_admin",
            Self::SiteAdmin => "site_admin",
        }
    }

    /// Whether the role includes `permission` (before scope checks).
    #[must_use]
    pub const fn allows(self, permission: Permission) -> bool {
        use Permission as P;
        match self {
            Self::SiteAdmin => true,
            Self::InstitutionAdmin => !matches!(permission, P::ManageInstitutions),
            Self::ProgramAdmin => matches!(
                permission,
                P::ViewInstitution
                    | P::SubmitAssessments
                    | P::ManageCatalog
                    | P::ManageSchedule
                    | P::ManageUsers
                    | P::ReviewAssessments
                    | P::ImportData
                    | P::ExportData
            ),
            Self::Instructor => matches!(permission, P::ViewInstitution | P::SubmitAssessments),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "instructor" => Ok(Self::Instructor),
            "program_admin" => Ok(Self::ProgramAdmin),
            "institution_admin" => Ok(Self::InstitutionAdmin),
            "site_admin" => Ok(Self::SiteAdmin),
            other => Err(RegistrarError::validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Coarse capabilities granted by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read records of the home institution.
    ViewInstitution,
    /// Enter and submit CLO data.
    SubmitAssessments,
    /// Create and edit courses and outcomes.
    ManageCatalog,
    /// Create and delete programs.
    ManagePrograms,
    /// Create and edit terms, offerings and sections.
    ManageSchedule,
    /// Create and edit user accounts.
    ManageUsers,
    /// Approve, return or close submissions.
    ReviewAssessments,
    /// Run imports.
    ImportData,
    /// Run exports.
    ExportData,
    /// Create and edit institutions.
    ManageInstitutions,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ViewInstitution => "view institution records",
            Self::SubmitAssessments => "submit assessments",
            Self::ManageCatalog => "manage the course catalog",
            Self::ManagePrograms => "manage programs",
            Self::ManageSchedule => "manage the schedule",
            Self::ManageUsers => "manage users",
            Self::ReviewAssessments => "review assessments",
            Self::ImportData => "import data",
            Self::ExportData => "export data",
            Self::ManageInstitutions => "manage institutions",
        };
        f.write_str(text)
    }
}

// =============================================================================
// ACTOR
// =============================================================================

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Calling user.
    pub user_id: UserId,
    /// Role at authentication time.
    pub role: Role,
    /// Home institution, `None` for site admins.
    pub institution_id: Option<InstitutionId>,
    /// Program memberships.
    pub program_ids: Vec<ProgramId>,
}

impl Actor {
    /// Build the actor for a stored user.
    #[must_use]
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            institution_id: user.institution_id,
            program_ids: user.program_ids.clone(),
        }
    }

    /// Whether the caller is a site admin.
    #[must_use]
    pub fn is_site_admin(&self) -> bool {
        self.role == Role::SiteAdmin
    }

    /// Require a role-level permission.
    pub fn require(&self, permission: Permission) -> Result<()> {
        if self.role.allows(permission) {
            Ok(())
        } else {
            Err(RegistrarError::forbidden(format!(
                "{} may not {permission}",
                self.role
            )))
        }
    }

    /// Whether the caller can see records of `institution`.
    #[must_use]
    pub fn can_see(&self, institution: InstitutionId) -> bool {
        self.is_site_admin() || self.institution_id == Some(institution)
    }

    /// Tenant check: `NotFound` outside the caller's institution.
    pub fn ensure_tenant(
        &self,
        institution: InstitutionId,
        kind: &'static str,
        id: impl ToString,
    ) -> Result<()> {
        if self.can_see(institution) {
            Ok(())
        } else {
            Err(RegistrarError::not_found(kind, id))
        }
    }

    /// Resolve the institution an institution-scoped call applies to.
    ///
    /// Site admins must name one. Everyone else defaults to, and is limited
    /// to, their own.
    pub fn resolve_institution(&self, requested: Option<InstitutionId>) -> Result<InstitutionId> {
        match (requested, self.institution_id) {
            (Some(requested), _) if self.can_see(requested) => Ok(requested),
            (Some(requested), _) => Err(RegistrarError::not_found("institution", requested)),
            (None, Some(home)) => Ok(home),
            (None, None) => Err(RegistrarError::validation("institution_id is required")),
        }
    }

    /// Whether the caller may manage `course` (catalog edits).
    #[must_use]
    pub fn can_manage_course(&self, course: &Course) -> bool {
        if !self.can_see(course.institution_id) || !self.role.allows(Permission::ManageCatalog) {
            return false;
        }
        match self.role {
            Role::ProgramAdmin => course.in_any_program(&self.program_ids),
            _ => true,
        }
    }

    /// Whether the caller may review assessments of sections of `course`.
    #[must_use]
    pub fn can_review_course(&self, course: &Course) -> bool {
        if !self.can_see(course.institution_id)
            || !self.role.allows(Permission::ReviewAssessments)
        {
            return false;
        }
        match self.role {
            Role::ProgramAdmin => course.in_any_program(&self.program_ids),
            _ => true,
        }
    }

    /// Whether the caller may enter data for a section taught by `instructor`.
    #[must_use]
    pub fn can_edit_for(&self, course: &Course, instructor: Option<UserId>) -> bool {
        if instructor == Some(self.user_id) && self.can_see(course.institution_id) {
            return true;
        }
        self.can_review_course(course)
    }

    /// Check that the caller may create or modify a user with `role` in
    /// `institution`.
    pub fn ensure_can_grant(&self, role: Role, institution: Option<InstitutionId>) -> Result<()> {
        self.require(Permission::ManageUsers)?;
        if role > self.role {
            return Err(RegistrarError::forbidden(format!(
                "{} may not grant the {role} role",
                self.role
            )));
        }
        if self.role == Role::ProgramAdmin && role != Role::Instructor {
            return Err(RegistrarError::forbidden(
                "program admins may only manage instructors",
            ));
        }
        match institution {
            Some(inst) if !self.can_see(inst) => Err(RegistrarError::not_found("institution", inst)),
            None if role != Role::SiteAdmin => Err(RegistrarError::validation(
                "non-site-admin users need an institution",
            )),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
