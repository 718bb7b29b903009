//! Institutions, programs and user accounts.

use crate::access::Role;
use crate::primitives::{InstitutionId, ProgramId, UserId};
use crate::storage::{Record, RecordKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tenant. Every other record belongs to exactly one institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    /// Identifier.
    pub id: InstitutionId,
    /// Display name (e.g. "Metro Community College").
    pub name: String,
    /// Unique short name (e.g. "MCC").
    pub short_name: String,
    /// Inactive institutions reject every login.
    pub active: bool,
    /// Creation time.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

/// An academic program used to scope program admins and group courses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Identifier.
    pub id: ProgramId,
    /// Owning institution.
    pub institution_id: InstitutionId,
    /// Display name (e.g. "Computer Science").
    pub name: String,
    /// Short name, unique within the institution.
    pub short_name: String,
    /// Creation time.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

/// A user account.
///
/// `token_hash` never leaves the core; callers get a [`UserView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identifier.
    pub id: UserId,
    /// Home institution. `None` only for site admins.
    pub institution_id: Option<InstitutionId>,
    /// Lowercased, globally unique email.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Role.
    pub role: Role,
    /// Programs this user administers or teaches in.
    pub program_ids: Vec<ProgramId>,
    /// Inactive users cannot authenticate.
    pub active: bool,
    /// blake3 hash of the current API token, if one was issued.
    pub token_hash: Option<String>,
    /// Creation time.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Full display name.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Public projection without credentials.
    #[must_use]
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            institution_id: self.institution_id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role,
            program_ids: self.program_ids.clone(),
            active: self.active,
            has_token: self.token_hash.is_some(),
        }
    }
}

/// A user as shown to API callers and in exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    /// Identifier.
    pub id: UserId,
    /// Home institution.
    pub institution_id: Option<InstitutionId>,
    /// Email.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Role.
    pub role: Role,
    /// Program memberships.
    pub program_ids: Vec<ProgramId>,
    /// Whether the account is active.
    pub active: bool,
    /// Whether an API token is currently issued.
    #[serde(default)]
    pub has_token: bool,
}

impl Record for Institution {
    const KIND: RecordKind = RecordKind::Institution;

    fn key(&self) -> u64 {
        self.id.0
    }

    fn institution(&self) -> Option<InstitutionId> {
        Some(self.id)
    }
}

impl Record for Program {
    const KIND: RecordKind = RecordKind::Program;

    fn key(&self) -> u64 {
        self.id.0
    }

    fn institution(&self) -> Option<InstitutionId> {
        Some(self.institution_id)
    }
}

impl Record for User {
    const KIND: RecordKind = RecordKind::User;

    fn key(&self) -> u64 {
        self.id.0
    }

    fn institution(&self) -> Option<InstitutionId> {
        self.institution_id
    }
}
